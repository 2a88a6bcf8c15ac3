//! Tag rewriting.
//!
//! Mirrors republish upstream images under transformed tags (suffixes,
//! namespace markers). The rewriter applies the configured rule list to the
//! tag before any registry is contacted.

use regex::Regex;
use tracing::{debug, warn};

use crate::config::TagTransform;

/// Applies the configured rewrite rules to `tag`.
///
/// Rules are tested in order; the first enabled rule whose pattern matches
/// wins. Its replacement is returned with every `{original_tag}` token
/// substituted by the incoming tag. A rule with an invalid pattern is logged
/// and skipped. When nothing matches the tag is returned unchanged.
#[must_use]
pub fn rewrite_tag(transform: &TagTransform, tag: &str) -> String {
    if !transform.enabled {
        return tag.to_string();
    }

    for rule in &transform.rules {
        if !rule.enabled {
            continue;
        }

        let pattern = match Regex::new(&rule.pattern) {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!(rule = %rule.name, error = %err, "invalid tag rule pattern, skipping");
                continue;
            }
        };

        if pattern.is_match(tag) {
            let rewritten = rule.replacement.replace("{original_tag}", tag);
            if rewritten != tag {
                debug!(rule = %rule.name, from = %tag, to = %rewritten, "tag rewritten");
            }
            return rewritten;
        }
    }

    tag.to_string()
}
