//! Registry manifest types.

use serde::{Deserialize, Serialize};

/// Accept header value for manifest requests.
pub const MEDIA_TYPE_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Manifest response from a v2 registry.
///
/// A single response may be an image manifest (`config` + `layers`), an index
/// manifest (`manifests`), or carry both shapes at once; consumers prefer
/// `manifests` whenever it is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version (should be 2).
    #[serde(default)]
    pub schema_version: u32,
    /// Media type.
    #[serde(default)]
    pub media_type: String,
    /// Config blob descriptor; absent on index manifests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,
    /// Ordered layer descriptors; empty on index manifests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<Descriptor>,
    /// Per-platform child manifests; empty on image manifests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<PlatformManifest>,
}

impl Manifest {
    /// True when the response should be treated as a multi-platform index.
    #[must_use]
    pub fn is_index(&self) -> bool {
        !self.manifests.is_empty()
    }

    /// Selects the first child manifest for `arch` on Linux.
    ///
    /// Returns `None` when no entry matches; no substitute architecture is
    /// ever guessed.
    #[must_use]
    pub fn select_platform(&self, arch: &str) -> Option<&PlatformManifest> {
        self.manifests
            .iter()
            .find(|m| m.platform.architecture == arch && m.platform.os == "linux")
    }
}

/// Content descriptor for a blob (config or layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type.
    #[serde(default)]
    pub media_type: String,
    /// Content size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Content digest of the form `sha256:<64-hex>`.
    pub digest: String,
}

/// Child entry of an index manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformManifest {
    /// Media type of the referenced manifest.
    #[serde(default)]
    pub media_type: String,
    /// Content size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Digest of the referenced manifest.
    pub digest: String,
    /// Platform the referenced manifest targets.
    pub platform: Platform,
}

/// Platform descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture (e.g. "amd64", "arm64").
    pub architecture: String,
    /// Operating system (e.g. "linux").
    pub os: String,
}

/// Strips the `sha256:` prefix from a digest.
#[must_use]
pub fn digest_hex(digest: &str) -> &str {
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(arch: &str, os: &str, digest: &str) -> PlatformManifest {
        PlatformManifest {
            media_type: MEDIA_TYPE_MANIFEST_V2.to_string(),
            size: 100,
            digest: digest.to_string(),
            platform: Platform {
                architecture: arch.to_string(),
                os: os.to_string(),
            },
        }
    }

    fn index(entries: Vec<PlatformManifest>) -> Manifest {
        Manifest {
            schema_version: 2,
            media_type: String::new(),
            config: None,
            layers: vec![],
            manifests: entries,
        }
    }

    #[test]
    fn test_decode_image_manifest() {
        let raw = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "size": 7023,
                "digest": "sha256:aaaa"
            },
            "layers": [
                {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 2, "digest": "sha256:bbbb"}
            ]
        }"#;
        let manifest: Manifest = serde_json::from_str(raw).unwrap();
        assert!(!manifest.is_index());
        assert_eq!(manifest.config.unwrap().digest, "sha256:aaaa");
        assert_eq!(manifest.layers.len(), 1);
    }

    #[test]
    fn test_decode_index_manifest() {
        let raw = r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
            "manifests": [
                {"mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                 "size": 1, "digest": "sha256:cccc",
                 "platform": {"architecture": "amd64", "os": "linux"}}
            ]
        }"#;
        let manifest: Manifest = serde_json::from_str(raw).unwrap();
        assert!(manifest.is_index());
        assert!(manifest.config.is_none());
        assert!(manifest.layers.is_empty());
    }

    #[test]
    fn test_index_preferred_when_both_shapes_present() {
        let raw = r#"{
            "schemaVersion": 2,
            "config": {"mediaType": "", "size": 1, "digest": "sha256:aaaa"},
            "layers": [{"mediaType": "", "size": 1, "digest": "sha256:bbbb"}],
            "manifests": [
                {"mediaType": "", "size": 1, "digest": "sha256:cccc",
                 "platform": {"architecture": "arm64", "os": "linux"}}
            ]
        }"#;
        let manifest: Manifest = serde_json::from_str(raw).unwrap();
        assert!(manifest.is_index());
    }

    #[test]
    fn test_select_platform() {
        let m = index(vec![
            entry("amd64", "linux", "sha256:one"),
            entry("arm64", "linux", "sha256:two"),
        ]);
        assert_eq!(m.select_platform("arm64").unwrap().digest, "sha256:two");
        assert_eq!(m.select_platform("amd64").unwrap().digest, "sha256:one");
        assert!(m.select_platform("s390x").is_none());
    }

    #[test]
    fn test_select_platform_requires_linux() {
        let m = index(vec![entry("amd64", "windows", "sha256:win")]);
        assert!(m.select_platform("amd64").is_none());
    }

    #[test]
    fn test_selection_stable_under_non_matching_permutation() {
        let matching = entry("arm64", "linux", "sha256:target");
        let a = entry("amd64", "linux", "sha256:a");
        let b = entry("s390x", "linux", "sha256:b");

        let one = index(vec![a.clone(), matching.clone(), b.clone()]);
        let two = index(vec![b, matching.clone(), a]);
        assert_eq!(
            one.select_platform("arm64").unwrap().digest,
            two.select_platform("arm64").unwrap().digest
        );
    }

    #[test]
    fn test_digest_hex() {
        assert_eq!(digest_hex("sha256:abcd"), "abcd");
        assert_eq!(digest_hex("abcd"), "abcd");
    }
}
