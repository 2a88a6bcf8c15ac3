//! Image reference parsing.

use serde::{Deserialize, Serialize};

use crate::error::{ImageError, Result};

/// Parsed image reference (e.g. "myorg/app:1.2" or
/// "registry.example.com/ns/app:1.2").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Explicit registry host, when the first path segment carried one.
    pub registry: Option<String>,
    /// Full repository path, host stripped (e.g. "myorg/app").
    pub repository: String,
    /// Last path segment (e.g. "app").
    pub image: String,
    /// Tag; defaults to "latest".
    pub tag: String,
}

impl ImageReference {
    /// Parses a user-supplied reference string.
    ///
    /// The first `/`-separated segment is treated as a registry host when it
    /// contains a `.` or a `:`. No implicit `library/` namespace is added; a
    /// bare name like `nginx` yields repository `nginx`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidReference`] when no image name remains
    /// after parsing.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let mut segments: Vec<&str> = input.split('/').collect();

        let registry = if segments.len() > 1
            && (segments[0].contains('.') || segments[0].contains(':'))
        {
            Some(segments.remove(0).to_string())
        } else {
            None
        };

        let last = segments.pop().unwrap_or("");
        let (image, tag) = match last.split_once(':') {
            Some((image, tag)) if !tag.is_empty() => (image, tag),
            Some((image, _)) => (image, "latest"),
            None => (last, "latest"),
        };

        if image.is_empty() {
            return Err(ImageError::InvalidReference(input.to_string()));
        }

        let mut repository = segments.join("/");
        if repository.is_empty() {
            repository = image.to_string();
        } else {
            repository.push('/');
            repository.push_str(image);
        }

        Ok(Self {
            registry,
            repository,
            image: image.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Returns `repository:tag`.
    #[must_use]
    pub fn repo_tag(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Returns `image:tag` (the repository path dropped).
    #[must_use]
    pub fn short_tag(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// Returns the tag the image will carry after `docker load`.
    #[must_use]
    pub fn load_tag(&self, remove_registry_prefix: bool) -> String {
        if remove_registry_prefix {
            self.short_tag()
        } else {
            self.repo_tag()
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.registry {
            Some(registry) => write!(f, "{}/{}:{}", registry, self.repository, self.tag),
            None => write!(f, "{}:{}", self.repository, self.tag),
        }
    }
}
