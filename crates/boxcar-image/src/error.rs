//! Error types for the pull core.

use thiserror::Error;

/// Result type alias for pull operations.
pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors that can occur while locating, downloading, or assembling an image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The user-supplied image reference could not be parsed.
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    /// Every configured registry failed its liveness probe.
    #[error("no configured registry is reachable")]
    NoRegistriesAvailable,

    /// All reachable registries were tried and none served the image.
    #[error("no registry serves {repository}:{tag}")]
    NoRegistryServes {
        /// Repository path that was requested.
        repository: String,
        /// Tag that was requested.
        tag: String,
    },

    /// The bearer-token handshake failed.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// The registry did not return a usable manifest.
    #[error("registry returned no usable manifest (status {status})")]
    ManifestUnavailable {
        /// HTTP status of the manifest response.
        status: u16,
    },

    /// The directory service reported an error for a search.
    #[error("directory service rejected search: {0}")]
    DirectoryRejected(String),

    /// A blob could not be downloaded.
    #[error("blob download failed for {url}: {reason}")]
    BlobDownloadFailure {
        /// Blob URL that was being fetched.
        url: String,
        /// Underlying cause.
        reason: String,
    },

    /// The final archive could not be assembled.
    #[error("image assembly failed: {0}")]
    AssemblyFailure(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
