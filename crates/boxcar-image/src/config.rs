//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority:
//!
//! 1. Environment variables (`BOXCAR_*`, `__`-separated nesting)
//! 2. Configuration file (`~/.config/boxcar/config.toml`)
//! 3. System configuration file (`/etc/boxcar/config.toml`)
//! 4. Built-in defaults
//!
//! The default registry catalog lists public mirrors in priority order with
//! Docker Hub as the last resort. Note that `insecure_tls` defaults to `true`
//! for mirror registries: many private and regional mirrors run with broken
//! certificate chains, and the tool favors availability over transport
//! verification. Set it to `false` per registry to enforce verification.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ImageError, Result};

/// A candidate registry endpoint.
///
/// This record is immutable configuration; probe outcomes live in a separate
/// [`crate::probe::ProbeResult`] keyed by the descriptor, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Human-readable label used in log output.
    pub name: String,
    /// DNS host, optionally with a port. `https` is implied unless the value
    /// already carries an `http://` or `https://` scheme.
    pub host: String,
    /// Ranking key; lower is preferred.
    pub priority: u32,
    /// Advisory hint that the registry requires credentials.
    pub auth_required: bool,
    /// Liveness-probe timeout in seconds.
    pub timeout_secs: u64,
    /// Free-form description.
    pub description: String,
    /// Skip TLS certificate verification for this registry.
    pub insecure_tls: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            priority: 100,
            auth_required: false,
            timeout_secs: 15,
            description: String::new(),
            insecure_tls: true,
        }
    }
}

impl RegistryConfig {
    /// Builds the transient descriptor for a mirror discovered through the
    /// directory service. It ranks ahead of every static registry.
    #[must_use]
    pub fn transient(host: impl Into<String>) -> Self {
        Self {
            name: "directory-mirror".to_string(),
            host: host.into(),
            priority: 0,
            auth_required: false,
            timeout_secs: 30,
            description: "registry discovered via the directory service".to_string(),
            insecure_tls: true,
        }
    }
}

/// One tag rewrite rule. Rules are evaluated in configured order; the first
/// enabled rule whose pattern matches wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TagRule {
    /// Rule label used in log output.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Regular expression tested against the tag.
    pub pattern: String,
    /// Replacement; the literal `{original_tag}` token substitutes the
    /// pre-transform tag.
    pub replacement: String,
    /// Disabled rules are skipped.
    pub enabled: bool,
}

/// Tag rewrite configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TagTransform {
    /// Master switch; when false the tag passes through untouched.
    pub enabled: bool,
    /// Ordered rule list.
    pub rules: Vec<TagRule>,
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Probe fan-out parallelism cap.
    pub max_concurrent_registries: usize,
    /// Blob download attempts (exponential backoff between attempts).
    pub retry_count: u32,
    /// When true, `RepoTags` in the emitted archive uses `image:tag` instead
    /// of `repository:tag`.
    pub remove_registry_prefix: bool,
    /// Architecture used when the caller does not supply one.
    pub default_architecture: String,
    /// Per-request deadline for blob downloads, in seconds.
    pub download_timeout_secs: u64,
    /// Show a byte-level progress bar during downloads.
    pub enable_progress_bar: bool,
    /// Remove the scratch directory after a successful pull.
    pub cleanup_temp_files: bool,
    /// Consult the directory service before the static registry fan-out.
    pub enable_advanced_api: bool,
    /// Base URL of the directory service.
    pub advanced_api_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_registries: 5,
            retry_count: 3,
            remove_registry_prefix: true,
            default_architecture: "amd64".to_string(),
            download_timeout_secs: 300,
            enable_progress_bar: true,
            cleanup_temp_files: true,
            enable_advanced_api: true,
            advanced_api_url: "https://docker.aityp.com/api/v1".to_string(),
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Candidate registries.
    pub registries: Vec<RegistryConfig>,
    /// Tag rewrite rules.
    pub tag_transform: TagTransform,
    /// Global settings.
    pub settings: Settings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registries: vec![
                RegistryConfig {
                    name: "aliyun".to_string(),
                    host: "registry.cn-hangzhou.aliyuncs.com".to_string(),
                    priority: 1,
                    description: "Alibaba Cloud container registry".to_string(),
                    ..RegistryConfig::default()
                },
                RegistryConfig {
                    name: "tencent".to_string(),
                    host: "ccr.ccs.tencentyun.com".to_string(),
                    priority: 2,
                    description: "Tencent Cloud container registry".to_string(),
                    ..RegistryConfig::default()
                },
                RegistryConfig {
                    name: "huawei".to_string(),
                    host: "swr.cn-north-4.myhuaweicloud.com".to_string(),
                    priority: 3,
                    description: "Huawei Cloud container registry".to_string(),
                    ..RegistryConfig::default()
                },
                RegistryConfig {
                    name: "netease".to_string(),
                    host: "hub.c.163.com".to_string(),
                    priority: 4,
                    description: "NetEase container registry".to_string(),
                    ..RegistryConfig::default()
                },
                RegistryConfig {
                    name: "docker-hub".to_string(),
                    host: "registry-1.docker.io".to_string(),
                    priority: 10,
                    timeout_secs: 30,
                    description: "Official Docker Hub (fallback)".to_string(),
                    insecure_tls: false,
                    ..RegistryConfig::default()
                },
            ],
            tag_transform: TagTransform {
                enabled: true,
                rules: vec![TagRule {
                    name: "passthrough".to_string(),
                    description: "keep the original tag".to_string(),
                    pattern: ".*".to_string(),
                    replacement: "{original_tag}".to_string(),
                    enabled: true,
                }],
            },
            settings: Settings::default(),
        }
    }
}

impl Config {
    /// Loads configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source cannot be parsed.
    pub fn load() -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(system_config_path()))
            .merge(Toml::file(user_config_path()))
            .merge(Env::prefixed("BOXCAR_").split("__"))
            .extract()
            .map_err(|e| ImageError::Config(e.to_string()))
    }

    /// Loads configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BOXCAR_").split("__"))
            .extract()
            .map_err(|e| ImageError::Config(e.to_string()))
    }

    /// Returns registries sorted by ascending priority.
    #[must_use]
    pub fn sorted_registries(&self) -> Vec<RegistryConfig> {
        let mut registries = self.registries.clone();
        registries.sort_by_key(|r| r.priority);
        registries
    }

    /// Renders the configuration as a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ImageError::Config(e.to_string()))
    }

    /// Writes the default configuration to `path`, refusing to overwrite an
    /// existing file. Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file already exists or cannot be written.
    pub fn init_file(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ImageError::Config(format!(
                "configuration file already exists: {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::default().to_toml()?)?;
        Ok(path.to_path_buf())
    }
}

/// Path of the per-user configuration file.
#[must_use]
pub fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("boxcar")
        .join("config.toml")
}

fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/boxcar/config.toml")
}
