//! The one-shot image pull flow.
//!
//! Sequencing within a pull is strictly linear: search (the only internally
//! parallel step) → token → config blob → each layer in manifest order →
//! descriptors → tar. The first unrecoverable error short-circuits the rest;
//! the scratch directory is then left behind for inspection.

use std::path::PathBuf;

use tracing::info;

use crate::assemble::{ImageAssembler, ScratchDir};
use crate::config::{Config, RegistryConfig};
use crate::download::BlobDownloader;
use crate::error::{ImageError, Result};
use crate::http::HttpClients;
use crate::reference::ImageReference;
use crate::registry::{fetch_token, Credentials};
use crate::search::{SearchOrchestrator, Selection};
use crate::tag::rewrite_tag;

/// Name of the scratch directory under the working directory.
const SCRATCH_DIR: &str = "tmp";

/// Result of a completed pull.
#[derive(Debug)]
pub struct PullOutcome {
    /// Path of the emitted archive.
    pub output: PathBuf,
    /// Effective reference the image was pulled under.
    pub reference: ImageReference,
    /// Registry that served the image.
    pub registry: RegistryConfig,
    /// Tag the image will carry after `docker load`.
    pub repo_tag: String,
}

/// Pulls images from the best available registry into a docker-loadable tar.
pub struct ImagePuller {
    config: Config,
    clients: HttpClients,
    work_dir: PathBuf,
}

impl ImagePuller {
    /// Creates a puller working in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be initialized.
    pub fn new(config: Config) -> Result<Self> {
        let clients = HttpClients::new()?;
        Ok(Self {
            config,
            clients,
            work_dir: PathBuf::from("."),
        })
    }

    /// Overrides the working directory (scratch space and archive output).
    #[must_use]
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Pulls `image` for `arch` (defaulting to the configured architecture)
    /// and writes `<safe-repo>_<tag>_<arch>.tar` into the working directory.
    ///
    /// # Errors
    ///
    /// Returns the first terminal error: parse failure, no usable registry,
    /// authentication failure, blob download failure, or assembly failure.
    pub async fn pull(
        &self,
        image: &str,
        arch: Option<&str>,
        credentials: &Credentials,
    ) -> Result<PullOutcome> {
        let arch = match arch {
            Some(arch) if !arch.is_empty() => arch,
            _ => self.config.settings.default_architecture.as_str(),
        };

        let mut reference = ImageReference::parse(image)?;
        reference.tag = rewrite_tag(&self.config.tag_transform, &reference.tag);
        info!(
            repository = %reference.repository,
            tag = %reference.tag,
            arch = %arch,
            "searching for image"
        );

        let orchestrator = SearchOrchestrator::new(&self.config, &self.clients);
        let Selection {
            registry,
            manifest,
            reference,
        } = orchestrator.find(&reference, arch, credentials).await?;

        info!(
            registry = %registry.name,
            host = %registry.host,
            repository = %reference.repository,
            tag = %reference.tag,
            "pulling image"
        );

        let config_descriptor = manifest
            .config
            .clone()
            .ok_or(ImageError::ManifestUnavailable { status: 200 })?;
        if manifest.layers.is_empty() {
            return Err(ImageError::ManifestUnavailable { status: 200 });
        }

        let client = self.clients.for_registry(&registry);
        let token = fetch_token(client, &registry, &reference.repository, credentials).await?;

        let scratch = ScratchDir::create(
            self.work_dir.join(SCRATCH_DIR),
            self.config.settings.cleanup_temp_files,
        )?;
        let downloader = BlobDownloader::new(client, &self.config.settings);
        let assembler = ImageAssembler::new(downloader, &self.config.settings);

        info!(layers = manifest.layers.len(), "downloading blobs");
        let config_filename = assembler
            .stage_config(
                scratch.path(),
                &registry,
                &reference,
                &config_descriptor,
                &token,
            )
            .await?;
        let layers = assembler
            .stage_layers(
                scratch.path(),
                &registry,
                &reference,
                &manifest.layers,
                &token,
            )
            .await?;
        assembler.write_descriptors(scratch.path(), &reference, &config_filename, &layers)?;
        let output = assembler.emit_tar(scratch.path(), &reference, arch, &self.work_dir)?;
        scratch.finish()?;

        let repo_tag = reference.load_tag(self.config.settings.remove_registry_prefix);
        info!(output = %output.display(), tag = %repo_tag, "image pull complete");

        Ok(PullOutcome {
            output,
            reference,
            registry,
            repo_tag,
        })
    }
}
