//! Registry search orchestration.
//!
//! Two phases. Phase A (optional): ask the directory service for a mirror,
//! probe it, and try it at top priority. Phase B: probe the static registry
//! list in parallel, rank the survivors by priority and latency, and walk
//! the ranked list until one serves a manifest. Per-candidate failures are
//! logged and swallowed; only exhausting every candidate is terminal.

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{Config, RegistryConfig};
use crate::directory::{best_match, split_mirror, DirectoryClient};
use crate::error::{ImageError, Result};
use crate::http::HttpClients;
use crate::manifest::Manifest;
use crate::probe::{probe, probe_all, rank};
use crate::reference::ImageReference;
use crate::registry::{fetch_manifest, fetch_token, Credentials};

/// A usable registry/manifest pair.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The registry that served the manifest.
    pub registry: RegistryConfig,
    /// The resolved (single-platform, when possible) manifest.
    pub manifest: Manifest,
    /// The effective reference: repository may have been overridden by a
    /// directory mirror, and the registry host is filled in.
    pub reference: ImageReference,
}

/// Finds a registry currently serving an image.
pub struct SearchOrchestrator<'a> {
    config: &'a Config,
    clients: &'a HttpClients,
}

impl<'a> SearchOrchestrator<'a> {
    /// Creates an orchestrator borrowing the shared configuration and
    /// transport.
    #[must_use]
    pub fn new(config: &'a Config, clients: &'a HttpClients) -> Self {
        Self { config, clients }
    }

    /// Runs both phases and returns the first usable selection.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::NoRegistriesAvailable`] when every probe fails,
    /// or [`ImageError::NoRegistryServes`] when the ranked list is exhausted.
    pub async fn find(
        &self,
        reference: &ImageReference,
        arch: &str,
        credentials: &Credentials,
    ) -> Result<Selection> {
        if self.config.settings.enable_advanced_api {
            match self.try_directory(reference, arch, credentials).await {
                Ok(Some(selection)) => return Ok(selection),
                Ok(None) => debug!("directory service produced no usable candidate"),
                Err(err) => warn!(error = %err, "directory-assisted discovery failed"),
            }
            info!("falling back to the static registry list");
        }

        self.fan_out(reference, arch, credentials).await
    }

    /// Phase A: directory-assisted discovery. `Ok(None)` means "nothing
    /// usable, continue with Phase B".
    async fn try_directory(
        &self,
        reference: &ImageReference,
        arch: &str,
        credentials: &Credentials,
    ) -> Result<Option<Selection>> {
        let directory = DirectoryClient::new(
            self.config.settings.advanced_api_url.clone(),
            self.clients.verifying().clone(),
        );

        let platform = (!arch.is_empty()).then(|| format!("linux/{arch}"));
        let results = directory
            .search_with_fallback(&reference.repository, &reference.tag, platform.as_deref())
            .await?;

        let Some(record) = best_match(&results) else {
            return Ok(None);
        };
        let Some((host, path)) = split_mirror(&record.mirror) else {
            return Ok(None);
        };
        info!(source = %record.source, mirror = %record.mirror, "directory service candidate");

        let registry = RegistryConfig::transient(host);
        let result = probe(self.clients.for_registry(&registry), &registry).await;
        if !result.available {
            warn!(host = %registry.host, "directory candidate not reachable");
            return Ok(None);
        }

        let mut effective = reference.clone();
        effective.repository = path;
        effective.registry = Some(registry.host.clone());

        match self.attempt(&registry, &effective, arch, credentials).await {
            Ok(manifest) if manifest.is_index() => {
                // The mirror has no child for the target architecture.
                warn!(arch = %arch, "directory candidate lacks the target architecture");
                Ok(None)
            }
            Ok(manifest) => Ok(Some(Selection {
                registry,
                manifest,
                reference: effective,
            })),
            Err(err) => {
                warn!(host = %effective.registry.as_deref().unwrap_or(""), error = %err, "directory candidate failed");
                Ok(None)
            }
        }
    }

    /// Phase B: parallel probe sweep over the static list, then a sequential
    /// walk of the ranked survivors.
    async fn fan_out(
        &self,
        reference: &ImageReference,
        arch: &str,
        credentials: &Credentials,
    ) -> Result<Selection> {
        info!(
            count = self.config.registries.len(),
            repository = %reference.repository,
            tag = %reference.tag,
            "probing registries"
        );

        let candidates = probe_all(
            self.clients,
            &self.config.registries,
            self.config.settings.max_concurrent_registries,
        )
        .await;
        let ranked = rank(candidates);
        if ranked.is_empty() {
            return Err(ImageError::NoRegistriesAvailable);
        }
        info!(count = ranked.len(), "registries available");

        for (registry, result) in ranked {
            debug!(
                registry = %registry.name,
                host = %registry.host,
                response_time = ?result.response_time,
                "attempting registry"
            );

            match self.attempt(&registry, reference, arch, credentials).await {
                Ok(manifest) => {
                    info!(
                        registry = %registry.name,
                        repository = %reference.repository,
                        tag = %reference.tag,
                        "image found"
                    );
                    let mut effective = reference.clone();
                    effective.registry = Some(registry.host.clone());
                    return Ok(Selection {
                        registry,
                        manifest,
                        reference: effective,
                    });
                }
                Err(err) => {
                    warn!(registry = %registry.name, error = %err, "registry attempt failed");
                }
            }
        }

        Err(ImageError::NoRegistryServes {
            repository: reference.repository.clone(),
            tag: reference.tag.clone(),
        })
    }

    /// Auth + manifest fetch against one registry, resolving index manifests
    /// to the architecture child where possible.
    async fn attempt(
        &self,
        registry: &RegistryConfig,
        reference: &ImageReference,
        arch: &str,
        credentials: &Credentials,
    ) -> Result<Manifest> {
        let client = self.clients.for_registry(registry);
        let token = fetch_token(client, registry, &reference.repository, credentials).await?;
        let manifest = fetch_manifest(
            client,
            registry,
            &reference.repository,
            &reference.tag,
            &token,
        )
        .await?;
        Ok(self
            .resolve_index(client, registry, reference, manifest, arch, &token)
            .await)
    }

    async fn resolve_index(
        &self,
        client: &Client,
        registry: &RegistryConfig,
        reference: &ImageReference,
        manifest: Manifest,
        arch: &str,
        token: &str,
    ) -> Manifest {
        if !manifest.is_index() {
            return manifest;
        }

        let Some(child) = manifest.select_platform(arch) else {
            // No substitute architecture is guessed; the caller decides what
            // to do with the unresolved index.
            warn!(arch = %arch, "index manifest has no entry for the target architecture");
            return manifest;
        };
        debug!(digest = %child.digest, arch = %arch, "resolving platform manifest");

        match fetch_manifest(client, registry, &reference.repository, &child.digest, token).await {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(error = %err, "failed to fetch platform manifest, keeping index");
                manifest
            }
        }
    }
}
