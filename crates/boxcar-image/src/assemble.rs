//! Legacy image-tar assembly.
//!
//! Scratch layout, one directory per layer:
//!
//! ```text
//! <scratch>/
//! ├── <config-digest-hex>.json
//! ├── <layer-id>/
//! │   ├── json           # {"id": ..., "parent": ...}
//! │   └── layer.tar      # decompressed layer
//! ├── manifest.json
//! └── repositories
//! ```
//!
//! Layer ids are synthetic: a chain hash over the manifest's digest
//! sequence. They only exist to name directories and link the parent chain
//! in the legacy format and have no relation to the content digests.

use std::fmt::Display;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use tracing::{debug, info};

use crate::config::{RegistryConfig, Settings};
use crate::download::BlobDownloader;
use crate::error::{ImageError, Result};
use crate::manifest::{digest_hex, Descriptor};
use crate::reference::ImageReference;
use crate::registry::blob_url;

/// Per-pull scratch directory. Removed on successful completion when cleanup
/// is enabled; deliberately left behind on failure for post-mortem.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    cleanup: bool,
}

impl ScratchDir {
    /// Creates (or re-creates) the scratch directory. Any leftover content
    /// from an earlier failed pull is discarded so it cannot leak into the
    /// new archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(path: PathBuf, cleanup: bool) -> Result<Self> {
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        Ok(Self { path, cleanup })
    }

    /// Returns the scratch path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Completes the pull: removes the directory when cleanup is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    pub fn finish(self) -> Result<()> {
        if self.cleanup {
            fs::remove_dir_all(&self.path)?;
            debug!(path = %self.path.display(), "scratch directory removed");
        }
        Ok(())
    }
}

/// Computes the synthetic id for a layer from its parent's id and its
/// content digest. A pure function of the manifest digest sequence.
#[must_use]
pub fn synthetic_layer_id(parent_id: &str, digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(digest.as_bytes());
    hasher.update(b"\n");
    hex::encode(hasher.finalize())
}

/// One staged layer.
#[derive(Debug, Clone)]
pub struct StagedLayer {
    /// Original content digest from the manifest.
    pub digest: String,
    /// Synthetic layer id (directory name).
    pub id: String,
    /// Parent layer id; empty for the base layer.
    pub parent: String,
    /// Archive-relative path of the extracted tar (`<id>/layer.tar`).
    pub tar_path: String,
}

/// Entry of the emitted archive's top-level `manifest.json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TarManifestEntry {
    config: String,
    repo_tags: Vec<String>,
    layers: Vec<String>,
}

/// Materializes the legacy layered layout and emits the final tar.
pub struct ImageAssembler<'a> {
    downloader: BlobDownloader<'a>,
    settings: &'a Settings,
}

impl<'a> ImageAssembler<'a> {
    /// Creates an assembler.
    #[must_use]
    pub fn new(downloader: BlobDownloader<'a>, settings: &'a Settings) -> Self {
        Self {
            downloader,
            settings,
        }
    }

    /// Downloads the config blob into the scratch root as
    /// `<digest-hex>.json` and returns that filename.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails.
    pub async fn stage_config(
        &self,
        scratch: &Path,
        registry: &RegistryConfig,
        reference: &ImageReference,
        config: &Descriptor,
        token: &str,
    ) -> Result<String> {
        let filename = format!("{}.json", digest_hex(&config.digest));
        let url = blob_url(registry, &reference.repository, &config.digest);
        self.downloader
            .download(&url, token, &scratch.join(&filename), "Config")
            .await?;
        Ok(filename)
    }

    /// Downloads, decompresses, and stages every layer in manifest order.
    ///
    /// # Errors
    ///
    /// Returns an error on download failure or any I/O error.
    pub async fn stage_layers(
        &self,
        scratch: &Path,
        registry: &RegistryConfig,
        reference: &ImageReference,
        layers: &[Descriptor],
        token: &str,
    ) -> Result<Vec<StagedLayer>> {
        let mut parent_id = String::new();
        let mut staged = Vec::with_capacity(layers.len());

        for (index, layer) in layers.iter().enumerate() {
            let id = synthetic_layer_id(&parent_id, &layer.digest);
            let layer_dir = scratch.join(&id);
            fs::create_dir_all(&layer_dir)
                .map_err(|e| assembly_err("create layer directory", &e))?;

            let gzip_path = layer_dir.join("layer_gzip.tar");
            let url = blob_url(registry, &reference.repository, &layer.digest);
            let description = format!("Layer {}/{}", index + 1, layers.len());
            self.downloader
                .download(&url, token, &gzip_path, &description)
                .await?;

            let tar_path = layer_dir.join("layer.tar");
            decompress_gzip(&gzip_path, &tar_path)?;
            fs::remove_file(&gzip_path)
                .map_err(|e| assembly_err("remove compressed layer", &e))?;

            write_layer_json(&layer_dir, &id, &parent_id)?;

            debug!(digest = %layer.digest, id = %id, "layer staged");
            staged.push(StagedLayer {
                digest: layer.digest.clone(),
                id: id.clone(),
                parent: parent_id.clone(),
                tar_path: format!("{id}/layer.tar"),
            });
            parent_id = id;
        }

        Ok(staged)
    }

    /// Writes the root-level `manifest.json` and `repositories` descriptors.
    ///
    /// # Errors
    ///
    /// Returns an error on any I/O or serialization failure.
    pub fn write_descriptors(
        &self,
        scratch: &Path,
        reference: &ImageReference,
        config_filename: &str,
        layers: &[StagedLayer],
    ) -> Result<()> {
        let entry = TarManifestEntry {
            config: config_filename.to_string(),
            repo_tags: vec![reference.load_tag(self.settings.remove_registry_prefix)],
            layers: layers.iter().map(|l| l.tar_path.clone()).collect(),
        };
        let manifest = serde_json::to_vec(&[entry])?;
        fs::write(scratch.join("manifest.json"), manifest)
            .map_err(|e| assembly_err("write manifest.json", &e))?;

        let last_id = layers.last().map(|l| l.id.as_str()).unwrap_or_default();
        let mut tags = serde_json::Map::new();
        tags.insert(
            reference.tag.clone(),
            serde_json::Value::String(last_id.to_string()),
        );
        let mut repositories = serde_json::Map::new();
        repositories.insert(reference.image.clone(), serde_json::Value::Object(tags));
        fs::write(
            scratch.join("repositories"),
            serde_json::to_vec(&serde_json::Value::Object(repositories))?,
        )
        .map_err(|e| assembly_err("write repositories", &e))?;

        Ok(())
    }

    /// Emits the scratch tree as `<safe-repo>_<tag>_<arch>.tar` under
    /// `output_dir`, entry names relative to the scratch root.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::AssemblyFailure`] on any I/O error.
    pub fn emit_tar(
        &self,
        scratch: &Path,
        reference: &ImageReference,
        arch: &str,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let safe_repo = reference.repository.replace('/', "_");
        let output_path = output_dir.join(format!("{safe_repo}_{}_{arch}.tar", reference.tag));

        let file =
            File::create(&output_path).map_err(|e| assembly_err("create output tar", &e))?;
        let mut builder = tar::Builder::new(file);
        append_tree(&mut builder, scratch, Path::new(""))?;
        builder
            .into_inner()
            .map_err(|e| assembly_err("finish output tar", &e))?;

        info!(output = %output_path.display(), "archive emitted");
        Ok(output_path)
    }
}

/// Writes the per-layer `json` descriptor; `parent` is omitted for the base
/// layer.
fn write_layer_json(layer_dir: &Path, id: &str, parent: &str) -> Result<()> {
    let mut value = serde_json::Map::new();
    value.insert("id".to_string(), serde_json::Value::String(id.to_string()));
    if !parent.is_empty() {
        value.insert(
            "parent".to_string(),
            serde_json::Value::String(parent.to_string()),
        );
    }
    fs::write(
        layer_dir.join("json"),
        serde_json::to_vec(&serde_json::Value::Object(value))?,
    )
    .map_err(|e| assembly_err("write layer json", &e))?;
    Ok(())
}

/// Decompresses a gzip file to `dst`.
fn decompress_gzip(src: &Path, dst: &Path) -> Result<()> {
    let src_file = File::open(src).map_err(|e| assembly_err("open compressed layer", &e))?;
    let mut decoder = GzDecoder::new(src_file);
    let mut dst_file = File::create(dst).map_err(|e| assembly_err("create layer tar", &e))?;
    io::copy(&mut decoder, &mut dst_file)
        .map_err(|e| assembly_err("decompress layer", &e))?;
    Ok(())
}

/// Recursively appends `root/rel` to the archive, entry names relative to
/// `root`. Entries are sorted for reproducible archives.
fn append_tree(builder: &mut tar::Builder<File>, root: &Path, rel: &Path) -> Result<()> {
    let dir = root.join(rel);
    let mut entries: Vec<_> = fs::read_dir(&dir)
        .map_err(|e| assembly_err("read scratch directory", &e))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| assembly_err("read scratch entry", &e))?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let entry_rel = rel.join(entry.file_name());
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| assembly_err("stat scratch entry", &e))?;
        if file_type.is_dir() {
            builder
                .append_dir(&entry_rel, &path)
                .map_err(|e| assembly_err("append directory", &e))?;
            append_tree(builder, root, &entry_rel)?;
        } else {
            builder
                .append_path_with_name(&path, &entry_rel)
                .map_err(|e| assembly_err("append file", &e))?;
        }
    }
    Ok(())
}

fn assembly_err(context: &str, err: &dyn Display) -> ImageError {
    ImageError::AssemblyFailure(format!("{context}: {err}"))
}
