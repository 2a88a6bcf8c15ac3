//! Streaming blob download.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{header, Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{ImageError, Result};

/// Downloads blobs into the scratch directory, streaming them to disk with
/// optional byte-level progress reporting. Failed attempts remove the
/// partial file and are retried with exponential backoff up to the
/// configured `retry_count`.
pub struct BlobDownloader<'a> {
    client: &'a Client,
    settings: &'a Settings,
}

impl<'a> BlobDownloader<'a> {
    /// Creates a downloader borrowing the shared transport.
    #[must_use]
    pub fn new(client: &'a Client, settings: &'a Settings) -> Self {
        Self { client, settings }
    }

    /// Downloads `url` to `dest`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::BlobDownloadFailure`] when every attempt fails
    /// with a non-200 status, transport error, or write error.
    pub async fn download(
        &self,
        url: &str,
        token: &str,
        dest: &Path,
        description: &str,
    ) -> Result<()> {
        let attempts = self.settings.retry_count.max(1);
        let mut delay = Duration::from_millis(250);
        let mut attempt = 0;

        loop {
            match self.fetch(url, token, dest, description).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt + 1 < attempts => {
                    warn!(url = %url, error = %err, attempt = attempt + 1, "blob download attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch(&self, url: &str, token: &str, dest: &Path, description: &str) -> Result<()> {
        debug!(url = %url, dest = %dest.display(), "downloading blob");

        let mut request = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.settings.download_timeout_secs));
        if !token.is_empty() {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| blob_err(url, format!("request failed: {e}")))?;
        if response.status() != StatusCode::OK {
            return Err(blob_err(
                url,
                format!("status {}", response.status().as_u16()),
            ));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| blob_err(url, format!("create directory failed: {e}")))?;
        }

        let bar = self.progress_bar(response.content_length(), description);
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| blob_err(url, format!("create file failed: {e}")))?;
        let mut stream = response.bytes_stream();

        let outcome: Result<()> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| blob_err(url, format!("read failed: {e}")))?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| blob_err(url, format!("write failed: {e}")))?;
                if let Some(bar) = &bar {
                    bar.inc(chunk.len() as u64);
                }
            }
            file.flush()
                .await
                .map_err(|e| blob_err(url, format!("flush failed: {e}")))?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                if let Some(bar) = &bar {
                    bar.finish_and_clear();
                }
                Ok(())
            }
            Err(err) => {
                if let Some(bar) = &bar {
                    bar.abandon();
                }
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                Err(err)
            }
        }
    }

    fn progress_bar(&self, length: Option<u64>, description: &str) -> Option<ProgressBar> {
        if !self.settings.enable_progress_bar {
            return None;
        }

        let bar = match length {
            Some(length) => {
                let bar = ProgressBar::new(length);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{msg:12} {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
                );
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        bar.set_message(description.to_string());
        Some(bar)
    }
}

fn blob_err(url: &str, reason: String) -> ImageError {
    ImageError::BlobDownloadFailure {
        url: url.to_string(),
        reason,
    }
}
