//! Docker archive fetcher.
//!
//! Converts a local docker archive into a native image and commits it to
//! the image store:
//!
//! ```text
//! location ──resolve──▶ absolute path
//!          ──stage────▶ <store>/tmp/docker2image-XXXX/
//!          ──convert──▶ <workspace>/<name>-<tag>.image.tar
//!          ──commit───▶ store key (sha512-...)
//! ```
//!
//! The workspace is removed on every exit path once it has been created.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use depot_core::error::{DepotError, Result};
use depot_core::security::InsecureOptions;

use super::convert::{ArchiveConverter, Compression, ConvertConfig};
use super::store::{FetchInfo, ImageWriter};
use crate::distribution::DockerArchive;

/// Prefix of per-fetch workspace directories.
const WORKSPACE_PREFIX: &str = "docker2image-";

/// Fetches images from local docker archives.
pub struct DockerArchiveFetcher {
    insecure_options: InsecureOptions,
    store: Arc<dyn ImageWriter>,
    converter: Arc<dyn ArchiveConverter>,
    debug: bool,
}

impl DockerArchiveFetcher {
    /// Create a new fetcher.
    pub fn new(
        store: Arc<dyn ImageWriter>,
        converter: Arc<dyn ArchiveConverter>,
        insecure_options: InsecureOptions,
    ) -> Self {
        Self {
            insecure_options,
            store,
            converter,
            debug: false,
        }
    }

    /// Log intermediate conversion details at `info` level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn insecure_options(&self) -> InsecureOptions {
        self.insecure_options
    }

    /// Convert the archive at `location` and store it, returning the key.
    ///
    /// `location` is a `file://` URL or a filesystem path; relative paths
    /// are resolved against the current directory.
    pub fn fetch(&self, location: &str) -> Result<String> {
        let path = resolve_location(location)?;
        self.fetch_path(&path)
    }

    /// Fetch the archive a docker-archive distribution points at.
    pub fn fetch_distribution(&self, distribution: &DockerArchive) -> Result<String> {
        self.fetch(distribution.file_url())
    }

    fn fetch_path(&self, path: &Path) -> Result<String> {
        tracing::info!(
            path = %path.display(),
            insecure = %self.insecure_options,
            "Converting docker archive"
        );

        let workspace = self.create_workspace()?;
        let result = self.convert_and_commit(path, workspace.path());

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            tracing::warn!(
                workspace = %workspace_path.display(),
                error = %e,
                "Failed to remove conversion workspace"
            );
        }

        result
    }

    fn create_workspace(&self) -> Result<tempfile::TempDir> {
        let store_tmp = self.store.tmp_dir().map_err(|e| match e {
            DepotError::Workspace(_) => e,
            other => DepotError::Workspace(other.to_string()),
        })?;

        let workspace = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&store_tmp)
            .map_err(|e| {
                DepotError::Workspace(format!(
                    "Failed to create temp dir in {}: {}",
                    store_tmp.display(),
                    e
                ))
            })?;

        self.trace(format_args!("Created workspace {}", workspace.path().display()));
        Ok(workspace)
    }

    fn convert_and_commit(&self, path: &Path, workspace: &Path) -> Result<String> {
        let artifact = self.convert(path, workspace)?;

        let file = File::open(&artifact).map_err(|e| DepotError::Conversion {
            path: path.display().to_string(),
            message: format!("cannot open converted image {}: {}", artifact.display(), e),
        })?;

        let key = self
            .store
            .write_image(&mut BufReader::new(file), FetchInfo { latest: false })
            .map_err(|e| match e {
                DepotError::StoreCommit(_) => e,
                other => DepotError::StoreCommit(other.to_string()),
            })?;

        tracing::info!(path = %path.display(), key = %key, "Stored converted image");
        Ok(key)
    }

    /// Run the converter and pick the first artifact.
    fn convert(&self, path: &Path, workspace: &Path) -> Result<PathBuf> {
        let config = ConvertConfig {
            squash: true,
            compression: Compression::None,
            output_dir: workspace.to_path_buf(),
            tmp_dir: workspace.to_path_buf(),
        };

        let artifacts = self
            .converter
            .convert(path, &config)
            .map_err(|e| match e {
                DepotError::Conversion { .. } => e,
                other => DepotError::Conversion {
                    path: path.display().to_string(),
                    message: other.to_string(),
                },
            })?;

        self.trace(format_args!("Conversion produced {:?}", artifacts));

        artifacts
            .into_iter()
            .next()
            .ok_or_else(|| DepotError::Conversion {
                path: path.display().to_string(),
                message: "conversion produced no images".to_string(),
            })
    }

    fn trace(&self, message: std::fmt::Arguments<'_>) {
        if self.debug {
            tracing::info!("{}", message);
        } else {
            tracing::debug!("{}", message);
        }
    }
}

/// Turn a `file://` URL or a plain path into an absolute path.
pub fn resolve_location(location: &str) -> Result<PathBuf> {
    let invalid = |message: String| DepotError::PathResolution {
        path: location.to_string(),
        message,
    };

    if location.trim().is_empty() {
        return Err(invalid("empty location".to_string()));
    }

    let path = match url::Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| invalid("file URL has no local path".to_string()))?,
        // Single letters are drive prefixes such as `C:\images\busybox.tar`
        Ok(url) if url.scheme().len() > 1 => {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        _ => PathBuf::from(location),
    };

    std::path::absolute(&path)
        .map_err(|e| invalid(format!("cannot make {} absolute: {}", path.display(), e)))
}
