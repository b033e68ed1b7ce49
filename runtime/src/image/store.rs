//! Disk-based content-addressed image store.
//!
//! Images are stored by the SHA-512 of their bytes with an in-memory index
//! backed by a persistent `index.json` file. Blob and index writes both go
//! through a scratch file that is renamed into place.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use depot_core::error::{DepotError, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Prefix of every content key.
pub const KEY_PREFIX: &str = "sha512-";

/// Number of hex characters of the digest kept in a key.
const KEY_HEX_LEN: usize = 64;

/// Per-write metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchInfo {
    /// Whether the image was fetched as the "latest" of its name
    pub latest: bool,
}

/// Write side of an image store.
///
/// This is everything the archive fetcher needs: a scratch area and a way to
/// commit a stream of image bytes.
pub trait ImageWriter: Send + Sync {
    /// Consume `reader` and commit its bytes, returning the content key.
    fn write_image(&self, reader: &mut dyn Read, info: FetchInfo) -> Result<String>;

    /// Scratch directory inside the store, created on demand.
    fn tmp_dir(&self) -> Result<PathBuf>;
}

/// Metadata for a stored image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    /// Content key (e.g., "sha512-3f1c...")
    pub key: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// When the image was imported
    pub imported_at: DateTime<Utc>,
    /// When the image was last used
    pub last_used: DateTime<Utc>,
    /// Whether the image was fetched as "latest"
    pub latest: bool,
    /// Path to the image blob on disk
    pub path: PathBuf,
}

/// Persistent index stored as JSON on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    images: Vec<StoredImage>,
}

/// Disk-based image store with in-memory index.
pub struct ImageStore {
    /// Root directory for image storage
    store_dir: PathBuf,
    /// In-memory index: key → StoredImage
    index: RwLock<HashMap<String, StoredImage>>,
    /// Serializes snapshot-and-write of `index.json`
    persist_lock: Mutex<()>,
}

impl ImageStore {
    /// Create a new image store.
    ///
    /// Creates the store directory if it doesn't exist and loads
    /// any existing index from disk.
    pub fn new(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir.join("blobs").join("sha512")).map_err(|e| {
            DepotError::Store(format!(
                "Failed to create image store directory {}: {}",
                store_dir.display(),
                e
            ))
        })?;

        let index = Self::load_index(store_dir)?;

        Ok(Self {
            store_dir: store_dir.to_path_buf(),
            index: RwLock::new(index),
            persist_lock: Mutex::new(()),
        })
    }

    /// Get a stored image by key, marking it as used.
    pub fn get(&self, key: &str) -> Option<StoredImage> {
        let updated = {
            let mut index = self.index.write();
            let image = index.get_mut(key)?;
            image.last_used = Utc::now();
            image.clone()
        };
        // Best-effort save of updated last_used
        if let Err(e) = self.save_index() {
            tracing::warn!(key = %key, error = %e, "Failed to record image use");
        }
        Some(updated)
    }

    /// Read a stored image's bytes.
    pub fn open(&self, key: &str) -> Result<std::fs::File> {
        let image = self
            .get(key)
            .ok_or_else(|| DepotError::Store(format!("Image not found: {}", key)))?;
        std::fs::File::open(&image.path).map_err(|e| {
            DepotError::Store(format!("Failed to open {}: {}", image.path.display(), e))
        })
    }

    /// Remove an image by key.
    pub fn remove(&self, key: &str) -> Result<()> {
        let removed = self.index.write().remove(key);
        let image =
            removed.ok_or_else(|| DepotError::Store(format!("Image not found: {}", key)))?;

        if image.path.exists() {
            std::fs::remove_file(&image.path).map_err(|e| {
                DepotError::Store(format!(
                    "Failed to remove image blob {}: {}",
                    image.path.display(),
                    e
                ))
            })?;
        }

        self.save_index()
    }

    /// List all stored images, most recently imported first.
    pub fn list(&self) -> Vec<StoredImage> {
        let mut images: Vec<StoredImage> = self.index.read().values().cloned().collect();
        images.sort_by(|a, b| b.imported_at.cmp(&a.imported_at));
        images
    }

    /// Get the store directory path.
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let hex = key.strip_prefix(KEY_PREFIX).unwrap_or(key);
        self.store_dir.join("blobs").join("sha512").join(hex)
    }

    /// Stream `reader` into a scratch file, hashing as we go.
    fn stage_blob(&self, reader: &mut dyn Read) -> Result<(tempfile::NamedTempFile, String, u64)> {
        let mut staged = tempfile::NamedTempFile::new_in(self.tmp_dir()?)?;
        let mut hasher = Sha512::new();
        let mut size = 0u64;
        let mut buf = [0u8; 64 * 1024];

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            staged.write_all(&buf[..n])?;
            size += n as u64;
        }
        staged.as_file().sync_all()?;

        let digest = hex::encode(hasher.finalize());
        let key = format!("{}{}", KEY_PREFIX, &digest[..KEY_HEX_LEN]);
        Ok((staged, key, size))
    }

    /// Load index from disk.
    fn load_index(store_dir: &Path) -> Result<HashMap<String, StoredImage>> {
        let index_path = store_dir.join("index.json");
        if !index_path.exists() {
            return Ok(HashMap::new());
        }

        let data = std::fs::read_to_string(&index_path).map_err(|e| {
            DepotError::Store(format!(
                "Failed to read image store index {}: {}",
                index_path.display(),
                e
            ))
        })?;

        let store_index: StoreIndex = serde_json::from_str(&data).map_err(|e| {
            DepotError::Store(format!("Failed to parse image store index: {}", e))
        })?;

        // Only include images whose blobs still exist
        Ok(store_index
            .images
            .into_iter()
            .filter(|image| image.path.exists())
            .map(|image| (image.key.clone(), image))
            .collect())
    }

    /// Save index to disk.
    ///
    /// The snapshot and the rename happen under `persist_lock`, so the file
    /// on disk always reflects a complete snapshot no older than the last
    /// one written.
    fn save_index(&self) -> Result<()> {
        let _guard = self.persist_lock.lock();

        let store_index = StoreIndex {
            images: self.index.read().values().cloned().collect(),
        };
        let data = serde_json::to_vec_pretty(&store_index)?;
        let index_path = self.store_dir.join("index.json");

        let write = || -> std::io::Result<()> {
            let mut staged = tempfile::NamedTempFile::new_in(&self.store_dir)?;
            staged.write_all(&data)?;
            staged.as_file().sync_all()?;
            staged.persist(&index_path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| {
            DepotError::Store(format!(
                "Failed to write image store index {}: {}",
                index_path.display(),
                e
            ))
        })
    }
}

impl ImageWriter for ImageStore {
    fn write_image(&self, reader: &mut dyn Read, info: FetchInfo) -> Result<String> {
        let (staged, key, size_bytes) = self
            .stage_blob(reader)
            .map_err(|e| DepotError::StoreCommit(e.to_string()))?;

        let target = self.blob_path(&key);
        if target.exists() {
            tracing::debug!(key = %key, "Image content already stored");
        } else {
            staged.persist(&target).map_err(|e| {
                DepotError::StoreCommit(format!(
                    "Failed to move image into {}: {}",
                    target.display(),
                    e.error
                ))
            })?;
        }

        let now = Utc::now();
        let inserted = {
            let mut index = self.index.write();
            match index.get_mut(&key) {
                Some(entry) => {
                    entry.last_used = now;
                    entry.latest |= info.latest;
                    false
                }
                None => {
                    index.insert(
                        key.clone(),
                        StoredImage {
                            key: key.clone(),
                            size_bytes,
                            imported_at: now,
                            last_used: now,
                            latest: info.latest,
                            path: target,
                        },
                    );
                    true
                }
            }
        };

        if let Err(e) = self.save_index() {
            // Not committed: a new entry must not outlive the failed write
            if inserted {
                self.index.write().remove(&key);
            }
            return Err(DepotError::StoreCommit(e.to_string()));
        }

        tracing::info!(key = %key, size_bytes, latest = info.latest, "Stored image");
        Ok(key)
    }

    fn tmp_dir(&self) -> Result<PathBuf> {
        let dir = self.store_dir.join("tmp");
        std::fs::create_dir_all(&dir).map_err(|e| {
            DepotError::Workspace(format!(
                "Failed to create store temp directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(dir)
    }
}
