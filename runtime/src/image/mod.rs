//! Native image handling.
//!
//! ```text
//! docker archive ──▶ DockerSaveConverter ──▶ <name>-<tag>.image.tar
//!                                                  │
//!                     DockerArchiveFetcher ────────┤
//!                                                  ▼
//!                                             ImageStore
//!                                          blobs/sha512/<hex>
//! ```

pub mod convert;
mod fetch;
pub mod store;

pub use convert::{ArchiveConverter, Compression, ConvertConfig, DockerSaveConverter, ImageManifest};
pub use fetch::{resolve_location, DockerArchiveFetcher};
pub use store::{FetchInfo, ImageStore, ImageWriter, StoredImage};
