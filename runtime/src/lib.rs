//! Depot Runtime - image distributions, conversion and storage.
//!
//! This crate resolves image distribution identifiers, converts local
//! docker archives into native images and keeps them in a
//! content-addressed store.

#![allow(clippy::result_large_err)]

pub mod distribution;
pub mod image;

// Re-export common types
pub use distribution::{
    install_registry, parse_distribution, Cimd, Distribution, DistributionType,
    DockerArchive, Registry,
};
pub use image::{
    ArchiveConverter, DockerArchiveFetcher, DockerSaveConverter, FetchInfo, ImageStore,
    ImageWriter, StoredImage,
};

/// Depot Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
