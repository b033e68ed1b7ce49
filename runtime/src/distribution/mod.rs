//! Image distributions: where an image came from.
//!
//! A distribution describes the source of an image (a local docker archive,
//! a registry, ...) behind a single canonical identifier:
//!
//! ```text
//! cimd:<type>:v=<version>:<escaped data>
//!
//! cimd:docker-archive:v=0:file%3A%2F%2F%2Fpath%2Fto%2Fbusybox.tar
//!      └─── type ───┘ └v┘ └────────── escaped file URL ─────────┘
//! ```
//!
//! Concrete source types plug into a [`Registry`] keyed by type tag, so new
//! sources can be added without touching the identifier parser. The
//! process-wide registry is fixed on first use: install a custom one with
//! [`install_registry`] before anything calls [`parse_distribution`].

mod cimd;
mod docker_archive;
mod registry;

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use depot_core::error::{DepotError, Result};

pub use cimd::{query_escape, query_unescape, Cimd, SCHEME};
pub use docker_archive::{DockerArchive, DOCKER_ARCHIVE_VERSION};
pub use registry::{Constructor, Registry};

/// Type tag of a distribution (the first segment after `cimd:`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DistributionType(Cow<'static, str>);

impl DistributionType {
    /// Local `docker save` tarball.
    pub const DOCKER_ARCHIVE: DistributionType = DistributionType(Cow::Borrowed("docker-archive"));

    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DistributionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image source.
pub trait Distribution: fmt::Debug + Send + Sync {
    /// Normalized canonical identifier. The returned value is a copy.
    fn cimd(&self) -> Cimd;

    /// Whether `other` is the same variant with an identical canonical form.
    ///
    /// Different variants are never equal, even if they point at the same
    /// underlying file.
    fn equals(&self, other: &dyn Distribution) -> bool;

    /// Human-readable form for messages. Not stable across versions and
    /// never suitable for persistence or comparison.
    fn display_form(&self) -> String;

    fn as_any(&self) -> &dyn Any;

    fn kind(&self) -> DistributionType {
        self.cimd().kind().clone()
    }
}

impl fmt::Display for dyn Distribution + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_form())
    }
}

impl PartialEq for dyn Distribution + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Install the process-wide registry.
///
/// Must happen before the first call to [`registry`] or
/// [`parse_distribution`]; afterwards the registry is frozen and this
/// returns an error.
pub fn install_registry(registry: Registry) -> Result<()> {
    REGISTRY.set(registry).map_err(|_| {
        DepotError::ConfigError(
            "distribution registry is already in use; register types before the first parse"
                .to_string(),
        )
    })
}

/// The process-wide registry, defaulting to the built-in types.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::with_builtin)
}

/// Parse a canonical identifier with the process-wide registry.
pub fn parse_distribution(input: &str) -> Result<Box<dyn Distribution>> {
    registry().parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_type_const() {
        assert_eq!(DistributionType::DOCKER_ARCHIVE.as_str(), "docker-archive");
        assert_eq!(
            DistributionType::new("docker-archive"),
            DistributionType::DOCKER_ARCHIVE
        );
        assert_eq!(DistributionType::DOCKER_ARCHIVE.to_string(), "docker-archive");
    }

    #[test]
    fn test_parse_distribution_builtin() {
        let d = parse_distribution("cimd:docker-archive:v=0:file%3A%2F%2F%2Fa.tar").unwrap();
        assert_eq!(d.kind(), DistributionType::DOCKER_ARCHIVE);
        assert_eq!(d.to_string(), "file:///a.tar");
    }

    #[test]
    fn test_install_after_use_fails() {
        let _ = registry();
        let err = install_registry(Registry::new()).unwrap_err();
        assert!(matches!(err, DepotError::ConfigError(_)));
    }

    #[test]
    fn test_dyn_equality() {
        let a = parse_distribution("cimd:docker-archive:v=0:x.tar").unwrap();
        let b = parse_distribution("cimd:docker-archive:v=0:x.tar").unwrap();
        let c = parse_distribution("cimd:docker-archive:v=0:y.tar").unwrap();
        assert!(*a == *b);
        assert!(*a != *c);
    }
}
