//! Distribution backed by a local `docker save` tarball.

use std::any::Any;

use depot_core::error::{DepotError, Result};

use super::{query_escape, query_unescape, Cimd, Distribution, DistributionType};

/// Schema version of the docker-archive data segment.
pub const DOCKER_ARCHIVE_VERSION: u32 = 0;

/// Image sourced from a local docker archive.
///
/// The data segment is the query-escaped file URL of the archive:
///
/// ```text
/// cimd:docker-archive:v=0:file%3A%2F%2F%2Fabsolute%2Fpath%2Fto%2Ffile.tar
/// ```
#[derive(Debug, Clone)]
pub struct DockerArchive {
    /// Normalized identifier
    cimd: Cimd,
    /// Decoded archive location, e.g. `file:///path/to/file.tar`
    file_url: String,
}

impl DockerArchive {
    /// Build from an archive location such as `file:///path/to/busybox.tar`.
    ///
    /// The location is escaped into an identifier string which is then
    /// parsed back, so the result is indistinguishable from one read from
    /// persisted storage.
    pub fn from_location(location: &str) -> Result<Self> {
        let raw = Cimd::build(
            &DistributionType::DOCKER_ARCHIVE,
            DOCKER_ARCHIVE_VERSION,
            &query_escape(location),
        );
        let cimd = Cimd::parse(&raw)?;
        Self::from_cimd(&cimd)
    }

    /// Build from a parsed identifier.
    pub fn from_cimd(cimd: &Cimd) -> Result<Self> {
        if cimd.kind() != &DistributionType::DOCKER_ARCHIVE {
            return Err(DepotError::TypeMismatch {
                expected: DistributionType::DOCKER_ARCHIVE.to_string(),
                found: cimd.kind().to_string(),
            });
        }

        let file_url = query_unescape(cimd.data()).map_err(|e| match e {
            DepotError::MalformedIdentifier { reason, .. } => {
                DepotError::malformed(cimd.to_string(), reason)
            }
            other => other,
        })?;

        Ok(Self {
            cimd: cimd.normalized(),
            file_url,
        })
    }

    /// Parse an identifier string as a docker archive.
    pub fn parse(input: &str) -> Result<Self> {
        Self::from_cimd(&Cimd::parse(input)?)
    }

    /// Decoded archive location.
    pub fn file_url(&self) -> &str {
        &self.file_url
    }
}

impl Distribution for DockerArchive {
    fn cimd(&self) -> Cimd {
        self.cimd.normalized()
    }

    fn equals(&self, other: &dyn Distribution) -> bool {
        match other.as_any().downcast_ref::<DockerArchive>() {
            Some(other) => self.cimd().to_string() == other.cimd().to_string(),
            None => false,
        }
    }

    fn display_form(&self) -> String {
        self.file_url.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Display for DockerArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_url)
    }
}

/// Registry constructor.
pub(super) fn construct(cimd: &Cimd) -> Result<Box<dyn Distribution>> {
    Ok(Box::new(DockerArchive::from_cimd(cimd)?))
}
