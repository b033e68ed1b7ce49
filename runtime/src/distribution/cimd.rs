//! Canonical distribution identifier parsing.
//!
//! Parses identifiers like `cimd:docker-archive:v=0:file%3A%2F%2F%2Fimg.tar`
//! into their type, version and data components.

use std::fmt;
use std::hash::{Hash, Hasher};

use depot_core::error::{DepotError, Result};
use serde::{Deserialize, Serialize};

use super::DistributionType;

/// Fixed scheme prefix of every canonical identifier.
pub const SCHEME: &str = "cimd";

/// Marker preceding the version number.
const VERSION_MARKER: &str = "v=";

/// Parsed canonical distribution identifier.
///
/// The textual form is `cimd:<type>:v=<version>:<data>[?<query>]`. `data`
/// is kept escaped exactly as the producer wrote it. Two identifiers compare
/// equal when their normalized forms are equal, so the order of query
/// parameters never matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cimd {
    kind: DistributionType,
    version: u32,
    data: String,
    query: Option<String>,
}

impl Cimd {
    /// Parse a canonical identifier string.
    ///
    /// Fails with [`DepotError::MalformedIdentifier`] when the scheme is not
    /// `cimd`, fewer than three segments follow it, the type is empty, or
    /// the version marker is not `v=<integer>`.
    pub fn parse(input: &str) -> Result<Self> {
        let rest = input
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| {
                DepotError::malformed(input, format!("missing {:?} scheme prefix", SCHEME))
            })?;

        // The query belongs to the whole identifier, not to the data segment
        let (opaque, query) = match rest.split_once('?') {
            Some((opaque, query)) => (opaque, Some(query.to_string())),
            None => (rest, None),
        };

        let segments: Vec<&str> = opaque.splitn(3, ':').collect();
        if segments.len() < 3 {
            return Err(DepotError::malformed(
                input,
                format!("expected 3 segments after scheme, found {}", segments.len()),
            ));
        }

        let kind = segments[0];
        if kind.is_empty() {
            return Err(DepotError::malformed(input, "empty distribution type"));
        }

        let version = segments[1]
            .strip_prefix(VERSION_MARKER)
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| {
                DepotError::malformed(input, format!("bad version marker {:?}", segments[1]))
            })?;

        Ok(Self {
            kind: DistributionType::new(kind),
            version,
            data: segments[2].to_string(),
            query,
        })
    }

    /// Assemble an identifier string from already-escaped parts.
    pub fn build(kind: &DistributionType, version: u32, data: &str) -> String {
        format!("{}:{}:{}{}:{}", SCHEME, kind, VERSION_MARKER, version, data)
    }

    pub fn kind(&self) -> &DistributionType {
        &self.kind
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Escaped, type-specific payload (without any query).
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Copy of this identifier with query parameters sorted by key.
    ///
    /// Values sharing a key keep their relative order, so normalizing twice
    /// yields the same result as normalizing once.
    pub fn normalized(&self) -> Self {
        let query = self.query.as_deref().and_then(|q| {
            let mut pairs: Vec<(&str, &str)> = q
                .split('&')
                .filter(|p| !p.is_empty())
                .map(|p| p.split_once('=').unwrap_or((p, "")))
                .collect();
            if pairs.is_empty() {
                return None;
            }
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            let joined: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| if v.is_empty() { k.to_string() } else { format!("{k}={v}") })
                .collect();
            Some(joined.join("&"))
        });

        Self {
            kind: self.kind.clone(),
            version: self.version,
            data: self.data.clone(),
            query,
        }
    }
}

impl fmt::Display for Cimd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::build(&self.kind, self.version, &self.data))?;
        if let Some(ref query) = self.query {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

impl PartialEq for Cimd {
    fn eq(&self, other: &Self) -> bool {
        self.normalized().to_string() == other.normalized().to_string()
    }
}

impl Eq for Cimd {}

impl Hash for Cimd {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().to_string().hash(state);
    }
}

impl std::str::FromStr for Cimd {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Cimd {
    type Error = DepotError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Cimd> for String {
    fn from(value: Cimd) -> Self {
        value.to_string()
    }
}

/// Escape arbitrary text so it can sit in the data segment.
///
/// Spaces become `+` and everything else outside `A-Za-z0-9-_.~` is
/// percent-encoded, which keeps colons, slashes and `?` out of the
/// identifier grammar.
pub fn query_escape(raw: &str) -> String {
    // Spaces are the only byte that encodes as `%20`, since `%` itself
    // becomes `%25`
    urlencoding::encode(raw).replace("%20", "+")
}

/// Reverse [`query_escape`].
///
/// `+` decodes to a space. A `%` not followed by two hex digits, or bytes
/// that do not form UTF-8, are rejected.
pub fn query_unescape(escaped: &str) -> Result<String> {
    let bytes = escaped.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(DepotError::malformed(
                    escaped,
                    format!("invalid escape {:?}", String::from_utf8_lossy(&bytes[i..end])),
                ));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(&escaped.replace('+', " "))
        .map(|s| s.into_owned())
        .map_err(|e| DepotError::malformed(escaped, format!("escaped data is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_docker_archive() {
        let c = Cimd::parse("cimd:docker-archive:v=0:file%3A%2F%2F%2Ffull%2Fpath%2Fto%2Fbusybox.tar")
            .unwrap();
        assert_eq!(c.kind().as_str(), "docker-archive");
        assert_eq!(c.version(), 0);
        assert_eq!(c.data(), "file%3A%2F%2F%2Ffull%2Fpath%2Fto%2Fbusybox.tar");
        assert_eq!(c.query(), None);
    }

    #[test]
    fn test_parse_keeps_colons_in_data() {
        let c = Cimd::parse("cimd:appc:v=3:example.com/app:extra").unwrap();
        assert_eq!(c.kind().as_str(), "appc");
        assert_eq!(c.version(), 3);
        assert_eq!(c.data(), "example.com/app:extra");
    }

    #[test]
    fn test_parse_empty_data() {
        let c = Cimd::parse("cimd:docker-archive:v=0:").unwrap();
        assert_eq!(c.data(), "");
    }

    #[test]
    fn test_parse_query() {
        let c = Cimd::parse("cimd:appc:v=0:coreos.com/etcd?version=v3&os=linux").unwrap();
        assert_eq!(c.data(), "coreos.com/etcd");
        assert_eq!(c.query(), Some("version=v3&os=linux"));
    }

    #[test]
    fn test_parse_missing_segments() {
        let err = Cimd::parse("cimd:docker-archive").unwrap_err();
        assert!(matches!(err, DepotError::MalformedIdentifier { .. }));
        assert!(err.to_string().contains("cimd:docker-archive"));

        assert!(Cimd::parse("cimd:docker-archive:v=0").is_err());
    }

    #[test]
    fn test_parse_wrong_scheme() {
        let err = Cimd::parse("docker-archive:v=0:x").unwrap_err();
        assert!(matches!(err, DepotError::MalformedIdentifier { .. }));
        assert!(Cimd::parse("cimdx:docker-archive:v=0:x").is_err());
    }

    #[test]
    fn test_parse_bad_version() {
        for input in [
            "cimd:docker-archive:0:x",
            "cimd:docker-archive:v=:x",
            "cimd:docker-archive:v=abc:x",
            "cimd:docker-archive:v=-1:x",
            "cimd:docker-archive:v=+1:x",
            "cimd:docker-archive:v= 1:x",
        ] {
            let err = Cimd::parse(input).unwrap_err();
            assert!(
                matches!(err, DepotError::MalformedIdentifier { .. }),
                "{input} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_bad_version_names_segment() {
        let err = Cimd::parse("cimd:docker-archive:ver1:x").unwrap_err();
        assert!(err.to_string().contains("ver1"));
    }

    #[test]
    fn test_parse_empty_type() {
        let err = Cimd::parse("cimd::v=0:x").unwrap_err();
        assert!(err.to_string().contains("empty distribution type"));
    }

    #[test]
    fn test_build() {
        let s = Cimd::build(&DistributionType::DOCKER_ARCHIVE, 0, "abc%2F");
        assert_eq!(s, "cimd:docker-archive:v=0:abc%2F");
    }

    #[test]
    fn test_display_round_trip() {
        let input = "cimd:appc:v=0:coreos.com/etcd?version=v3&os=linux";
        assert_eq!(Cimd::parse(input).unwrap().to_string(), input);
    }

    #[test]
    fn test_normalized_sorts_query() {
        let c = Cimd::parse("cimd:appc:v=0:etcd?version=v3&arch=amd64&os=linux").unwrap();
        assert_eq!(
            c.normalized().to_string(),
            "cimd:appc:v=0:etcd?arch=amd64&os=linux&version=v3"
        );
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let c = Cimd::parse("cimd:appc:v=0:etcd?b=2&a=1&b=1").unwrap();
        let once = c.normalized();
        let twice = once.normalized();
        assert_eq!(once.to_string(), twice.to_string());
        assert_eq!(once.to_string(), "cimd:appc:v=0:etcd?a=1&b=2&b=1");
    }

    #[test]
    fn test_normalized_drops_empty_query() {
        let c = Cimd::parse("cimd:appc:v=0:etcd?").unwrap();
        assert_eq!(c.normalized().to_string(), "cimd:appc:v=0:etcd");
    }

    #[test]
    fn test_equality_ignores_query_order() {
        let a = Cimd::parse("cimd:appc:v=0:etcd?os=linux&arch=amd64").unwrap();
        let b = Cimd::parse("cimd:appc:v=0:etcd?arch=amd64&os=linux").unwrap();
        assert_eq!(a, b);

        let c = Cimd::parse("cimd:appc:v=1:etcd?arch=amd64&os=linux").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_serde_as_string() {
        let c = Cimd::parse("cimd:docker-archive:v=0:a%2Fb").unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"cimd:docker-archive:v=0:a%2Fb\"");
        let back: Cimd = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
        assert!(serde_json::from_str::<Cimd>("\"cimd:nope\"").is_err());
    }

    #[test]
    fn test_query_escape() {
        assert_eq!(
            query_escape("file:///full/path/to/busybox.tar"),
            "file%3A%2F%2F%2Ffull%2Fpath%2Fto%2Fbusybox.tar"
        );
        assert_eq!(query_escape("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(query_escape("a?b&c"), "a%3Fb%26c");
        assert_eq!(query_escape("my images/a+b*"), "my+images%2Fa%2Bb%2A");
        assert_eq!(query_escape("100%20"), "100%2520");
    }

    #[test]
    fn test_query_unescape() {
        assert_eq!(
            query_unescape("file%3A%2F%2F%2Ffull%2Fpath").unwrap(),
            "file:///full/path"
        );
        assert_eq!(query_unescape("a+b%2Bc").unwrap(), "a b+c");
        assert_eq!(query_unescape("%C3%A9").unwrap(), "é");
    }

    #[test]
    fn test_query_unescape_rejects_bad_escapes() {
        for input in ["%", "%2", "%zz", "abc%4", "%FF"] {
            let err = query_unescape(input).unwrap_err();
            assert!(
                matches!(err, DepotError::MalformedIdentifier { .. }),
                "{input} should be rejected"
            );
        }
    }
}
