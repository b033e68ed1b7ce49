use thiserror::Error;

/// Depot error types
#[derive(Error, Debug)]
pub enum DepotError {
    /// Canonical identifier does not follow the `cimd:<type>:v=<n>:<data>` grammar
    #[error("Cannot parse identifier {input:?}: {reason}")]
    MalformedIdentifier { input: String, reason: String },

    /// No constructor registered for the distribution type
    #[error("Unknown distribution type: {0:?}")]
    UnknownType(String),

    /// Identifier type does not match the variant being constructed
    #[error("Wrong distribution type: expected {expected:?}, found {found:?}")]
    TypeMismatch { expected: String, found: String },

    /// Location cannot be turned into an absolute filesystem path
    #[error("Invalid path {path:?}: {message}")]
    PathResolution { path: String, message: String },

    /// Temporary workspace allocation failed
    #[error("Cannot create workspace: {0}")]
    Workspace(String),

    /// External conversion failed or produced nothing
    #[error("Conversion failed for {path}: {message}")]
    Conversion { path: String, message: String },

    /// Store rejected the image write
    #[error("Store write failed: {0}")]
    StoreCommit(String),

    /// Store read-side error (index, lookup, removal)
    #[error("Store error: {0}")]
    Store(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DepotError {
    /// Shorthand for a [`DepotError::MalformedIdentifier`].
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        DepotError::MalformedIdentifier {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for DepotError {
    fn from(err: serde_json::Error) -> Self {
        DepotError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DepotError {
    fn from(err: serde_yaml::Error) -> Self {
        DepotError::SerializationError(err.to_string())
    }
}

/// Result type alias for depot operations
pub type Result<T> = std::result::Result<T, DepotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_identifier_display() {
        let error = DepotError::malformed("cimd:docker-archive", "expected 3 segments, found 1");
        assert_eq!(
            error.to_string(),
            "Cannot parse identifier \"cimd:docker-archive\": expected 3 segments, found 1"
        );
    }

    #[test]
    fn test_unknown_type_display() {
        let error = DepotError::UnknownType("not-a-real-type".to_string());
        assert_eq!(
            error.to_string(),
            "Unknown distribution type: \"not-a-real-type\""
        );
    }

    #[test]
    fn test_type_mismatch_display() {
        let error = DepotError::TypeMismatch {
            expected: "docker-archive".to_string(),
            found: "appc".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Wrong distribution type: expected \"docker-archive\", found \"appc\""
        );
    }

    #[test]
    fn test_path_resolution_display() {
        let error = DepotError::PathResolution {
            path: "http://example.com/x.tar".to_string(),
            message: "unsupported scheme http".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid path \"http://example.com/x.tar\": unsupported scheme http"
        );
    }

    #[test]
    fn test_conversion_display() {
        let error = DepotError::Conversion {
            path: "/tmp/busybox.tar".to_string(),
            message: "no images in archive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Conversion failed for /tmp/busybox.tar: no images in archive"
        );
    }

    #[test]
    fn test_store_commit_display() {
        let error = DepotError::StoreCommit("disk full".to_string());
        assert_eq!(error.to_string(), "Store write failed: disk full");
    }

    #[test]
    fn test_workspace_display() {
        let error = DepotError::Workspace("permission denied".to_string());
        assert_eq!(error.to_string(), "Cannot create workspace: permission denied");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: DepotError = io_error.into();
        assert!(matches!(error, DepotError::IoError(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ invalid");
        let error: DepotError = result.unwrap_err().into();
        assert!(matches!(error, DepotError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let error: DepotError = result.unwrap_err().into();
        assert!(matches!(error, DepotError::SerializationError(_)));
    }
}
