//! Error types for shale-cloud

use thiserror::Error;

/// Error taxonomy for cloud storage operations.
///
/// Variants carry their message as an owned string so the error is `Clone`;
/// a writable file handle keeps its last I/O error and re-surfaces it from
/// `status()` without exceptions crossing the provider boundary.
#[derive(Error, Debug, Clone)]
pub enum CloudError {
    /// Object or bucket absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Vendor or build lacks the requested capability
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Transport or vendor failure
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed bucket or object naming
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored state inconsistent with expectations
    #[error("corruption: {0}")]
    Corruption(String),
}

impl CloudError {
    /// True for the `NotFound` variant; used where absence is an answer
    /// rather than a failure (existence probes).
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, CloudError>;

impl From<object_store::Error> for CloudError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => CloudError::NotFound(path),
            object_store::Error::InvalidPath { source } => {
                CloudError::InvalidArgument(source.to_string())
            }
            other => CloudError::Io(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CloudError {
    fn from(err: std::io::Error) -> Self {
        CloudError::Io(err.to_string())
    }
}

impl From<CloudError> for std::io::Error {
    fn from(err: CloudError) -> Self {
        let kind = match &err {
            CloudError::NotFound(_) => std::io::ErrorKind::NotFound,
            CloudError::NotSupported(_) => std::io::ErrorKind::Unsupported,
            CloudError::InvalidArgument(_) => std::io::ErrorKind::InvalidInput,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_mapping() {
        let err = CloudError::from(object_store::Error::NotFound {
            path: "db/000001.sst".to_string(),
            source: "gone".into(),
        });
        assert!(err.is_not_found());

        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = CloudError::Io("connection reset".to_string());
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
