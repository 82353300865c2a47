//! The capability interface every object-store vendor implements

use crate::env::CloudEnv;
use crate::error::{CloudError, Result};
use crate::file::{CloudReadableFile, CloudWritableFile};
use crate::memory::MemoryStorageProvider;
use crate::options::CloudStorageProviderOptions;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reserved provider name for the object-store vendor provider (S3)
pub const PROVIDER_S3: &str = "s3";
/// Reserved provider name for the options-only, in-memory provider
pub const PROVIDER_MEMORY: &str = "memory";

/// Read-only snapshot of a stored object, produced by a successful
/// metadata query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudObjectInformation {
    /// Object size in bytes
    pub size: u64,
    /// Modification time in epoch seconds
    pub modification_time: u64,
    /// Vendor-defined content hash (an ETag on S3)
    pub content_hash: String,
    /// Arbitrary string-keyed vendor metadata
    pub metadata: HashMap<String, String>,
}

/// Tags every provider operation for instrumentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudRequestOpType {
    /// Object download or ranged read
    Read,
    /// Object upload
    Write,
    /// Prefix enumeration
    List,
    /// Bucket creation
    Create,
    /// Object or bucket deletion
    Delete,
    /// Server-side or streamed copy
    Copy,
    /// Metadata query
    Info,
}

/// Best-effort instrumentation hook invoked after each provider operation
/// with `(op_type, bytes, latency, success)`
pub type CloudRequestCallback = Arc<dyn Fn(CloudRequestOpType, u64, Duration, bool) + Send + Sync>;

/// Closed enumeration of the provider implementations this build carries.
///
/// Together with [`CloudStorageProvider::as_any`] this replaces lookup by
/// unchecked pointer casts: callers match on the tag and get a checked,
/// possibly-absent downcast instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// [`S3StorageProvider`](crate::S3StorageProvider)
    S3,
    /// [`MemoryStorageProvider`](crate::MemoryStorageProvider)
    Memory,
}

/// Interface to a cloud object store.
///
/// Implementations are safe under concurrent invocation from multiple
/// engine worker threads. Every method surfaces failure as a typed result
/// and never retries internally; retry policy belongs to the caller. Calls
/// that perform network I/O may block the calling thread, bounded by the
/// configured request and connect timeouts.
pub trait CloudStorageProvider: Send + Sync {
    /// Vendor name of this provider
    fn name(&self) -> &str;

    /// Type tag for checked downcasting
    fn kind(&self) -> ProviderKind;

    /// The concrete provider for [`ProviderKind`]-guided downcasts
    fn as_any(&self) -> &dyn Any;

    /// Effective provider configuration
    fn options(&self) -> &CloudStorageProviderOptions;

    /// Creates the bucket
    fn create_bucket(&self, bucket_name: &str) -> Result<()>;

    /// Whether the bucket exists
    fn exists_bucket(&self, bucket_name: &str) -> Result<bool>;

    /// Deletes every object under `object_path` in the bucket
    fn empty_bucket(&self, bucket_name: &str, object_path: &str) -> Result<()>;

    /// Deletes one object
    fn delete_cloud_object(&self, bucket_name: &str, object_path: &str) -> Result<()>;

    /// All keys whose path starts with the given prefix
    fn list_cloud_objects(&self, bucket_name: &str, object_path: &str) -> Result<Vec<String>>;

    /// Whether the object exists
    fn exists_cloud_object(&self, bucket_name: &str, object_path: &str) -> Result<bool>;

    /// Size of the object in bytes
    fn get_cloud_object_size(&self, bucket_name: &str, object_path: &str) -> Result<u64>;

    /// Modification time of the object in epoch seconds
    fn get_cloud_object_modification_time(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<u64>;

    /// Full metadata snapshot of the object
    fn get_cloud_object_metadata(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<CloudObjectInformation>;

    /// Copies an object between cloud locations without staging it on
    /// local disk
    fn copy_cloud_object(
        &self,
        src_bucket_name: &str,
        src_object_path: &str,
        dest_bucket_name: &str,
        dest_object_path: &str,
    ) -> Result<()>;

    /// Downloads an object to a local path
    fn get_cloud_object(
        &self,
        bucket_name: &str,
        object_path: &str,
        local_path: &str,
    ) -> Result<()>;

    /// Uploads a local file as an object
    fn put_cloud_object(
        &self,
        local_path: &str,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<()>;

    /// Replaces the object's vendor metadata
    fn put_cloud_object_metadata(
        &self,
        bucket_name: &str,
        object_path: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<()>;

    /// Opens an append-write handle that uploads on close
    fn new_cloud_writable_file(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<Box<dyn CloudWritableFile>>;

    /// Opens a sequential and random-access read handle
    fn new_cloud_readable_file(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<Box<dyn CloudReadableFile>>;

    /// Logs the effective configuration for diagnostics; no side effect
    /// on state
    fn dump(&self);

    /// Binds the provider to its owning environment after construction.
    ///
    /// Client construction needs environment-level bucket, region, and
    /// credential state that only exists once the environment is fully
    /// formed, so initialization is two-phase.
    fn prepare(&self, env: &CloudEnv) -> Result<()>;
}

impl std::fmt::Debug for dyn CloudStorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudStorageProvider")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Creates a provider by name with the given options.
///
/// Reserved names are [`PROVIDER_S3`] and [`PROVIDER_MEMORY`]; any other
/// name fails with `NotSupported`, never a silent fallback.
pub fn create_provider(
    name: &str,
    options: CloudStorageProviderOptions,
) -> Result<Arc<dyn CloudStorageProvider>> {
    match name {
        PROVIDER_S3 => Ok(Arc::new(crate::s3::S3StorageProvider::new(options))),
        PROVIDER_MEMORY => Ok(Arc::new(MemoryStorageProvider::new(options))),
        other => Err(CloudError::NotSupported(format!(
            "unknown cloud storage provider: {other}"
        ))),
    }
}

/// Creates a provider by name with default options
pub fn create_provider_with_defaults(name: &str) -> Result<Arc<dyn CloudStorageProvider>> {
    create_provider(name, CloudStorageProviderOptions::default())
}

/// Fans completed operations out to the configured request callback.
///
/// Cheap to clone; file handles carry their own copy so reads and writes
/// through them are instrumented like direct provider calls.
#[derive(Clone)]
pub(crate) struct RequestInstrument {
    callback: Option<CloudRequestCallback>,
}

impl RequestInstrument {
    pub(crate) fn new(callback: Option<CloudRequestCallback>) -> Self {
        RequestInstrument { callback }
    }

    /// Reports one completed operation. Never fails; the callback is
    /// instrumentation only.
    pub(crate) fn record(
        &self,
        op: CloudRequestOpType,
        bytes: u64,
        started: Instant,
        success: bool,
    ) {
        if let Some(callback) = &self.callback {
            callback(op, bytes, started.elapsed(), success);
        }
    }
}

impl std::fmt::Debug for RequestInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestInstrument")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_not_supported() {
        let err = create_provider_with_defaults("does-not-exist").unwrap_err();
        assert!(matches!(err, CloudError::NotSupported(_)));
    }

    #[test]
    fn test_reserved_names_resolve() {
        let s3 = create_provider_with_defaults(PROVIDER_S3).unwrap();
        assert_eq!(s3.kind(), ProviderKind::S3);
        assert_eq!(s3.name(), PROVIDER_S3);

        let memory = create_provider_with_defaults(PROVIDER_MEMORY).unwrap();
        assert_eq!(memory.kind(), ProviderKind::Memory);
    }

    #[test]
    fn test_checked_downcast() {
        let provider = create_provider_with_defaults(PROVIDER_MEMORY).unwrap();
        assert!(provider
            .as_any()
            .downcast_ref::<MemoryStorageProvider>()
            .is_some());
        assert!(provider
            .as_any()
            .downcast_ref::<crate::s3::S3StorageProvider>()
            .is_none());
    }
}
