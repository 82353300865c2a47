//! # shale-cloud
//!
//! Cloud object-storage layer for the shale storage engine. This crate lets the
//! engine persist and retrieve its files through a pluggable cloud object-store
//! backend while keeping the engine's synchronous file-I/O contract: every
//! provider method blocks the calling thread, bridging the async `object_store`
//! API over an internal Tokio runtime.
//!
//! ## Architecture
//!
//! The main abstractions are:
//! - [`CloudStorageProvider`]: the capability interface every object-store
//!   vendor implements (bucket/object lifecycle, read/write handles, metadata,
//!   copy), selected by name through [`create_provider`]
//! - [`CloudEnv`]: the orchestrating environment owning the provider and log
//!   controller, composing bucket names, and running the background purger
//! - [`CloudReadableFile`] / [`CloudWritableFile`]: sequential and
//!   random-access handles over cloud objects
//!
//! A database can be cloned from a read-only template bucket (the source
//! bucket) while new state is written to a private destination bucket; the
//! purger reclaims destination objects the engine no longer references.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod buffer;
mod controller;
mod env;
mod error;
mod file;
mod memory;
mod ops;
mod options;
mod path;
mod provider;
mod purger;
mod runtime;
mod s3;

pub use controller::CloudLogController;
pub use env::CloudEnv;
pub use error::{CloudError, Result};
pub use file::{CloudReadableFile, CloudWritableFile};
pub use memory::MemoryStorageProvider;
pub use options::{
    get_name_from_environment, BucketOptions, CloudCredentials, CloudEnvOptions,
    CloudStorageProviderOptions, EnvOverrides, DEFAULT_BUCKET_PREFIX,
};
pub use path::{flatten_path, object_key};
pub use provider::{
    create_provider, create_provider_with_defaults, CloudObjectInformation, CloudRequestCallback,
    CloudRequestOpType, CloudStorageProvider, ProviderKind, PROVIDER_MEMORY, PROVIDER_S3,
};
pub use purger::FileManifest;
pub use s3::S3StorageProvider;

// Re-export commonly used types from object_store
pub use object_store::{path::Path as ObjectPath, ObjectStore};
