//! In-memory provider: the options-only provider and hermetic test double

use crate::env::CloudEnv;
use crate::error::{CloudError, Result};
use crate::file::{
    CloudReadableFile, CloudWritableFile, ObjectReadableFile, ObjectWritableFile,
};
use crate::ops;
use crate::options::CloudStorageProviderOptions;
use crate::provider::{
    CloudObjectInformation, CloudRequestOpType, CloudStorageProvider, ProviderKind,
    RequestInstrument, PROVIDER_MEMORY,
};
use object_store::memory::InMemory;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Provider backed by named in-memory object stores.
///
/// Carries no vendor dependency, supports the full bucket lifecycle, and is
/// the store behind hermetic tests. State lives for the provider's lifetime
/// only.
pub struct MemoryStorageProvider {
    options: CloudStorageProviderOptions,
    instrument: RequestInstrument,
    buckets: Mutex<HashMap<String, Arc<InMemory>>>,
}

impl MemoryStorageProvider {
    /// Creates an empty provider with the given options
    pub fn new(options: CloudStorageProviderOptions) -> Self {
        let instrument = RequestInstrument::new(options.cloud_request_callback.clone());
        MemoryStorageProvider {
            options,
            instrument,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn store(&self, bucket_name: &str) -> Result<Arc<InMemory>> {
        if bucket_name.is_empty() {
            return Err(CloudError::InvalidArgument("empty bucket name".to_string()));
        }
        self.buckets
            .lock()
            .expect("bucket map lock poisoned")
            .get(bucket_name)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("bucket {bucket_name} does not exist")))
    }
}

impl std::fmt::Debug for MemoryStorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorageProvider")
            .field("options", &self.options)
            .finish()
    }
}

impl CloudStorageProvider for MemoryStorageProvider {
    fn name(&self) -> &str {
        PROVIDER_MEMORY
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Memory
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn options(&self) -> &CloudStorageProviderOptions {
        &self.options
    }

    fn create_bucket(&self, bucket_name: &str) -> Result<()> {
        if bucket_name.is_empty() {
            return Err(CloudError::InvalidArgument("empty bucket name".to_string()));
        }
        let started = Instant::now();
        self.buckets
            .lock()
            .expect("bucket map lock poisoned")
            .entry(bucket_name.to_string())
            .or_insert_with(|| Arc::new(InMemory::new()));
        self.instrument
            .record(CloudRequestOpType::Create, 0, started, true);
        debug!(bucket = bucket_name, "created in-memory bucket");
        Ok(())
    }

    fn exists_bucket(&self, bucket_name: &str) -> Result<bool> {
        Ok(self
            .buckets
            .lock()
            .expect("bucket map lock poisoned")
            .contains_key(bucket_name))
    }

    fn empty_bucket(&self, bucket_name: &str, object_path: &str) -> Result<()> {
        let store = self.store(bucket_name)?;
        ops::empty_prefix(&self.instrument, store.as_ref(), object_path)
    }

    fn delete_cloud_object(&self, bucket_name: &str, object_path: &str) -> Result<()> {
        let store = self.store(bucket_name)?;
        ops::delete(&self.instrument, store.as_ref(), object_path)
    }

    fn list_cloud_objects(&self, bucket_name: &str, object_path: &str) -> Result<Vec<String>> {
        let store = self.store(bucket_name)?;
        ops::list_keys(&self.instrument, store.as_ref(), object_path)
    }

    fn exists_cloud_object(&self, bucket_name: &str, object_path: &str) -> Result<bool> {
        let store = self.store(bucket_name)?;
        ops::exists(&self.instrument, store.as_ref(), object_path)
    }

    fn get_cloud_object_size(&self, bucket_name: &str, object_path: &str) -> Result<u64> {
        let store = self.store(bucket_name)?;
        ops::object_size(&self.instrument, store.as_ref(), object_path)
    }

    fn get_cloud_object_modification_time(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<u64> {
        let store = self.store(bucket_name)?;
        ops::object_modification_time(&self.instrument, store.as_ref(), object_path)
    }

    fn get_cloud_object_metadata(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<CloudObjectInformation> {
        let store = self.store(bucket_name)?;
        ops::object_info(&self.instrument, store.as_ref(), object_path)
    }

    fn copy_cloud_object(
        &self,
        src_bucket_name: &str,
        src_object_path: &str,
        dest_bucket_name: &str,
        dest_object_path: &str,
    ) -> Result<()> {
        let src = self.store(src_bucket_name)?;
        if src_bucket_name == dest_bucket_name {
            ops::copy_within(&self.instrument, src.as_ref(), src_object_path, dest_object_path)
        } else {
            let dest = self.store(dest_bucket_name)?;
            ops::copy_across(
                &self.instrument,
                src.as_ref(),
                src_object_path,
                dest.as_ref(),
                dest_object_path,
            )
        }
    }

    fn get_cloud_object(
        &self,
        bucket_name: &str,
        object_path: &str,
        local_path: &str,
    ) -> Result<()> {
        let store = self.store(bucket_name)?;
        ops::download(&self.instrument, store.as_ref(), object_path, local_path)
    }

    fn put_cloud_object(
        &self,
        local_path: &str,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<()> {
        let store = self.store(bucket_name)?;
        ops::upload(&self.instrument, store.as_ref(), local_path, object_path)
    }

    fn put_cloud_object_metadata(
        &self,
        bucket_name: &str,
        object_path: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<()> {
        let store = self.store(bucket_name)?;
        ops::replace_metadata(&self.instrument, store.as_ref(), object_path, metadata)
    }

    fn new_cloud_writable_file(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<Box<dyn CloudWritableFile>> {
        let store = self.store(bucket_name)?;
        let file = ObjectWritableFile::create(store, object_path, self.instrument.clone())?;
        Ok(Box::new(file))
    }

    fn new_cloud_readable_file(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<Box<dyn CloudReadableFile>> {
        let store = self.store(bucket_name)?;
        let file = ObjectReadableFile::open(store, object_path, self.instrument.clone())?;
        Ok(Box::new(file))
    }

    fn dump(&self) {
        let buckets = self
            .buckets
            .lock()
            .expect("bucket map lock poisoned")
            .len();
        info!(
            provider = PROVIDER_MEMORY,
            buckets,
            request_timeout_ms = self.options.request_timeout_ms,
            connect_timeout_ms = self.options.connect_timeout_ms,
            "cloud storage provider configuration"
        );
    }

    fn prepare(&self, env: &CloudEnv) -> Result<()> {
        // A fresh environment should be immediately writable, so the
        // configured buckets are materialized here.
        if env.has_src_bucket() {
            self.create_bucket(env.src_bucket().name())?;
        }
        if env.has_dest_bucket() {
            self.create_bucket(env.dest_bucket().name())?;
        }
        Ok(())
    }
}
