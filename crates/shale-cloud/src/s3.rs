//! S3 provider backed by `object_store`'s AWS implementation

use crate::env::CloudEnv;
use crate::error::{CloudError, Result};
use crate::file::{
    CloudReadableFile, CloudWritableFile, ObjectReadableFile, ObjectWritableFile,
};
use crate::ops;
use crate::options::{CloudCredentials, CloudStorageProviderOptions};
use crate::provider::{
    CloudObjectInformation, CloudRequestOpType, CloudStorageProvider, ProviderKind,
    RequestInstrument, PROVIDER_S3,
};
use crate::runtime;
use futures_util::StreamExt;
use object_store::aws::{AmazonS3Builder, AmazonS3ConfigKey};
use object_store::{ClientOptions, ObjectStore};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Environment-level state the provider needs to build vendor clients.
/// Only available after `prepare`, which is why initialization is
/// two-phase.
#[derive(Debug)]
struct Binding {
    credentials: CloudCredentials,
    /// Composed bucket name to region, from the environment's bucket options
    regions: HashMap<String, String>,
    default_region: String,
}

/// Provider for the S3 object store.
///
/// One vendor client is built per bucket and cached; clients are
/// constructed during [`prepare`](CloudStorageProvider::prepare) for the
/// environment's configured buckets and lazily for any other bucket named
/// in a call.
pub struct S3StorageProvider {
    options: CloudStorageProviderOptions,
    instrument: RequestInstrument,
    binding: OnceLock<Binding>,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl S3StorageProvider {
    /// Creates an unbound provider with the given options
    pub fn new(options: CloudStorageProviderOptions) -> Self {
        let instrument = RequestInstrument::new(options.cloud_request_callback.clone());
        S3StorageProvider {
            options,
            instrument,
            binding: OnceLock::new(),
            stores: Mutex::new(HashMap::new()),
        }
    }

    fn store_for(&self, bucket_name: &str) -> Result<Arc<dyn ObjectStore>> {
        if bucket_name.is_empty() {
            return Err(CloudError::InvalidArgument("empty bucket name".to_string()));
        }
        if let Some(store) = self
            .stores
            .lock()
            .expect("store map lock poisoned")
            .get(bucket_name)
        {
            return Ok(store.clone());
        }

        let binding = self.binding.get().ok_or_else(|| {
            CloudError::InvalidArgument("provider has not been prepared".to_string())
        })?;

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket_name);

        let region = binding
            .regions
            .get(bucket_name)
            .cloned()
            .unwrap_or_else(|| binding.default_region.clone());
        if !region.is_empty() {
            builder = builder.with_region(region);
        }
        if let (Some(key_id), Some(secret)) = (
            &binding.credentials.access_key_id,
            &binding.credentials.secret_access_key,
        ) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }

        let mut client_options = ClientOptions::new();
        if self.options.request_timeout_ms > 0 {
            client_options =
                client_options.with_timeout(Duration::from_millis(self.options.request_timeout_ms));
        }
        if self.options.connect_timeout_ms > 0 {
            client_options = client_options
                .with_connect_timeout(Duration::from_millis(self.options.connect_timeout_ms));
        }
        builder = builder.with_client_options(client_options);

        if self.options.server_side_encryption {
            let unsupported = |_| {
                CloudError::NotSupported(
                    "server-side encryption is not supported by this object_store build"
                        .to_string(),
                )
            };
            let algorithm = if self.options.encryption_key_id.is_empty() {
                "AES256"
            } else {
                "aws:kms"
            };
            let key = "aws_server_side_encryption"
                .parse::<AmazonS3ConfigKey>()
                .map_err(unsupported)?;
            builder = builder.with_config(key, algorithm);
            if !self.options.encryption_key_id.is_empty() {
                let key = "aws_sse_kms_key_id"
                    .parse::<AmazonS3ConfigKey>()
                    .map_err(unsupported)?;
                builder = builder.with_config(key, self.options.encryption_key_id.clone());
            }
        }

        let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
        debug!(bucket = bucket_name, "built S3 client");
        self.stores
            .lock()
            .expect("store map lock poisoned")
            .insert(bucket_name.to_string(), store.clone());
        Ok(store)
    }
}

impl std::fmt::Debug for S3StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3StorageProvider")
            .field("options", &self.options)
            .field("prepared", &self.binding.get().is_some())
            .finish()
    }
}

impl CloudStorageProvider for S3StorageProvider {
    fn name(&self) -> &str {
        PROVIDER_S3
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::S3
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn options(&self) -> &CloudStorageProviderOptions {
        &self.options
    }

    fn create_bucket(&self, bucket_name: &str) -> Result<()> {
        Err(CloudError::NotSupported(format!(
            "bucket {bucket_name} must be provisioned out-of-band"
        )))
    }

    fn exists_bucket(&self, bucket_name: &str) -> Result<bool> {
        let store = self.store_for(bucket_name)?;
        let started = Instant::now();
        let result = runtime::block_on(async {
            // Probing the first list entry is the cheapest portable check
            let mut stream = store.list(None);
            match stream.next().await {
                Some(Err(e)) => Err(CloudError::from(e)),
                _ => Ok(true),
            }
        });
        let result = match result {
            Err(e) if e.is_not_found() => Ok(false),
            other => other,
        };
        self.instrument
            .record(CloudRequestOpType::Info, 0, started, result.is_ok());
        result
    }

    fn empty_bucket(&self, bucket_name: &str, object_path: &str) -> Result<()> {
        let store = self.store_for(bucket_name)?;
        ops::empty_prefix(&self.instrument, store.as_ref(), object_path)
    }

    fn delete_cloud_object(&self, bucket_name: &str, object_path: &str) -> Result<()> {
        let store = self.store_for(bucket_name)?;
        ops::delete(&self.instrument, store.as_ref(), object_path)
    }

    fn list_cloud_objects(&self, bucket_name: &str, object_path: &str) -> Result<Vec<String>> {
        let store = self.store_for(bucket_name)?;
        ops::list_keys(&self.instrument, store.as_ref(), object_path)
    }

    fn exists_cloud_object(&self, bucket_name: &str, object_path: &str) -> Result<bool> {
        let store = self.store_for(bucket_name)?;
        ops::exists(&self.instrument, store.as_ref(), object_path)
    }

    fn get_cloud_object_size(&self, bucket_name: &str, object_path: &str) -> Result<u64> {
        let store = self.store_for(bucket_name)?;
        ops::object_size(&self.instrument, store.as_ref(), object_path)
    }

    fn get_cloud_object_modification_time(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<u64> {
        let store = self.store_for(bucket_name)?;
        ops::object_modification_time(&self.instrument, store.as_ref(), object_path)
    }

    fn get_cloud_object_metadata(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<CloudObjectInformation> {
        let store = self.store_for(bucket_name)?;
        ops::object_info(&self.instrument, store.as_ref(), object_path)
    }

    fn copy_cloud_object(
        &self,
        src_bucket_name: &str,
        src_object_path: &str,
        dest_bucket_name: &str,
        dest_object_path: &str,
    ) -> Result<()> {
        let src = self.store_for(src_bucket_name)?;
        if src_bucket_name == dest_bucket_name {
            // Server-side copy, no transfer through this host
            ops::copy_within(&self.instrument, src.as_ref(), src_object_path, dest_object_path)
        } else {
            let dest = self.store_for(dest_bucket_name)?;
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
        let store = self.store_for(bucket_name)?;
        ops::download(&self.instrument, store.as_ref(), object_path, local_path)
    }

    fn put_cloud_object(
        &self,
        local_path: &str,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<()> {
        let store = self.store_for(bucket_name)?;
        ops::upload(&self.instrument, store.as_ref(), local_path, object_path)
    }

    fn put_cloud_object_metadata(
        &self,
        bucket_name: &str,
        object_path: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<()> {
        let store = self.store_for(bucket_name)?;
        ops::replace_metadata(&self.instrument, store.as_ref(), object_path, metadata)
    }

    fn new_cloud_writable_file(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<Box<dyn CloudWritableFile>> {
        let store = self.store_for(bucket_name)?;
        let file = ObjectWritableFile::create(store, object_path, self.instrument.clone())?;
        Ok(Box::new(file))
    }

    fn new_cloud_readable_file(
        &self,
        bucket_name: &str,
        object_path: &str,
    ) -> Result<Box<dyn CloudReadableFile>> {
        let store = self.store_for(bucket_name)?;
        let file = ObjectReadableFile::open(store, object_path, self.instrument.clone())?;
        Ok(Box::new(file))
    }

    fn dump(&self) {
        info!(
            provider = PROVIDER_S3,
            request_timeout_ms = self.options.request_timeout_ms,
            connect_timeout_ms = self.options.connect_timeout_ms,
            server_side_encryption = self.options.server_side_encryption,
            encryption_key_id_set = !self.options.encryption_key_id.is_empty(),
            "cloud storage provider configuration"
        );
    }

    fn prepare(&self, env: &CloudEnv) -> Result<()> {
        let options = env.options();
        let mut regions = HashMap::new();
        if options.src_bucket.is_valid() {
            regions.insert(
                options.src_bucket.name().to_string(),
                options.src_bucket.region().to_string(),
            );
        }
        if options.dest_bucket.is_valid() {
            regions.insert(
                options.dest_bucket.name().to_string(),
                options.dest_bucket.region().to_string(),
            );
        }
        let default_region = if options.dest_bucket.is_valid() {
            options.dest_bucket.region().to_string()
        } else {
            options.src_bucket.region().to_string()
        };

        // Re-preparing against the same environment is a no-op
        let _ = self.binding.set(Binding {
            credentials: options.credentials.clone(),
            regions,
            default_region,
        });

        // Fail fast: build clients for the configured buckets now
        if options.src_bucket.is_valid() {
            self.store_for(options.src_bucket.name())?;
        }
        if options.dest_bucket.is_valid() {
            self.store_for(options.dest_bucket.name())?;
        }
        Ok(())
    }
}
