//! The orchestrating cloud environment

use crate::controller::CloudLogController;
use crate::error::Result;
use crate::options::{BucketOptions, CloudEnvOptions, EnvOverrides};
use crate::path;
use crate::provider::{create_provider, CloudStorageProvider};
use crate::purger::{Purger, PurgerHandle};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Owns the storage provider and log controller for the lifetime of one
/// cloud-backed database environment.
///
/// Construction resolves environment-variable overrides, selects and
/// prepares the provider, and conditionally starts the background purger.
/// Teardown stops and joins the purger before the shared handles are
/// released; a construction failure leaves nothing running.
pub struct CloudEnv {
    options: CloudEnvOptions,
    base_path: PathBuf,
    provider: Arc<dyn CloudStorageProvider>,
    purger: Option<PurgerHandle>,
}

impl CloudEnv {
    /// Opens an environment from the given options.
    ///
    /// Bucket fields not explicitly supplied are filled from the captured
    /// environment overrides. If no provider handle is supplied, one is
    /// created by name; an unknown name fails with `NotSupported` and no
    /// partial environment is produced.
    pub fn new(mut options: CloudEnvOptions, base_path: impl Into<PathBuf>) -> Result<CloudEnv> {
        let overrides = EnvOverrides::capture();
        options.src_bucket.merge_overrides(&overrides);
        options.dest_bucket.merge_overrides(&overrides);

        let provider = match &options.storage_provider {
            Some(provider) => provider.clone(),
            None => create_provider(&options.provider_name, options.provider_options.clone())?,
        };

        let mut env = CloudEnv {
            options,
            base_path: base_path.into(),
            provider,
            purger: None,
        };

        info!(
            src_bucket = env.options.src_bucket.name(),
            dest_bucket = env.options.dest_bucket.name(),
            provider = env.provider.name(),
            run_purger = env.options.run_purger,
            "opening cloud environment"
        );
        env.provider.dump();

        let provider = env.provider.clone();
        provider.prepare(&env)?;
        if let Some(controller) = env.options.cloud_log_controller.clone() {
            controller.prepare(&env)?;
        }

        // The purger starts last: only a fully prepared environment with a
        // writable destination runs background reclamation.
        if env.options.dest_bucket.is_valid() && env.options.run_purger {
            env.purger = Some(Purger::start(
                env.provider.clone(),
                env.options.dest_bucket.name().to_string(),
                env.options.dest_bucket.object_path().to_string(),
                env.options.file_manifest.clone(),
                Duration::from_millis(env.options.purger_periodicity_millis),
            ));
        }

        Ok(env)
    }

    /// Opens an environment overriding source and destination bucket
    /// fields with raw strings. Empty strings leave the corresponding
    /// option at its configured default, allowing partial overrides.
    #[allow(clippy::too_many_arguments)]
    pub fn with_bucket_names(
        mut options: CloudEnvOptions,
        base_path: impl Into<PathBuf>,
        src_bucket: &str,
        src_object: &str,
        src_region: &str,
        dest_bucket: &str,
        dest_object: &str,
        dest_region: &str,
    ) -> Result<CloudEnv> {
        if !src_bucket.is_empty() {
            options.src_bucket.set_bucket_name(src_bucket, "");
        }
        if !src_object.is_empty() {
            options.src_bucket.set_object_path(src_object);
        }
        if !src_region.is_empty() {
            options.src_bucket.set_region(src_region);
        }
        if !dest_bucket.is_empty() {
            options.dest_bucket.set_bucket_name(dest_bucket, "");
        }
        if !dest_object.is_empty() {
            options.dest_bucket.set_object_path(dest_object);
        }
        if !dest_region.is_empty() {
            options.dest_bucket.set_region(dest_region);
        }
        Self::new(options, base_path)
    }

    /// The effective environment options
    pub fn options(&self) -> &CloudEnvOptions {
        &self.options
    }

    /// The storage provider owned by this environment
    pub fn provider(&self) -> &Arc<dyn CloudStorageProvider> {
        &self.provider
    }

    /// The replication log controller, when one is attached
    pub fn log_controller(&self) -> Option<&Arc<dyn CloudLogController>> {
        self.options.cloud_log_controller.as_ref()
    }

    /// Local staging directory for downloads and uploads
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Read-template bucket
    pub fn src_bucket(&self) -> &BucketOptions {
        &self.options.src_bucket
    }

    /// Writable destination bucket
    pub fn dest_bucket(&self) -> &BucketOptions {
        &self.options.dest_bucket
    }

    /// Whether a source bucket is configured
    pub fn has_src_bucket(&self) -> bool {
        self.options.src_bucket.is_valid()
    }

    /// Whether a destination bucket is configured
    pub fn has_dest_bucket(&self) -> bool {
        self.options.dest_bucket.is_valid()
    }

    /// Object key for a local file in the source bucket
    pub fn src_object_key(&self, local_path: &str) -> String {
        path::object_key(self.options.src_bucket.object_path(), local_path)
    }

    /// Object key for a local file in the destination bucket
    pub fn dest_object_key(&self, local_path: &str) -> String {
        path::object_key(self.options.dest_bucket.object_path(), local_path)
    }

    /// Whether the background purger is currently running
    pub fn is_purger_running(&self) -> bool {
        self.purger.as_ref().map_or(false, |p| p.is_running())
    }

    /// Flag the purger sets immediately before it exits.
    ///
    /// Lets teardown diagnostics and tests observe that the background
    /// task stopped before the shared handles were released. `None` when
    /// no purger was started.
    pub fn purger_stop_witness(&self) -> Option<Arc<AtomicBool>> {
        self.purger.as_ref().map(|p| p.stop_witness())
    }
}

impl fmt::Debug for CloudEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudEnv")
            .field("options", &self.options)
            .field("base_path", &self.base_path)
            .field("provider", &self.provider.name())
            .field("purger_running", &self.is_purger_running())
            .finish()
    }
}

impl Drop for CloudEnv {
    fn drop(&mut self) {
        // Stop-then-release: the purger must be joined before the provider
        // and controller handles drop with the rest of the struct.
        if let Some(mut purger) = self.purger.take() {
            debug!("stopping purger before releasing shared handles");
            purger.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use crate::provider::PROVIDER_MEMORY;

    fn memory_options() -> CloudEnvOptions {
        CloudEnvOptions {
            provider_name: PROVIDER_MEMORY.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_provider_aborts_construction() {
        let options = CloudEnvOptions {
            provider_name: "does-not-exist".to_string(),
            ..Default::default()
        };
        let err = CloudEnv::new(options, "/tmp").unwrap_err();
        assert!(matches!(err, CloudError::NotSupported(_)));
    }

    #[test]
    fn test_with_bucket_names_partial_override() {
        let mut options = memory_options();
        options.src_bucket.set_bucket_name("template", "");
        options.src_bucket.set_object_path("shared");

        // Empty strings leave the configured fields untouched
        let env = CloudEnv::with_bucket_names(
            options, "/tmp", "", "", "", "private", "db1", "us-west-2",
        )
        .unwrap();

        assert_eq!(env.src_bucket().name(), "rockset.template");
        assert_eq!(env.src_bucket().object_path(), "shared");
        assert_eq!(env.dest_bucket().name(), "rockset.private");
        assert_eq!(env.dest_bucket().region(), "us-west-2");
    }

    #[test]
    fn test_object_key_composition() {
        let mut options = memory_options();
        options.dest_bucket.set_bucket_name("private", "");
        options.dest_bucket.set_object_path("db1");

        let env = CloudEnv::new(options, "/tmp").unwrap();
        assert_eq!(
            env.dest_object_key(r"\data\db\000001.sst"),
            "db1/data-db-000001.sst"
        );
        // No source bucket configured: bare flattened key
        assert_eq!(env.src_object_key("CURRENT"), "CURRENT");
    }
}
