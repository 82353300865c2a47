//! Configuration options for cloud environments and providers

use crate::controller::CloudLogController;
use crate::provider::{CloudRequestCallback, CloudStorageProvider, PROVIDER_S3};
use crate::purger::FileManifest;
use std::fmt;
use std::sync::Arc;

/// Default naming prefix prepended to every bucket name.
///
/// The effective bucket name exposed to the vendor is always
/// `prefix + bucket`; callers never hand a raw bucket name to the vendor.
pub const DEFAULT_BUCKET_PREFIX: &str = "rockset.";

const ENV_TEST_BUCKET_NAME: &str = "SHALE_CLOUD_TEST_BUCKET_NAME";
const ENV_BUCKET_NAME: &str = "SHALE_CLOUD_BUCKET_NAME";
const ENV_TEST_BUCKET_PREFIX: &str = "SHALE_CLOUD_TEST_BUCKET_PREFIX";
const ENV_BUCKET_PREFIX: &str = "SHALE_CLOUD_BUCKET_PREFIX";
const ENV_TEST_OBJECT_PATH: &str = "SHALE_CLOUD_TEST_OBJECT_PATH";
const ENV_OBJECT_PATH: &str = "SHALE_CLOUD_OBJECT_PATH";
const ENV_TEST_REGION: &str = "SHALE_CLOUD_TEST_REGION";
const ENV_REGION: &str = "SHALE_CLOUD_REGION";

/// Resolves a logical setting from the environment.
///
/// The primary name wins; the alternate is the fallback. `None` means
/// neither is set and the caller's destination should be left unchanged.
pub fn get_name_from_environment(name: &str, alt: &str) -> Option<String> {
    std::env::var(name).ok().or_else(|| std::env::var(alt).ok())
}

/// A one-shot snapshot of the bucket-related environment overrides.
///
/// All ambient environment reads happen in [`EnvOverrides::capture`]; the
/// snapshot is then applied as plain data, so no other component performs
/// its own lookup.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// Bucket name override, if set
    pub bucket: Option<String>,
    /// Bucket naming-prefix override, if set
    pub prefix: Option<String>,
    /// Object path override, if set
    pub object_path: Option<String>,
    /// Region override, if set
    pub region: Option<String>,
}

impl EnvOverrides {
    /// Captures the recognized `SHALE_CLOUD_TEST_*` / `SHALE_CLOUD_*`
    /// variable pairs from the process environment.
    pub fn capture() -> Self {
        Self::capture_with(|name, alt| get_name_from_environment(name, alt))
    }

    /// Captures overrides through the given lookup; lets tests supply a
    /// fake environment without mutating process state.
    pub fn capture_with<F>(lookup: F) -> Self
    where
        F: Fn(&str, &str) -> Option<String>,
    {
        EnvOverrides {
            bucket: lookup(ENV_TEST_BUCKET_NAME, ENV_BUCKET_NAME),
            prefix: lookup(ENV_TEST_BUCKET_PREFIX, ENV_BUCKET_PREFIX),
            object_path: lookup(ENV_TEST_OBJECT_PATH, ENV_OBJECT_PATH),
            region: lookup(ENV_TEST_REGION, ENV_REGION),
        }
    }
}

/// Identifies one logical cloud location: a naming prefix, a vendor bucket
/// name, an object-path prefix within the bucket, and a region.
///
/// Invariant: `name() == prefix + bucket` whenever the bucket is non-empty,
/// and `name()` is empty iff the bucket is empty. [`set_bucket_name`] is the
/// only mutator of bucket, prefix, and name, and recomputes all three
/// together.
///
/// [`set_bucket_name`]: BucketOptions::set_bucket_name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketOptions {
    prefix: String,
    bucket: String,
    object_path: String,
    region: String,
    name: String,
}

impl Default for BucketOptions {
    fn default() -> Self {
        BucketOptions {
            prefix: DEFAULT_BUCKET_PREFIX.to_string(),
            bucket: String::new(),
            object_path: String::new(),
            region: String::new(),
            name: String::new(),
        }
    }
}

impl BucketOptions {
    /// Sets the bucket name and, when `prefix` is non-empty, replaces the
    /// stored prefix. The composed `name` is recomputed atomically with the
    /// other two fields; an empty bucket clears it.
    pub fn set_bucket_name(&mut self, bucket: &str, prefix: &str) {
        if !prefix.is_empty() {
            self.prefix = prefix.to_string();
        }

        self.bucket = bucket.to_string();
        if self.bucket.is_empty() {
            self.name.clear();
        } else {
            self.name = format!("{}{}", self.prefix, self.bucket);
        }
    }

    /// Sets the object-path prefix under which this location's keys live
    pub fn set_object_path(&mut self, object_path: &str) {
        self.object_path = object_path.to_string();
    }

    /// Sets the vendor region
    pub fn set_region(&mut self, region: &str) {
        self.region = region.to_string();
    }

    /// The raw bucket name, without the prefix
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The naming prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The composed bucket name exposed to the vendor (`prefix + bucket`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object-path prefix
    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    /// The vendor region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// True iff a bucket has been named. Gates purger startup and
    /// distinguishes "no destination configured" from "destination
    /// configured".
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// Fills bucket, prefix, object path, and region from the environment
    /// snapshot, falling back to the given defaults. The bucket name
    /// defaults to `bucket_stem` suffixed with the current user so parallel
    /// test runs do not collide.
    ///
    /// This is the bootstrap used by tests and default configuration.
    pub fn initialize_from_environment(&mut self, bucket_stem: &str, object: &str, region: &str) {
        let overrides = EnvOverrides::capture();

        let bucket = overrides.bucket.unwrap_or_else(|| {
            let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
            format!("{}{}", bucket_stem, user)
        });
        let prefix = overrides.prefix.unwrap_or_default();
        self.set_bucket_name(&bucket, &prefix);

        self.object_path = overrides.object_path.unwrap_or_else(|| object.to_string());
        self.region = overrides.region.unwrap_or_else(|| region.to_string());
    }

    /// Applies the captured overrides to fields not explicitly supplied:
    /// bucket, object path, and region fill in only when still empty, and
    /// the prefix is replaced only while it still holds the default.
    pub(crate) fn merge_overrides(&mut self, overrides: &EnvOverrides) {
        if self.bucket.is_empty() {
            if let Some(bucket) = &overrides.bucket {
                let bucket = bucket.clone();
                self.set_bucket_name(&bucket, "");
            }
        }
        if self.prefix == DEFAULT_BUCKET_PREFIX {
            if let Some(prefix) = &overrides.prefix {
                let (bucket, prefix) = (self.bucket.clone(), prefix.clone());
                self.set_bucket_name(&bucket, &prefix);
            }
        }
        if self.object_path.is_empty() {
            if let Some(object_path) = &overrides.object_path {
                self.object_path = object_path.clone();
            }
        }
        if self.region.is_empty() {
            if let Some(region) = &overrides.region {
                self.region = region.clone();
            }
        }
    }
}

/// Static credentials handed to the vendor client.
///
/// Unset fields defer to whatever the vendor SDK resolves on its own
/// (instance profiles, credential files, ambient configuration).
#[derive(Debug, Clone, Default)]
pub struct CloudCredentials {
    /// Access key identifier
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
}

impl CloudCredentials {
    /// Reads the conventional `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
    /// variables. Part of the bootstrap step, not called from steady-state
    /// code paths.
    pub fn from_environment() -> Self {
        CloudCredentials {
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
        }
    }

    /// True when both halves of the key pair are present
    pub fn has_key_pair(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

/// Configuration shared by every provider implementation
#[derive(Clone)]
pub struct CloudStorageProviderOptions {
    /// Request timeout in milliseconds; 0 means the vendor default
    pub request_timeout_ms: u64,
    /// Connection timeout in milliseconds; 0 means the vendor default
    pub connect_timeout_ms: u64,
    /// Enables server-side encryption on uploads
    pub server_side_encryption: bool,
    /// Key identifier for encryption; empty selects a vendor-managed key
    pub encryption_key_id: String,
    /// Invoked after every cloud operation with
    /// `(op_type, bytes, latency, success)`. Best-effort instrumentation:
    /// its absence, failure, or slowness never affects the operation, and
    /// it may fire more than once for internally retried vendor requests.
    pub cloud_request_callback: Option<CloudRequestCallback>,
}

impl Default for CloudStorageProviderOptions {
    fn default() -> Self {
        CloudStorageProviderOptions {
            request_timeout_ms: 600_000,
            connect_timeout_ms: 30_000,
            server_side_encryption: false,
            encryption_key_id: String::new(),
            cloud_request_callback: None,
        }
    }
}

impl fmt::Debug for CloudStorageProviderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudStorageProviderOptions")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("server_side_encryption", &self.server_side_encryption)
            .field("encryption_key_id", &self.encryption_key_id)
            .field(
                "cloud_request_callback",
                &self.cloud_request_callback.is_some(),
            )
            .finish()
    }
}

/// Aggregated configuration for a [`CloudEnv`](crate::CloudEnv).
///
/// `src_bucket` and `dest_bucket` may be equal (the conventional
/// single-bucket deployment) or distinct (clone-from-template: reads prefer
/// the source, new writes go to the destination).
#[derive(Clone)]
pub struct CloudEnvOptions {
    /// Read-template bucket
    pub src_bucket: BucketOptions,
    /// Writable bucket for new state
    pub dest_bucket: BucketOptions,
    /// Credentials handed to the provider
    pub credentials: CloudCredentials,
    /// Provider selected by name when no shared handle is supplied
    pub provider_name: String,
    /// Pre-built provider handle; takes precedence over `provider_name`
    pub storage_provider: Option<Arc<dyn CloudStorageProvider>>,
    /// Replication log controller handle (external collaborator)
    pub cloud_log_controller: Option<Arc<dyn CloudLogController>>,
    /// Engine file manifest consulted by the purger for liveness
    pub file_manifest: Option<Arc<dyn FileManifest>>,
    /// Starts the background purger when the destination bucket is valid
    pub run_purger: bool,
    /// Interval between purge passes, in milliseconds
    pub purger_periodicity_millis: u64,
    /// Provider-level configuration (timeouts, encryption, instrumentation)
    pub provider_options: CloudStorageProviderOptions,
}

impl Default for CloudEnvOptions {
    fn default() -> Self {
        CloudEnvOptions {
            src_bucket: BucketOptions::default(),
            dest_bucket: BucketOptions::default(),
            credentials: CloudCredentials::default(),
            provider_name: PROVIDER_S3.to_string(),
            storage_provider: None,
            cloud_log_controller: None,
            file_manifest: None,
            run_purger: false,
            purger_periodicity_millis: 600_000,
            provider_options: CloudStorageProviderOptions::default(),
        }
    }
}

impl fmt::Debug for CloudEnvOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudEnvOptions")
            .field("src_bucket", &self.src_bucket)
            .field("dest_bucket", &self.dest_bucket)
            .field("provider_name", &self.provider_name)
            .field(
                "storage_provider",
                &self.storage_provider.as_ref().map(|p| p.name()),
            )
            .field(
                "cloud_log_controller",
                &self.cloud_log_controller.as_ref().map(|c| c.name()),
            )
            .field("file_manifest", &self.file_manifest.is_some())
            .field("run_purger", &self.run_purger)
            .field("purger_periodicity_millis", &self.purger_periodicity_millis)
            .field("provider_options", &self.provider_options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_bucket_name_composes_name() {
        let mut opts = BucketOptions::default();
        opts.set_bucket_name("mydb", "");
        assert_eq!(opts.name(), "rockset.mydb");
        assert_eq!(opts.bucket(), "mydb");
        assert!(opts.is_valid());

        opts.set_bucket_name("mydb", "acme.");
        assert_eq!(opts.name(), "acme.mydb");

        // Prefix is retained across later calls that do not replace it
        opts.set_bucket_name("other", "");
        assert_eq!(opts.name(), "acme.other");
    }

    #[test]
    fn test_set_bucket_name_idempotent() {
        let mut opts = BucketOptions::default();
        opts.set_bucket_name("mydb", "acme.");
        let first = opts.clone();
        opts.set_bucket_name("mydb", "acme.");
        assert_eq!(opts, first);
    }

    #[test]
    fn test_empty_bucket_clears_name() {
        let mut opts = BucketOptions::default();
        opts.set_bucket_name("mydb", "");
        opts.set_bucket_name("", "");
        assert_eq!(opts.name(), "");
        assert!(!opts.is_valid());
    }

    #[test]
    fn test_get_name_from_environment() {
        std::env::set_var("SHALE_OPTS_UNIT_X_TEST", "primary");
        std::env::set_var("SHALE_OPTS_UNIT_X", "alternate");
        assert_eq!(
            get_name_from_environment("SHALE_OPTS_UNIT_X_TEST", "SHALE_OPTS_UNIT_X").as_deref(),
            Some("primary")
        );

        std::env::remove_var("SHALE_OPTS_UNIT_X_TEST");
        assert_eq!(
            get_name_from_environment("SHALE_OPTS_UNIT_X_TEST", "SHALE_OPTS_UNIT_X").as_deref(),
            Some("alternate")
        );

        std::env::remove_var("SHALE_OPTS_UNIT_X");
        assert_eq!(
            get_name_from_environment("SHALE_OPTS_UNIT_X_TEST", "SHALE_OPTS_UNIT_X"),
            None
        );
    }

    #[test]
    fn test_merge_overrides_fills_unset_fields() {
        let overrides = EnvOverrides {
            bucket: Some("envbucket".to_string()),
            prefix: Some("env.".to_string()),
            object_path: Some("envpath".to_string()),
            region: Some("eu-central-1".to_string()),
        };

        let mut opts = BucketOptions::default();
        opts.merge_overrides(&overrides);
        assert_eq!(opts.name(), "env.envbucket");
        assert_eq!(opts.object_path(), "envpath");
        assert_eq!(opts.region(), "eu-central-1");
    }

    #[test]
    fn test_merge_overrides_keeps_explicit_fields() {
        let overrides = EnvOverrides {
            bucket: Some("envbucket".to_string()),
            prefix: Some("env.".to_string()),
            object_path: Some("envpath".to_string()),
            region: Some("eu-central-1".to_string()),
        };

        let mut opts = BucketOptions::default();
        opts.set_bucket_name("explicit", "mine.");
        opts.set_object_path("db1");
        opts.set_region("us-west-2");
        opts.merge_overrides(&overrides);

        assert_eq!(opts.name(), "mine.explicit");
        assert_eq!(opts.object_path(), "db1");
        assert_eq!(opts.region(), "us-west-2");
    }

    #[test]
    fn test_capture_with_fake_environment() {
        let overrides = EnvOverrides::capture_with(|name, _alt| {
            (name == "SHALE_CLOUD_TEST_BUCKET_NAME").then(|| "snapshot".to_string())
        });
        assert_eq!(overrides.bucket.as_deref(), Some("snapshot"));
        assert!(overrides.prefix.is_none());
        assert!(overrides.region.is_none());
    }
}
