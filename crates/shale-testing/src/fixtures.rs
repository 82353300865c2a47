//! Common fixtures for cloud environment tests

use crate::TestDir;
use anyhow::Result;
use shale_cloud::{
    CloudEnvOptions, CloudError, CloudRequestCallback, CloudStorageProvider, FileManifest,
    PROVIDER_MEMORY,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// File manifest double with a settable set of live object keys.
///
/// Can be switched into a failing mode to exercise how background
/// reclamation reacts to an unreadable manifest.
#[derive(Debug, Default)]
pub struct StaticManifest {
    live: Mutex<HashSet<String>>,
    failing: AtomicBool,
}

impl StaticManifest {
    /// Manifest that reports the given object keys as live
    pub fn new<I, S>(live: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            live: Mutex::new(live.into_iter().map(Into::into).collect()),
            failing: AtomicBool::new(false),
        })
    }

    /// Replaces the live set
    pub fn set_live<I, S>(&self, live: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.live.lock().unwrap() = live.into_iter().map(Into::into).collect();
    }

    /// Makes every subsequent `live_files` call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl FileManifest for StaticManifest {
    fn live_files(&self) -> shale_cloud::Result<HashSet<String>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CloudError::Io("manifest unavailable".to_string()));
        }
        Ok(self.live.lock().unwrap().clone())
    }
}

/// Environment options wired to the in-memory provider.
///
/// Empty bucket stems leave the corresponding bucket unconfigured.
pub fn memory_env_options(src_bucket: &str, dest_bucket: &str) -> CloudEnvOptions {
    let mut options = CloudEnvOptions {
        provider_name: PROVIDER_MEMORY.to_string(),
        ..Default::default()
    };
    if !src_bucket.is_empty() {
        options.src_bucket.set_bucket_name(src_bucket, "");
    }
    if !dest_bucket.is_empty() {
        options.dest_bucket.set_bucket_name(dest_bucket, "");
    }
    options
}

/// Request callback that counts invocations, with a shared counter
pub fn counting_callback() -> (CloudRequestCallback, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = counter.clone();
    let callback: CloudRequestCallback = Arc::new(move |_op, _bytes, _latency, _success| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (callback, counter)
}

/// Uploads `content` under `key` by staging it through a local file,
/// the same route the engine takes
pub fn seed_object(
    provider: &dyn CloudStorageProvider,
    dir: &TestDir,
    bucket: &str,
    key: &str,
    content: &[u8],
) -> Result<()> {
    let staged = dir.create_file(&key.replace('/', "_"), content)?;
    let local = staged
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("non-utf8 temp path"))?;
    provider.put_cloud_object(local, bucket, key)?;
    Ok(())
}

/// Downloads `key` and returns its bytes
pub fn fetch_object(
    provider: &dyn CloudStorageProvider,
    dir: &TestDir,
    bucket: &str,
    key: &str,
) -> Result<Vec<u8>> {
    let name = format!("fetched_{}", key.replace('/', "_"));
    let local = dir.path().join(&name);
    let local_str = local
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("non-utf8 temp path"))?;
    provider.get_cloud_object(bucket, key, local_str)?;
    Ok(std::fs::read(&local)?)
}
