//! Background reclamation of unreferenced destination-bucket objects

use crate::provider::CloudStorageProvider;
use crate::error::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The engine's view of which destination-bucket objects are still
/// referenced by live database state.
///
/// Keys are full object keys as stored (the destination object path plus
/// the flattened file name). The manifest is an external collaborator; the
/// purger only consults it.
pub trait FileManifest: Send + Sync {
    /// Object keys that must not be reclaimed
    fn live_files(&self) -> Result<HashSet<String>>;
}

/// One purge loop, owned by its thread. Holds clones of exactly the shared
/// state it touches, so the provider stays valid until the loop has
/// observably stopped.
pub(crate) struct Purger {
    provider: Arc<dyn CloudStorageProvider>,
    bucket: String,
    object_path: String,
    manifest: Option<Arc<dyn FileManifest>>,
    period: Duration,
    stop_rx: Receiver<()>,
    stopped: Arc<AtomicBool>,
}

impl Purger {
    /// Spawns the purge thread and returns its handle
    pub(crate) fn start(
        provider: Arc<dyn CloudStorageProvider>,
        bucket: String,
        object_path: String,
        manifest: Option<Arc<dyn FileManifest>>,
        period: Duration,
    ) -> PurgerHandle {
        let (stop_tx, stop_rx) = bounded(1);
        let stopped = Arc::new(AtomicBool::new(false));

        let purger = Purger {
            provider,
            bucket,
            object_path,
            manifest,
            period,
            stop_rx,
            stopped: stopped.clone(),
        };
        let thread = std::thread::Builder::new()
            .name("shale-cloud-purger".to_string())
            .spawn(move || purger.run())
            .expect("failed to spawn purger thread");

        PurgerHandle {
            stop_tx,
            thread: Some(thread),
            stopped,
        }
    }

    fn run(self) {
        debug!(bucket = %self.bucket, period_ms = self.period.as_millis() as u64, "purger started");
        loop {
            // Cancellation is checked before every pass and during the wait
            match self.stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            self.run_pass();

            match self.stop_rx.recv_timeout(self.period) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        self.stopped.store(true, Ordering::SeqCst);
        debug!(bucket = %self.bucket, "purger stopped");
    }

    /// One reclamation pass. Failures are logged and never abort the task.
    fn run_pass(&self) {
        let keys = match self
            .provider
            .list_cloud_objects(&self.bucket, &self.object_path)
        {
            Ok(keys) => keys,
            Err(error) => {
                warn!(bucket = %self.bucket, %error, "purge pass could not list objects");
                return;
            }
        };

        let manifest = match &self.manifest {
            Some(manifest) => manifest,
            None => {
                // Without a manifest nothing is provably dead
                debug!(candidates = keys.len(), "no file manifest configured, skipping reclamation");
                return;
            }
        };
        let live = match manifest.live_files() {
            Ok(live) => live,
            Err(error) => {
                warn!(bucket = %self.bucket, %error, "purge pass could not read file manifest");
                return;
            }
        };

        let mut deleted = 0usize;
        let mut failed = 0usize;
        for key in keys {
            if live.contains(&key) {
                continue;
            }
            match self.provider.delete_cloud_object(&self.bucket, &key) {
                Ok(()) => deleted += 1,
                Err(error) => {
                    failed += 1;
                    warn!(bucket = %self.bucket, key, %error, "failed to delete unreferenced object");
                }
            }
        }
        if deleted > 0 || failed > 0 {
            info!(bucket = %self.bucket, deleted, failed, "purge pass complete");
        }
    }
}

/// Owner-side handle to the purge thread.
///
/// `stop` signals the loop and joins the thread; it runs on every exit
/// path, so the environment can release shared handles only after the
/// thread is gone.
#[derive(Debug)]
pub(crate) struct PurgerHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
}

impl PurgerHandle {
    /// Signals the purger and joins it; idempotent
    pub(crate) fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("purger thread panicked before stopping");
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Flag the purge loop sets immediately before exiting
    pub(crate) fn stop_witness(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }
}

impl Drop for PurgerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
