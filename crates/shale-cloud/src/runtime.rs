//! Tokio runtime management for synchronous operations

use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::runtime::Runtime;

/// Get or create the shared Tokio runtime backing all blocking provider calls
pub(crate) fn get_runtime() -> Arc<Runtime> {
    static RUNTIME: OnceLock<Arc<Runtime>> = OnceLock::new();

    RUNTIME
        .get_or_init(|| {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .thread_name("shale-cloud-worker")
                .build()
                .expect("Failed to create Tokio runtime");

            Arc::new(runtime)
        })
        .clone()
}

/// Drive a future to completion on the shared runtime
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    get_runtime().block_on(future)
}
