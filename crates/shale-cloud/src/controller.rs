//! Handle surface for the replication log controller

use crate::env::CloudEnv;
use crate::error::Result;

/// The write-ahead-log replication controller collaborating with a
/// [`CloudEnv`].
///
/// The replication mechanism itself lives outside this crate; the
/// environment only owns a shared handle for the controller's lifetime and
/// releases it after the purger has stopped.
pub trait CloudLogController: Send + Sync {
    /// Name of the controller implementation
    fn name(&self) -> &str;

    /// Binds the controller to its owning environment after construction
    fn prepare(&self, env: &CloudEnv) -> Result<()> {
        let _ = env;
        Ok(())
    }
}
