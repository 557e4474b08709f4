//! Per-scheme write serialization.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per scheme. Mutations of a scheme's codes, extensions and
/// members hold the scheme's lock from the first read to the commit.
#[derive(Debug, Default)]
pub struct SchemeLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl SchemeLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock of a scheme.
    pub async fn lock(&self, scheme_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(scheme_id).or_default())
        };
        lock.lock_owned().await
    }
}
