//! Per-session request serialization

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::SessionId;

/// Registry of one async mutex per active session id
///
/// A request holds its session's [`SessionLease`] from load until the
/// session has been written back, so two requests carrying the same cookie
/// cannot interleave their read-modify-write. Entries are dropped as soon
/// as nobody holds or waits for them.
///
/// The registry also remembers identifiers that were rotated away for a
/// short while. A request that queued behind the rotation still carries
/// the old cookie; it must not answer with a cookie deletion that could
/// land after, and wipe out, the new one.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
    retired: Mutex<HashMap<SessionId, Instant>>,
}

/// How long a rotated-away identifier is remembered
const RETIRED_GRACE: Duration = Duration::from_secs(60);

impl SessionLocks {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a session
    pub async fn acquire(self: &Arc<Self>, id: &SessionId) -> SessionLease {
        let lock = self.locks.lock().entry(id.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        SessionLease {
            id: id.clone(),
            registry: Arc::clone(self),
            guard: Some(guard),
        }
    }

    /// Record that `id` was replaced by a fresh identifier
    pub fn retire(&self, id: &SessionId) {
        let now = Instant::now();
        let mut retired = self.retired.lock();
        retired.retain(|_, at| now.duration_since(*at) < RETIRED_GRACE);
        retired.insert(id.clone(), now);
    }

    /// Whether `id` was rotated away within the grace period
    #[must_use]
    pub fn recently_retired(&self, id: &SessionId) -> bool {
        self.retired
            .lock()
            .get(id)
            .is_some_and(|at| at.elapsed() < RETIRED_GRACE)
    }

    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Exclusive access to one session, released on drop
#[derive(Debug)]
pub struct SessionLease {
    id: SessionId,
    registry: Arc<SessionLocks>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut locks = self.registry.locks.lock();
        if let Some(guard) = self.guard.take() {
            // registry entry + this guard: nobody else is waiting
            if Arc::strong_count(OwnedMutexGuard::mutex(&guard)) == 2 {
                locks.remove(&self.id);
            }
            drop(guard);
        }
    }
}
