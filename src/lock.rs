use std::any::Any;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Acquire the store lock unless `cancel` fires first.
///
/// The guard is owned so it can be handed to blocking work with
/// [`LockHold`]. A token that is already cancelled wins over an uncontended
/// lock, so a cancelled caller never runs its operation.
///
/// # Errors
/// Returns [`Error::Cancelled`] if cancellation happens before the lock is
/// acquired.
pub(crate) async fn acquire<T>(
    lock: &Arc<Mutex<T>>,
    cancel: &CancellationToken,
) -> Result<OwnedMutexGuard<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        guard = Arc::clone(lock).lock_owned() => Ok(guard),
    }
}

/// A held store lock, shared between an operation and its blocking work.
///
/// The lock is released when the last clone is dropped. Blocking closures
/// keep a clone, so dropping the operation's future mid-call does not free
/// the lock while the work is still running on the blocking pool.
#[derive(Clone)]
pub(crate) struct LockHold(Arc<dyn Any + Send + Sync>);

impl LockHold {
    pub(crate) fn new<T: Send + Sync + 'static>(guard: OwnedMutexGuard<T>) -> Self {
        Self(Arc::new(guard))
    }
}

/// Run blocking work on the blocking pool while keeping `hold` alive.
///
/// Panics in `f` are re-raised on the calling task.
pub(crate) async fn blocking<T, F>(hold: &LockHold, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let hold = hold.clone();
    let task = tokio::task::spawn_blocking(move || {
        let _hold = hold;
        f()
    });
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e))),
    }
}

/// Fail with [`Error::Cancelled`] once `cancel` has fired.
///
/// Used between steps of a long operation that already holds the lock.
pub(crate) fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
