use std::{fmt, sync::Arc};

use parking_lot::{Mutex, MutexGuard};

use crate::{DispatchError, DispatchId, DispatchStage, DispatchStats, Scheduler, WaitStatus};

/// A [`Scheduler`] behind a single lock, for hosts that drive it from
/// several threads.
///
/// Clones refer to the same scheduler. Callbacks run with the lock held and
/// receive the scheduler directly, so they must not go through the wrapper.
pub struct SharedScheduler<A: hal::Api> {
    inner: Arc<Mutex<Scheduler<A>>>,
}

impl<A: hal::Api> Clone for SharedScheduler<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: hal::Api> fmt::Debug for SharedScheduler<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.try_lock() {
            Some(scheduler) => fmt::Debug::fmt(&*scheduler, f),
            None => f.write_str("SharedScheduler { <locked> }"),
        }
    }
}

impl<A: hal::Api> From<Scheduler<A>> for SharedScheduler<A> {
    fn from(scheduler: Scheduler<A>) -> Self {
        Self::new(scheduler)
    }
}

impl<A: hal::Api> SharedScheduler<A> {
    pub fn new(scheduler: Scheduler<A>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(scheduler)),
        }
    }

    /// Locks the scheduler for a sequence of calls, such as acquiring a
    /// dispatch, recording into it and submitting it.
    pub fn lock(&self) -> MutexGuard<'_, Scheduler<A>> {
        self.inner.lock()
    }

    pub fn acquire(&self, stage: DispatchStage) -> Result<DispatchId, DispatchError> {
        self.inner.lock().acquire(stage)
    }

    pub fn submit(&self, id: DispatchId) -> Result<(), DispatchError> {
        self.inner.lock().submit(id)
    }

    pub fn wait(&self) -> Result<WaitStatus, DispatchError> {
        self.inner.lock().wait()
    }

    pub fn wait_idle(&self) -> Result<WaitStatus, DispatchError> {
        self.inner.lock().wait_idle()
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.lock().stats()
    }

    /// Returns the scheduler if this is the last reference to it.
    pub fn try_unwrap(self) -> Result<Scheduler<A>, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
