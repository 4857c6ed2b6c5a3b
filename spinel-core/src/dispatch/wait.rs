use smallvec::SmallVec;

use crate::dispatch::{DispatchError, Scheduler};

/// Outcome of a wait that didn't fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitStatus {
    /// The wait condition was met, and whatever completed has been retired.
    Ready,
    /// The timeout elapsed first. Nothing changed.
    Timeout,
}

impl<A: hal::Api> Scheduler<A> {
    /// Waits on the fences of every executing dispatch together with
    /// `imports`, then retires the dispatches whose fence has signaled.
    ///
    /// With nothing to wait on, this only retires dispatches that were
    /// already complete. Any backend failure loses the scheduler.
    pub fn wait_for_fences(
        &mut self,
        imports: &[&A::Fence],
        wait_for: hal::WaitFor,
        timeout_ns: u64,
    ) -> Result<WaitStatus, DispatchError> {
        use hal::Device as _;

        profiling::scope!("wait_for_fences");
        self.check_lost()?;

        let result = {
            let fences = self
                .slots
                .executing
                .iter()
                .map(|&id| &self.slots[id].fence)
                .chain(imports.iter().copied())
                .collect::<SmallVec<[&A::Fence; 32]>>();
            if fences.is_empty() {
                None
            } else {
                log::debug!(
                    "Waiting for {:?} of {} fences ({} imported)",
                    wait_for,
                    fences.len(),
                    imports.len()
                );
                Some((
                    fences.len(),
                    self.device.wait_for_fences(&fences, wait_for, timeout_ns),
                ))
            }
        };

        if let Some((_count, result)) = result {
            let ready = match result {
                Ok(ready) => ready,
                Err(error) => return Err(self.handle_device_error(error)),
            };
            #[cfg(feature = "trace")]
            if let Some(ref mut trace) = self.trace {
                trace.add(super::trace::Action::Wait {
                    fences: _count,
                    all: wait_for == hal::WaitFor::All,
                    ready,
                });
            }
            if !ready {
                log::debug!("Wait timed out after {} ns", timeout_ns);
                return Ok(WaitStatus::Timeout);
            }

            let device = &self.device;
            match self.slots.classify(|fence| device.get_fence_status(fence)) {
                Ok(count) => log::trace!("{} dispatches completed", count),
                Err(error) => return Err(self.handle_device_error(error)),
            }
        }

        self.process_complete()?;
        #[cfg(debug_assertions)]
        self.slots.check_partition();
        Ok(WaitStatus::Ready)
    }

    /// Waits until at least one executing dispatch completes, or the default
    /// timeout elapses.
    pub fn wait(&mut self) -> Result<WaitStatus, DispatchError> {
        self.wait_for_fences(&[], hal::WaitFor::Any, self.wait_timeout_ns)
    }

    /// Waits until every executing dispatch completes, or the default timeout
    /// elapses.
    ///
    /// Dispatches launched by the completions themselves are not waited on.
    pub fn wait_all(&mut self) -> Result<WaitStatus, DispatchError> {
        self.wait_for_fences(&[], hal::WaitFor::All, self.wait_timeout_ns)
    }

    /// Keeps waiting until every submitted dispatch has been retired.
    ///
    /// Fails with [`DispatchError::Stuck`] if some dispatches wait on
    /// predecessors that are still recording, since those would never
    /// complete.
    pub fn wait_idle(&mut self) -> Result<WaitStatus, DispatchError> {
        profiling::scope!("wait_idle");
        self.check_lost()?;
        loop {
            let stats = self.stats();
            if stats.in_flight() == 0 {
                return Ok(WaitStatus::Ready);
            }
            if stats.executing == 0 && stats.complete == 0 {
                log::warn!(
                    "Scheduler {:?}: {} dispatches wait on work that was never submitted",
                    self.label,
                    stats.waiting
                );
                return Err(DispatchError::Stuck);
            }
            if self.wait()? == WaitStatus::Timeout {
                return Ok(WaitStatus::Timeout);
            }
        }
    }
}
