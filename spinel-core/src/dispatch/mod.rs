mod deps;
mod life;
mod pool;
mod queue;
#[cfg(feature = "trace")]
mod trace;
mod wait;

use std::fmt;

use thiserror::Error;

use crate::{
    descriptor::{CreateSchedulerError, SchedulerDescriptor},
    handles::HandleIndex,
    DispatchId, DispatchStage, FlushArg, Handle, StageMask, COMPLETION_PAYLOAD_SIZE,
};

use pool::SlotTable;

pub use pool::DispatchState;
pub use queue::{DefaultSubmitter, Submitter};
pub use wait::WaitStatus;

/// Called once the fence of a dispatch has signaled, with the payload
/// reserved by [`Scheduler::set_completion`].
///
/// By the time it runs the dispatch id is already back in the pool, so the
/// callback may acquire and submit new dispatches.
///
/// The successors of the dispatch are only released after the callback
/// returns, so a callback must not call [`Scheduler::wait_idle`]: it would
/// report them as [`DispatchError::Stuck`].
pub type CompletionFn<A> =
    Box<dyn FnOnce(&mut Scheduler<A>, &[u8]) -> Result<(), DispatchError> + Send>;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("device is lost")]
    Lost,
    #[error("every dispatch is acquired and none of them is in flight")]
    Exhausted,
    #[error("dispatches are waiting on predecessors that were never submitted")]
    Stuck,
    #[error("{0:?} is not a valid dispatch id")]
    InvalidId(DispatchId),
    #[error("{0:?} is not acquired")]
    NotAcquired(DispatchId),
    #[error("{id:?} is {state:?}, expected it to be recording")]
    NotRecording { id: DispatchId, state: DispatchState },
    #[error("handle {0} is outside of the handle index")]
    InvalidHandle(Handle),
}

/// Number of dispatches in each state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub available: usize,
    pub recording: usize,
    pub waiting: usize,
    pub executing: usize,
    pub complete: usize,
}

impl DispatchStats {
    /// Dispatches that have been submitted but not retired yet.
    pub fn in_flight(&self) -> usize {
        self.waiting + self.executing + self.complete
    }
}

/// Multiplexes dispatches onto a fixed pool of command buffers and fences,
/// and submits each of them once all of its predecessors have completed.
///
/// Every method takes `&mut self`: the scheduler is driven from one thread at
/// a time. Completion callbacks and flush closures get the scheduler back, so
/// they can acquire, record and submit more work. See
/// [`SharedScheduler`](crate::SharedScheduler) to drive it from several
/// threads.
pub struct Scheduler<A: hal::Api> {
    device: A::Device,
    queues: Vec<A::Queue>,
    next_queue: usize,
    slots: SlotTable<A>,
    handles: HandleIndex,
    lost: bool,
    wait_timeout_ns: u64,
    label: String,
    #[cfg(feature = "trace")]
    trace: Option<trace::Trace>,
}

impl<A: hal::Api> Scheduler<A> {
    pub fn new(
        device: A::Device,
        queues: Vec<A::Queue>,
        desc: &SchedulerDescriptor,
    ) -> Result<Self, CreateSchedulerError> {
        desc.validate()?;
        if queues.is_empty() {
            return Err(CreateSchedulerError::NoQueues);
        }
        let slots = SlotTable::new(&device, desc.dispatch_count as usize)?;
        let label = desc.label.as_deref().unwrap_or_default().to_owned();
        log::info!(
            "Scheduler {:?}: {} dispatches, {} handles, {} queues",
            label,
            desc.dispatch_count,
            desc.handle_count,
            queues.len()
        );

        #[cfg(not(feature = "trace"))]
        if desc.trace_path.is_some() {
            log::error!("Feature 'trace' is not enabled");
        }

        Ok(Self {
            #[cfg(feature = "trace")]
            trace: desc
                .trace_path
                .as_deref()
                .and_then(|path| match trace::Trace::new(path) {
                    Ok(mut trace) => {
                        trace.add(trace::Action::Init {
                            label: label.clone(),
                            dispatch_count: desc.dispatch_count,
                            handle_count: desc.handle_count,
                            queue_count: queues.len(),
                        });
                        Some(trace)
                    }
                    Err(e) => {
                        log::error!("Unable to start a trace in '{:?}': {:?}", path, e);
                        None
                    }
                }),
            device,
            queues,
            next_queue: 0,
            slots,
            handles: HandleIndex::new(desc.handle_count as usize),
            lost: false,
            wait_timeout_ns: desc.wait_timeout_ns,
            label,
        })
    }

    pub fn device(&self) -> &A::Device {
        &self.device
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Size of the dispatch pool.
    pub fn dispatch_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` once a backend call has failed. A lost scheduler
    /// rejects every further call with [`DispatchError::Lost`].
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub(crate) fn check_lost(&self) -> Result<(), DispatchError> {
        if self.lost {
            Err(DispatchError::Lost)
        } else {
            Ok(())
        }
    }

    /// Marks the scheduler as lost. There is no way back.
    pub(crate) fn handle_device_error(&mut self, error: hal::DeviceError) -> DispatchError {
        if !self.lost {
            log::error!("Scheduler {:?}: {}, no more work will be submitted", self.label, error);
            self.lost = true;
            #[cfg(feature = "trace")]
            if let Some(ref mut trace) = self.trace {
                trace.add(trace::Action::DeviceLost);
            }
        }
        DispatchError::Lost
    }

    /// Takes a dispatch out of the pool and begins its command buffer.
    ///
    /// If the pool is empty, this waits for dispatches in flight to retire.
    /// Fails with [`DispatchError::Exhausted`] if none are in flight, since
    /// waiting could never return one.
    ///
    /// A completion callback failing during that wait is logged, and only
    /// returned if no dispatch was released.
    pub fn acquire(&mut self, stage: DispatchStage) -> Result<DispatchId, DispatchError> {
        use hal::{CommandBuffer as _, Device as _};

        self.check_lost()?;
        let id = loop {
            if let Some(id) = self.slots.available.pop() {
                break id;
            }
            if self.slots.executing.is_empty() && self.slots.complete.is_empty() {
                log::warn!(
                    "Scheduler {:?}: all {} dispatches are acquired and none is in flight",
                    self.label,
                    self.slots.len()
                );
                return Err(DispatchError::Exhausted);
            }
            match self.wait() {
                Ok(WaitStatus::Ready) => {}
                Ok(WaitStatus::Timeout) => log::warn!(
                    "Scheduler {:?}: dispatch pool is exhausted, still waiting for {} executing dispatches",
                    self.label,
                    self.slots.executing.len()
                ),
                Err(DispatchError::Lost) => return Err(DispatchError::Lost),
                Err(error) if self.slots.available.is_empty() => return Err(error),
                Err(error) => log::error!(
                    "Scheduler {:?}: completion failed while acquiring: {}",
                    self.label,
                    error
                ),
            }
        };

        let slot = &mut self.slots[id];
        slot.reset(stage);
        let result = self
            .device
            .reset_fence(&mut slot.fence)
            .and_then(|()| slot.cmd_buf.begin());
        if let Err(error) = result {
            slot.state = DispatchState::Available;
            self.slots.available.push(id);
            return Err(self.handle_device_error(error));
        }

        log::trace!("Acquired {:?} for {:?}", id, stage);
        #[cfg(feature = "trace")]
        if let Some(ref mut trace) = self.trace {
            trace.add(trace::Action::Acquire { id, stage });
        }
        Ok(id)
    }

    /// Command buffer of a recording dispatch, open for recording.
    pub fn command_buffer(&mut self, id: DispatchId) -> Result<&mut A::CommandBuffer, DispatchError> {
        self.check_lost()?;
        Ok(&mut self.slots.recording_mut(id)?.cmd_buf)
    }

    /// Overrides how the dispatch is handed to its queue.
    pub fn set_submitter(
        &mut self,
        id: DispatchId,
        submitter: impl Submitter<A> + 'static,
    ) -> Result<(), DispatchError> {
        self.check_lost()?;
        self.slots.recording_mut(id)?.submitter = Box::new(submitter);
        Ok(())
    }

    /// Registers `callback` to run once the dispatch has completed, and
    /// reserves `payload_size` zeroed bytes for its argument.
    ///
    /// Returns the payload, to be filled in by the caller.
    ///
    /// # Panics
    ///
    /// If `payload_size` is larger than [`COMPLETION_PAYLOAD_SIZE`].
    pub fn set_completion<F>(
        &mut self,
        id: DispatchId,
        callback: F,
        payload_size: usize,
    ) -> Result<&mut [u8], DispatchError>
    where
        F: FnOnce(&mut Self, &[u8]) -> Result<(), DispatchError> + Send + 'static,
    {
        assert!(
            payload_size <= COMPLETION_PAYLOAD_SIZE,
            "completion payload of {} bytes doesn't fit in {} bytes",
            payload_size,
            COMPLETION_PAYLOAD_SIZE
        );
        self.check_lost()?;
        let slot = self.slots.recording_mut(id)?;
        slot.completion = Some(Box::new(callback));
        slot.payload.clear();
        slot.payload
            .extend(std::iter::repeat(0).take(payload_size));
        Ok(slot.payload.as_mut_slice())
    }

    /// Registers the argument passed to the flush closure of
    /// [`happens_after_handles`](Self::happens_after_handles) when a later
    /// dispatch depends on handles this one produces.
    pub fn set_flush_arg(&mut self, id: DispatchId, arg: FlushArg) -> Result<(), DispatchError> {
        self.check_lost()?;
        let slot = self.slots.get_mut(id)?;
        if slot.state == DispatchState::Available {
            return Err(DispatchError::NotAcquired(id));
        }
        slot.flush_arg = Some(arg);
        Ok(())
    }

    /// Ends the command buffer of the dispatch and launches it, or parks it
    /// until its predecessors have completed.
    pub fn submit(&mut self, id: DispatchId) -> Result<(), DispatchError> {
        use hal::CommandBuffer as _;

        self.check_lost()?;
        let slot = self.slots.recording_mut(id)?;
        if let Err(error) = slot.cmd_buf.end() {
            return Err(self.handle_device_error(error));
        }
        let wait_count = slot.wait_count;
        if wait_count != 0 {
            slot.state = DispatchState::Waiting;
        }

        #[cfg(feature = "trace")]
        if let Some(ref mut trace) = self.trace {
            trace.add(trace::Action::Submit { id, wait_count });
        }
        if wait_count == 0 {
            self.launch(id)
        } else {
            log::trace!("{:?} waits on {} predecessors", id, wait_count);
            Ok(())
        }
    }

    /// Hands a dispatch with no pending predecessors to the next queue.
    pub(crate) fn launch(&mut self, id: DispatchId) -> Result<(), DispatchError> {
        self.check_lost()?;
        let queue_index = self.next_queue;
        self.next_queue = (queue_index + 1) % self.queues.len();
        self.slots.executing.push(id);

        let slot = &mut self.slots[id];
        debug_assert_eq!(slot.wait_count, 0);
        slot.state = DispatchState::Executing;
        log::trace!("Launching {:?} on queue {}", id, queue_index);
        let queue = &mut self.queues[queue_index];
        if let Err(error) = slot.submitter.submit(queue, &slot.cmd_buf, &slot.fence) {
            return Err(self.handle_device_error(error));
        }

        #[cfg(feature = "trace")]
        if let Some(ref mut trace) = self.trace {
            trace.add(trace::Action::Launch {
                id,
                queue: queue_index,
            });
        }
        Ok(())
    }

    pub fn state(&self, id: DispatchId) -> Result<DispatchState, DispatchError> {
        Ok(self.slots.get(id)?.state)
    }

    /// Stage the dispatch was acquired for.
    pub fn stage(&self, id: DispatchId) -> Result<DispatchStage, DispatchError> {
        Ok(self.slots.get(id)?.stage)
    }

    /// Number of predecessors the dispatch is still waiting on.
    pub fn wait_count(&self, id: DispatchId) -> Result<u32, DispatchError> {
        Ok(self.slots.get(id)?.wait_count)
    }

    pub fn stats(&self) -> DispatchStats {
        let mut stats = DispatchStats::default();
        for (_, slot) in self.slots.iter() {
            match slot.state {
                DispatchState::Available => stats.available += 1,
                DispatchState::Recording => stats.recording += 1,
                DispatchState::Waiting => stats.waiting += 1,
                DispatchState::Executing => stats.executing += 1,
                DispatchState::Complete => stats.complete += 1,
            }
        }
        stats
    }

    /// Acquired dispatches whose stage is in `mask`, in id order.
    pub fn pending(&self, mask: StageMask) -> impl Iterator<Item = DispatchId> + '_ {
        self.slots.iter().filter_map(move |(id, slot)| {
            if slot.state != DispatchState::Available && mask.contains(slot.stage.mask()) {
                Some(id)
            } else {
                None
            }
        })
    }
}

impl<A: hal::Api> fmt::Debug for Scheduler<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("label", &self.label)
            .field("stats", &self.stats())
            .field("queues", &self.queues.len())
            .field("lost", &self.lost)
            .finish()
    }
}

impl<A: hal::Api> Drop for Scheduler<A> {
    fn drop(&mut self) {
        use hal::Device as _;

        for (id, slot) in self.slots.iter() {
            match slot.state {
                DispatchState::Recording => {
                    log::warn!("{:?} was acquired for {:?} but never submitted", id, slot.stage)
                }
                DispatchState::Waiting => log::warn!(
                    "{:?} is dropped while waiting on {} predecessors",
                    id,
                    slot.wait_count
                ),
                _ => {}
            }
        }

        if !self.lost && !self.slots.executing.is_empty() {
            let fences = self
                .slots
                .executing
                .iter()
                .map(|&id| &self.slots[id].fence)
                .collect::<smallvec::SmallVec<[_; 32]>>();
            match self
                .device
                .wait_for_fences(&fences, hal::WaitFor::All, self.wait_timeout_ns)
            {
                Ok(true) => {}
                Ok(false) => log::warn!(
                    "Scheduler {:?}: timed out waiting for {} executing dispatches",
                    self.label,
                    fences.len()
                ),
                Err(error) => log::error!("Scheduler {:?}: {}", self.label, error),
            }
        }

        log::info!("Destroying scheduler {:?}", self.label);
        self.slots.destroy(&self.device);
    }
}
