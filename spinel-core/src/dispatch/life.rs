use crate::dispatch::{deps::SignalSet, DispatchError, DispatchState, Scheduler};

impl<A: hal::Api> Scheduler<A> {
    /// Retires every dispatch in the complete list, oldest first.
    ///
    /// Each id goes back to the pool before its completion callback runs, and
    /// its payload and successors are copied out first, so the callback may
    /// acquire the very same slot. Successors left with no pending
    /// predecessors are launched.
    ///
    /// If a callback fails, its successors are still notified and the error
    /// is returned. The remaining dispatches stay complete until the next
    /// wait.
    pub(crate) fn process_complete(&mut self) -> Result<(), DispatchError> {
        profiling::scope!("process_complete");

        while let Some(id) = self.slots.complete.pop_front() {
            let slot = &mut self.slots[id];
            debug_assert_eq!(slot.state, DispatchState::Complete);
            let completion = slot.completion.take();
            let payload = slot.payload.clone();
            let signals = if slot.signals.is_empty() {
                None
            } else {
                Some(slot.signals.clone())
            };
            slot.flush_arg = None;
            slot.state = DispatchState::Available;
            self.slots.available.push(id);
            log::trace!("{:?} is retired", id);
            #[cfg(feature = "trace")]
            if let Some(ref mut trace) = self.trace {
                trace.add(super::trace::Action::Retire(id));
            }

            let result = match completion {
                Some(callback) => callback(self, payload.as_slice()),
                None => Ok(()),
            };
            if let Some(ref signals) = signals {
                self.propagate(signals)?;
            }
            result?;
        }
        Ok(())
    }

    /// Notifies the successors of a retired dispatch, launching the ones
    /// that were only waiting on it.
    fn propagate(&mut self, signals: &SignalSet) -> Result<(), DispatchError> {
        for id in signals.iter() {
            let slot = &mut self.slots[id];
            debug_assert!(slot.wait_count != 0, "{:?} isn't waiting on anything", id);
            slot.wait_count -= 1;
            if slot.wait_count != 0 {
                log::trace!("{:?} still waits on {} predecessors", id, slot.wait_count);
                continue;
            }
            match slot.state {
                DispatchState::Waiting => self.launch(id)?,
                // Launched by `submit` once recording is done.
                DispatchState::Recording => {}
                state => {
                    log::error!("{:?} is signaled while {:?}", id, state);
                }
            }
        }
        Ok(())
    }
}
