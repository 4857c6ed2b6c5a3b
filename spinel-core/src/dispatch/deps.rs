use smallvec::{smallvec, SmallVec};

use crate::{
    dispatch::{DispatchError, DispatchState, Scheduler},
    handles::{Binding, HandleSpan},
    DispatchId, FlushArg, Handle, MAX_DISPATCHES,
};

const BLOCK_BITS: usize = 32;

/// Set of dispatch ids, stored as 32-id blocks plus a coarse index word with
/// one bit per non-empty block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SignalSet {
    index: u32,
    blocks: SmallVec<[u32; 4]>,
}

impl SignalSet {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity <= MAX_DISPATCHES);
        Self {
            index: 0,
            blocks: smallvec![0; (capacity + BLOCK_BITS - 1) / BLOCK_BITS],
        }
    }

    /// Adds `id` to the set. Returns `false` if it was already present.
    pub fn insert(&mut self, id: DispatchId) -> bool {
        let (block, mask) = Self::locate(id);
        let word = &mut self.blocks[block];
        if *word & mask != 0 {
            return false;
        }
        *word |= mask;
        self.index |= 1 << block;
        true
    }

    pub fn contains(&self, id: DispatchId) -> bool {
        let (block, mask) = Self::locate(id);
        self.blocks[block] & mask != 0
    }

    pub fn is_empty(&self) -> bool {
        self.index == 0
    }

    pub fn len(&self) -> usize {
        self.iter_blocks()
            .map(|block| self.blocks[block].count_ones() as usize)
            .sum()
    }

    pub fn clear(&mut self) {
        let mut index = self.index;
        while index != 0 {
            let block = index.trailing_zeros() as usize;
            index &= index - 1;
            self.blocks[block] = 0;
        }
        self.index = 0;
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            set: self,
            index: self.index,
            block: 0,
            bits: 0,
        }
    }

    fn iter_blocks(&self) -> impl Iterator<Item = usize> {
        let mut index = self.index;
        std::iter::from_fn(move || {
            if index == 0 {
                return None;
            }
            let block = index.trailing_zeros() as usize;
            index &= index - 1;
            Some(block)
        })
    }

    fn locate(id: DispatchId) -> (usize, u32) {
        let index = id.index();
        (index / BLOCK_BITS, 1 << (index % BLOCK_BITS))
    }
}

pub(crate) struct Iter<'a> {
    set: &'a SignalSet,
    index: u32,
    block: usize,
    bits: u32,
}

impl Iterator for Iter<'_> {
    type Item = DispatchId;

    fn next(&mut self) -> Option<DispatchId> {
        loop {
            if self.bits != 0 {
                let bit = self.bits.trailing_zeros() as usize;
                self.bits &= self.bits - 1;
                return Some(DispatchId::new(self.block * BLOCK_BITS + bit));
            }
            if self.index == 0 {
                return None;
            }
            self.block = self.index.trailing_zeros() as usize;
            self.index &= self.index - 1;
            self.bits = self.set.blocks[self.block];
        }
    }
}

impl<A: hal::Api> Scheduler<A> {
    /// Declares that `after` must not start executing before `before` has
    /// completed.
    ///
    /// `after` must be recording. Declaring the same edge again has no
    /// effect. If `before` has already retired there is nothing to wait for.
    pub fn happens_after(
        &mut self,
        after: DispatchId,
        before: DispatchId,
    ) -> Result<(), DispatchError> {
        self.check_lost()?;
        self.slots.recording_mut(after)?;
        if after == before {
            log::warn!("{:?} can't happen after itself, ignoring", after);
            return Ok(());
        }

        let before_slot = self.slots.get_mut(before)?;
        if before_slot.state == DispatchState::Available {
            return Ok(());
        }
        if before_slot.signals.insert(after) {
            self.slots[after].wait_count += 1;
            log::trace!(
                "{:?} happens after {:?}, waiting on {}",
                after,
                before,
                self.slots[after].wait_count
            );
            #[cfg(feature = "trace")]
            if let Some(ref mut trace) = self.trace {
                trace.add(super::trace::Action::HappensAfter { after, before });
            }
        }
        Ok(())
    }

    /// Makes `after` happen after every dispatch producing one of the handles
    /// inside `span` of the `handles` ring.
    ///
    /// Each distinct producer gets one edge. Then `flush` is called once for
    /// every producer that registered a flush argument, so that whatever its
    /// owner still buffers on the host gets submitted before `after` can
    /// rely on it.
    pub fn happens_after_handles<F>(
        &mut self,
        mut flush: F,
        after: DispatchId,
        handles: &[Handle],
        span: HandleSpan,
    ) -> Result<(), DispatchError>
    where
        F: FnMut(&mut Self, FlushArg) -> Result<(), DispatchError>,
    {
        self.check_lost()?;
        self.slots.recording_mut(after)?;

        let mut producers = SignalSet::new(self.slots.len());
        for handle in span.iter(handles) {
            if let Some(id) = self.producer(handle)? {
                if id != after {
                    producers.insert(id);
                }
            }
        }
        if producers.is_empty() {
            return Ok(());
        }

        for before in producers.iter() {
            self.happens_after(after, before)?;
        }

        // Flushing may submit and even retire producers, so collect the
        // arguments before calling out.
        let flush_args = producers
            .iter()
            .filter_map(|id| self.slots[id].flush_arg)
            .collect::<SmallVec<[FlushArg; 8]>>();
        log::trace!(
            "{:?} depends on {} producers, flushing {}",
            after,
            producers.len(),
            flush_args.len()
        );
        for arg in flush_args {
            flush(self, arg)?;
        }
        Ok(())
    }

    /// Records `id` as the dispatch producing `handle`.
    pub fn register_handle(&mut self, id: DispatchId, handle: Handle) -> Result<(), DispatchError> {
        self.check_lost()?;
        let slot = self.slots.get(id)?;
        if slot.state == DispatchState::Available {
            return Err(DispatchError::NotAcquired(id));
        }
        let binding = Binding {
            id,
            epoch: slot.epoch,
        };
        if let Some(previous) = self.handles.bind(handle, binding)? {
            log::trace!(
                "Handle {} moves from {:?} to {:?}",
                handle,
                previous.id,
                id
            );
        }
        #[cfg(feature = "trace")]
        if let Some(ref mut trace) = self.trace {
            trace.add(super::trace::Action::RegisterHandle { id, handle });
        }
        Ok(())
    }

    /// Forgets the producers of the handles inside `span` of the `handles`
    /// ring.
    pub fn handles_complete(
        &mut self,
        handles: &[Handle],
        span: HandleSpan,
    ) -> Result<(), DispatchError> {
        self.check_lost()?;
        for handle in span.iter(handles) {
            self.handles.unbind(handle)?;
        }
        #[cfg(feature = "trace")]
        if let Some(ref mut trace) = self.trace {
            trace.add(super::trace::Action::HandlesComplete(
                span.iter(handles).collect(),
            ));
        }
        Ok(())
    }

    /// Returns the live dispatch producing `handle`, if any.
    ///
    /// A binding whose slot has been recycled since it was registered is
    /// stale and ignored.
    pub fn producer(&self, handle: Handle) -> Result<Option<DispatchId>, DispatchError> {
        Ok(self.handles.get(handle)?.and_then(|binding| {
            let slot = &self.slots[binding.id];
            if slot.epoch == binding.epoch && slot.state != DispatchState::Available {
                Some(binding.id)
            } else {
                None
            }
        }))
    }
}
