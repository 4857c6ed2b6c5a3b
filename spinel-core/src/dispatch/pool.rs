use std::{
    collections::VecDeque,
    ops::{Index, IndexMut},
};

use arrayvec::ArrayVec;

use crate::{
    dispatch::{deps::SignalSet, queue::DefaultSubmitter, CompletionFn, DispatchError, Submitter},
    DispatchId, DispatchStage, Epoch, FlushArg, COMPLETION_PAYLOAD_SIZE,
};

pub(crate) type Payload = ArrayVec<u8, COMPLETION_PAYLOAD_SIZE>;

/// Where a dispatch is in its lifecycle.
///
/// `Available → Recording → (Waiting | Executing) → Complete → Available`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchState {
    /// In the pool, free to be acquired.
    Available,
    /// Acquired; the command buffer is open for recording.
    Recording,
    /// Submitted, but some predecessors have not completed yet.
    Waiting,
    /// Handed to a queue; its fence has not been seen signaled yet.
    Executing,
    /// Fence signaled; completion processing has not run yet.
    Complete,
}

pub(crate) struct Slot<A: hal::Api> {
    pub cmd_buf: A::CommandBuffer,
    pub fence: A::Fence,
    pub state: DispatchState,
    pub stage: DispatchStage,
    pub epoch: Epoch,
    /// Number of predecessors that have not completed yet.
    pub wait_count: u32,
    /// Successors to notify on completion.
    pub signals: SignalSet,
    pub completion: Option<CompletionFn<A>>,
    pub payload: Payload,
    pub flush_arg: Option<FlushArg>,
    pub submitter: Box<dyn Submitter<A>>,
}

impl<A: hal::Api> Slot<A> {
    fn new(cmd_buf: A::CommandBuffer, fence: A::Fence, dispatch_count: usize) -> Self {
        Self {
            cmd_buf,
            fence,
            state: DispatchState::Available,
            stage: DispatchStage::PathBuilder,
            epoch: 0,
            wait_count: 0,
            signals: SignalSet::new(dispatch_count),
            completion: None,
            payload: Payload::new(),
            flush_arg: None,
            submitter: Box::new(DefaultSubmitter),
        }
    }

    /// Clears the bookkeeping of a freshly acquired slot.
    pub fn reset(&mut self, stage: DispatchStage) {
        self.state = DispatchState::Recording;
        self.stage = stage;
        self.epoch = self.epoch.wrapping_add(1);
        self.wait_count = 0;
        self.signals.clear();
        self.completion = None;
        self.payload.clear();
        self.flush_arg = None;
        self.submitter = Box::new(DefaultSubmitter);
    }
}

/// Fixed pool of dispatch slots, with the lists of ids in each
/// scheduling state.
pub(crate) struct SlotTable<A: hal::Api> {
    slots: Vec<Slot<A>>,
    /// Ids free to be acquired. Popped from the back.
    pub available: Vec<DispatchId>,
    /// Ids handed to a queue, in launch order.
    pub executing: Vec<DispatchId>,
    /// Ids whose fence was seen signaled, oldest first.
    pub complete: VecDeque<DispatchId>,
}

impl<A: hal::Api> SlotTable<A> {
    pub fn new(device: &A::Device, dispatch_count: usize) -> Result<Self, hal::DeviceError> {
        let mut slots = Vec::with_capacity(dispatch_count);
        for _ in 0..dispatch_count {
            match Self::create_slot(device, dispatch_count) {
                Ok(slot) => slots.push(slot),
                Err(error) => {
                    for slot in slots.drain(..) {
                        Self::destroy_slot(device, slot);
                    }
                    return Err(error);
                }
            }
        }
        // Reversed so that the lowest ids are handed out first.
        let available = (0..dispatch_count).rev().map(DispatchId::new).collect();

        Ok(Self {
            slots,
            available,
            executing: Vec::with_capacity(dispatch_count),
            complete: VecDeque::with_capacity(dispatch_count),
        })
    }

    fn create_slot(device: &A::Device, dispatch_count: usize) -> Result<Slot<A>, hal::DeviceError> {
        use hal::Device as _;

        let cmd_buf = device.create_command_buffer()?;
        match device.create_fence() {
            Ok(fence) => Ok(Slot::new(cmd_buf, fence, dispatch_count)),
            Err(error) => {
                device.destroy_command_buffer(cmd_buf);
                Err(error)
            }
        }
    }

    fn destroy_slot(device: &A::Device, slot: Slot<A>) {
        use hal::Device as _;

        device.destroy_command_buffer(slot.cmd_buf);
        device.destroy_fence(slot.fence);
    }

    /// Destroys every slot. The table is empty afterwards.
    pub fn destroy(&mut self, device: &A::Device) {
        self.available.clear();
        self.executing.clear();
        self.complete.clear();
        for slot in self.slots.drain(..) {
            Self::destroy_slot(device, slot);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, id: DispatchId) -> Result<&Slot<A>, DispatchError> {
        self.slots
            .get(id.index())
            .ok_or(DispatchError::InvalidId(id))
    }

    pub fn get_mut(&mut self, id: DispatchId) -> Result<&mut Slot<A>, DispatchError> {
        self.slots
            .get_mut(id.index())
            .ok_or(DispatchError::InvalidId(id))
    }

    /// Returns the slot of a dispatch that is still recording.
    pub fn recording_mut(&mut self, id: DispatchId) -> Result<&mut Slot<A>, DispatchError> {
        let slot = self.get_mut(id)?;
        match slot.state {
            DispatchState::Recording => Ok(slot),
            state => Err(DispatchError::NotRecording { id, state }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DispatchId, &Slot<A>)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| (DispatchId::new(index), slot))
    }

    /// Moves the executing dispatches whose fence has signaled to the end of
    /// the complete list. Both lists keep their order.
    ///
    /// Returns the number of dispatches moved.
    pub fn classify(
        &mut self,
        mut is_signaled: impl FnMut(&A::Fence) -> Result<bool, hal::DeviceError>,
    ) -> Result<usize, hal::DeviceError> {
        let mut result = Ok(());
        let moved = self.complete.len();
        let slots = &mut self.slots;
        let complete = &mut self.complete;
        self.executing.retain(|&id| {
            if result.is_err() {
                return true;
            }
            let slot = &mut slots[id.index()];
            match is_signaled(&slot.fence) {
                Ok(true) => {
                    slot.state = DispatchState::Complete;
                    complete.push_back(id);
                    false
                }
                Ok(false) => true,
                Err(error) => {
                    result = Err(error);
                    true
                }
            }
        });
        result.map(|()| self.complete.len() - moved)
    }

    /// Checks that every id is in exactly one scheduling list, matching its
    /// state.
    #[cfg(debug_assertions)]
    pub fn check_partition(&self) {
        let mut seen = vec![false; self.slots.len()];
        let listed = self
            .available
            .iter()
            .map(|&id| (id, DispatchState::Available))
            .chain(self.executing.iter().map(|&id| (id, DispatchState::Executing)))
            .chain(self.complete.iter().map(|&id| (id, DispatchState::Complete)));
        for (id, state) in listed {
            assert!(!seen[id.index()], "{:?} is listed twice", id);
            seen[id.index()] = true;
            assert_eq!(self.slots[id.index()].state, state, "{:?}", id);
        }
        for (index, slot) in self.slots.iter().enumerate() {
            let listed = match slot.state {
                DispatchState::Recording | DispatchState::Waiting => false,
                _ => true,
            };
            assert_eq!(seen[index], listed, "D{} in state {:?}", index, slot.state);
        }
    }
}

impl<A: hal::Api> Index<DispatchId> for SlotTable<A> {
    type Output = Slot<A>;
    fn index(&self, id: DispatchId) -> &Slot<A> {
        &self.slots[id.index()]
    }
}

impl<A: hal::Api> IndexMut<DispatchId> for SlotTable<A> {
    fn index_mut(&mut self, id: DispatchId) -> &mut Slot<A> {
        &mut self.slots[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::{mock, CommandBuffer as _, Device as _, Queue as _};

    #[test]
    fn classify_keeps_submission_order() {
        let device = mock::Device::new(mock::Completion::Manual);
        let mut queue = device.create_queue();
        let mut table = SlotTable::<mock::Api>::new(&device, 3).unwrap();
        assert_eq!(table.available.last(), Some(&DispatchId::new(0)));

        table.available.clear();
        for index in [2, 0, 1] {
            let id = DispatchId::new(index);
            let slot = &mut table[id];
            slot.cmd_buf.begin().unwrap();
            slot.cmd_buf.end().unwrap();
            queue.submit(&slot.cmd_buf, &slot.fence).unwrap();
            slot.state = DispatchState::Executing;
            table.executing.push(id);
        }
        assert!(device.signal_next());
        assert!(device.signal_next());

        let moved = table
            .classify(|fence| device.get_fence_status(fence))
            .unwrap();
        assert_eq!(moved, 2);
        assert_eq!(table.executing, [DispatchId::new(1)]);
        assert_eq!(table.complete, [DispatchId::new(2), DispatchId::new(0)]);
        #[cfg(debug_assertions)]
        table.check_partition();

        table.destroy(&device);
        assert_eq!(device.live_fences(), 0);
        assert_eq!(device.live_command_buffers(), 0);
    }

    #[test]
    fn creation_fails_on_a_lost_device() {
        let device = mock::Device::new(mock::Completion::Manual);
        device.lose();
        assert_eq!(
            SlotTable::<mock::Api>::new(&device, 4).err(),
            Some(hal::DeviceError::Lost)
        );
        assert_eq!(device.live_command_buffers(), 0);
    }
}
