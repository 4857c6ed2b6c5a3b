//! Backend that executes nothing, but keeps a log of every submission and
//! lets the caller decide when submitted work completes.
//!
//! Command buffers, fences and queues are numbered in creation order, starting
//! at zero. Time is a logical tick that advances on every submission and every
//! fence signal, so the log can be used to check ordering.
//!
//! Waiting never sleeps: if the fences are not signaled once the
//! [`Completion`] policy has been applied, the wait reports a timeout.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

type DeviceResult<T> = Result<T, crate::DeviceError>;

/// When submitted work is considered finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Only when the test calls [`Device::signal_next`] or [`Device::signal_all`].
    Manual,
    /// Every pending submission finishes when a wait starts.
    OnWait,
    /// The oldest pending submission finishes when a wait starts.
    OnePerWait,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub queue: u32,
    pub command_buffer: u32,
    pub fence: u32,
    pub tick: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletionRecord {
    pub fence: u32,
    pub tick: u64,
}

#[derive(Debug, Default)]
struct FenceState {
    signaled: bool,
    pending: bool,
    destroyed: bool,
}

#[derive(Debug)]
struct State {
    completion: Completion,
    tick: u64,
    fences: Vec<FenceState>,
    pending: VecDeque<u32>,
    submissions: Vec<SubmissionRecord>,
    completions: Vec<CompletionRecord>,
    command_buffers: u32,
    live_command_buffers: u32,
    queues: u32,
    wait_calls: usize,
    fail_next_wait: bool,
    lost: bool,
}

impl State {
    fn check_lost(&self) -> DeviceResult<()> {
        if self.lost {
            Err(crate::DeviceError::Lost)
        } else {
            Ok(())
        }
    }

    fn signal_oldest(&mut self) -> bool {
        match self.pending.pop_front() {
            Some(fence) => {
                self.tick += 1;
                let state = &mut self.fences[fence as usize];
                state.pending = false;
                state.signaled = true;
                self.completions.push(CompletionRecord {
                    fence,
                    tick: self.tick,
                });
                log::trace!("Mock fence {} signaled at tick {}", fence, self.tick);
                true
            }
            None => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Api;

/// Handle to the shared mock device state. Clones observe the same device.
#[derive(Clone, Debug)]
pub struct Device {
    shared: Arc<Mutex<State>>,
}

#[derive(Debug)]
pub struct Queue {
    index: u32,
    shared: Arc<Mutex<State>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecordingState {
    Initial,
    Recording,
    Executable,
}

#[derive(Debug)]
pub struct CommandBuffer {
    index: u32,
    state: RecordingState,
    commands: Vec<&'static str>,
}

#[derive(Debug)]
pub struct Fence {
    index: u32,
}

impl Device {
    pub fn new(completion: Completion) -> Self {
        Self {
            shared: Arc::new(Mutex::new(State {
                completion,
                tick: 0,
                fences: Vec::new(),
                pending: VecDeque::new(),
                submissions: Vec::new(),
                completions: Vec::new(),
                command_buffers: 0,
                live_command_buffers: 0,
                queues: 0,
                wait_calls: 0,
                fail_next_wait: false,
                lost: false,
            })),
        }
    }

    /// Creates another queue on this device.
    pub fn create_queue(&self) -> Queue {
        let mut state = self.shared.lock();
        let index = state.queues;
        state.queues += 1;
        Queue {
            index,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn set_completion(&self, completion: Completion) {
        self.shared.lock().completion = completion;
    }

    /// Finishes the oldest pending submission. Returns `false` if nothing
    /// was pending.
    pub fn signal_next(&self) -> bool {
        self.shared.lock().signal_oldest()
    }

    /// Finishes every pending submission, oldest first.
    pub fn signal_all(&self) -> usize {
        let mut state = self.shared.lock();
        let mut count = 0;
        while state.signal_oldest() {
            count += 1;
        }
        count
    }

    /// Signals a fence that no queue submission owns, such as one imported
    /// from another device.
    pub fn signal_fence(&self, fence: &Fence) {
        let mut state = self.shared.lock();
        let fence_state = &mut state.fences[fence.index as usize];
        assert!(!fence_state.pending, "fence {} is owned by a submission", fence.index);
        fence_state.signaled = true;
        state.tick += 1;
        let tick = state.tick;
        state.completions.push(CompletionRecord {
            fence: fence.index,
            tick,
        });
    }

    /// Makes the next `wait_for_fences` call fail, which the device then
    /// never recovers from.
    pub fn fail_next_wait(&self) {
        self.shared.lock().fail_next_wait = true;
    }

    /// Loses the device immediately.
    pub fn lose(&self) {
        self.shared.lock().lost = true;
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.shared.lock().submissions.clone()
    }

    pub fn completions(&self) -> Vec<CompletionRecord> {
        self.shared.lock().completions.clone()
    }

    pub fn wait_calls(&self) -> usize {
        self.shared.lock().wait_calls
    }

    /// Number of command buffers created and not yet destroyed.
    pub fn live_command_buffers(&self) -> u32 {
        self.shared.lock().live_command_buffers
    }

    /// Number of fences created and not yet destroyed.
    pub fn live_fences(&self) -> usize {
        self.shared
            .lock()
            .fences
            .iter()
            .filter(|fence| !fence.destroyed)
            .count()
    }
}

impl CommandBuffer {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Appends a named command. The command buffer must be recording.
    pub fn record(&mut self, command: &'static str) {
        assert_eq!(self.state, RecordingState::Recording);
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[&'static str] {
        &self.commands
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }
}

impl Fence {
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl crate::Api for Api {
    type Device = Device;
    type Queue = Queue;
    type CommandBuffer = CommandBuffer;
    type Fence = Fence;
}

impl crate::Device<Api> for Device {
    fn create_command_buffer(&self) -> DeviceResult<CommandBuffer> {
        let mut state = self.shared.lock();
        state.check_lost()?;
        let index = state.command_buffers;
        state.command_buffers += 1;
        state.live_command_buffers += 1;
        Ok(CommandBuffer {
            index,
            state: RecordingState::Initial,
            commands: Vec::new(),
        })
    }
    fn destroy_command_buffer(&self, _cmd_buf: CommandBuffer) {
        self.shared.lock().live_command_buffers -= 1;
    }

    fn create_fence(&self) -> DeviceResult<Fence> {
        let mut state = self.shared.lock();
        state.check_lost()?;
        let index = state.fences.len() as u32;
        state.fences.push(FenceState::default());
        Ok(Fence { index })
    }
    fn destroy_fence(&self, fence: Fence) {
        self.shared.lock().fences[fence.index as usize].destroyed = true;
    }
    fn reset_fence(&self, fence: &mut Fence) -> DeviceResult<()> {
        let mut state = self.shared.lock();
        state.check_lost()?;
        let fence = &mut state.fences[fence.index as usize];
        assert!(!fence.pending, "reset of a fence in use by a submission");
        fence.signaled = false;
        Ok(())
    }
    fn get_fence_status(&self, fence: &Fence) -> DeviceResult<bool> {
        let state = self.shared.lock();
        state.check_lost()?;
        Ok(state.fences[fence.index as usize].signaled)
    }
    fn wait_for_fences(
        &self,
        fences: &[&Fence],
        wait_for: crate::WaitFor,
        _timeout_ns: u64,
    ) -> DeviceResult<bool> {
        let mut state = self.shared.lock();
        state.wait_calls += 1;
        if state.fail_next_wait {
            log::error!("Mock device: injected wait failure");
            state.fail_next_wait = false;
            state.lost = true;
        }
        state.check_lost()?;

        match state.completion {
            Completion::Manual => {}
            Completion::OnWait => while state.signal_oldest() {},
            Completion::OnePerWait => {
                state.signal_oldest();
            }
        }

        let signaled = |fence: &&Fence| state.fences[fence.index as usize].signaled;
        Ok(match wait_for {
            crate::WaitFor::Any => fences.iter().any(signaled),
            crate::WaitFor::All => fences.iter().all(signaled),
        })
    }
}

impl crate::Queue<Api> for Queue {
    fn submit(
        &mut self,
        command_buffer: &CommandBuffer,
        signal_fence: &Fence,
    ) -> DeviceResult<()> {
        assert_eq!(
            command_buffer.state,
            RecordingState::Executable,
            "submission of a command buffer that was not ended"
        );
        let mut state = self.shared.lock();
        state.check_lost()?;
        let fence = &mut state.fences[signal_fence.index as usize];
        assert!(
            !fence.signaled && !fence.pending,
            "submission with a fence that was not reset"
        );
        fence.pending = true;
        state.tick += 1;
        let record = SubmissionRecord {
            queue: self.index,
            command_buffer: command_buffer.index,
            fence: signal_fence.index,
            tick: state.tick,
        };
        log::trace!("Mock submission {:?}", record);
        state.submissions.push(record);
        state.pending.push_back(signal_fence.index);
        Ok(())
    }
}

impl crate::CommandBuffer<Api> for CommandBuffer {
    fn begin(&mut self) -> DeviceResult<()> {
        self.commands.clear();
        self.state = RecordingState::Recording;
        Ok(())
    }
    fn end(&mut self) -> DeviceResult<()> {
        assert_eq!(self.state, RecordingState::Recording);
        self.state = RecordingState::Executable;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandBuffer as _, Device as _, Queue as _, WaitFor};

    fn submit_one(device: &Device, queue: &mut Queue) -> (CommandBuffer, Fence) {
        let _ = env_logger::try_init();
        let mut cmd_buf = device.create_command_buffer().unwrap();
        let fence = device.create_fence().unwrap();
        cmd_buf.begin().unwrap();
        cmd_buf.record("fill");
        cmd_buf.end().unwrap();
        queue.submit(&cmd_buf, &fence).unwrap();
        (cmd_buf, fence)
    }

    #[test]
    fn manual_completion_times_out_until_signaled() {
        let device = Device::new(Completion::Manual);
        let mut queue = device.create_queue();
        let (_cmd_buf, fence) = submit_one(&device, &mut queue);

        assert!(!device
            .wait_for_fences(&[&fence], WaitFor::Any, 0)
            .unwrap());
        assert_eq!(device.pending_count(), 1);

        assert!(device.signal_next());
        assert!(device.get_fence_status(&fence).unwrap());
        assert!(device
            .wait_for_fences(&[&fence], WaitFor::All, 0)
            .unwrap());
    }

    #[test]
    fn one_per_wait_signals_in_submission_order() {
        let device = Device::new(Completion::OnePerWait);
        let mut queue = device.create_queue();
        let (_a, fence_a) = submit_one(&device, &mut queue);
        let (_b, fence_b) = submit_one(&device, &mut queue);

        assert!(device
            .wait_for_fences(&[&fence_a, &fence_b], WaitFor::Any, 0)
            .unwrap());
        assert!(device.get_fence_status(&fence_a).unwrap());
        assert!(!device.get_fence_status(&fence_b).unwrap());

        let completions = device.completions();
        let submissions = device.submissions();
        assert_eq!(completions.len(), 1);
        assert!(completions[0].tick > submissions[1].tick);
    }

    #[test]
    fn injected_failure_is_permanent() {
        let device = Device::new(Completion::OnWait);
        let mut queue = device.create_queue();
        let (_cmd_buf, fence) = submit_one(&device, &mut queue);

        device.fail_next_wait();
        assert_eq!(
            device.wait_for_fences(&[&fence], WaitFor::Any, 0),
            Err(crate::DeviceError::Lost)
        );
        assert_eq!(
            device.get_fence_status(&fence),
            Err(crate::DeviceError::Lost)
        );
    }
}
