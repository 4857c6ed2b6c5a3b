/*! This library describes the backend primitives the Spinel dispatch
 *  scheduler is built on. It follows the shape of a Vulkan-style queue API,
 *  reduced to the pieces a scheduler needs:
 *  - One-shot command buffers that are begun, recorded and ended.
 *  - Binary fences that are reset, signaled by a queue submission,
 *    queried, and waited on in batches.
 *  - Queues that accept a command buffer together with the fence to signal.
 *  - Zero validation: the scheduler is responsible for correct use.
 */

#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
    // Redundant matching is more explicit.
    clippy::redundant_pattern_matching,
    // Explicit lifetimes are often easier to reason about.
    clippy::needless_lifetimes,
    // No need for defaults in the internal types.
    clippy::new_without_default,
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications,
    // We don't match on a reference, unless required.
    clippy::pattern_type_mismatch,
)]

pub mod empty;
pub mod mock;

use std::fmt;

use thiserror::Error;

/// Timeout value meaning "block until the condition is met".
pub const WAIT_FOREVER: u64 = u64::MAX;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("device is lost")]
    Lost,
}

/// How many fences of a batch have to be signaled for a wait to succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitFor {
    /// At least one fence.
    Any,
    /// Every fence in the batch.
    All,
}

pub trait Api: Sized + 'static {
    type Device: Device<Self>;
    type Queue: Queue<Self>;
    type CommandBuffer: CommandBuffer<Self>;
    type Fence: fmt::Debug;
}

pub trait Device<A: Api> {
    fn create_command_buffer(&self) -> Result<A::CommandBuffer, DeviceError>;
    fn destroy_command_buffer(&self, cmd_buf: A::CommandBuffer);

    /// Creates a new fence in the unsignaled state.
    fn create_fence(&self) -> Result<A::Fence, DeviceError>;
    fn destroy_fence(&self, fence: A::Fence);
    /// Returns a fence to the unsignaled state.
    ///
    /// The fence must not be referenced by a pending submission.
    fn reset_fence(&self, fence: &mut A::Fence) -> Result<(), DeviceError>;
    /// Returns `true` if the fence is signaled.
    fn get_fence_status(&self, fence: &A::Fence) -> Result<bool, DeviceError>;
    /// Blocks until the fences satisfy `wait_for`, or `timeout_ns` elapses.
    ///
    /// Returns `false` on timeout.
    fn wait_for_fences(
        &self,
        fences: &[&A::Fence],
        wait_for: WaitFor,
        timeout_ns: u64,
    ) -> Result<bool, DeviceError>;
}

pub trait Queue<A: Api> {
    /// Submits an ended command buffer. `signal_fence` is signaled once the
    /// work recorded in it has finished executing.
    fn submit(
        &mut self,
        command_buffer: &A::CommandBuffer,
        signal_fence: &A::Fence,
    ) -> Result<(), DeviceError>;
}

pub trait CommandBuffer<A: Api> {
    /// Opens the command buffer for one-shot recording, discarding whatever
    /// was recorded previously.
    fn begin(&mut self) -> Result<(), DeviceError>;
    /// Closes the command buffer, making it ready for submission.
    fn end(&mut self) -> Result<(), DeviceError>;
}
