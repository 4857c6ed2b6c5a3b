/*! This library schedules the GPU work of the Spinel vector renderer.
 *  Units of work ("dispatches") are recorded into a fixed pool of command
 *  buffers and fences, ordered by happens-after edges declared between them
 *  or derived from the resource handles they produce, and submitted once all
 *  of their predecessors have completed.
 */

#![allow(
    // It is much clearer to assert negative conditions with eq! false
    clippy::bool_assert_comparison,
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
    // Redundant matching is more explicit.
    clippy::redundant_pattern_matching,
    // Explicit lifetimes are often easier to reason about.
    clippy::needless_lifetimes,
    // No need for defaults in the internal types.
    clippy::new_without_default,
    // Needless updates are more scaleable, easier to play with features.
    clippy::needless_update,
    // Clashes with clippy::pattern_type_mismatch
    clippy::needless_borrowed_reference,
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications,
    // We don't match on a reference, unless required.
    clippy::pattern_type_mismatch,
)]

mod descriptor;
mod dispatch;
mod handles;
mod id;
mod shared;

pub use hal;
pub use hal::{WaitFor, WAIT_FOREVER};

pub use descriptor::{CreateSchedulerError, SchedulerDescriptor};
pub use dispatch::{
    CompletionFn, DefaultSubmitter, DispatchError, DispatchState, DispatchStats, Scheduler,
    Submitter, WaitStatus,
};
pub use handles::HandleSpan;
pub use id::{DispatchId, DispatchStage, FlushArg, Handle, StageMask};
pub use shared::SharedScheduler;

use std::borrow::Cow;

/// Largest supported dispatch pool.
///
/// Successor sets are bitmaps of 32-id blocks, indexed by one 32-bit word.
pub const MAX_DISPATCHES: usize = 32 * 32;

/// Capacity of the payload handed to a completion callback, in bytes.
pub const COMPLETION_PAYLOAD_SIZE: usize = 48;

/// Number of times a dispatch slot has been acquired.
type Epoch = u32;

pub type Label<'a> = Option<Cow<'a, str>>;
