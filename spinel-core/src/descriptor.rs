use std::{borrow::Cow, path::PathBuf, str::FromStr};

use thiserror::Error;

use crate::{Label, MAX_DISPATCHES};

/// Describes a [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug)]
pub struct SchedulerDescriptor<'a> {
    /// Debug label of the scheduler, used in log messages.
    pub label: Label<'a>,
    /// Size of the dispatch pool: the maximum number of dispatches that can be
    /// recording, waiting or executing at once.
    pub dispatch_count: u32,
    /// Number of entries in the handle index. Handles must be smaller than this.
    pub handle_count: u32,
    /// Timeout used by `wait`, `wait_all` and the stall loop in `acquire`.
    pub wait_timeout_ns: u64,
    /// Directory to write a `trace.ron` of scheduler actions into.
    ///
    /// Requires the `trace` feature.
    pub trace_path: Option<PathBuf>,
}

impl Default for SchedulerDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            dispatch_count: 64,
            handle_count: 1 << 14,
            wait_timeout_ns: 5_000 * 1_000_000,
            trace_path: None,
        }
    }
}

impl SchedulerDescriptor<'static> {
    /// Default descriptor, overridden by the environment variables
    /// `SPINEL_DISPATCH_COUNT`, `SPINEL_HANDLE_COUNT`, `SPINEL_WAIT_TIMEOUT_MS`
    /// and `SPINEL_TRACE`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut desc = Self::default();
        if let Some(count) = parse_var(&lookup, "SPINEL_DISPATCH_COUNT") {
            desc.dispatch_count = count;
        }
        if let Some(count) = parse_var(&lookup, "SPINEL_HANDLE_COUNT") {
            desc.handle_count = count;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "SPINEL_WAIT_TIMEOUT_MS") {
            desc.wait_timeout_ns = ms.saturating_mul(1_000_000);
        }
        if let Some(path) = lookup("SPINEL_TRACE") {
            desc.trace_path = Some(PathBuf::from(path));
        }
        desc
    }
}

impl<'a> SchedulerDescriptor<'a> {
    pub fn with_label(mut self, label: impl Into<Cow<'a, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), CreateSchedulerError> {
        if self.dispatch_count == 0 || self.dispatch_count as usize > MAX_DISPATCHES {
            return Err(CreateSchedulerError::DispatchCount {
                requested: self.dispatch_count,
                max: MAX_DISPATCHES,
            });
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let value = lookup(name)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a number", name, value);
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CreateSchedulerError {
    #[error(transparent)]
    Device(#[from] hal::DeviceError),
    #[error("dispatch count {requested} is outside of 1..={max}")]
    DispatchCount { requested: u32, max: usize },
    #[error("at least one queue is required")]
    NoQueues,
}
