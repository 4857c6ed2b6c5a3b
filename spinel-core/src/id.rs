use std::fmt;

use crate::MAX_DISPATCHES;

/// Opaque client-visible identifier of a path, raster, or other resource
/// whose producing dispatch is tracked.
pub type Handle = u32;

/// Argument handed back to the flush callback of
/// [`Scheduler::happens_after_handles`](crate::Scheduler::happens_after_handles).
///
/// Typically identifies the builder that owns a dispatch.
pub type FlushArg = u64;

/// Identifies one slot of the dispatch pool.
///
/// Ids are only unique among live dispatches: once a dispatch retires, its id
/// goes back to the pool and may be handed out again by the next `acquire`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "trace", derive(serde::Serialize))]
pub struct DispatchId(u16);

impl DispatchId {
    pub(crate) fn new(index: usize) -> Self {
        debug_assert!(index < MAX_DISPATCHES);
        Self(index as u16)
    }

    /// Index of the slot in the dispatch pool.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The kind of work a dispatch was acquired for.
///
/// The scheduler treats all stages alike; the tag shows up in logs, traces
/// and [`Scheduler::pending`](crate::Scheduler::pending).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "trace", derive(serde::Serialize))]
pub enum DispatchStage {
    PathBuilder,
    RasterBuilder1,
    RasterBuilder2,
    ReclaimPaths,
    ReclaimRasters,
    Styling,
    CompositionPlace,
    CompositionSeal1,
    CompositionSeal2,
    CompositionReset,
    Render,
}

impl DispatchStage {
    pub fn mask(self) -> StageMask {
        match self {
            Self::PathBuilder => StageMask::PATH_BUILDER,
            Self::RasterBuilder1 => StageMask::RASTER_BUILDER_1,
            Self::RasterBuilder2 => StageMask::RASTER_BUILDER_2,
            Self::ReclaimPaths => StageMask::RECLAIM_PATHS,
            Self::ReclaimRasters => StageMask::RECLAIM_RASTERS,
            Self::Styling => StageMask::STYLING,
            Self::CompositionPlace => StageMask::COMPOSITION_PLACE,
            Self::CompositionSeal1 => StageMask::COMPOSITION_SEAL_1,
            Self::CompositionSeal2 => StageMask::COMPOSITION_SEAL_2,
            Self::CompositionReset => StageMask::COMPOSITION_RESET,
            Self::Render => StageMask::RENDER,
        }
    }
}

bitflags::bitflags! {
    /// A set of [`DispatchStage`]s.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct StageMask: u16 {
        const PATH_BUILDER = 1 << 0;
        const RASTER_BUILDER_1 = 1 << 1;
        const RASTER_BUILDER_2 = 1 << 2;
        const RECLAIM_PATHS = 1 << 3;
        const RECLAIM_RASTERS = 1 << 4;
        const STYLING = 1 << 5;
        const COMPOSITION_PLACE = 1 << 6;
        const COMPOSITION_SEAL_1 = 1 << 7;
        const COMPOSITION_SEAL_2 = 1 << 8;
        const COMPOSITION_RESET = 1 << 9;
        const RENDER = 1 << 10;

        const RASTER_BUILDER = Self::RASTER_BUILDER_1.bits() | Self::RASTER_BUILDER_2.bits();
        const RECLAIM = Self::RECLAIM_PATHS.bits() | Self::RECLAIM_RASTERS.bits();
        const COMPOSITION = Self::COMPOSITION_PLACE.bits()
            | Self::COMPOSITION_SEAL_1.bits()
            | Self::COMPOSITION_SEAL_2.bits()
            | Self::COMPOSITION_RESET.bits();
    }
}

#[test]
fn stage_masks_are_distinct() {
    let stages = [
        DispatchStage::PathBuilder,
        DispatchStage::RasterBuilder1,
        DispatchStage::RasterBuilder2,
        DispatchStage::ReclaimPaths,
        DispatchStage::ReclaimRasters,
        DispatchStage::Styling,
        DispatchStage::CompositionPlace,
        DispatchStage::CompositionSeal1,
        DispatchStage::CompositionSeal2,
        DispatchStage::CompositionReset,
        DispatchStage::Render,
    ];
    let mut seen = StageMask::empty();
    for stage in stages {
        assert!(!seen.intersects(stage.mask()), "{:?}", stage);
        seen |= stage.mask();
    }
    assert!(StageMask::COMPOSITION.contains(DispatchStage::CompositionSeal2.mask()));
    assert!(!StageMask::RECLAIM.contains(DispatchStage::Render.mask()));
}
