use spinel_core::{hal::mock, DispatchError, DispatchStage, DispatchState, WaitStatus};

use crate::common::initialize_test;

#[test]
fn successor_waits_for_its_predecessor() {
    let mut ctx = initialize_test(mock::Completion::Manual, 4);
    let a = ctx.scheduler.acquire(DispatchStage::RasterBuilder1).unwrap();
    let b = ctx.scheduler.acquire(DispatchStage::Styling).unwrap();
    ctx.scheduler.happens_after(b, a).unwrap();

    ctx.scheduler.submit(b).unwrap();
    assert_eq!(ctx.scheduler.state(b), Ok(DispatchState::Waiting));
    assert_eq!(ctx.scheduler.wait_count(b), Ok(1));
    assert!(ctx.device.submissions().is_empty());

    ctx.scheduler.submit(a).unwrap();
    assert_eq!(ctx.device.submissions().len(), 1);
    assert_eq!(ctx.scheduler.state(b), Ok(DispatchState::Waiting));

    assert!(ctx.device.signal_next());
    assert_eq!(ctx.scheduler.wait(), Ok(WaitStatus::Ready));
    assert_eq!(ctx.scheduler.state(a), Ok(DispatchState::Available));
    assert_eq!(ctx.scheduler.state(b), Ok(DispatchState::Executing));
    assert_eq!(ctx.scheduler.wait_count(b), Ok(0));
    assert_eq!(ctx.submission_count(b), 1);
    ctx.assert_ordered(b, a);
}

#[test]
fn repeated_edges_count_once() {
    let mut ctx = initialize_test(mock::Completion::OnWait, 4);
    let a = ctx.scheduler.acquire(DispatchStage::PathBuilder).unwrap();
    let b = ctx.scheduler.acquire(DispatchStage::RasterBuilder1).unwrap();
    ctx.scheduler.happens_after(b, a).unwrap();
    ctx.scheduler.happens_after(b, a).unwrap();
    assert_eq!(ctx.scheduler.wait_count(b), Ok(1));

    ctx.scheduler.submit(b).unwrap();
    ctx.scheduler.submit(a).unwrap();
    assert_eq!(ctx.scheduler.wait_idle(), Ok(WaitStatus::Ready));
    assert_eq!(ctx.submission_count(b), 1);
    ctx.assert_ordered(b, a);
}

#[test]
fn wait_count_drops_once_per_predecessor() {
    let mut ctx = initialize_test(mock::Completion::Manual, 4);
    let preds = [
        ctx.scheduler.acquire(DispatchStage::RasterBuilder1).unwrap(),
        ctx.scheduler.acquire(DispatchStage::RasterBuilder2).unwrap(),
        ctx.scheduler.acquire(DispatchStage::Styling).unwrap(),
    ];
    let d = ctx.scheduler.acquire(DispatchStage::Render).unwrap();
    for &pred in &preds {
        ctx.scheduler.happens_after(d, pred).unwrap();
    }
    ctx.scheduler.submit(d).unwrap();
    assert_eq!(ctx.scheduler.wait_count(d), Ok(3));

    for &pred in preds.iter().rev() {
        ctx.scheduler.submit(pred).unwrap();
    }
    for remaining in (0..3).rev() {
        assert!(ctx.device.signal_next());
        assert_eq!(ctx.scheduler.wait(), Ok(WaitStatus::Ready));
        assert_eq!(ctx.scheduler.wait_count(d), Ok(remaining));
    }
    assert_eq!(ctx.scheduler.state(d), Ok(DispatchState::Executing));
    for &pred in &preds {
        ctx.assert_ordered(d, pred);
    }
}

#[test]
fn diamond_runs_in_order() {
    let mut ctx = initialize_test(mock::Completion::OnePerWait, 8);
    let top = ctx.scheduler.acquire(DispatchStage::PathBuilder).unwrap();
    let left = ctx.scheduler.acquire(DispatchStage::RasterBuilder1).unwrap();
    let right = ctx.scheduler.acquire(DispatchStage::RasterBuilder2).unwrap();
    let bottom = ctx.scheduler.acquire(DispatchStage::Render).unwrap();
    let edges = [(left, top), (right, top), (bottom, left), (bottom, right)];
    for (after, before) in edges {
        ctx.scheduler.happens_after(after, before).unwrap();
    }
    for id in [bottom, right, left, top] {
        ctx.scheduler.submit(id).unwrap();
    }
    assert_eq!(ctx.device.submissions().len(), 1);

    assert_eq!(ctx.scheduler.wait_idle(), Ok(WaitStatus::Ready));
    assert_eq!(ctx.device.submissions().len(), 4);
    for (after, before) in edges {
        ctx.assert_ordered(after, before);
    }
    assert_eq!(ctx.assert_partition().available, 8);
}

#[test]
fn predecessor_may_finish_before_the_successor_is_submitted() {
    let mut ctx = initialize_test(mock::Completion::OnWait, 4);
    let a = ctx.scheduler.acquire(DispatchStage::PathBuilder).unwrap();
    let b = ctx.scheduler.acquire(DispatchStage::RasterBuilder1).unwrap();
    ctx.scheduler.submit(a).unwrap();
    ctx.scheduler.happens_after(b, a).unwrap();

    assert_eq!(ctx.scheduler.wait(), Ok(WaitStatus::Ready));
    assert_eq!(ctx.scheduler.state(b), Ok(DispatchState::Recording));
    assert_eq!(ctx.scheduler.wait_count(b), Ok(0));

    ctx.scheduler.submit(b).unwrap();
    assert_eq!(ctx.scheduler.state(b), Ok(DispatchState::Executing));
    ctx.assert_ordered(b, a);
}

#[test]
fn edges_need_a_recording_successor() {
    let mut ctx = initialize_test(mock::Completion::Manual, 4);
    let a = ctx.scheduler.acquire(DispatchStage::PathBuilder).unwrap();
    let b = ctx.scheduler.acquire(DispatchStage::RasterBuilder1).unwrap();
    ctx.scheduler.submit(a).unwrap();
    assert_eq!(
        ctx.scheduler.happens_after(a, b),
        Err(DispatchError::NotRecording {
            id: a,
            state: DispatchState::Executing,
        })
    );
    assert_eq!(ctx.scheduler.wait_count(a), Ok(0));
}
