#![cfg(feature = "trace")]

use spinel_core::{hal::mock, DispatchStage, Scheduler, SchedulerDescriptor, WaitStatus};

#[test]
fn actions_are_written_to_the_trace() {
    let _ = env_logger::try_init();
    let dir = std::env::temp_dir().join(format!("spinel-trace-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let device = mock::Device::new(mock::Completion::OnWait);
    let queue = device.create_queue();
    let desc = SchedulerDescriptor {
        dispatch_count: 2,
        trace_path: Some(dir.clone()),
        ..Default::default()
    };
    let mut scheduler = Scheduler::<mock::Api>::new(device, vec![queue], &desc).unwrap();
    let a = scheduler.acquire(DispatchStage::PathBuilder).unwrap();
    let b = scheduler.acquire(DispatchStage::RasterBuilder1).unwrap();
    scheduler.register_handle(a, 1).unwrap();
    scheduler.happens_after(b, a).unwrap();
    scheduler.submit(b).unwrap();
    scheduler.submit(a).unwrap();
    assert_eq!(scheduler.wait_idle(), Ok(WaitStatus::Ready));
    drop(scheduler);

    let trace = std::fs::read_to_string(dir.join("trace.ron")).unwrap();
    assert!(trace.starts_with('['));
    assert!(trace.ends_with(']'));
    for action in ["Init", "Acquire", "RegisterHandle", "HappensAfter", "Launch", "Retire"] {
        assert!(trace.contains(action), "{} is missing from the trace", action);
    }
    let _ = std::fs::remove_dir_all(&dir);
}
