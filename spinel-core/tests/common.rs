use spinel_core::{
    hal::mock::{self, CompletionRecord, SubmissionRecord},
    DispatchId, DispatchStats, Scheduler, SchedulerDescriptor,
};

pub struct TestContext {
    pub device: mock::Device,
    pub scheduler: Scheduler<mock::Api>,
}

pub fn initialize_test(completion: mock::Completion, dispatch_count: u32) -> TestContext {
    initialize_test_with_queues(completion, dispatch_count, 1)
}

pub fn initialize_test_with_queues(
    completion: mock::Completion,
    dispatch_count: u32,
    queue_count: usize,
) -> TestContext {
    let _ = env_logger::try_init();
    let device = mock::Device::new(completion);
    let queues = (0..queue_count)
        .map(|_| device.create_queue())
        .collect::<Vec<_>>();
    let desc = SchedulerDescriptor {
        dispatch_count,
        handle_count: 64,
        ..Default::default()
    }
    .with_label("test");
    let scheduler = Scheduler::<mock::Api>::new(device.clone(), queues, &desc).unwrap();
    TestContext { device, scheduler }
}

impl TestContext {
    // Slots are created before any other fence, so fence indices match
    // dispatch ids.

    /// Latest queue submission of the dispatch.
    pub fn submission(&self, id: DispatchId) -> Option<SubmissionRecord> {
        self.device
            .submissions()
            .into_iter()
            .rev()
            .find(|record| record.fence as usize == id.index())
    }

    pub fn submission_count(&self, id: DispatchId) -> usize {
        self.device
            .submissions()
            .iter()
            .filter(|record| record.fence as usize == id.index())
            .count()
    }

    /// Latest completion of the dispatch.
    pub fn completion(&self, id: DispatchId) -> Option<CompletionRecord> {
        self.device
            .completions()
            .into_iter()
            .rev()
            .find(|record| record.fence as usize == id.index())
    }

    /// Checks that `after` reached a queue only once `before` had completed.
    pub fn assert_ordered(&self, after: DispatchId, before: DispatchId) {
        let completed = self
            .completion(before)
            .unwrap_or_else(|| panic!("{:?} never completed", before));
        let submitted = self
            .submission(after)
            .unwrap_or_else(|| panic!("{:?} was never submitted", after));
        assert!(
            submitted.tick > completed.tick,
            "{:?} was submitted at tick {}, before {:?} completed at tick {}",
            after,
            submitted.tick,
            before,
            completed.tick
        );
    }

    /// Checks that every dispatch is accounted for exactly once.
    pub fn assert_partition(&self) -> DispatchStats {
        let stats = self.scheduler.stats();
        assert_eq!(
            stats.available + stats.recording + stats.in_flight(),
            self.scheduler.dispatch_count(),
            "{:?}",
            stats
        );
        stats
    }
}
