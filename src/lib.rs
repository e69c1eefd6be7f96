pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod memory;
pub mod net;
pub mod orchestration;
pub mod tasks;

pub use crate::config::{ExchangeOrdering, SchedulerConfig};
pub use crate::core::{EventTask, Progress, Task, TaskId, TaskKind, TaskState};
pub use crate::orchestration::{Context, Manager, ManagerStats};
pub use error::{Error, Result};

/// Architecture verification tests.
///
/// These tests pin down the threading properties the scheduler relies on:
/// - Handles that cross onto lane threads are `Send + Sync`
/// - Merging events stays cheap enough to run on every submission
/// - Lane submission never blocks the orchestrating thread
#[cfg(test)]
mod architecture_tests {
    use crate::core::event::TaskToken;
    use crate::memory::{DataSpace, DeviceBuffer, HostBuffer};
    use crate::orchestration::{Lane, LaneEvent, LaneId, LaneKind};
    use crate::{EventTask, TaskId, TaskKind};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn assert_send_sync<T: Send + Sync>() {}

    /// Everything captured by lane work must be shareable across threads.
    #[test]
    fn test_cross_thread_handles_are_send_sync() {
        assert_send_sync::<EventTask>();
        assert_send_sync::<LaneEvent>();
        assert_send_sync::<DeviceBuffer<f64, 3>>();
        assert_send_sync::<HostBuffer<u8, 1>>();
        assert_send_sync::<Arc<dyn crate::net::Transport>>();
    }

    /// Accumulating a transaction's events is on the submission path.
    #[test]
    fn test_merge_accumulation_is_fast() {
        let tokens: Vec<_> = (0..2000)
            .map(|_| TaskToken::new(TaskId::next(), TaskKind::Compute))
            .collect();

        let start = Instant::now();
        let mut acc = EventTask::ready();
        for token in &tokens {
            acc += EventTask::from_token(Arc::clone(token));
        }
        let elapsed = start.elapsed();

        assert_eq!(acc.len(), 2000);
        assert!(
            elapsed < Duration::from_secs(2),
            "merging 2000 events took {:?}",
            elapsed
        );
    }

    /// Submitting onto a lane whose worker is parked on a fence must return
    /// immediately.
    #[test]
    fn test_submit_never_blocks_on_busy_lane() {
        let mut lane = Lane::spawn(LaneId(0), LaneKind::Device).unwrap();
        let blocker = TaskToken::new(TaskId::next(), TaskKind::Compute);
        lane.submit(EventTask::from_token(Arc::clone(&blocker)), Box::new(|| {}));

        let start = Instant::now();
        let mut last = None;
        for _ in 0..1000 {
            last = Some(lane.submit(EventTask::ready(), Box::new(|| {})));
        }
        let elapsed = start.elapsed();
        assert!(
            elapsed < Duration::from_millis(500),
            "1000 submissions behind a parked op took {:?}",
            elapsed
        );

        blocker.finish();
        let last = last.unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !last.is_complete() {
            assert!(Instant::now() < deadline);
            std::thread::yield_now();
        }
    }

    #[test]
    fn test_data_space_matches_buffer_capacity() {
        let buf = DeviceBuffer::<u8, 3>::new(DataSpace::new([4, 4, 4]));
        assert_eq!(buf.capacity(), buf.extent().product());
    }
}
