//! Kernel launch on a device lane.

use crate::core::task::{Progress, Task, TaskKind};
use crate::orchestration::{Context, LaneEvent, LaneId};

type Kernel = Box<dyn FnOnce() + Send + 'static>;

pub struct ComputeTask {
    kernel: Option<Kernel>,
    lane: Option<LaneId>,
    launched: Option<LaneEvent>,
}

impl ComputeTask {
    pub fn new<F>(kernel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            kernel: Some(Box::new(kernel)),
            lane: None,
            launched: None,
        }
    }

    /// Pin the launch to `lane` instead of the next device lane.
    pub fn on_lane(mut self, lane: LaneId) -> Self {
        self.lane = Some(lane);
        self
    }
}

impl Task for ComputeTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Compute
    }

    fn name(&self) -> &'static str {
        "compute"
    }

    fn init(&mut self, cx: &mut Context<'_>) {
        let lane = match self.lane {
            Some(lane) => lane,
            None => cx.next_device_lane(),
        };
        if let Some(kernel) = self.kernel.take() {
            self.launched = Some(cx.enqueue(lane, kernel));
        }
    }

    fn poll(&mut self) -> Progress {
        Progress::from_done(self.launched.as_ref().map_or(true, |ev| ev.is_complete()))
    }
}
