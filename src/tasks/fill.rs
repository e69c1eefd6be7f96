//! Fill a device buffer's logical extent with one value.
//!
//! The extent is cut into chunks of `fill_chunk_size` elements along x; each
//! chunk is one execution group, and elements past the end of a partial last
//! chunk are masked by a bounds check. Values narrower than
//! `small_value_threshold` bytes are captured by the kernel directly. Wider
//! values go through a task-owned staging buffer: a first lane operation
//! copies them into the destination's first element and the kernel reads
//! the value from there. An empty extent queues nothing; the task then
//! finishes once its dependencies have.

use crate::core::event::EventTask;
use crate::core::task::{Progress, Task, TaskKind};
use crate::memory::{DataBoxMut, DataSpace, DeviceBuffer};
use crate::orchestration::{Context, LaneEvent, LaneId};
use crate::{elog_debug, elog_trace};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    /// Value passed to the kernel by argument.
    Small,
    /// Value staged through memory first.
    Large,
}

impl FillPolicy {
    pub fn for_value<T>(threshold: usize) -> Self {
        if std::mem::size_of::<T>() < threshold {
            FillPolicy::Small
        } else {
            FillPolicy::Large
        }
    }
}

/// Host-side staging copy of a large fill value, released with the task.
pub struct StagingBuffer<T> {
    value: Arc<T>,
}

impl<T> StagingBuffer<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    fn handle(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }
}

impl<T> Drop for StagingBuffer<T> {
    fn drop(&mut self) {
        elog_trace!(
            "releasing {} byte fill staging buffer",
            std::mem::size_of::<T>()
        );
    }
}

pub struct FillTask<T, const D: usize> {
    destination: DeviceBuffer<T, D>,
    value: T,
    policy: Option<FillPolicy>,
    lane: Option<LaneId>,
    staging: Option<StagingBuffer<T>>,
    filled: Option<LaneEvent>,
    deps: EventTask,
}

impl<T, const D: usize> FillTask<T, D>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(destination: DeviceBuffer<T, D>, value: T) -> Self {
        Self {
            destination,
            value,
            policy: None,
            lane: None,
            staging: None,
            filled: None,
            deps: EventTask::ready(),
        }
    }

    /// Force a policy instead of choosing by value size.
    pub fn with_policy(mut self, policy: FillPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Run on `lane` instead of the next device lane.
    pub fn on_lane(mut self, lane: LaneId) -> Self {
        self.lane = Some(lane);
        self
    }
}

impl<T, const D: usize> Task for FillTask<T, D>
where
    T: Clone + Send + Sync + 'static,
{
    fn kind(&self) -> TaskKind {
        TaskKind::Fill
    }

    fn name(&self) -> &'static str {
        "fill"
    }

    fn init(&mut self, cx: &mut Context<'_>) {
        let area = self.destination.current_data_space();
        let chunk = cx.config().fill_chunk_size;
        let policy = self
            .policy
            .unwrap_or_else(|| FillPolicy::for_value::<T>(cx.config().small_value_threshold));
        let lane = match self.lane {
            Some(lane) => lane,
            None => cx.next_device_lane(),
        };

        if area.product() == 0 {
            cx.bind_lane(lane);
            self.deps = cx.dependencies().clone();
            return;
        }
        elog_debug!(
            "fill #{} area={} policy={:?} groups={}",
            cx.task_id(),
            area,
            policy,
            area.x().div_ceil(chunk) * (area.product() / area.x())
        );

        let destination = self.destination.clone();
        match policy {
            FillPolicy::Small => {
                let value = self.value.clone();
                self.filled = Some(cx.enqueue(lane, move || {
                    destination.write(|mut data| fill_kernel(&mut data, area, chunk, &value))
                }));
            }
            FillPolicy::Large => {
                let staging = StagingBuffer::new(self.value.clone());
                let staged = staging.handle();
                let scratch = destination.clone();
                cx.enqueue(lane, move || {
                    scratch.write(|mut data| data.as_mut_slice()[0] = T::clone(&staged))
                });
                self.filled = Some(cx.enqueue(lane, move || {
                    destination.write(|mut data| {
                        let value = data.as_slice()[0].clone();
                        fill_kernel(&mut data, area, chunk, &value)
                    })
                }));
                self.staging = Some(staging);
            }
        }
    }

    fn poll(&mut self) -> Progress {
        match &self.filled {
            Some(ev) => Progress::from_done(ev.is_complete()),
            None => Progress::from_done(self.deps.is_ready()),
        }
    }
}

/// One pass over `area`, grouped in chunks of `chunk` elements along x.
fn fill_kernel<T: Clone, const D: usize>(
    data: &mut DataBoxMut<'_, T, D>,
    area: DataSpace<D>,
    chunk: usize,
    value: &T,
) {
    let mut groups = area;
    groups[0] = area.x().div_ceil(chunk);
    for group in groups.indices() {
        for worker in 0..chunk {
            let mut idx = group;
            idx[0] = group[0] * chunk + worker;
            if idx[0] < area.x() {
                data[idx] = value.clone();
            }
        }
    }
}
