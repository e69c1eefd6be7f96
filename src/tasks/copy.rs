//! Copies between host and device buffers.
//!
//! The destination's current size is set to the source's when the task is
//! initialized, so tasks submitted afterwards already see the new logical
//! extent. The data itself moves on a device lane. An empty copy queues
//! nothing and finishes once its dependencies have.

use crate::core::event::EventTask;
use crate::core::task::{Progress, Task, TaskKind};
use crate::error::fatal;
use crate::memory::{Buffer, Device, DeviceBuffer, Host, HostBuffer, Location};
use crate::orchestration::{Context, LaneEvent, LaneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

impl CopyDirection {
    fn name(&self) -> &'static str {
        match self {
            CopyDirection::HostToDevice => "copy_host_to_device",
            CopyDirection::DeviceToHost => "copy_device_to_host",
            CopyDirection::DeviceToDevice => "copy_device_to_device",
        }
    }
}

pub struct CopyTask<T, const D: usize, S, Dst> {
    source: Buffer<T, D, S>,
    destination: Buffer<T, D, Dst>,
    direction: CopyDirection,
    lane: Option<LaneId>,
    copied: Option<LaneEvent>,
    deps: EventTask,
}

impl<T, const D: usize> CopyTask<T, D, Host, Device> {
    pub fn host_to_device(source: &HostBuffer<T, D>, destination: &DeviceBuffer<T, D>) -> Self {
        Self::build(source, destination, CopyDirection::HostToDevice)
    }
}

impl<T, const D: usize> CopyTask<T, D, Device, Host> {
    pub fn device_to_host(source: &DeviceBuffer<T, D>, destination: &HostBuffer<T, D>) -> Self {
        Self::build(source, destination, CopyDirection::DeviceToHost)
    }
}

impl<T, const D: usize> CopyTask<T, D, Device, Device> {
    pub fn device_to_device(source: &DeviceBuffer<T, D>, destination: &DeviceBuffer<T, D>) -> Self {
        Self::build(source, destination, CopyDirection::DeviceToDevice)
    }
}

impl<T, const D: usize, S: Location, Dst: Location> CopyTask<T, D, S, Dst> {
    fn build(
        source: &Buffer<T, D, S>,
        destination: &Buffer<T, D, Dst>,
        direction: CopyDirection,
    ) -> Self {
        Self {
            source: source.clone(),
            destination: destination.clone(),
            direction,
            lane: None,
            copied: None,
            deps: EventTask::ready(),
        }
    }

    /// Run on `lane` instead of the next device lane.
    pub fn on_lane(mut self, lane: LaneId) -> Self {
        self.lane = Some(lane);
        self
    }

    pub fn direction(&self) -> CopyDirection {
        self.direction
    }
}

impl<T, const D: usize, S, Dst> Task for CopyTask<T, D, S, Dst>
where
    T: Clone + Send + Sync + 'static,
    S: Location,
    Dst: Location,
{
    fn kind(&self) -> TaskKind {
        TaskKind::Copy
    }

    fn name(&self) -> &'static str {
        self.direction.name()
    }

    fn init(&mut self, cx: &mut Context<'_>) {
        let (kind, id) = (cx.kind(), cx.task_id());
        if self.source.same_storage(&self.destination) {
            fatal(kind, id, "copy source and destination are the same buffer");
        }

        let size = self.source.current_size();
        let area = self.source.current_data_space();
        if !self.destination.extent().contains(&area) {
            fatal(
                kind,
                id,
                &format!(
                    "copy of extent {} does not fit destination extent {}",
                    area,
                    self.destination.extent()
                ),
            );
        }
        if let Err(e) = self.destination.set_current_size(size) {
            fatal(kind, id, &e.to_string());
        }

        let lane = match self.lane {
            Some(lane) => lane,
            None => cx.next_device_lane(),
        };
        if area.product() == 0 {
            cx.bind_lane(lane);
            self.deps = cx.dependencies().clone();
            return;
        }

        let source = self.source.clone();
        let destination = self.destination.clone();
        self.copied = Some(cx.enqueue(lane, move || {
            source.read(|src| {
                destination.write(|mut dst| {
                    if src.extent() == dst.extent() {
                        dst.as_mut_slice()[..size].clone_from_slice(&src.as_slice()[..size]);
                    } else {
                        for idx in area.indices() {
                            dst[idx] = src[idx].clone();
                        }
                    }
                })
            })
        }));
    }

    fn poll(&mut self) -> Progress {
        match &self.copied {
            Some(ev) => Progress::from_done(ev.is_complete()),
            None => Progress::from_done(self.deps.is_ready()),
        }
    }
}
