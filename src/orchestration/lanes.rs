//! Execution lanes.
//!
//! A lane is an ordered queue of operations executed by one worker thread:
//! a device queue or a network channel. Operations on the same lane run in
//! submission order; distinct lanes run independently. Each operation first
//! blocks its worker on the fence of the submitting task's dependencies, then
//! runs. Completion is published as a monotonically increasing sequence
//! number, so a [`LaneEvent`] is complete once the lane has caught up to it.

use crate::core::event::EventTask;
use crate::error::{fatal_scheduler, Error, Result};
use crate::net::ExchangeDirection;
use crate::{elog_debug, elog_error, elog_trace};
use crossbeam_channel::{unbounded, Sender};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Identity of a lane within one manager.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LaneId(pub u32);

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lane-{}", self.0)
    }
}

/// What a lane models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum LaneKind {
    /// Device execution queue.
    Device,
    /// Network channel towards one neighbor direction.
    Channel {
        direction: ExchangeDirection,
        role: ChannelRole,
    },
}

/// Sends and receives towards one direction get separate channel lanes so a
/// receive parked on its message never holds back outgoing traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    Send,
    Receive,
}

/// Work item executed on a lane's worker thread.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

struct LaneOp {
    seq: u64,
    fence: EventTask,
    work: Work,
}

enum LaneMessage {
    Run(LaneOp),
    Shutdown,
}

#[derive(Default)]
struct LaneProgress {
    completed: AtomicU64,
    fault: Mutex<Option<String>>,
}

impl LaneProgress {
    fn fault(&self) -> Option<String> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Observed state of a lane operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneStatus {
    Pending,
    Complete,
    /// An operation on the lane panicked.
    Faulted(String),
}

/// Marker for one submitted lane operation.
#[derive(Clone)]
pub struct LaneEvent {
    lane: LaneId,
    seq: u64,
    progress: Arc<LaneProgress>,
}

impl LaneEvent {
    pub fn lane(&self) -> LaneId {
        self.lane
    }

    pub fn status(&self) -> LaneStatus {
        // Load the counter first: a fault is recorded before the counter
        // moves past the faulting op.
        let done = self.progress.completed.load(Ordering::Acquire) >= self.seq;
        if let Some(fault) = self.progress.fault() {
            return LaneStatus::Faulted(fault);
        }
        if done {
            LaneStatus::Complete
        } else {
            LaneStatus::Pending
        }
    }

    /// Non-blocking completion check. A faulted lane is fatal: the device
    /// state behind it can no longer be trusted.
    pub fn is_complete(&self) -> bool {
        match self.status() {
            LaneStatus::Pending => false,
            LaneStatus::Complete => true,
            LaneStatus::Faulted(msg) => {
                fatal_scheduler(&format!("operation on {} faulted: {}", self.lane, msg))
            }
        }
    }
}

impl std::fmt::Debug for LaneEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneEvent")
            .field("lane", &self.lane)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Per-lane counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStats {
    pub id: LaneId,
    pub kind: LaneKind,
    pub submitted: u64,
    pub completed: u64,
    pub closed: bool,
}

pub struct Lane {
    id: LaneId,
    kind: LaneKind,
    tx: Sender<LaneMessage>,
    progress: Arc<LaneProgress>,
    worker: Option<JoinHandle<()>>,
    submitted: u64,
    closed: bool,
}

impl Lane {
    /// Start a lane and its worker thread.
    pub fn spawn(id: LaneId, kind: LaneKind) -> Result<Self> {
        let (tx, rx) = unbounded::<LaneMessage>();
        let progress = Arc::new(LaneProgress::default());
        let worker_progress = Arc::clone(&progress);

        let worker = std::thread::Builder::new()
            .name(id.to_string())
            .spawn(move || {
                for msg in rx.iter() {
                    match msg {
                        LaneMessage::Run(op) => {
                            op.fence.wait_finished();
                            if let Err(payload) = catch_unwind(AssertUnwindSafe(op.work)) {
                                let msg = panic_message(payload.as_ref());
                                elog_error!("{} op {} panicked: {}", id, op.seq, msg);
                                let mut fault = worker_progress
                                    .fault
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner);
                                fault.get_or_insert(msg);
                            }
                            worker_progress.completed.store(op.seq, Ordering::Release);
                            elog_trace!("{} completed op {}", id, op.seq);
                        }
                        LaneMessage::Shutdown => break,
                    }
                }
            })?;

        elog_debug!("{} started ({:?})", id, kind);
        Ok(Self {
            id,
            kind,
            tx,
            progress,
            worker: Some(worker),
            submitted: 0,
            closed: false,
        })
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn kind(&self) -> LaneKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of operations ever submitted.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// First panic message recorded on this lane.
    pub fn fault(&self) -> Option<String> {
        self.progress.fault()
    }

    /// Number of operations that finished running.
    pub fn completed(&self) -> u64 {
        self.progress.completed.load(Ordering::Acquire)
    }

    /// Queue `work` behind every earlier operation on this lane. The worker
    /// waits for `fence` to be ready before running it.
    pub fn submit(&mut self, fence: EventTask, work: Work) -> LaneEvent {
        if self.closed {
            fatal_scheduler(&format!("submit onto closed {}", self.id));
        }
        self.submitted += 1;
        let seq = self.submitted;
        let op = LaneOp { seq, fence, work };
        if self.tx.send(LaneMessage::Run(op)).is_err() {
            fatal_scheduler(&format!("{} worker is gone", self.id));
        }
        elog_trace!("{} queued op {}", self.id, seq);
        LaneEvent {
            lane: self.id,
            seq,
            progress: Arc::clone(&self.progress),
        }
    }

    /// Stop accepting work. Already queued operations still run.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.tx.send(LaneMessage::Shutdown);
        elog_debug!("{} closed after {} ops", self.id, self.submitted);
    }

    pub fn stats(&self) -> LaneStats {
        LaneStats {
            id: self.id,
            kind: self.kind,
            submitted: self.submitted,
            completed: self.completed(),
            closed: self.closed,
        }
    }
}

impl Drop for Lane {
    fn drop(&mut self) {
        self.close();
        // A worker parked on a fence that will never finish cannot be joined.
        if std::thread::panicking() {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("submitted", &self.submitted)
            .field("closed", &self.closed)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Device lanes plus lazily created per-direction network channels.
pub struct LaneSet {
    lanes: Vec<Lane>,
    device: Vec<LaneId>,
    channels: HashMap<(ExchangeDirection, ChannelRole), LaneId>,
    next_device: usize,
}

impl LaneSet {
    pub fn new(device_lanes: usize) -> Result<Self> {
        if device_lanes == 0 {
            return Err(Error::Validation(
                "at least one device lane is required".to_string(),
            ));
        }
        let mut set = Self {
            lanes: Vec::new(),
            device: Vec::new(),
            channels: HashMap::new(),
            next_device: 0,
        };
        for _ in 0..device_lanes {
            let id = set.spawn(LaneKind::Device)?;
            set.device.push(id);
        }
        Ok(set)
    }

    fn spawn(&mut self, kind: LaneKind) -> Result<LaneId> {
        let id = LaneId(self.lanes.len() as u32);
        self.lanes.push(Lane::spawn(id, kind)?);
        Ok(id)
    }

    pub fn device_lanes(&self) -> &[LaneId] {
        &self.device
    }

    /// Round-robin over device lanes.
    pub fn next_device_lane(&mut self) -> LaneId {
        let id = self.device[self.next_device % self.device.len()];
        self.next_device = self.next_device.wrapping_add(1);
        id
    }

    /// The channel lane for `direction` and `role`, created on first use.
    pub fn channel_lane(
        &mut self,
        direction: ExchangeDirection,
        role: ChannelRole,
    ) -> Result<LaneId> {
        if let Some(id) = self.channels.get(&(direction, role)) {
            return Ok(*id);
        }
        let id = self.spawn(LaneKind::Channel { direction, role })?;
        self.channels.insert((direction, role), id);
        Ok(id)
    }

    pub fn get(&self, id: LaneId) -> Result<&Lane> {
        self.lanes.get(id.0 as usize).ok_or(Error::UnknownLane(id))
    }

    pub fn get_mut(&mut self, id: LaneId) -> Result<&mut Lane> {
        self.lanes.get_mut(id.0 as usize).ok_or(Error::UnknownLane(id))
    }

    pub fn close(&mut self, id: LaneId) -> Result<()> {
        self.get_mut(id)?.close();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Total operations submitted across all lanes.
    pub fn submitted_total(&self) -> u64 {
        self.lanes.iter().map(|l| l.submitted()).sum()
    }

    pub fn stats(&self) -> Vec<LaneStats> {
        self.lanes.iter().map(|l| l.stats()).collect()
    }
}

impl std::fmt::Debug for LaneSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneSet")
            .field("device", &self.device.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}
