//! Task identity, lifecycle states and the contract every task implements.
//!
//! A task is the smallest schedulable unit. The manager owns the state
//! machine; a concrete task only submits its work in [`Task::init`] and
//! reports progress from [`Task::poll`].

use crate::orchestration::Context;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique task identity.
///
/// Identities are handed out in strictly increasing order, so comparing two
/// ids tells which task was created first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate the next identity.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        if id == u64::MAX {
            Self::exhausted();
        }
        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    /// Rebuild an id from its raw value (diagnostics and tests).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Class of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Compute,
    Copy,
    Fill,
    Communication,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Compute => write!(f, "compute"),
            TaskKind::Copy => write!(f, "copy"),
            TaskKind::Fill => write!(f, "fill"),
            TaskKind::Communication => write!(f, "communication"),
        }
    }
}

/// Task lifecycle state.
///
/// States are totally ordered and a task only ever moves forward.
/// `Initialized` and `WaitingForCompletion` are only visited by
/// communication tasks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Constructed,
    Initialized,
    Queued,
    WaitingForCompletion,
    Finished,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Constructed => write!(f, "constructed"),
            TaskState::Initialized => write!(f, "initialized"),
            TaskState::Queued => write!(f, "queued"),
            TaskState::WaitingForCompletion => write!(f, "waiting_for_completion"),
            TaskState::Finished => write!(f, "finished"),
        }
    }
}

/// Result of one [`Task::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Underlying operation still in flight.
    Pending,
    /// Operation posted; waiting on the transport or on sub-tasks.
    WaitingForCompletion,
    /// Operation complete. The task becomes `Finished`.
    Done,
}

impl Progress {
    pub fn from_done(done: bool) -> Self {
        if done {
            Progress::Done
        } else {
            Progress::Pending
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Progress::Done)
    }
}

/// Contract implemented by every concrete task.
///
/// None of the methods may block the calling thread.
pub trait Task {
    fn kind(&self) -> TaskKind;

    /// Short human-readable name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Bind to a lane and submit the underlying operation.
    fn init(&mut self, cx: &mut Context<'_>);

    /// Check whether the submitted operation has completed. Called only by
    /// the manager's tick.
    fn poll(&mut self) -> Progress;

    /// A task this one depends on reached `Finished`.
    fn on_dependency_finished(&mut self, _id: TaskId) {}

    /// Whether the task can only finish once a peer outside this manager
    /// acts, such as a receive with no matching send yet.
    fn awaits_peer(&self) -> bool {
        false
    }
}
