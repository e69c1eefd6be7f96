//! Event handles: "this set of tasks must finish".
//!
//! Every registered task owns a [`TaskToken`] that records whether it has
//! finished. An [`EventTask`] is an immutable, reference-counted set of
//! tokens. Tokens double as fences: a lane operation blocks its worker
//! thread on the tokens of its dependencies before running.

use crate::core::task::{TaskId, TaskKind};
use crate::error::fatal;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Completion flag shared between the registry, event handles and lanes.
pub struct TaskToken {
    id: TaskId,
    kind: TaskKind,
    finished: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl TaskToken {
    pub(crate) fn new(id: TaskId, kind: TaskKind) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            finished: AtomicBool::new(false),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Flip the token to finished and wake every lane fenced on it.
    pub(crate) fn finish(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.finished.swap(true, Ordering::AcqRel) {
            fatal(self.kind, self.id, "task finished twice");
        }
        self.cond.notify_all();
    }

    /// Block the current thread until the task finishes. Only lane worker
    /// threads call this; the orchestrating thread never blocks on a token.
    pub(crate) fn wait(&self) {
        if self.is_finished() {
            return;
        }
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.is_finished() {
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl fmt::Debug for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskToken")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Immutable, mergeable handle over a set of tasks.
///
/// Cloning copies the handle, never the tasks. Merging (`a + b`) yields the
/// union; members that already finished are absorbed, so merging with a
/// ready event changes nothing.
#[derive(Clone)]
pub struct EventTask {
    // Sorted by id, no duplicates.
    members: Arc<[Arc<TaskToken>]>,
}

impl EventTask {
    /// An event with no members. Always ready.
    pub fn ready() -> Self {
        Self {
            members: Arc::from(Vec::new()),
        }
    }

    pub(crate) fn from_token(token: Arc<TaskToken>) -> Self {
        Self {
            members: Arc::from(vec![token]),
        }
    }

    /// True once every referenced task reached `Finished`.
    pub fn is_ready(&self) -> bool {
        self.members.iter().all(|t| t.is_finished())
    }

    /// Identities captured by this handle.
    pub fn ids(&self) -> Vec<TaskId> {
        self.members.iter().map(|t| t.id()).collect()
    }

    /// Identities of referenced tasks that have not finished yet.
    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.members
            .iter()
            .filter(|t| !t.is_finished())
            .map(|t| t.id())
            .collect()
    }

    /// The single task behind this handle, if it references exactly one.
    pub fn task_id(&self) -> Option<TaskId> {
        match &*self.members {
            [only] => Some(only.id()),
            _ => None,
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.members.binary_search_by_key(&id, |t| t.id()).is_ok()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn tokens(&self) -> &[Arc<TaskToken>] {
        &self.members
    }

    /// Block until ready. Lane worker threads only.
    pub(crate) fn wait_finished(&self) {
        for token in self.members.iter() {
            token.wait();
        }
    }

    /// Union of two events, dropping members that already finished.
    pub fn merge(&self, other: &EventTask) -> EventTask {
        if Arc::ptr_eq(&self.members, &other.members) {
            return self.absorb_finished();
        }
        let mut merged: Vec<Arc<TaskToken>> =
            Vec::with_capacity(self.members.len() + other.members.len());
        let (mut a, mut b) = (self.members.iter().peekable(), other.members.iter().peekable());
        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(x), Some(y)) if x.id() == y.id() => {
                    b.next();
                    a.next()
                }
                (Some(x), Some(y)) if x.id() < y.id() => a.next(),
                (Some(_), Some(_)) => b.next(),
                (Some(_), None) => a.next(),
                (None, Some(_)) => b.next(),
                (None, None) => break,
            };
            if let Some(token) = next {
                if !token.is_finished() {
                    merged.push(Arc::clone(token));
                }
            }
        }
        Self {
            members: Arc::from(merged),
        }
    }

    fn absorb_finished(&self) -> EventTask {
        if self.members.iter().all(|t| !t.is_finished()) {
            return self.clone();
        }
        let pending: Vec<_> = self
            .members
            .iter()
            .filter(|t| !t.is_finished())
            .cloned()
            .collect();
        Self {
            members: Arc::from(pending),
        }
    }
}

impl Default for EventTask {
    fn default() -> Self {
        Self::ready()
    }
}

impl fmt::Debug for EventTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTask")
            .field("ids", &self.ids())
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl PartialEq for EventTask {
    fn eq(&self, other: &Self) -> bool {
        self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .zip(other.members.iter())
                .all(|(a, b)| a.id() == b.id())
    }
}

impl Eq for EventTask {}

impl Add for EventTask {
    type Output = EventTask;

    fn add(self, rhs: EventTask) -> EventTask {
        self.merge(&rhs)
    }
}

impl Add<&EventTask> for &EventTask {
    type Output = EventTask;

    fn add(self, rhs: &EventTask) -> EventTask {
        self.merge(rhs)
    }
}

impl AddAssign for EventTask {
    fn add_assign(&mut self, rhs: EventTask) {
        *self = self.merge(&rhs);
    }
}

impl AddAssign<&EventTask> for EventTask {
    fn add_assign(&mut self, rhs: &EventTask) {
        *self = self.merge(rhs);
    }
}
