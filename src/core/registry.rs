//! Process-wide table of live tasks.
//!
//! Entries are keyed by [`TaskId`] and reclaimed lazily once a task is
//! `Finished` and the registry holds the only reference to its token, i.e.
//! no outstanding [`EventTask`] can still name it. Dependency edges are kept
//! in a petgraph `DiGraphMap` (dependency -> dependent) so a finishing task
//! can find whom to notify.

use crate::core::event::{EventTask, TaskToken};
use crate::core::task::{Task, TaskId, TaskKind, TaskState};
use crate::error::fatal;
use crate::orchestration::LaneId;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

/// Single-fire completion callback.
pub type Observer = Box<dyn FnOnce(TaskId)>;

/// Registry-side state of one task.
pub struct TaskEntry {
    token: Arc<TaskToken>,
    name: &'static str,
    state: TaskState,
    lane: Option<LaneId>,
    deps: EventTask,
    task: Option<Box<dyn Task>>,
    observers: Vec<Observer>,
}

impl TaskEntry {
    pub fn new(token: Arc<TaskToken>, name: &'static str, deps: EventTask) -> Self {
        Self {
            token,
            name,
            state: TaskState::Constructed,
            lane: None,
            deps,
            task: None,
            observers: Vec::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.token.id()
    }

    pub fn kind(&self) -> TaskKind {
        self.token.kind()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn lane(&self) -> Option<LaneId> {
        self.lane
    }

    pub fn dependencies(&self) -> &EventTask {
        &self.deps
    }

    pub(crate) fn token(&self) -> &Arc<TaskToken> {
        &self.token
    }

    pub(crate) fn set_lane(&mut self, lane: LaneId) {
        self.lane = Some(lane);
    }

    pub(crate) fn attach(&mut self, task: Box<dyn Task>) {
        self.task = Some(task);
    }

    pub(crate) fn task(&self) -> Option<&dyn Task> {
        self.task.as_deref()
    }

    pub(crate) fn task_mut(&mut self) -> Option<&mut Box<dyn Task>> {
        self.task.as_mut()
    }

    pub(crate) fn add_observer(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    /// Move forward in the lifecycle. Moving backwards or re-entering
    /// `Finished` is fatal.
    pub(crate) fn advance(&mut self, next: TaskState) {
        if next < self.state || (next == self.state && next == TaskState::Finished) {
            fatal(
                self.kind(),
                self.id(),
                &format!("illegal transition {} -> {}", self.state, next),
            );
        }
        self.state = next;
    }

    /// Finish bookkeeping: flip the token, release dependencies and the task
    /// object, hand back the observers to fire.
    pub(crate) fn finish(&mut self) -> Vec<Observer> {
        self.advance(TaskState::Finished);
        self.token.finish();
        self.deps = EventTask::ready();
        // Dropping the task object releases any scoped resources it holds.
        self.task = None;
        std::mem::take(&mut self.observers)
    }
}

impl Drop for TaskEntry {
    fn drop(&mut self) {
        if self.task.is_some() && self.state != TaskState::Finished && !std::thread::panicking()
        {
            fatal(self.kind(), self.id(), "task destroyed before it finished");
        }
    }
}

impl std::fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEntry")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("name", &self.name)
            .field("state", &self.state)
            .field("lane", &self.lane)
            .finish()
    }
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub live: usize,
    pub unfinished: usize,
    pub awaiting_collection: usize,
    pub submitted_total: u64,
    pub finished_total: u64,
    pub collected_total: u64,
}

pub struct Registry {
    entries: HashMap<TaskId, TaskEntry>,
    /// Ids still to be polled, in creation order.
    unfinished: BTreeSet<TaskId>,
    /// Finished ids not yet reclaimed.
    finished: BTreeSet<TaskId>,
    graph: DiGraphMap<TaskId, ()>,
    submitted_total: u64,
    finished_total: u64,
    collected_total: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            unfinished: BTreeSet::new(),
            finished: BTreeSet::new(),
            graph: DiGraphMap::new(),
            submitted_total: 0,
            finished_total: 0,
            collected_total: 0,
        }
    }

    /// Register a freshly constructed task and its dependency edges.
    pub fn insert(&mut self, entry: TaskEntry) {
        let id = entry.id();
        self.graph.add_node(id);
        for dep in entry.dependencies().pending_ids() {
            // A pending dependency is always still registered.
            if self.graph.contains_node(dep) {
                self.graph.add_edge(dep, id, ());
            }
        }
        self.unfinished.insert(id);
        self.entries.insert(id, entry);
        self.submitted_total += 1;
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskEntry> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.entries.get(&id).map(|e| e.state())
    }

    /// Live unfinished ids in creation order.
    pub fn unfinished_ids(&self) -> Vec<TaskId> {
        self.unfinished.iter().copied().collect()
    }

    pub fn unfinished_count(&self) -> usize {
        self.unfinished.len()
    }

    pub fn is_unfinished(&self, id: TaskId) -> bool {
        self.unfinished.contains(&id)
    }

    /// Tasks that declared a dependency on `id`.
    pub fn dependents(&self, id: TaskId) -> Vec<TaskId> {
        if !self.graph.contains_node(id) {
            return Vec::new();
        }
        let mut out: Vec<TaskId> = self
            .graph
            .neighbors_directed(id, Direction::Outgoing)
            .collect();
        out.sort();
        out
    }

    /// Record that `id` moved into `Finished`.
    pub(crate) fn mark_finished(&mut self, id: TaskId) {
        if self.unfinished.remove(&id) {
            self.finished.insert(id);
            self.finished_total += 1;
        }
    }

    /// Reclaim finished entries nobody references any more. Returns the
    /// number of entries removed.
    pub fn collect_garbage(&mut self) -> usize {
        let collectable: Vec<TaskId> = self
            .finished
            .iter()
            .copied()
            .filter(|id| {
                self.entries
                    .get(id)
                    .map(|e| Arc::strong_count(e.token()) == 1)
                    .unwrap_or(true)
            })
            .collect();

        for id in &collectable {
            self.finished.remove(id);
            self.entries.remove(id);
            self.graph.remove_node(*id);
        }
        self.collected_total += collectable.len() as u64;
        collectable.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.entries.len(),
            unfinished: self.unfinished.len(),
            awaiting_collection: self.finished.len(),
            submitted_total: self.submitted_total,
            finished_total: self.finished_total,
            collected_total: self.collected_total,
        }
    }

    /// Graphviz rendering of live tasks and their dependency edges.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph tasks {\n");
        let mut nodes: Vec<TaskId> = self.graph.nodes().collect();
        nodes.sort();
        for id in nodes {
            if let Some(entry) = self.entries.get(&id) {
                let _ = writeln!(
                    out,
                    "    t{} [label=\"{} #{}\\n{} {}\"];",
                    id,
                    entry.name(),
                    id,
                    entry.kind(),
                    entry.state()
                );
            }
        }
        let mut edges: Vec<(TaskId, TaskId)> =
            self.graph.all_edges().map(|(a, b, _)| (a, b)).collect();
        edges.sort();
        for (from, to) in edges {
            let _ = writeln!(out, "    t{} -> t{};", from, to);
        }
        out.push_str("}\n");
        out
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tasks", &self.entries.len())
            .field("unfinished", &self.unfinished.len())
            .field("dependencies", &self.graph.edge_count())
            .finish()
    }
}
