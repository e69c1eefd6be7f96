//! The manager: task submission, the cooperative tick loop and the blocking
//! points offered to collaborators.
//!
//! Bookkeeping lives entirely on the thread that owns the [`Manager`]. Work
//! runs on lanes; the manager only observes completion by polling tasks
//! from [`Manager::tick`], which is the sole place where tasks change state,
//! dependents hear about finished dependencies and observers fire.
//!
//! # Example
//!
//! ```ignore
//! use eventsys::{Manager, SchedulerConfig};
//! use eventsys::memory::{DataSpace, DeviceBuffer};
//! use eventsys::tasks::FillTask;
//!
//! let mut manager = Manager::new(SchedulerConfig::default())?;
//! let buffer = DeviceBuffer::<f32, 1>::new(DataSpace::new([1024]));
//!
//! manager.start_transaction(EventTask::ready());
//! manager.submit(FillTask::new(buffer.clone(), 1.0));
//! let done = manager.end_transaction();
//! manager.wait(&done);
//! ```

use crate::config::SchedulerConfig;
use crate::core::event::{EventTask, TaskToken};
use crate::core::registry::{Registry, RegistryStats, TaskEntry};
use crate::core::task::{Progress, Task, TaskId, TaskKind, TaskState};
use crate::error::{fatal, fatal_scheduler, Error, Result};
use crate::net::{ExchangeDirection, LoopbackTransport, Transport};
use crate::orchestration::lanes::{ChannelRole, LaneEvent, LaneId, LaneSet, LaneStats};
use crate::orchestration::transaction::TransactionStack;
use crate::tasks::MarkerTask;
use crate::{elog, elog_debug, elog_trace, elog_warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub registry: RegistryStats,
    pub lanes: Vec<LaneStats>,
    pub transaction_depth: usize,
}

pub struct Manager {
    config: SchedulerConfig,
    registry: Registry,
    transactions: TransactionStack,
    lanes: LaneSet,
    transport: Arc<dyn Transport>,
}

impl Manager {
    /// Create a manager with its device lanes and a loopback transport.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let transport = Arc::new(LoopbackTransport::new(config.transport_latency())?);
        Self::with_transport(config, transport)
    }

    /// Create a manager that exchanges messages through `transport`.
    pub fn with_transport(config: SchedulerConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let lanes = LaneSet::new(config.device_lanes)?;
        elog!(
            "Manager started: {} device lanes, ordering={:?}",
            config.device_lanes,
            config.exchange_ordering
        );
        Ok(Self {
            config,
            registry: Registry::new(),
            transactions: TransactionStack::new(),
            lanes,
            transport,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn lanes(&self) -> &LaneSet {
        &self.lanes
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Submit a task depending on the current transaction baseline.
    pub fn submit<T: Task + 'static>(&mut self, task: T) -> EventTask {
        let deps = self.transactions.baseline();
        self.register(Box::new(task), deps)
    }

    /// Submit a task with an explicit dependency, overriding the baseline.
    pub fn submit_after<T: Task + 'static>(&mut self, task: T, deps: EventTask) -> EventTask {
        self.register(Box::new(task), deps)
    }

    fn register(&mut self, mut task: Box<dyn Task>, deps: EventTask) -> EventTask {
        let id = TaskId::next();
        let kind = task.kind();
        let name = task.name();
        let token = TaskToken::new(id, kind);
        let event = EventTask::from_token(Arc::clone(&token));

        self.registry
            .insert(TaskEntry::new(token, name, deps.clone()));
        if kind == TaskKind::Communication {
            self.entry_mut(id).advance(TaskState::Initialized);
        }
        elog_debug!(
            "submit {} #{} ({}) deps={:?}",
            name,
            id,
            kind,
            deps.pending_ids()
        );

        let lane = {
            let mut cx = Context {
                manager: self,
                id,
                kind,
                deps,
                lane: None,
            };
            task.init(&mut cx);
            cx.lane
        };

        let entry = self.entry_mut(id);
        if let Some(lane) = lane {
            entry.set_lane(lane);
        }
        entry.advance(TaskState::Queued);
        entry.attach(task);

        self.transactions.record(&event);
        event
    }

    fn entry_mut(&mut self, id: TaskId) -> &mut TaskEntry {
        match self.registry.get_mut(id) {
            Some(entry) => entry,
            None => fatal_scheduler(&format!("task {} vanished from the registry", id)),
        }
    }

    // ---- transactions ----

    /// Open a transaction scope seeded with `seed`.
    pub fn start_transaction(&mut self, seed: EventTask) {
        elog_trace!("start_transaction depth={}", self.transactions.depth());
        self.transactions.start(seed);
    }

    /// Close the innermost scope and return the event standing for its seed
    /// and every task created inside it.
    pub fn end_transaction(&mut self) -> EventTask {
        let event = self.transactions.end();
        elog_trace!(
            "end_transaction depth={} pending={:?}",
            self.transactions.depth(),
            event.pending_ids()
        );
        event
    }

    /// Seed and tasks of the innermost open scope so far.
    pub fn transaction_event(&self) -> EventTask {
        self.transactions.current()
    }

    /// Run `f` inside a transaction seeded with `seed`.
    pub fn transaction<F>(&mut self, seed: EventTask, f: F) -> EventTask
    where
        F: FnOnce(&mut Manager),
    {
        self.start_transaction(seed);
        f(self);
        self.end_transaction()
    }

    pub fn transaction_depth(&self) -> usize {
        self.transactions.depth()
    }

    // ---- tick loop ----

    /// Poll every live unfinished task once, in creation order. Returns the
    /// number of tasks that finished during this tick.
    pub fn tick(&mut self) -> usize {
        let mut finished = 0;
        for id in self.registry.unfinished_ids() {
            let Some(entry) = self.registry.get_mut(id) else {
                continue;
            };
            if let Some(lane) = entry.lane() {
                if let Ok(lane) = self.lanes.get(lane) {
                    if let Some(fault) = lane.fault() {
                        fatal(
                            entry.kind(),
                            id,
                            &format!("operation on {} faulted: {}", lane.id(), fault),
                        );
                    }
                }
            }
            let Some(task) = entry.task_mut() else {
                continue;
            };

            match task.poll() {
                Progress::Pending => {}
                Progress::WaitingForCompletion => {
                    if entry.state() < TaskState::WaitingForCompletion {
                        entry.advance(TaskState::WaitingForCompletion);
                        elog_trace!("task #{} waiting for completion", id);
                    }
                }
                Progress::Done => {
                    let observers = entry.finish();
                    self.registry.mark_finished(id);
                    finished += 1;
                    elog_trace!("task #{} finished", id);

                    for dependent in self.registry.dependents(id) {
                        if let Some(task) = self
                            .registry
                            .get_mut(dependent)
                            .and_then(|e| e.task_mut())
                        {
                            task.on_dependency_finished(id);
                        }
                    }
                    for observer in observers {
                        observer(id);
                    }
                }
            }
        }
        self.registry.collect_garbage();
        finished
    }

    fn idle(&self) {
        let backoff = self.config.idle_backoff();
        if backoff.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(backoff);
        }
    }

    fn check_waitable(&self, event: &EventTask) {
        if let Some(id) = event
            .pending_ids()
            .into_iter()
            .find(|id| !self.registry.is_unfinished(*id))
        {
            fatal_scheduler(&format!(
                "waiting on task {} which this manager does not track",
                id
            ));
        }
    }

    /// Is the task behind `id` still unfinished?
    pub fn is_unfinished(&self, id: TaskId) -> bool {
        self.registry.is_unfinished(id)
    }

    /// Lifecycle state of a live task. `None` once collected.
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.registry.state(id)
    }

    /// Spin the tick loop until `event` is ready.
    pub fn wait(&mut self, event: &EventTask) {
        self.check_waitable(event);
        while !event.is_ready() {
            if self.tick() == 0 && !event.is_ready() {
                self.idle();
            }
        }
    }

    /// Like [`Manager::wait`], giving up after `timeout`. Work already
    /// submitted keeps running.
    pub fn wait_timeout(&mut self, event: &EventTask, timeout: Duration) -> Result<()> {
        self.check_waitable(event);
        let deadline = Instant::now() + timeout;
        while !event.is_ready() {
            if Instant::now() >= deadline {
                elog_warn!(
                    "wait timed out after {:?}, pending={:?}",
                    timeout,
                    event.pending_ids()
                );
                return Err(Error::Timeout(timeout));
            }
            if self.tick() == 0 && !event.is_ready() {
                self.idle();
            }
        }
        Ok(())
    }

    /// Spin until every submitted task finished.
    pub fn wait_all(&mut self) {
        while self.registry.unfinished_count() > 0 {
            if self.tick() == 0 && self.registry.unfinished_count() > 0 {
                self.idle();
            }
        }
    }

    /// `wait_all` for drop. Once only tasks waiting on an absent peer are
    /// left, the transport is shut down so they give up instead of blocking
    /// the drop forever.
    fn drain(&mut self) {
        let mut released = false;
        while self.registry.unfinished_count() > 0 {
            if self.tick() > 0 || self.registry.unfinished_count() == 0 {
                continue;
            }
            if !released {
                let stranded = self.stranded_receives();
                if stranded.len() == self.registry.unfinished_count() {
                    elog_warn!(
                        "Abandoning {} receives with no matching send: {:?}",
                        stranded.len(),
                        stranded
                    );
                    self.transport.shutdown();
                    released = true;
                    continue;
                }
            }
            self.idle();
        }
    }

    fn stranded_receives(&self) -> Vec<TaskId> {
        self.registry
            .unfinished_ids()
            .into_iter()
            .filter(|id| {
                self.registry
                    .get(*id)
                    .and_then(|e| e.task())
                    .is_some_and(|t| t.awaits_peer())
            })
            .collect()
    }

    // ---- completion notification ----

    /// Register a single-fire callback for the completion of `id`. Fires
    /// right away if the task already finished.
    pub fn observe<F>(&mut self, id: TaskId, callback: F)
    where
        F: FnOnce(TaskId) + 'static,
    {
        match self.registry.get_mut(id) {
            Some(entry) if entry.state() == TaskState::Finished => callback(id),
            Some(entry) => entry.add_observer(Box::new(callback)),
            None => fatal_scheduler(&format!("observe on unknown or collected task {}", id)),
        }
    }

    /// Fire `callback` once `event` is ready. Returns the marker task's event.
    pub fn notify_when_ready<F>(&mut self, event: &EventTask, callback: F) -> EventTask
    where
        F: FnOnce(TaskId) + 'static,
    {
        let marker = self.submit_after(MarkerTask::new(), event.clone());
        if let Some(id) = marker.task_id() {
            self.observe(id, callback);
        }
        marker
    }

    // ---- lanes and diagnostics ----

    /// Stop a lane from accepting further work.
    pub fn close_lane(&mut self, lane: LaneId) -> Result<()> {
        self.lanes.close(lane)
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            registry: self.registry.stats(),
            lanes: self.lanes.stats(),
            transaction_depth: self.transactions.depth(),
        }
    }

    /// Graphviz rendering of the live dependency graph.
    pub fn dependency_dot(&self) -> String {
        self.registry.to_dot()
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let outstanding = self.registry.unfinished_count();
        if outstanding > 0 {
            elog!("Draining {} outstanding tasks", outstanding);
            self.drain();
        }
        if self.transactions.depth() > 1 {
            elog_warn!(
                "Manager dropped with {} open transactions",
                self.transactions.depth() - 1
            );
        }
        self.registry.collect_garbage();
        self.transport.shutdown();
        elog!("Manager shut down: {:?}", self.registry.stats());
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("registry", &self.registry)
            .field("lanes", &self.lanes)
            .field("transactions", &self.transactions.depth())
            .finish()
    }
}

/// Handle given to [`Task::init`]: the submitting task's identity and
/// dependencies plus access to lanes, transactions and nested submission.
pub struct Context<'a> {
    manager: &'a mut Manager,
    id: TaskId,
    kind: TaskKind,
    deps: EventTask,
    lane: Option<LaneId>,
}

impl Context<'_> {
    pub fn task_id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Event the task depends on.
    pub fn dependencies(&self) -> &EventTask {
        &self.deps
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.manager.config
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.manager.transport()
    }

    pub fn next_device_lane(&mut self) -> LaneId {
        self.manager.lanes.next_device_lane()
    }

    pub fn channel_lane(&mut self, direction: ExchangeDirection, role: ChannelRole) -> LaneId {
        match self.manager.lanes.channel_lane(direction, role) {
            Ok(lane) => lane,
            Err(e) => fatal(
                self.kind,
                self.id,
                &format!("cannot open channel lane towards {}: {}", direction, e),
            ),
        }
    }

    /// Bind the task to `lane` without queuing anything on it.
    pub fn bind_lane(&mut self, lane: LaneId) {
        self.lane.get_or_insert(lane);
    }

    /// Queue `work` on `lane`, fenced on the task's dependencies.
    pub fn enqueue<F>(&mut self, lane: LaneId, work: F) -> LaneEvent
    where
        F: FnOnce() + Send + 'static,
    {
        let (kind, id) = (self.kind, self.id);
        let target = match self.manager.lanes.get_mut(lane) {
            Ok(target) => target,
            Err(e) => fatal(kind, id, &e.to_string()),
        };
        if target.is_closed() {
            fatal(kind, id, &format!("submit onto closed {}", lane));
        }
        self.lane.get_or_insert(lane);
        target.submit(self.deps.clone(), Box::new(work))
    }

    /// Submit a nested task depending on the current baseline.
    pub fn submit<T: Task + 'static>(&mut self, task: T) -> EventTask {
        self.manager.submit(task)
    }

    pub fn submit_after<T: Task + 'static>(&mut self, task: T, deps: EventTask) -> EventTask {
        self.manager.submit_after(task, deps)
    }

    pub fn start_transaction(&mut self, seed: EventTask) {
        self.manager.start_transaction(seed);
    }

    pub fn end_transaction(&mut self) -> EventTask {
        self.manager.end_transaction()
    }

    pub fn transaction_event(&self) -> EventTask {
        self.manager.transaction_event()
    }
}
