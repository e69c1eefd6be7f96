//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Building managers with fast, deterministic configs
//! - A gate task finished from the test thread
//! - A listener task recording dependency notifications
//! - Wide plain-data values for fill policy tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eventsys::config::{SchedulerConfig, TransportConfig};
use eventsys::net::LoopbackTransport;
use eventsys::{Context, Manager, Progress, Task, TaskId, TaskKind};

/// Config with no idle backoff so waits spin quickly.
pub fn test_config(device_lanes: usize) -> SchedulerConfig {
    SchedulerConfig {
        device_lanes,
        idle_backoff_us: 0,
        transport: TransportConfig { latency_us: 0 },
        ..Default::default()
    }
}

pub fn manager(device_lanes: usize) -> Manager {
    Manager::new(test_config(device_lanes)).expect("Failed to create manager")
}

/// Manager plus a handle on its transport for per-direction latency.
pub fn manager_with_loopback(config: SchedulerConfig) -> (Manager, Arc<LoopbackTransport>) {
    let transport = Arc::new(
        LoopbackTransport::new(Duration::from_micros(config.transport.latency_us))
            .expect("Failed to create transport"),
    );
    let manager = Manager::with_transport(config, transport.clone())
        .expect("Failed to create manager");
    (manager, transport)
}

/// Task that stays pending until its gate is opened.
pub struct GateTask {
    open: Arc<AtomicBool>,
}

impl GateTask {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let open = Arc::new(AtomicBool::new(false));
        (
            Self {
                open: Arc::clone(&open),
            },
            open,
        )
    }
}

impl Task for GateTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Compute
    }

    fn name(&self) -> &'static str {
        "gate"
    }

    fn init(&mut self, _cx: &mut Context<'_>) {}

    fn poll(&mut self) -> Progress {
        Progress::from_done(self.open.load(Ordering::Acquire))
    }
}

/// Task that finishes once it heard about a finished dependency, recording
/// every notification it receives.
pub struct ListenerTask {
    heard: Arc<Mutex<Vec<TaskId>>>,
}

impl ListenerTask {
    pub fn new() -> (Self, Arc<Mutex<Vec<TaskId>>>) {
        let heard = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                heard: Arc::clone(&heard),
            },
            heard,
        )
    }
}

impl Task for ListenerTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Compute
    }

    fn name(&self) -> &'static str {
        "listener"
    }

    fn init(&mut self, _cx: &mut Context<'_>) {}

    fn poll(&mut self) -> Progress {
        Progress::from_done(!self.heard.lock().unwrap().is_empty())
    }

    fn on_dependency_finished(&mut self, id: TaskId) {
        self.heard.lock().unwrap().push(id);
    }
}

/// Opaque value of `N` bytes.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Blob<const N: usize>(pub [u8; N]);

impl<const N: usize> Blob<N> {
    pub fn pattern(seed: u8) -> Self {
        let mut bytes = [0u8; N];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = seed.wrapping_add(i as u8);
        }
        Self(bytes)
    }
}

impl<const N: usize> Default for Blob<N> {
    fn default() -> Self {
        Self([0; N])
    }
}
