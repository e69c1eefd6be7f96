//! Marker task: finishes once all of its dependencies finished.
//!
//! It submits nothing to any lane. Completion is driven by dependency
//! notifications rather than by polling an operation.

use crate::core::task::{Progress, Task, TaskId, TaskKind};
use crate::orchestration::Context;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct MarkerTask {
    pending: BTreeSet<TaskId>,
}

impl MarkerTask {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Task for MarkerTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Compute
    }

    fn name(&self) -> &'static str {
        "marker"
    }

    fn init(&mut self, cx: &mut Context<'_>) {
        self.pending = cx.dependencies().pending_ids().into_iter().collect();
    }

    fn poll(&mut self) -> Progress {
        Progress::from_done(self.pending.is_empty())
    }

    fn on_dependency_finished(&mut self, id: TaskId) {
        self.pending.remove(&id);
    }
}
