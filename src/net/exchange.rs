//! Multi-phase exchange send task.
//!
//! One task stands for "send this collaborator's boundary data to every
//! neighbor". During init it opens a nested transaction per direction, lets
//! the handler submit the real outgoing work (or a no-op marker), and merges
//! the per-direction events into one aggregate. Direction transactions are
//! seeded with the task's own dependencies merged with the enclosing
//! transaction event. It finishes exactly when that aggregate is ready;
//! individual directions are never awaited.

use crate::config::ExchangeOrdering;
use crate::core::event::EventTask;
use crate::core::task::{Progress, Task, TaskKind};
use crate::elog_debug;
use crate::memory::HostBuffer;
use crate::net::direction::{ExchangeDirection, Neighborhood};
use crate::orchestration::Context;
use crate::tasks::{MarkerTask, SendTask};
use std::collections::BTreeMap;

/// Collaborator side of an exchange: what to send towards each direction.
pub trait ExchangeHandler {
    /// Is there an active outgoing exchange towards `direction`?
    fn has_send_exchange(&self, direction: ExchangeDirection) -> bool;

    /// Submit the outgoing work for `direction`. Runs inside the direction's
    /// transaction, so submitted tasks depend on its seed.
    fn handle_outgoing(&mut self, cx: &mut Context<'_>, direction: ExchangeDirection);

    /// Directions without an exchange still contribute an event.
    fn handle_not_exchanged(&mut self, cx: &mut Context<'_>, direction: ExchangeDirection) {
        let _ = direction;
        cx.submit(MarkerTask::new());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Constructor,
    Init,
    WaitingForSend,
    Finished,
}

pub struct ExchangeSendTask<H> {
    handler: H,
    neighborhood: Neighborhood,
    ordering: Option<ExchangeOrdering>,
    state: ExchangeState,
    aggregate: EventTask,
}

impl<H: ExchangeHandler> ExchangeSendTask<H> {
    pub fn new(handler: H, neighborhood: Neighborhood) -> Self {
        Self {
            handler,
            neighborhood,
            ordering: None,
            state: ExchangeState::Constructor,
            aggregate: EventTask::ready(),
        }
    }

    /// Override the configured seeding of per-direction transactions.
    pub fn with_ordering(mut self, ordering: ExchangeOrdering) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }
}

impl<H: ExchangeHandler + 'static> Task for ExchangeSendTask<H> {
    fn kind(&self) -> TaskKind {
        TaskKind::Communication
    }

    fn name(&self) -> &'static str {
        "exchange_send"
    }

    fn init(&mut self, cx: &mut Context<'_>) {
        self.state = ExchangeState::Init;
        let ordering = self.ordering.unwrap_or(cx.config().exchange_ordering);
        let seed = cx.dependencies().merge(&cx.transaction_event());
        self.aggregate = seed.clone();
        let mut previous = seed.clone();
        let mut active = 0;

        for direction in self.neighborhood.directions() {
            let direction_seed = match ordering {
                ExchangeOrdering::Concurrent => seed.clone(),
                ExchangeOrdering::Serialized => previous.clone(),
            };
            cx.start_transaction(direction_seed);
            if self.handler.has_send_exchange(direction) {
                active += 1;
                self.handler.handle_outgoing(cx, direction);
            } else {
                self.handler.handle_not_exchanged(cx, direction);
            }
            previous = cx.end_transaction();
            self.aggregate += &previous;
        }

        elog_debug!(
            "exchange #{}: {} directions, {} active, ordering={:?}",
            cx.task_id(),
            self.neighborhood.len(),
            active,
            ordering
        );
        self.state = ExchangeState::WaitingForSend;
    }

    fn poll(&mut self) -> Progress {
        match self.state {
            ExchangeState::WaitingForSend if self.aggregate.is_ready() => {
                self.state = ExchangeState::Finished;
                Progress::Done
            }
            ExchangeState::WaitingForSend => Progress::WaitingForCompletion,
            _ => Progress::Pending,
        }
    }
}

/// Handler sending whole host buffers, one per active direction.
pub struct BufferExchange<T> {
    tag: u32,
    outgoing: BTreeMap<ExchangeDirection, HostBuffer<T, 1>>,
}

impl<T: Clone + Send + Sync + 'static> BufferExchange<T> {
    pub fn new(tag: u32) -> Self {
        Self {
            tag,
            outgoing: BTreeMap::new(),
        }
    }

    pub fn with_send(mut self, towards: ExchangeDirection, buffer: HostBuffer<T, 1>) -> Self {
        self.outgoing.insert(towards, buffer);
        self
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn active_directions(&self) -> Vec<ExchangeDirection> {
        self.outgoing.keys().copied().collect()
    }
}

impl<T: Clone + Send + Sync + 'static> ExchangeHandler for BufferExchange<T> {
    fn has_send_exchange(&self, direction: ExchangeDirection) -> bool {
        self.outgoing.contains_key(&direction)
    }

    fn handle_outgoing(&mut self, cx: &mut Context<'_>, direction: ExchangeDirection) {
        if let Some(buffer) = self.outgoing.get(&direction) {
            cx.submit(SendTask::from_buffer(direction, self.tag, buffer.clone()));
        }
    }
}
