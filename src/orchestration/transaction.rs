//! Transaction bracket.
//!
//! A transaction scope carries a baseline event every task created inside it
//! depends on by default, and collects the events of those tasks so closing
//! the scope yields one handle standing for all of them. Scopes nest; the
//! stack always holds a root scope that cannot be popped.

use crate::core::event::EventTask;
use crate::error::fatal_scheduler;

#[derive(Debug)]
struct Scope {
    seed: EventTask,
    collected: EventTask,
}

impl Scope {
    fn new(seed: EventTask) -> Self {
        Self {
            seed,
            collected: EventTask::ready(),
        }
    }
}

#[derive(Debug)]
pub struct TransactionStack {
    scopes: Vec<Scope>,
}

impl TransactionStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(EventTask::ready())],
        }
    }

    /// Open a nested scope seeded with `seed`.
    pub fn start(&mut self, seed: EventTask) {
        self.scopes.push(Scope::new(seed));
    }

    /// Close the innermost scope and return its seed merged with every event
    /// recorded in it. The result is also recorded in the enclosing scope.
    pub fn end(&mut self) -> EventTask {
        if self.scopes.len() <= 1 {
            fatal_scheduler("end_transaction without a matching start_transaction");
        }
        let event = match self.scopes.pop() {
            Some(scope) => scope.seed.merge(&scope.collected),
            None => fatal_scheduler("transaction stack is empty"),
        };
        self.record(&event);
        event
    }

    /// Default dependency for tasks created right now.
    pub fn baseline(&self) -> EventTask {
        self.scopes
            .last()
            .map(|s| s.seed.clone())
            .unwrap_or_default()
    }

    /// Seed of the innermost scope merged with what was recorded so far.
    pub fn current(&self) -> EventTask {
        self.scopes
            .last()
            .map(|s| s.seed.merge(&s.collected))
            .unwrap_or_default()
    }

    /// Add a task event to the innermost scope. The root scope keeps nothing:
    /// nobody can close it, so holding events there would only delay their
    /// collection.
    pub fn record(&mut self, event: &EventTask) {
        if self.scopes.len() <= 1 {
            return;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.collected += event;
        }
    }

    /// Number of open scopes, the root included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for TransactionStack {
    fn default() -> Self {
        Self::new()
    }
}
