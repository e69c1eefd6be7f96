//! Core scheduling model.
//!
//! Task identities and lifecycle, the mergeable event handles that stand for
//! "these tasks must finish", and the registry of live tasks.

pub mod event;
pub mod registry;
pub mod task;

pub use event::{EventTask, TaskToken};
pub use registry::{Registry, RegistryStats};
pub use task::{Progress, Task, TaskId, TaskKind, TaskState};
