//! Concrete tasks.
//!
//! Each kind is a separate [`Task`](crate::core::Task) implementation chosen
//! at construction: kernel launches, copies, fills, markers and
//! point-to-point messages.

mod compute;
mod copy;
mod fill;
mod marker;
mod message;

pub use compute::ComputeTask;
pub use copy::{CopyDirection, CopyTask};
pub use fill::{FillPolicy, FillTask, StagingBuffer};
pub use marker::MarkerTask;
pub use message::{RecvTask, SendTask};
