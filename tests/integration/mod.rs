//! Integration test suite for eventsys.
//!
//! These tests drive the public scheduler API end to end: tasks are
//! submitted through a `Manager`, their operations run on real lane
//! threads, and messages travel over the loopback transport.
//!
//! # Test Categories
//!
//! - `transactions`: Transaction brackets and event merging
//! - `completion`: Completion notification and waiting
//! - `fill_copy`: Fill and copy ordering on device lanes
//! - `exchange`: Multi-direction exchange sends
//!
//! # CI Compatibility
//!
//! Nothing here touches the network or the user's home directory. Timing
//! assertions use generous bounds.

mod fixtures;

mod completion;
mod exchange;
mod fill_copy;
mod transactions;
