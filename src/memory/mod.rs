//! Buffers that tasks operate on.

pub mod buffer;
pub mod data_space;

pub use buffer::{Buffer, DataBox, DataBoxMut, Device, DeviceBuffer, Host, HostBuffer, Location};
pub use data_space::DataSpace;
