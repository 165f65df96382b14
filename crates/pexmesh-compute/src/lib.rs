//! # pexmesh Compute
//!
//! Compute backend abstraction for the stiffness assembler. This crate
//! provides a [`ComputeBackend`](backend::ComputeBackend) trait that isolates
//! the coupling traversal from how its work items are scheduled.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Notes |
//! |---------|-------------|--------|
//! | Serial | always | Reference implementation, one thread |
//! | CPU (Rayon) | `cpu` (default) | Work items spread over a thread pool |
//!
//! Both backends return stamps concatenated in work-item order, so the
//! assembled matrix does not depend on the backend or the thread count.

pub mod backend;
pub mod serial;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, StampFn, Triplet};
pub use serial::SerialBackend;

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
