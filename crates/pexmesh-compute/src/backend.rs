//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution strategies so that
//! the assembly code in `pexmesh-core` stays scheduling-agnostic.

use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// One matrix contribution: `value` is added at (`row`, `col`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

impl Triplet {
    pub fn new(row: usize, col: usize, value: f64) -> Self {
        Self { row, col, value }
    }
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub threads: usize,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Serial,
    Cpu,
}

/// Kernel run once per work item, appending its contributions to the buffer.
pub type StampFn<'a> = dyn Fn(usize, &mut Vec<Triplet>) + Send + Sync + 'a;

/// Abstraction over compute backends.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Run `stamp_fn` for every work item in `0..items`.
    ///
    /// Items are independent, so implementations may run them concurrently,
    /// but the returned list must be the concatenation of the per-item
    /// buffers in ascending item order.
    fn parallel_stamp(
        &self,
        items: usize,
        stamp_fn: &StampFn<'_>,
    ) -> Result<Vec<Triplet>, ComputeError>;
}
