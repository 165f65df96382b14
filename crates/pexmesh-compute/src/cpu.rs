//! CPU compute backend using Rayon for shared-memory parallelism.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, StampFn, Triplet};

/// CPU backend that parallelises work items across threads via Rayon.
///
/// Each item fills its own buffer; buffers are concatenated in item order
/// afterwards, so no locking happens inside the stamping loop.
pub struct CpuBackend {
    pool: Option<ThreadPool>,
    num_threads: usize,
}

impl CpuBackend {
    /// Create a new CPU backend on Rayon's global pool.
    pub fn new() -> Self {
        Self {
            pool: None,
            num_threads: rayon::current_num_threads(),
        }
    }

    /// Create a CPU backend with a dedicated pool of `num_threads` threads.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool: Some(pool),
        })
    }

    fn run(&self, items: usize, stamp_fn: &StampFn<'_>) -> Vec<Triplet> {
        let buffers: Vec<Vec<Triplet>> = (0..items)
            .into_par_iter()
            .map(|item| {
                let mut buf = Vec::new();
                stamp_fn(item, &mut buf);
                buf
            })
            .collect();
        buffers.concat()
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            threads: self.num_threads,
        }
    }

    fn parallel_stamp(
        &self,
        items: usize,
        stamp_fn: &StampFn<'_>,
    ) -> Result<Vec<Triplet>, ComputeError> {
        Ok(match &self.pool {
            Some(pool) => pool.install(|| self.run(items, stamp_fn)),
            None => self.run(items, stamp_fn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::SerialBackend;

    #[test]
    fn test_cpu_matches_serial_order() {
        let kernel = |item: usize, buf: &mut Vec<Triplet>| {
            for k in 0..(item % 4) {
                buf.push(Triplet::new(item, k, (item * 10 + k) as f64));
            }
        };
        let serial = SerialBackend.parallel_stamp(257, &kernel).unwrap();
        let cpu = CpuBackend::with_threads(4).unwrap().parallel_stamp(257, &kernel).unwrap();
        assert_eq!(serial, cpu);
    }

    #[test]
    fn test_device_info_reports_threads() {
        let backend = CpuBackend::with_threads(2).unwrap();
        let info = backend.device_info();
        assert_eq!(info.backend_type, BackendType::Cpu);
        assert_eq!(info.threads, 2);
    }
}
