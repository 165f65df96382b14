//! Single-threaded reference backend.

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, StampFn, Triplet};

/// Runs every work item in order on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Serial".into(),
            backend_type: BackendType::Serial,
            threads: 1,
        }
    }

    fn parallel_stamp(
        &self,
        items: usize,
        stamp_fn: &StampFn<'_>,
    ) -> Result<Vec<Triplet>, ComputeError> {
        let mut out = Vec::new();
        for item in 0..items {
            stamp_fn(item, &mut out);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_preserves_item_order() {
        let backend = SerialBackend;
        let out = backend
            .parallel_stamp(3, &|item, buf| {
                buf.push(Triplet::new(item, item, item as f64));
                buf.push(Triplet::new(item, 0, -1.0));
            })
            .unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], Triplet::new(0, 0, 0.0));
        assert_eq!(out[4], Triplet::new(2, 2, 2.0));
        assert_eq!(backend.device_info().threads, 1);
    }
}
