use super::DeviceBufferId;

/// Hard failures reported by a device backend.
///
/// Device errors are never retried by the engine; the requesting operation is
/// aborted and the error is surfaced to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to create device buffer {label:?} ({size} bytes): {reason}")]
    BufferCreation {
        label: String,
        size: u64,
        reason: String,
    },

    #[error("device buffer {0:?} does not exist")]
    UnknownBuffer(DeviceBufferId),

    #[error("device access [{offset}, {offset}+{len}) exceeds buffer {id:?} of {size} bytes")]
    OutOfRange {
        id: DeviceBufferId,
        offset: u64,
        len: u64,
        size: u64,
    },

    #[error("device write at offset {offset} of {len} bytes is not {alignment}-byte aligned")]
    Misaligned { offset: u64, len: u64, alignment: u64 },

    #[error("failed to map device buffer {id:?} for reading: {reason}")]
    MapFailed { id: DeviceBufferId, reason: String },

    #[error("device poll failed: {0}")]
    PollFailed(String),
}
