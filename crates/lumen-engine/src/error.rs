//! Error taxonomy shared by every buffer operation.
//!
//! Every variant names the operation that failed and carries the offending
//! argument values, so a scripting-level caller can diagnose misuse without
//! looking at engine internals.

use crate::device::DeviceError;
use crate::layout::{BufferKind, ScalarType};

pub type Result<T, E = BufferError> = std::result::Result<T, E>;

/// Top-level error returned by buffer, registry and batch operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BufferError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Invalid or repeated buffer definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("[{op}] buffer is already defined; definitions are immutable")]
    AlreadyDefined { op: &'static str },

    #[error("[{op}] buffer has no valid definition")]
    NotDefined { op: &'static str },

    #[error("[{op}] scalar type {scalar} is not supported by {kind} buffers")]
    UnsupportedType {
        op: &'static str,
        kind: BufferKind,
        scalar: ScalarType,
    },

    #[error("[{op}] {count} attributes exceed the {kind} maximum of {max}")]
    TooManyAttributes {
        op: &'static str,
        kind: BufferKind,
        count: usize,
        max: usize,
    },

    #[error("[{op}] attribute id {id} is defined more than once")]
    DuplicateAttribute { op: &'static str, id: u32 },

    #[error("[{op}] attribute id {id} has component count {count}, expected 1..={max}")]
    InvalidComponentCount {
        op: &'static str,
        id: u32,
        count: u32,
        max: u32,
    },

    #[error("[{op}] definition contains no attributes")]
    Empty { op: &'static str },

    #[error("[{op}] element count must be positive, got {count}")]
    InvalidElementCount { op: &'static str, count: u32 },

    #[error("[{op}] {bytes} bytes exceed the {kind} limit of {limit} bytes")]
    TooLarge {
        op: &'static str,
        kind: BufferKind,
        bytes: u64,
        limit: u64,
    },

    #[error("[{op}] attribute id {id} is not part of the definition")]
    UnknownAttribute { op: &'static str, id: u32 },

    #[error("[{op}] attribute id {id} has type {found}, expected {expected}")]
    AttributeTypeMismatch {
        op: &'static str,
        id: u32,
        expected: ScalarType,
        found: ScalarType,
    },

    #[error("[{op}] {kind} buffers cannot be used for this operation")]
    UnsupportedKind { op: &'static str, kind: BufferKind },
}

/// Bounds and size violations of upload, download and binding requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("[{op}] input has {supplied} values but {required} are needed to fill whole elements")]
    ShortInput {
        op: &'static str,
        supplied: usize,
        required: usize,
    },

    #[error(
        "[{op}] element offset {element_offset} + {element_count} elements exceeds capacity of {capacity}"
    )]
    OutOfBounds {
        op: &'static str,
        element_offset: u32,
        element_count: u32,
        capacity: u32,
    },

    #[error("[{op}] request covers no data")]
    Empty { op: &'static str },

    #[error("[{op}] source range {start}..{end} is invalid for {len} values")]
    InvalidSourceRange {
        op: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("[{op}] byte offset {offset} is not a multiple of the {alignment}-byte binding alignment")]
    MisalignedBinding {
        op: &'static str,
        offset: u64,
        alignment: u64,
    },
}
