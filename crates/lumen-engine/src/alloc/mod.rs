//! Stable-position range allocation.

mod range;

pub use range::RangeAllocator;
