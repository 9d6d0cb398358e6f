use core::ops::Range;

use super::ScalarType;

/// User-supplied description of one attribute, before layout.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    pub id: u32,
    pub scalar: ScalarType,
    /// Components per element. For block layouts this is an array length.
    pub components: u32,
    /// Integer data is read as normalized floats by vertex fetch.
    pub normalized: bool,
    /// Defaults to `attr{id}` when empty.
    pub name: String,
}

impl AttributeSpec {
    pub fn new(id: u32, scalar: ScalarType, components: u32) -> Self {
        Self {
            id,
            scalar,
            components,
            normalized: false,
            name: String::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }
}

/// A laid-out attribute: its spec plus its place inside an element.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub id: u32,
    pub scalar: ScalarType,
    pub components: u32,
    pub normalized: bool,
    pub name: String,
    /// Byte offset inside an element.
    pub offset: u32,
    /// Byte size inside an element.
    pub size: u32,
}

impl AttributeDescriptor {
    /// Number of scalar values this attribute consumes per element.
    #[inline]
    pub fn lanes(&self) -> u32 {
        self.components * self.scalar.lane_count()
    }

    /// Byte range inside an element.
    #[inline]
    pub fn byte_range(&self) -> Range<u32> {
        self.offset..self.offset + self.size
    }

    /// Byte offset of lane `lane` inside an element.
    ///
    /// Lanes are contiguous: tight attributes pack components back to back
    /// and block aggregates have no inner padding.
    #[inline]
    pub fn lane_offset(&self, lane: u32) -> u32 {
        self.offset + lane * self.scalar.lane_size()
    }
}
