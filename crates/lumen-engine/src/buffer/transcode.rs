//! Conversion between flat numeric sequences and a buffer's binary layout.
//!
//! Values are consumed element-major: for each element, every selected
//! attribute in ascending id order, every lane of that attribute in order.
//! Aggregates count as their 32-bit lanes (4 per vec4, 16 per mat4 slot).

use core::ops::Range;

use crate::device::DeviceBackend;
use crate::error::{DefinitionError, RangeError, Result};
use crate::layout::{AttributeDescriptor, ScalarType};

use super::BufferObject;

impl BufferObject {
    /// Encodes `values[source]` into the shadow copy and commits the touched
    /// bytes to the device.
    ///
    /// With `attribute` set only that attribute's slots are written; other
    /// bytes of the elements are left untouched. Returns the number of
    /// elements written. Length and bounds are validated before any byte
    /// changes.
    pub fn upload<D: DeviceBackend + ?Sized>(
        &mut self,
        device: &mut D,
        values: &[f64],
        attribute: Option<u32>,
        element_offset: u32,
        source: Option<Range<usize>>,
    ) -> Result<u32> {
        const OP: &str = "Upload";

        let source = source.unwrap_or(0..values.len());
        if source.start > source.end || source.end > values.len() {
            return Err(RangeError::InvalidSourceRange {
                op: OP,
                start: source.start,
                end: source.end,
                len: values.len(),
            }
            .into());
        }
        let values = &values[source];
        if values.is_empty() {
            return Err(RangeError::Empty { op: OP }.into());
        }

        let selected = self.select(OP, attribute)?;
        let lanes: usize = selected.iter().map(|a| a.lanes() as usize).sum();

        let elements = values.len().div_ceil(lanes);
        let required = elements * lanes;
        if values.len() < required {
            return Err(RangeError::ShortInput {
                op: OP,
                supplied: values.len(),
                required,
            }
            .into());
        }
        let elements = self.check_bounds(OP, element_offset, elements)?;

        let stride = self.stride() as usize;
        let first = element_offset as usize;
        let touched = byte_span(&selected, first, elements as usize, stride);

        let shadow = self.shadow_mut();
        let mut input = values.iter().copied();
        for element in first..first + elements as usize {
            let base = element * stride;
            for attr in &selected {
                let lane_size = attr.scalar.lane_size() as usize;
                for lane in 0..attr.lanes() {
                    let at = base + attr.lane_offset(lane) as usize;
                    // Length was checked above.
                    let value = input.next().unwrap_or_default();
                    attr.scalar.encode_lane(value, &mut shadow[at..at + lane_size]);
                }
            }
        }

        log::trace!(
            "upload {:?}: {elements} elements at {element_offset}, bytes {touched:?}",
            self.label()
        );
        self.mark_dirty(touched);
        self.commit(device)?;
        Ok(elements)
    }

    /// Decodes `element_count` elements starting at `element_offset`.
    ///
    /// `element_count` defaults to the rest of the buffer. With
    /// `force_device_read` the bytes are read back from the device, which
    /// blocks until pending device work finishes; otherwise the shadow copy
    /// is decoded, which does not observe device-only writes such as compute
    /// output.
    pub fn download<D: DeviceBackend + ?Sized>(
        &mut self,
        device: &mut D,
        attribute: Option<u32>,
        element_offset: u32,
        element_count: Option<u32>,
        force_device_read: bool,
    ) -> Result<Vec<f64>> {
        const OP: &str = "Download";

        let selected = self.select(OP, attribute)?;
        self.check_bounds(OP, element_offset, 0)?;
        let count = element_count.unwrap_or(self.element_count().saturating_sub(element_offset));
        if count == 0 {
            return Err(RangeError::Empty { op: OP }.into());
        }
        let count = self.check_bounds(OP, element_offset, count as usize)?;

        let stride = self.stride() as usize;
        let first = element_offset as usize;
        let span = first * stride..(first + count as usize) * stride;

        let device_bytes;
        let (bytes, base) = if force_device_read {
            device_bytes = self.read_device(device, span.clone())?;
            (device_bytes.as_slice(), span.start)
        } else {
            (self.shadow(), 0)
        };

        let lanes: usize = selected.iter().map(|a| a.lanes() as usize).sum();
        let mut out = Vec::with_capacity(lanes * count as usize);
        for element in first..first + count as usize {
            let elem_base = element * stride - base;
            for attr in &selected {
                let lane_size = attr.scalar.lane_size() as usize;
                for lane in 0..attr.lanes() {
                    let at = elem_base + attr.lane_offset(lane) as usize;
                    out.push(attr.scalar.decode_lane(&bytes[at..at + lane_size]));
                }
            }
        }
        Ok(out)
    }

    /// Writes `value` into every lane of a `u32` attribute for each element
    /// in `elements`. Used to hand instance-data offsets to shaders.
    pub fn fill_u32_attribute<D: DeviceBackend + ?Sized>(
        &mut self,
        device: &mut D,
        attribute: u32,
        value: u32,
        elements: Range<u32>,
    ) -> Result<u32> {
        const OP: &str = "FillOffset";

        let attr = self
            .definition()
            .attribute(attribute)
            .ok_or(DefinitionError::UnknownAttribute { op: OP, id: attribute })?;
        if attr.scalar != ScalarType::U32 {
            return Err(DefinitionError::AttributeTypeMismatch {
                op: OP,
                id: attribute,
                expected: ScalarType::U32,
                found: attr.scalar,
            }
            .into());
        }
        if elements.is_empty() {
            return Err(RangeError::Empty { op: OP }.into());
        }

        let count = (elements.end - elements.start) as usize;
        self.check_bounds(OP, elements.start, count)?;
        let values = vec![f64::from(value); count * attr.lanes() as usize];
        self.upload(device, &values, Some(attribute), elements.start, None)
    }

    fn select(&self, op: &'static str, attribute: Option<u32>) -> Result<Vec<AttributeDescriptor>> {
        match attribute {
            Some(id) => self
                .definition()
                .attribute(id)
                .cloned()
                .map(|a| vec![a])
                .ok_or_else(|| DefinitionError::UnknownAttribute { op, id }.into()),
            None => Ok(self.definition().attributes().to_vec()),
        }
    }

    fn check_bounds(&self, op: &'static str, element_offset: u32, elements: usize) -> Result<u32> {
        let capacity = self.element_count();
        let count = u32::try_from(elements).unwrap_or(u32::MAX);
        let fits = u64::from(element_offset) + elements as u64 <= u64::from(capacity);
        if !fits {
            return Err(RangeError::OutOfBounds {
                op,
                element_offset,
                element_count: count,
                capacity,
            }
            .into());
        }
        Ok(count)
    }
}

/// Bytes covered by `selected` attributes of `elements` elements from `first`.
fn byte_span(selected: &[AttributeDescriptor], first: usize, elements: usize, stride: usize) -> Range<usize> {
    let lo = selected.iter().map(|a| a.offset as usize).min().unwrap_or(0);
    let hi = selected.iter().map(|a| (a.offset + a.size) as usize).max().unwrap_or(0);
    let last = first + elements - 1;
    first * stride + lo..last * stride + hi
}
