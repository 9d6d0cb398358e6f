use std::collections::{BTreeMap, BTreeSet};

use crate::error::RangeError;

/// Free-list allocator over one growable backing sequence.
///
/// Live ranges never move: growth appends to the tail and frees only ever
/// shrink the tail or turn a range into a hole. Holes are reused best-fit.
///
/// Invariants kept after every call:
/// - no two free ranges are adjacent
/// - `free_len() + live_len() == len()`
///
/// Freeing a range that is not live is a contract violation and is not
/// detected.
#[derive(Debug, Clone)]
pub struct RangeAllocator<T> {
    data: Vec<T>,

    /// position -> size
    free_by_pos: BTreeMap<usize, usize>,
    /// (size, position), ordered for best-fit lookups
    free_by_size: BTreeSet<(usize, usize)>,

    free_len: usize,
}

impl<T: Clone + Default> Default for RangeAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Default> RangeAllocator<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            free_by_pos: BTreeMap::new(),
            free_by_size: BTreeSet::new(),
            free_len: 0,
        }
    }

    /// Reserves `n` contiguous slots and returns the first position.
    ///
    /// Uses the smallest free range that fits and splits off the remainder;
    /// otherwise grows the backing sequence by exactly `n`.
    pub fn allocate(&mut self, n: usize) -> Result<usize, RangeError> {
        if n == 0 {
            return Err(RangeError::Empty { op: "Allocate" });
        }

        if let Some(&(size, pos)) = self.free_by_size.range((n, 0)..).next() {
            self.remove_free(pos, size);
            if size > n {
                self.insert_free(pos + n, size - n);
            }
            return Ok(pos);
        }

        let pos = self.data.len();
        self.data.resize(pos + n, T::default());
        log::debug!("range allocator grew to {} slots", self.data.len());
        Ok(pos)
    }

    /// Returns `n` slots starting at `offset` to the allocator.
    pub fn free(&mut self, offset: usize, n: usize) {
        if n == 0 {
            return;
        }

        if offset + n == self.data.len() {
            self.data.truncate(offset);
            // The hole that now touches the tail is reclaimed too.
            if let Some((&pos, &size)) = self.free_by_pos.iter().next_back() {
                if pos + size == self.data.len() {
                    self.remove_free(pos, size);
                    self.data.truncate(pos);
                }
            }
            return;
        }

        let mut start = offset;
        let mut size = n;

        let before = self
            .free_by_pos
            .range(..offset)
            .next_back()
            .map(|(&p, &s)| (p, s));
        if let Some((p, s)) = before.filter(|&(p, s)| p + s == offset) {
            self.remove_free(p, s);
            start = p;
            size += s;
        }

        if let Some(&s) = self.free_by_pos.get(&(offset + n)) {
            self.remove_free(offset + n, s);
            size += s;
        }

        self.insert_free(start, size);
    }

    /// Drops every range, live or free.
    pub fn clear(&mut self) {
        self.data.clear();
        self.free_by_pos.clear();
        self.free_by_size.clear();
        self.free_len = 0;
    }

    fn insert_free(&mut self, pos: usize, size: usize) {
        self.free_by_pos.insert(pos, size);
        self.free_by_size.insert((size, pos));
        self.free_len += size;
    }

    fn remove_free(&mut self, pos: usize, size: usize) {
        self.free_by_pos.remove(&pos);
        self.free_by_size.remove(&(size, pos));
        self.free_len -= size;
    }
}

impl<T> RangeAllocator<T> {
    /// Length of the backing sequence.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn free_len(&self) -> usize {
        self.free_len
    }

    #[inline]
    pub fn live_len(&self) -> usize {
        self.data.len() - self.free_len
    }

    /// Free ranges as `(position, size)`, ordered by position.
    pub fn free_ranges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.free_by_pos.iter().map(|(&p, &s)| (p, s))
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}
