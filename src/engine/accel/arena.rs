//! Compute arena for accelerated scopes
//!
//! One fixed-capacity `f32` region is reserved when the scope is created and
//! subdivided by a bump allocator. Allocations are never freed individually;
//! the whole region goes away with the scope. Tensors refer to their storage
//! through [`ArenaSlice`] handles, and every access is bounds-checked.

use crate::error::{ServeResult, TensorServeError};

/// Byte alignment of every allocation offset
pub const ARENA_ALIGNMENT: usize = 64;

const F32_BYTES: usize = std::mem::size_of::<f32>();
const ALIGNMENT_ELEMS: usize = ARENA_ALIGNMENT / F32_BYTES;

/// Handle to a region of a [`ComputeArena`], in elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSlice {
    offset: usize,
    len: usize,
}

impl ArenaSlice {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Bump-allocated arena owning every buffer of one accelerated scope
#[derive(Debug)]
pub struct ComputeArena {
    /// Initialized prefix; `len()` is the bump pointer. Never grows past
    /// `capacity` so the reservation is never reallocated.
    buffer: Vec<f32>,
    /// Capacity in elements
    capacity: usize,
}

impl ComputeArena {
    /// Reserve an arena of `capacity_bytes`
    ///
    /// # Errors
    /// - `ArenaAllocationFailed` if the capacity holds no value or the
    ///   reservation is refused by the allocator
    pub fn new(capacity_bytes: usize) -> ServeResult<Self> {
        let capacity = capacity_bytes / F32_BYTES;
        if capacity == 0 {
            return Err(TensorServeError::ArenaAllocationFailed(format!(
                "arena capacity of {} bytes cannot hold a value",
                capacity_bytes
            )));
        }

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(capacity).map_err(|e| {
            TensorServeError::ArenaAllocationFailed(format!(
                "could not reserve {} bytes: {}",
                capacity_bytes, e
            ))
        })?;

        tracing::debug!(
            "ComputeArena created: {} MB ({} bytes)",
            capacity_bytes / 1024 / 1024,
            capacity_bytes
        );

        Ok(Self { buffer, capacity })
    }

    /// Allocate `len` zeroed elements at the next aligned offset.
    ///
    /// A request larger than the whole arena is `InvalidRequest`; running out
    /// of the remaining space is `ArenaAllocationFailed`.
    pub fn allocate(&mut self, len: usize) -> ServeResult<ArenaSlice> {
        if len > self.capacity {
            return Err(TensorServeError::InvalidRequest(format!(
                "tensor of {} bytes exceeds the {} byte compute arena",
                len.saturating_mul(F32_BYTES),
                self.capacity_bytes()
            )));
        }
        let offset = Self::align_up(self.buffer.len(), ALIGNMENT_ELEMS);
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.capacity)
            .ok_or_else(|| {
                TensorServeError::ArenaAllocationFailed(format!(
                    "arena exhausted: need {} bytes, {} of {} bytes free",
                    len.saturating_mul(F32_BYTES),
                    self.remaining_bytes(),
                    self.capacity_bytes()
                ))
            })?;

        self.buffer.resize(end, 0.0);

        tracing::trace!(
            "Arena allocated {} bytes at offset {} (alignment={})",
            len * F32_BYTES,
            offset * F32_BYTES,
            ARENA_ALIGNMENT
        );

        Ok(ArenaSlice { offset, len })
    }

    /// Allocate a region and copy `values` into it
    pub fn allocate_from(&mut self, values: &[f32]) -> ServeResult<ArenaSlice> {
        let slice = self.allocate(values.len())?;
        self.view_mut(slice)?.copy_from_slice(values);
        Ok(slice)
    }

    pub fn view(&self, slice: ArenaSlice) -> ServeResult<&[f32]> {
        self.buffer
            .get(slice.offset..slice.end())
            .ok_or_else(|| out_of_bounds(slice, self.buffer.len()))
    }

    pub fn view_mut(&mut self, slice: ArenaSlice) -> ServeResult<&mut [f32]> {
        let used = self.buffer.len();
        self.buffer
            .get_mut(slice.offset..slice.end())
            .ok_or_else(|| out_of_bounds(slice, used))
    }

    /// Copy a region out into an owned buffer
    pub fn read_to_vec(&self, slice: ArenaSlice) -> ServeResult<Vec<f32>> {
        Ok(self.view(slice)?.to_vec())
    }

    /// Borrow the inputs of a graph node read-only and its output mutably
    ///
    /// Every input must end at or before the output's offset, which holds for
    /// any node whose output was allocated after its inputs.
    pub fn split_for_node(
        &mut self,
        inputs: &[ArenaSlice],
        output: ArenaSlice,
    ) -> ServeResult<(Vec<&[f32]>, &mut [f32])> {
        if let Some(bad) = inputs.iter().find(|input| input.end() > output.offset) {
            return Err(crate::internal_error!(
                "node input {:?} overlaps or follows output {:?}",
                bad,
                output
            ));
        }
        if output.end() > self.buffer.len() {
            return Err(out_of_bounds(output, self.buffer.len()));
        }

        let (head, tail) = self.buffer.split_at_mut(output.offset);
        let head: &[f32] = head;
        let out = &mut tail[..output.len];
        let ins = inputs
            .iter()
            .map(|input| &head[input.offset..input.end()])
            .collect();
        Ok((ins, out))
    }

    pub fn used_bytes(&self) -> usize {
        self.buffer.len() * F32_BYTES
    }

    pub fn remaining_bytes(&self) -> usize {
        (self.capacity - self.buffer.len()) * F32_BYTES
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity * F32_BYTES
    }

    /// Align offset up to alignment
    ///
    /// Alignment must be a power of 2.
    fn align_up(offset: usize, alignment: usize) -> usize {
        (offset + alignment - 1) & !(alignment - 1)
    }
}

fn out_of_bounds(slice: ArenaSlice, used: usize) -> TensorServeError {
    crate::internal_error!(
        "arena slice {:?} out of bounds ({} elements in use)",
        slice,
        used
    )
}
