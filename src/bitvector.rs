use bitvec::prelude::*;

use crate::error::{BitError, SieveError};

/// Bit-packed boolean storage, eight logical bits per byte.
///
/// Bit `i` lives in byte `i / 8` at offset `i % 8` (least significant bit
/// first). Every access is bounds-checked against the logical length; the
/// padding bits of the last byte are never addressable. Storage is released
/// when the vector is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitVector {
    bits: BitVec<u8, Lsb0>,
}

impl BitVector {
    /// Allocates `ceil(len / 8)` zeroed bytes for `len` logical bits.
    pub fn new(len: usize) -> Result<Self, SieveError> {
        if len > BitSlice::<u8, Lsb0>::MAX_BITS {
            return Err(SieveError::Allocation { bits: len });
        }
        let bytes = len.div_ceil(8);
        let mut storage: Vec<u8> = Vec::new();
        storage
            .try_reserve_exact(bytes)
            .map_err(|_| SieveError::Allocation { bits: len })?;
        storage.resize(bytes, 0);

        let mut bits = BitVec::from_vec(storage);
        bits.truncate(len);
        Ok(Self { bits })
    }

    /// Logical length in bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Bytes of backing storage.
    pub fn storage_bytes(&self) -> usize {
        self.bits.as_raw_slice().len()
    }

    pub fn fill(&mut self, value: bool) {
        self.bits.fill(value);
    }

    /// Sets bit `index` to `value`, which must be 0 or 1.
    pub fn set(&mut self, index: usize, value: u8) -> Result<(), BitError> {
        self.check(index)?;
        match value {
            0 => self.bits.set(index, false),
            1 => self.bits.set(index, true),
            other => return Err(BitError::InvalidValue(other)),
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<u8, BitError> {
        self.check(index)?;
        Ok(u8::from(self.bits[index]))
    }

    /// Sets every `step`-th bit starting at `start`, up to the end of the vector.
    ///
    /// Returns the number of bits visited. A `start` at or past the end marks
    /// nothing; `step` must be non-zero.
    pub fn set_stride(&mut self, start: usize, step: usize) -> usize {
        debug_assert!(step > 0);
        let len = self.bits.len();
        let mut visited = 0;
        let mut index = start;
        while index < len {
            self.bits.set(index, true);
            visited += 1;
            index += step;
        }
        visited
    }

    /// First clear bit strictly after `index`, if any.
    pub fn next_clear_after(&self, index: usize) -> Option<usize> {
        let from = index.checked_add(1)?;
        if from >= self.bits.len() {
            return None;
        }
        self.bits[from..].first_zero().map(|offset| from + offset)
    }

    pub fn count_clear(&self) -> u64 {
        self.bits.count_zeros() as u64
    }

    /// Indices of clear bits, ascending.
    pub fn iter_clear(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_zeros()
    }

    /// Indices of set bits, ascending.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    fn check(&self, index: usize) -> Result<(), BitError> {
        if index >= self.bits.len() {
            return Err(BitError::OutOfRange {
                index,
                len: self.bits.len(),
            });
        }
        Ok(())
    }
}
