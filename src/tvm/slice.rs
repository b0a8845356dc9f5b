//! Slice implementation for reading data from cells
//!
//! A Slice provides a way to read data from a Cell sequentially,
//! tracking the current position in both bits and references.
//! Reading past the end is always an error, never a zero-fill.

use std::sync::Arc;

use num_bigint::{BigInt, BigUint};

use crate::tvm::cell::{Cell, CellBuilder};
use crate::tvm::error::{CellError, Result};
use crate::tvm::hash::CellType;

/// A slice for reading data from a cell
#[derive(Debug, Clone)]
pub struct Slice {
    /// The cell being read
    cell: Arc<Cell>,
    /// Current bit position in the cell
    bit_pos: usize,
    /// Current reference position
    ref_pos: usize,
}

impl Slice {
    /// Creates a new slice over any cell, exotic ones included
    pub fn new(cell: Arc<Cell>) -> Self {
        Self {
            cell,
            bit_pos: 0,
            ref_pos: 0,
        }
    }

    /// Creates a slice over an ordinary cell
    ///
    /// Exotic cells have no user data layout, so parsers refuse them.
    pub fn ordinary(cell: Arc<Cell>) -> Result<Self> {
        if cell.is_exotic() {
            return Err(CellError::UnsupportedCellKind(cell.cell_type()));
        }
        Ok(Self::new(cell))
    }

    /// Returns the number of remaining bits
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bit_pos
    }

    /// Returns the number of remaining references
    pub fn remaining_refs(&self) -> usize {
        self.cell.reference_count() - self.ref_pos
    }

    /// Checks if there are any remaining bits or references
    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0 && self.remaining_refs() == 0
    }

    fn ensure_bits(&self, n: usize) -> Result<()> {
        if n > self.remaining_bits() {
            return Err(CellError::Underflow {
                requested: n,
                available: self.remaining_bits(),
            });
        }
        Ok(())
    }

    fn bit_at(&self, pos: usize) -> bool {
        (self.cell.data()[pos / 8] >> (7 - pos % 8)) & 1 == 1
    }

    /// Loads a single bit
    pub fn load_bit(&mut self) -> Result<bool> {
        self.ensure_bits(1)?;
        let bit = self.bit_at(self.bit_pos);
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Loads a boolean stored as a single bit
    pub fn load_bool(&mut self) -> Result<bool> {
        self.load_bit()
    }

    /// Reads `n` bits without advancing the position
    pub fn preload_bits(&self, n: usize) -> Result<Vec<u8>> {
        self.ensure_bits(n)?;

        let data = self.cell.data();
        let shift = self.bit_pos % 8;
        let start = self.bit_pos / 8;
        let mut result = Vec::with_capacity(n.div_ceil(8));

        for i in 0..n.div_ceil(8) {
            let hi = data[start + i] << shift;
            let lo = if shift == 0 {
                0
            } else {
                data.get(start + i + 1).map_or(0, |b| b >> (8 - shift))
            };
            result.push(hi | lo);
        }

        let rem = n % 8;
        if rem != 0 {
            let last = result.len() - 1;
            result[last] &= 0xFFu8 << (8 - rem);
        }
        Ok(result)
    }

    /// Loads multiple bits into a byte vector, left-aligned
    pub fn load_bits(&mut self, n: usize) -> Result<Vec<u8>> {
        let bits = self.preload_bits(n)?;
        self.bit_pos += n;
        Ok(bits)
    }

    /// Loads a byte (8 bits)
    pub fn load_byte(&mut self) -> Result<u8> {
        Ok(self.load_uint(8)? as u8)
    }

    /// Loads multiple bytes
    pub fn load_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.load_bits(n * 8)
    }

    pub fn load_u8(&mut self) -> Result<u8> {
        self.load_byte()
    }

    /// Loads a u16 value (16 bits, big-endian)
    pub fn load_u16(&mut self) -> Result<u16> {
        Ok(self.load_uint(16)? as u16)
    }

    /// Loads a u32 value (32 bits, big-endian)
    pub fn load_u32(&mut self) -> Result<u32> {
        Ok(self.load_uint(32)? as u32)
    }

    /// Loads a u64 value (64 bits, big-endian)
    pub fn load_u64(&mut self) -> Result<u64> {
        self.load_uint(64)
    }

    /// Reads an unsigned integer without advancing the position
    pub fn preload_uint(&self, bits: usize) -> Result<u64> {
        if bits > 64 {
            return Err(CellError::out_of_range(format!(
                "can't load {bits} bits into u64"
            )));
        }
        self.ensure_bits(bits)?;
        let mut result = 0u64;
        for i in 0..bits {
            result = (result << 1) | self.bit_at(self.bit_pos + i) as u64;
        }
        Ok(result)
    }

    /// Loads a uint with a specific number of bits
    pub fn load_uint(&mut self, bits: usize) -> Result<u64> {
        let value = self.preload_uint(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Loads a signed integer with a specific number of bits
    pub fn load_int(&mut self, bits: usize) -> Result<i64> {
        if bits > 64 {
            return Err(CellError::out_of_range(format!(
                "can't load {bits} bits into i64"
            )));
        }
        if bits == 0 {
            return Ok(0);
        }

        let unsigned = self.load_uint(bits)?;
        if bits == 64 {
            return Ok(unsigned as i64);
        }

        let sign_bit = 1u64 << (bits - 1);
        if unsigned & sign_bit != 0 {
            let mask = !0u64 << bits;
            Ok((unsigned | mask) as i64)
        } else {
            Ok(unsigned as i64)
        }
    }

    /// Loads an unsigned integer of arbitrary width
    pub fn load_big_uint(&mut self, bits: usize) -> Result<BigUint> {
        if bits == 0 {
            return Ok(BigUint::default());
        }
        let bytes = self.load_bits(bits)?;
        let value = BigUint::from_bytes_be(&bytes);
        Ok(value >> (bytes.len() * 8 - bits))
    }

    /// Loads a two's complement signed integer of arbitrary width
    pub fn load_big_int(&mut self, bits: usize) -> Result<BigInt> {
        if bits == 0 {
            return Ok(BigInt::default());
        }
        let negative = self.preload_uint(1)? == 1;
        let unsigned = BigInt::from(self.load_big_uint(bits)?);
        if negative {
            Ok(unsigned - (BigInt::from(1u8) << bits))
        } else {
            Ok(unsigned)
        }
    }

    /// Loads a reference to another cell
    pub fn load_ref(&mut self) -> Result<Arc<Cell>> {
        let reference = self.peek_ref(0)?;
        self.ref_pos += 1;
        Ok(reference)
    }

    /// Returns the reference `index` positions past the cursor without consuming it
    pub fn peek_ref(&self, index: usize) -> Result<Arc<Cell>> {
        if index >= self.remaining_refs() {
            return Err(CellError::ReferenceOutOfRange {
                index,
                count: self.remaining_refs(),
            });
        }
        Ok(self.cell.references()[self.ref_pos + index].clone())
    }

    /// Loads an optional reference (Maybe ^Cell)
    pub fn load_maybe_ref(&mut self) -> Result<Option<Arc<Cell>>> {
        if self.load_bit()? {
            Ok(Some(self.load_ref()?))
        } else {
            Ok(None)
        }
    }

    /// Skips a number of bits
    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        self.ensure_bits(n)?;
        self.bit_pos += n;
        Ok(())
    }

    /// Skips a number of references
    pub fn skip_refs(&mut self, n: usize) -> Result<()> {
        if n > self.remaining_refs() {
            return Err(CellError::ReferenceOutOfRange {
                index: n - 1,
                count: self.remaining_refs(),
            });
        }
        self.ref_pos += n;
        Ok(())
    }

    /// Gets the underlying cell
    pub fn cell(&self) -> &Arc<Cell> {
        &self.cell
    }

    /// Gets the current bit position
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Gets the current reference position
    pub fn ref_position(&self) -> usize {
        self.ref_pos
    }

    /// Resets the slice to the beginning
    pub fn reset(&mut self) {
        self.bit_pos = 0;
        self.ref_pos = 0;
    }

    /// Loads all remaining bits
    pub fn load_remaining_bits(&mut self) -> Result<Vec<u8>> {
        self.load_bits(self.remaining_bits())
    }

    /// Loads all remaining references
    pub fn load_remaining_refs(&mut self) -> Result<Vec<Arc<Cell>>> {
        let mut refs = Vec::with_capacity(self.remaining_refs());
        while self.remaining_refs() > 0 {
            refs.push(self.load_ref()?);
        }
        Ok(refs)
    }

    /// Checks if a specific number of bits can be read
    pub fn can_read_bits(&self, n: usize) -> bool {
        n <= self.remaining_bits()
    }

    /// Checks if a specific number of references can be read
    pub fn can_read_refs(&self, n: usize) -> bool {
        n <= self.remaining_refs()
    }

    /// Consumes the rest of the slice into a new ordinary cell
    pub fn to_cell(&mut self) -> Result<Arc<Cell>> {
        if self.bit_pos == 0 && self.ref_pos == 0 && !self.cell.is_exotic() {
            let cell = self.cell.clone();
            self.bit_pos = cell.bit_len();
            self.ref_pos = cell.reference_count();
            return Ok(cell);
        }

        let bit_len = self.remaining_bits();
        let bits = self.load_bits(bit_len)?;
        let mut builder = CellBuilder::new();
        builder.store_bits(&bits, bit_len)?;
        for reference in self.load_remaining_refs()? {
            builder.store_reference(reference)?;
        }
        builder.build()
    }

    /// Fails unless every bit and reference has been consumed
    pub fn end_parse(&self) -> Result<()> {
        if !self.is_empty() {
            return Err(CellError::format(format!(
                "{} bits and {} refs left unparsed",
                self.remaining_bits(),
                self.remaining_refs()
            )));
        }
        Ok(())
    }

    /// Loads a variable-length integer (VarUInteger)
    /// First length_bits encode the byte length, then that many bytes of data
    pub fn load_var_uint(&mut self, length_bits: usize) -> Result<u64> {
        let value = self.load_big_var_uint(length_bits)?;
        u64::try_from(&value)
            .map_err(|_| CellError::out_of_range(format!("VarUInteger {value} exceeds u64")))
    }

    /// Loads a VarUInteger of arbitrary size
    pub fn load_big_var_uint(&mut self, length_bits: usize) -> Result<BigUint> {
        let byte_len = self.load_uint(length_bits)? as usize;
        self.load_big_uint(byte_len * 8)
    }

    /// Loads coins (VarUInteger 16)
    /// Length is encoded in 4 bits, then that many bytes of value
    pub fn load_coins(&mut self) -> Result<u128> {
        let len = self.load_uint(4)? as usize;
        let bytes = self.load_bytes(len)?;
        Ok(bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    /// Loads coins as a big integer
    pub fn load_big_coins(&mut self) -> Result<BigUint> {
        self.load_big_var_uint(4)
    }

    /// Loads bytes stored with snake encoding, following the chain of first references
    pub fn load_snake_bytes(&mut self) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        self.take_whole_bytes(&mut result)?;

        let mut next = if self.remaining_refs() > 0 {
            Some(self.load_ref()?)
        } else {
            None
        };

        while let Some(cell) = next {
            let mut slice = Slice::ordinary(cell)?;
            slice.take_whole_bytes(&mut result)?;
            next = if slice.remaining_refs() > 0 {
                Some(slice.load_ref()?)
            } else {
                None
            };
        }

        Ok(result)
    }

    /// Loads a UTF-8 string stored with snake encoding
    pub fn load_snake_string(&mut self) -> Result<String> {
        let bytes = self.load_snake_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| CellError::format(format!("snake string is not UTF-8: {e}")))
    }

    fn take_whole_bytes(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let remaining = self.remaining_bits();
        if remaining % 8 != 0 {
            return Err(CellError::format(format!(
                "snake data must be byte aligned, got {remaining} bits"
            )));
        }
        out.extend(self.load_bytes(remaining / 8)?);
        Ok(())
    }

    pub fn cell_type(&self) -> CellType {
        self.cell.cell_type()
    }
}

impl From<Arc<Cell>> for Slice {
    fn from(cell: Arc<Cell>) -> Self {
        Self::new(cell)
    }
}
