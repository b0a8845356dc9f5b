//! Enhanced Builder for constructing cells with convenient methods
//!
//! This module provides a high-level builder (`Builder`) that wraps the low-level
//! `CellBuilder` with additional convenience methods for common TON operations.
//!
//! Every `store_*` call is checked: if the value doesn't fit into the remaining
//! 1023-bit / 4-reference budget the call returns [`CellError::CapacityExceeded`]
//! and the builder is left exactly as it was. The `must_store_*` variants panic
//! instead and are meant for literals whose size is known to fit.
//!
//! # Examples
//!
//! ```rust
//! use toncell_rs::tvm::{Address, Builder};
//!
//! let mut builder = Builder::new();
//!
//! let addr = Address::new(0, [0u8; 32]);
//! builder.store_address(Some(&addr)).unwrap();
//! builder.store_coins(1_000_000_000).unwrap();
//! builder.store_snake_string("Hello, TON!", false).unwrap();
//!
//! let cell = builder.end_cell().unwrap();
//! assert_eq!(cell.bit_len(), 267 + 4 + 32 + 88);
//! ```

use std::sync::Arc;

use num_bigint::{BigInt, BigUint, Sign};

use crate::tvm::address::{Address, ExternalAddress};
use crate::tvm::cell::{Cell, CellBuilder, MAX_CELL_BITS};
use crate::tvm::error::{CellError, Result};
use crate::tvm::hash::CellType;
use crate::tvm::slice::Slice;

/// Bytes that fit into an empty cell
const SNAKE_CHUNK_BYTES: usize = MAX_CELL_BITS / 8;

/// Extended builder with convenience methods
#[derive(Debug, Clone, Default)]
pub struct Builder {
    inner: CellBuilder,
}

impl Builder {
    /// Creates a new builder
    pub fn new() -> Self {
        Self {
            inner: CellBuilder::new(),
        }
    }

    /// Returns the number of bits used
    pub fn bit_len(&self) -> usize {
        self.inner.bit_len()
    }

    /// Returns the number of available bits
    pub fn available_bits(&self) -> usize {
        self.inner.available_bits()
    }

    /// Returns the number of available bytes
    pub fn available_bytes(&self) -> usize {
        self.available_bits() / 8
    }

    /// Returns the number of references
    pub fn ref_count(&self) -> usize {
        self.inner.ref_count()
    }

    /// Returns the number of available references
    pub fn available_refs(&self) -> usize {
        self.inner.available_refs()
    }

    /// Checks that `bits` and `refs` still fit
    pub fn can_fit(&self, bits: usize, refs: usize) -> bool {
        bits <= self.available_bits() && refs <= self.available_refs()
    }

    fn ensure_fits(&self, bits: usize, refs: usize) -> Result<()> {
        if bits > self.available_bits() {
            return Err(CellError::bits(bits, self.available_bits()));
        }
        if refs > self.available_refs() {
            return Err(CellError::refs(refs, self.available_refs()));
        }
        Ok(())
    }

    /// Runs a multi-step store, rolling back everything if any step fails
    fn atomic<F>(&mut self, f: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut CellBuilder) -> Result<()>,
    {
        let snapshot = self.inner.clone();
        if let Err(e) = f(&mut self.inner) {
            self.inner = snapshot;
            return Err(e);
        }
        Ok(self)
    }

    /// Stores a single bit
    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self> {
        self.inner.store_bit(bit)?;
        Ok(self)
    }

    /// Stores a boolean value as a single bit
    pub fn store_bool(&mut self, value: bool) -> Result<&mut Self> {
        self.store_bit(value)
    }

    /// Stores the first `bit_len` bits of a byte slice
    pub fn store_bits(&mut self, bits: &[u8], bit_len: usize) -> Result<&mut Self> {
        self.inner.store_bits(bits, bit_len)?;
        Ok(self)
    }

    /// Stores `count` zero bits
    pub fn store_zeroes(&mut self, count: usize) -> Result<&mut Self> {
        self.inner.store_zeroes(count)?;
        Ok(self)
    }

    /// Stores a byte
    pub fn store_byte(&mut self, byte: u8) -> Result<&mut Self> {
        self.inner.store_byte(byte)?;
        Ok(self)
    }

    /// Stores multiple bytes
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.inner.store_bytes(bytes)?;
        Ok(self)
    }

    pub fn store_u8(&mut self, value: u8) -> Result<&mut Self> {
        self.store_byte(value)
    }

    pub fn store_u16(&mut self, value: u16) -> Result<&mut Self> {
        self.store_bits(&value.to_be_bytes(), 16)
    }

    /// Stores a u32 value
    pub fn store_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.inner.store_u32(value)?;
        Ok(self)
    }

    /// Stores a u64 value
    pub fn store_u64(&mut self, value: u64) -> Result<&mut Self> {
        self.inner.store_u64(value)?;
        Ok(self)
    }

    /// Stores an unsigned integer with specific bit length
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self> {
        if bits > 64 {
            return self.store_big_uint(&BigUint::from(value), bits);
        }
        if bits < 64 && value >> bits != 0 {
            return Err(CellError::out_of_range(format!(
                "{value} doesn't fit into {bits} bits"
            )));
        }
        self.inner.store_uint(value, bits)?;
        Ok(self)
    }

    /// Stores a signed integer with specific bit length
    pub fn store_int(&mut self, value: i64, bits: usize) -> Result<&mut Self> {
        if bits > 64 {
            return self.store_big_int(&BigInt::from(value), bits);
        }
        let fits = match bits {
            0 => value == 0,
            64 => true,
            _ => {
                let bound = 1i64 << (bits - 1);
                (-bound..bound).contains(&value)
            }
        };
        if !fits {
            return Err(CellError::out_of_range(format!(
                "{value} doesn't fit into {bits} signed bits"
            )));
        }

        let unsigned = if bits == 64 {
            value as u64
        } else {
            (value as u64) & ((1u64 << bits) - 1)
        };
        self.inner.store_uint(unsigned, bits)?;
        Ok(self)
    }

    /// Stores an unsigned integer of arbitrary width
    pub fn store_big_uint(&mut self, value: &BigUint, bits: usize) -> Result<&mut Self> {
        if value.bits() as usize > bits {
            return Err(CellError::out_of_range(format!(
                "{value} doesn't fit into {bits} bits"
            )));
        }
        self.ensure_fits(bits, 0)?;
        if bits == 0 {
            return Ok(self);
        }

        // left-align the value within whole bytes
        let byte_len = bits.div_ceil(8);
        let aligned = (value << (byte_len * 8 - bits)).to_bytes_be();
        let mut out = vec![0u8; byte_len];
        out[byte_len - aligned.len()..].copy_from_slice(&aligned);

        self.store_bits(&out, bits)
    }

    /// Stores a two's complement signed integer of arbitrary width
    pub fn store_big_int(&mut self, value: &BigInt, bits: usize) -> Result<&mut Self> {
        if bits == 0 {
            if value.sign() != Sign::NoSign {
                return Err(CellError::out_of_range(format!(
                    "{value} doesn't fit into 0 bits"
                )));
            }
            return Ok(self);
        }
        let bound = BigInt::from(1u8) << (bits - 1);
        if *value >= bound || *value < -bound.clone() {
            return Err(CellError::out_of_range(format!(
                "{value} doesn't fit into {bits} signed bits"
            )));
        }
        let unsigned = if value.sign() == Sign::Minus {
            (BigInt::from(1u8) << bits) + value
        } else {
            value.clone()
        };
        let (_, magnitude) = unsigned.into_parts();
        self.store_big_uint(&magnitude, bits)
    }

    /// Stores an unsigned integer, panicking if it doesn't fit
    pub fn must_store_uint(&mut self, value: u64, bits: usize) -> &mut Self {
        if let Err(e) = self.store_uint(value, bits) {
            panic!("must_store_uint({value}, {bits}): {e}");
        }
        self
    }

    /// Stores a signed integer, panicking if it doesn't fit
    pub fn must_store_int(&mut self, value: i64, bits: usize) -> &mut Self {
        if let Err(e) = self.store_int(value, bits) {
            panic!("must_store_int({value}, {bits}): {e}");
        }
        self
    }

    pub fn must_store_bit(&mut self, bit: bool) -> &mut Self {
        if let Err(e) = self.store_bit(bit) {
            panic!("must_store_bit: {e}");
        }
        self
    }

    pub fn must_store_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        if let Err(e) = self.store_bytes(bytes) {
            panic!("must_store_bytes({} bytes): {e}", bytes.len());
        }
        self
    }

    pub fn must_store_ref(&mut self, cell: Arc<Cell>) -> &mut Self {
        if let Err(e) = self.store_ref(cell) {
            panic!("must_store_ref: {e}");
        }
        self
    }

    /// Stores a reference to another cell
    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self> {
        self.inner.store_reference(cell)?;
        Ok(self)
    }

    /// Stores an optional reference (Maybe ^Cell)
    pub fn store_maybe_ref(&mut self, cell: Option<Arc<Cell>>) -> Result<&mut Self> {
        match cell {
            Some(c) => {
                self.ensure_fits(1, 1)?;
                self.store_bit(true)?;
                self.store_ref(c)
            }
            None => self.store_bit(false),
        }
    }

    /// Stores the contents of another cell
    pub fn store_cell(&mut self, cell: &Cell) -> Result<&mut Self> {
        if cell.is_exotic() {
            return Err(CellError::UnsupportedCellKind(cell.cell_type()));
        }
        self.ensure_fits(cell.bit_len(), cell.reference_count())?;
        self.atomic(|inner| {
            inner.store_bits(cell.data(), cell.bit_len())?;
            for reference in cell.references() {
                inner.store_reference(reference.clone())?;
            }
            Ok(())
        })
    }

    /// Stores the remaining bits and references of a slice
    pub fn store_slice(&mut self, slice: &Slice) -> Result<&mut Self> {
        let bit_len = slice.remaining_bits();
        let ref_count = slice.remaining_refs();
        self.ensure_fits(bit_len, ref_count)?;

        let bits = slice.preload_bits(bit_len)?;
        self.atomic(|inner| {
            inner.store_bits(&bits, bit_len)?;
            for i in 0..ref_count {
                inner.store_reference(slice.peek_ref(i)?)?;
            }
            Ok(())
        })
    }

    /// Appends everything stored in another builder
    pub fn store_builder(&mut self, other: &Builder) -> Result<&mut Self> {
        self.ensure_fits(other.bit_len(), other.ref_count())?;
        self.atomic(|inner| {
            inner.store_bits(other.inner.data(), other.bit_len())?;
            for reference in other.inner.references() {
                inner.store_reference(reference.clone())?;
            }
            Ok(())
        })
    }

    /// Stores a variable-length unsigned integer (VarUInteger)
    pub fn store_var_uint(&mut self, value: u64, length_bits: usize) -> Result<&mut Self> {
        self.store_big_var_uint(&BigUint::from(value), length_bits)
    }

    /// Stores a VarUInteger of arbitrary size: byte length in `length_bits`, then the bytes
    pub fn store_big_var_uint(&mut self, value: &BigUint, length_bits: usize) -> Result<&mut Self> {
        let byte_len = (value.bits() as usize).div_ceil(8);
        let max_len = (1usize << length_bits.min(16)) - 1;
        if byte_len > max_len {
            return Err(CellError::out_of_range(format!(
                "{value} needs {byte_len} bytes, at most {max_len} allowed"
            )));
        }
        self.ensure_fits(length_bits + byte_len * 8, 0)?;
        self.store_uint(byte_len as u64, length_bits)?;
        self.store_big_uint(value, byte_len * 8)
    }

    /// Stores coins (VarUInteger 16)
    pub fn store_coins(&mut self, amount: u128) -> Result<&mut Self> {
        self.store_big_coins(&BigUint::from(amount))
    }

    /// Stores coins given as a big integer
    pub fn store_big_coins(&mut self, amount: &BigUint) -> Result<&mut Self> {
        self.store_big_var_uint(amount, 4)
    }

    /// Stores a string inline, it must fit into the remaining space
    pub fn store_string(&mut self, s: &str) -> Result<&mut Self> {
        self.store_bytes(s.as_bytes())
    }

    /// Stores a string using snake encoding, optionally prefixed with a zero byte
    /// (the text comment / off-chain content marker)
    pub fn store_snake_string(&mut self, s: &str, with_prefix: bool) -> Result<&mut Self> {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        if with_prefix {
            bytes.push(0x00);
        }
        bytes.extend_from_slice(s.as_bytes());
        self.store_snake_bytes(&bytes)
    }

    /// Stores bytes using snake encoding (splits across a chain of cells if needed)
    pub fn store_snake_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        let head_len = bytes.len().min(self.available_bytes());
        let (head, tail) = bytes.split_at(head_len);
        if tail.is_empty() {
            return self.store_bytes(head);
        }
        self.ensure_fits(head_len * 8, 1)?;

        let mut next: Option<Arc<Cell>> = None;
        for chunk in tail.chunks(SNAKE_CHUNK_BYTES).rev() {
            let mut builder = CellBuilder::new();
            builder.store_bytes(chunk)?;
            if let Some(cell) = next.take() {
                builder.store_reference(cell)?;
            }
            next = Some(builder.build()?);
        }

        self.atomic(|inner| {
            inner.store_bytes(head)?;
            if let Some(cell) = next {
                inner.store_reference(cell)?;
            }
            Ok(())
        })
    }

    /// Stores a TON address (MsgAddressInt or addr_none)
    pub fn store_address(&mut self, address: Option<&Address>) -> Result<&mut Self> {
        match address {
            None => {
                // addr_none$00
                self.store_uint(0, 2)
            }
            Some(addr) => {
                // addr_std$10 anycast:(Maybe Anycast) workchain_id:int8 address:bits256
                self.ensure_fits(Address::BIT_LEN, 0)?;
                self.store_uint(0b10, 2)?;
                self.store_bit(false)?;
                self.store_int(addr.workchain as i64, 8)?;
                self.store_bytes(&addr.hash_part)
            }
        }
    }

    /// Stores an external address
    pub fn store_external_address(&mut self, address: &ExternalAddress) -> Result<&mut Self> {
        // addr_extern$01 len:(## 9) external_address:(bits len)
        self.ensure_fits(2 + 9 + address.bit_len, 0)?;
        self.store_uint(0b01, 2)?;
        self.store_uint(address.bit_len as u64, 9)?;
        self.store_bits(&address.data, address.bit_len)
    }

    /// Builds the cell
    pub fn build(self) -> Result<Arc<Cell>> {
        self.inner.build()
    }

    /// Finalizes the builder into an immutable ordinary cell
    pub fn end_cell(self) -> Result<Arc<Cell>> {
        self.build()
    }

    /// Finalizes the builder into an exotic cell of the given kind
    pub fn end_exotic_cell(self, cell_type: CellType) -> Result<Arc<Cell>> {
        self.inner.build_exotic(cell_type)
    }

    /// Converts to a slice
    pub fn to_slice(self) -> Result<Slice> {
        let cell = self.build()?;
        Ok(Slice::new(cell))
    }
}

impl From<CellBuilder> for Builder {
    fn from(inner: CellBuilder) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::cell::MAX_CELL_REFS;

    #[test]
    fn test_builder_basic() {
        let mut builder = Builder::new();
        builder.store_u32(0x12345678).unwrap();
        builder.store_byte(0xFF).unwrap();
        assert_eq!(builder.bit_len(), 40);
        assert_eq!(builder.available_bits(), MAX_CELL_BITS - 40);

        let cell = builder.build().unwrap();
        assert_eq!(cell.bit_len(), 40);
    }

    #[test]
    fn test_store_uint_then_load() {
        let mut builder = Builder::new();
        builder.store_uint(700, 32).unwrap();
        let cell = builder.end_cell().unwrap();

        let mut slice = Slice::new(cell);
        assert_eq!(slice.load_uint(32).unwrap(), 700);
    }

    #[test]
    fn test_capacity_exceeded_bits() {
        let mut builder = Builder::new();
        builder.store_zeroes(1020).unwrap();

        let err = builder.store_uint(0xAB, 8).unwrap_err();
        assert_eq!(
            err,
            CellError::CapacityExceeded {
                requested: 8,
                available: 3,
                unit: "bits"
            }
        );
        // nothing was written
        assert_eq!(builder.bit_len(), 1020);
        builder.store_uint(0b101, 3).unwrap();
        assert_eq!(builder.available_bits(), 0);
    }

    #[test]
    fn test_capacity_exceeded_refs() {
        let empty = Builder::new().end_cell().unwrap();
        let mut builder = Builder::new();
        for _ in 0..MAX_CELL_REFS {
            builder.store_ref(empty.clone()).unwrap();
        }
        assert!(matches!(
            builder.store_ref(empty.clone()),
            Err(CellError::CapacityExceeded { unit: "refs", .. })
        ));
        // maybe-ref must not leave a dangling presence bit
        assert!(builder.store_maybe_ref(Some(empty)).is_err());
        assert_eq!(builder.bit_len(), 0);
    }

    #[test]
    fn test_store_uint_out_of_range() {
        let mut builder = Builder::new();
        assert!(matches!(
            builder.store_uint(256, 8),
            Err(CellError::ValueOutOfRange(_))
        ));
        assert!(builder.store_int(-129, 8).is_err());
        builder.store_int(-128, 8).unwrap();
        builder.store_int(127, 8).unwrap();
    }

    #[test]
    fn test_store_int_roundtrip() {
        let mut builder = Builder::new();
        builder.store_int(-5, 7).unwrap();
        builder.store_int(i64::MIN, 64).unwrap();
        let mut slice = builder.to_slice().unwrap();
        assert_eq!(slice.load_int(7).unwrap(), -5);
        assert_eq!(slice.load_int(64).unwrap(), i64::MIN);
    }

    #[test]
    fn test_big_uint_and_int() {
        let big = BigUint::from(1u8) << 200usize;
        let negative = BigInt::from(-3);

        let mut builder = Builder::new();
        builder.store_big_uint(&big, 256).unwrap();
        builder.store_big_int(&negative, 257).unwrap();
        builder.store_uint(1, 70).unwrap();
        let mut slice = builder.to_slice().unwrap();

        assert_eq!(slice.load_big_uint(256).unwrap(), big);
        assert_eq!(slice.load_big_int(257).unwrap(), negative);
        assert_eq!(slice.load_big_uint(70).unwrap(), BigUint::from(1u8));
    }

    #[test]
    fn test_builder_address() {
        let addr = Address::new(0, [0u8; 32]);
        let mut builder = Builder::new();
        builder.store_address(Some(&addr)).unwrap();

        let cell = builder.build().unwrap();
        // 2 bits (addr_std) + 1 bit (no anycast) + 8 bits (workchain) + 256 bits (hash) = 267 bits
        assert_eq!(cell.bit_len(), 267);
    }

    #[test]
    fn test_builder_coins() {
        let mut builder = Builder::new();
        builder.store_coins(1_000_000_000).unwrap(); // 1 TON
        builder.store_coins(0).unwrap();

        let cell = builder.build().unwrap();
        // 4 bits length + 4 bytes, then a zero nibble
        assert_eq!(cell.bit_len(), 4 + 32 + 4);

        let mut slice = Slice::new(cell);
        assert_eq!(slice.load_coins().unwrap(), 1_000_000_000);
        assert_eq!(slice.load_big_coins().unwrap(), BigUint::default());
    }

    #[test]
    fn test_big_coins_too_large() {
        let too_big = BigUint::from(1u8) << 120usize;
        let mut builder = Builder::new();
        assert!(matches!(
            builder.store_big_coins(&too_big),
            Err(CellError::ValueOutOfRange(_))
        ));
    }

    #[test]
    fn test_builder_string() {
        let mut builder = Builder::new();
        builder.store_string("Hello, TON!").unwrap();

        let cell = builder.build().unwrap();
        assert_eq!(cell.bit_len(), 11 * 8);
    }

    #[test]
    fn test_builder_snake_string() {
        let long_string = "a".repeat(300);
        let mut builder = Builder::new();
        builder.store_u32(7).unwrap();
        builder.store_snake_string(&long_string, false).unwrap();

        let cell = builder.build().unwrap();
        assert_eq!(cell.reference_count(), 1);
        assert_eq!(cell.bit_len(), 32 + 123 * 8);
        assert_eq!(cell.depth(), 2);

        let mut slice = Slice::new(cell);
        assert_eq!(slice.load_u32().unwrap(), 7);
        assert_eq!(slice.load_snake_string().unwrap(), long_string);
    }

    #[test]
    fn test_store_builder() {
        let child = Builder::new().end_cell().unwrap();
        let mut other = Builder::new();
        other.store_uint(0b11, 2).unwrap();
        other.store_ref(child).unwrap();

        let mut builder = Builder::new();
        builder.store_bit(false).unwrap();
        builder.store_builder(&other).unwrap();
        assert_eq!(builder.bit_len(), 3);
        assert_eq!(builder.ref_count(), 1);

        let mut slice = builder.to_slice().unwrap();
        assert_eq!(slice.load_uint(3).unwrap(), 0b011);
    }

    #[test]
    fn test_store_slice_copies_remainder() {
        let mut source = Builder::new();
        source.store_u16(0xBEEF).unwrap();
        let mut slice = source.to_slice().unwrap();
        slice.skip_bits(8).unwrap();

        let mut builder = Builder::new();
        builder.store_slice(&slice).unwrap();
        assert_eq!(builder.end_cell().unwrap().data(), &[0xEF]);
    }

    #[test]
    #[should_panic(expected = "must_store_uint")]
    fn test_must_store_panics() {
        let mut builder = Builder::new();
        builder.must_store_uint(16, 4);
    }
}
