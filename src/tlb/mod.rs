//! TL-B codecs mapping typed records onto cells
//!
//! Types implement [`Tlb`] by reading and writing their fields in declaration
//! order; an optional constructor tag ([`TlbPrefix`]) is checked and written
//! around that definition. The [`schema`] module offers the same mapping driven
//! by tag strings instead of hand-written impls.

use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::Zero;

use crate::tvm::address::Address;
use crate::tvm::boc::{base64_to_boc, boc_to_base64, deserialize_boc, serialize_boc};
use crate::tvm::builder::Builder;
use crate::tvm::cell::Cell;
use crate::tvm::dict::{Dict, DictKey};
use crate::tvm::error::{CellError, Result};
use crate::tvm::hash::CellHash;
use crate::tvm::slice::Slice;

pub mod jetton;
pub mod schema;
pub mod state_init;
#[cfg(test)]
mod tests;

pub use jetton::JettonTransfer;
pub use schema::{FieldTag, Payload, Record, Schema, Value};
pub use state_init::{SimpleLib, StateInit, TickTock};

/// Constructor tag of a TL-B type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbPrefix {
    pub value: u64,
    pub bit_len: usize,
}

impl TlbPrefix {
    /// No constructor tag
    pub const NULL: TlbPrefix = TlbPrefix::new(0, 0);

    pub const fn new(value: u64, bit_len: usize) -> Self {
        Self { value, bit_len }
    }
}

pub trait Tlb: Sized {
    const PREFIX: TlbPrefix = TlbPrefix::NULL;

    /// Reads the fields following the constructor tag
    fn read_definition(slice: &mut Slice) -> Result<Self>;

    /// Writes the fields following the constructor tag
    fn write_definition(&self, builder: &mut Builder) -> Result<()>;

    fn read(slice: &mut Slice) -> Result<Self> {
        let prefix = Self::PREFIX;
        if prefix.bit_len > 0 {
            let actual = slice.preload_uint(prefix.bit_len)?;
            if actual != prefix.value {
                return Err(CellError::TagMismatch {
                    expected: prefix.value,
                    actual,
                });
            }
            slice.skip_bits(prefix.bit_len)?;
        }
        Self::read_definition(slice)
    }

    fn write(&self, builder: &mut Builder) -> Result<()> {
        let prefix = Self::PREFIX;
        if prefix.bit_len > 0 {
            builder.store_uint(prefix.value, prefix.bit_len)?;
        }
        self.write_definition(builder)
    }

    fn to_cell(&self) -> Result<Arc<Cell>> {
        let mut builder = Builder::new();
        self.write(&mut builder)?;
        builder.end_cell()
    }

    /// Parses the whole cell, failing if anything is left over
    fn from_cell(cell: &Arc<Cell>) -> Result<Self> {
        let mut slice = Slice::ordinary(cell.clone())?;
        let value = Self::read(&mut slice)?;
        slice.end_parse()?;
        Ok(value)
    }

    fn cell_hash(&self) -> Result<CellHash> {
        Ok(self.to_cell()?.hash())
    }

    fn to_boc(&self, has_crc32c: bool) -> Result<Vec<u8>> {
        serialize_boc(&self.to_cell()?, has_crc32c)
    }

    fn to_boc_base64(&self, has_crc32c: bool) -> Result<String> {
        boc_to_base64(&self.to_cell()?, has_crc32c)
    }

    fn from_boc(bytes: &[u8]) -> Result<Self> {
        Self::from_cell(&deserialize_boc(bytes)?)
    }

    /// Accepts the standard and url-safe alphabets, like [`base64_to_boc`]
    fn from_boc_base64(b64: &str) -> Result<Self> {
        Self::from_cell(&base64_to_boc(b64)?)
    }
}

impl Tlb for bool {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        slice.load_bit()
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_bit(*self)?;
        Ok(())
    }
}

macro_rules! impl_tlb_uint {
    ($($ty:ty => $bits:expr),* $(,)?) => {
        $(
            impl Tlb for $ty {
                fn read_definition(slice: &mut Slice) -> Result<Self> {
                    Ok(slice.load_uint($bits)? as $ty)
                }

                fn write_definition(&self, builder: &mut Builder) -> Result<()> {
                    builder.store_uint(*self as u64, $bits)?;
                    Ok(())
                }
            }
        )*
    };
}

impl_tlb_uint!(u8 => 8, u16 => 16, u32 => 32, u64 => 64);

/// `^Cell`
impl Tlb for Arc<Cell> {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        slice.load_ref()
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_ref(self.clone())?;
        Ok(())
    }
}

/// `Maybe X`
impl<T: Tlb> Tlb for Option<T> {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        if slice.load_bit()? {
            Ok(Some(T::read(slice)?))
        } else {
            Ok(None)
        }
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        match self {
            Some(value) => {
                builder.store_bit(true)?;
                value.write(builder)
            }
            None => {
                builder.store_bit(false)?;
                Ok(())
            }
        }
    }
}

/// `addr_std`, `addr_none` is rejected
impl Tlb for Address {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        slice
            .load_address()?
            .ok_or_else(|| CellError::format("expected an internal address, got addr_none"))
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_address(Some(self))?;
        Ok(())
    }
}

/// `MsgAddressInt` or `addr_none`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsgAddress(pub Option<Address>);

impl MsgAddress {
    pub const NONE: MsgAddress = MsgAddress(None);
}

impl From<Address> for MsgAddress {
    fn from(address: Address) -> Self {
        MsgAddress(Some(address))
    }
}

impl Tlb for MsgAddress {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        Ok(MsgAddress(slice.load_address()?))
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_address(self.0.as_ref())?;
        Ok(())
    }
}

/// `Grams` / `VarUInteger 16`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Coins(pub BigUint);

impl Coins {
    pub fn zero() -> Self {
        Coins(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<u64> for Coins {
    fn from(value: u64) -> Self {
        Coins(BigUint::from(value))
    }
}

impl From<u128> for Coins {
    fn from(value: u128) -> Self {
        Coins(BigUint::from(value))
    }
}

impl From<BigUint> for Coins {
    fn from(value: BigUint) -> Self {
        Coins(value)
    }
}

impl Tlb for Coins {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        Ok(Coins(slice.load_big_coins()?))
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_big_coins(&self.0)?;
        Ok(())
    }
}

/// `^X`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref<T>(pub T);

impl<T: Tlb> Tlb for Ref<T> {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        Ok(Ref(T::from_cell(&slice.load_ref()?)?))
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_ref(self.0.to_cell()?)?;
        Ok(())
    }
}

/// Everything left in the slice, i.e. a `Cell` stored inline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remainder(pub Arc<Cell>);

impl Default for Remainder {
    fn default() -> Self {
        Remainder(Arc::new(Cell::new()))
    }
}

impl Tlb for Remainder {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        Ok(Remainder(slice.to_cell()?))
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_cell(&self.0)?;
        Ok(())
    }
}

/// `Either X ^X`
///
/// Written inline when the value plus the selector bit fits into what is left
/// of the builder, otherwise spilled into a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EitherRef<T>(pub T);

impl<T: Tlb> Tlb for EitherRef<T> {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        if slice.load_bit()? {
            Ok(EitherRef(T::from_cell(&slice.load_ref()?)?))
        } else {
            Ok(EitherRef(T::read(slice)?))
        }
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        store_either(builder, self.0.to_cell()?)
    }
}

pub(crate) fn store_either(builder: &mut Builder, payload: Arc<Cell>) -> Result<()> {
    if builder.can_fit(payload.bit_len() + 1, payload.reference_count()) {
        builder.store_bit(false)?;
        builder.store_cell(&payload)?;
    } else {
        // the selector bit and the reference go in together
        builder.store_maybe_ref(Some(payload))?;
    }
    Ok(())
}

/// `HashmapE N X` with cell values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictE<const N: usize>(pub Dict);

impl<const N: usize> Default for DictE<N> {
    fn default() -> Self {
        DictE(Dict::new(N))
    }
}

impl<const N: usize> DictE<N> {
    /// Stores a typed value under a key
    pub fn insert_as<T: Tlb>(&mut self, key: impl Into<DictKey>, value: &T) -> Result<()> {
        let mut builder = Builder::new();
        value.write(&mut builder)?;
        self.0.set(key, builder.end_cell()?)?;
        Ok(())
    }

    /// Reads a typed value stored under a key
    pub fn get_as<T: Tlb>(&self, key: impl Into<DictKey>) -> Result<Option<T>> {
        match self.0.get(key)? {
            Some(cell) => T::from_cell(cell).map(Some),
            None => Ok(None),
        }
    }
}

impl<const N: usize> Tlb for DictE<N> {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        Ok(DictE(slice.load_dict(N)?))
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        if self.0.key_bits() != N {
            return Err(CellError::out_of_range(format!(
                "dictionary has {} bit keys, expected {N}",
                self.0.key_bits()
            )));
        }
        builder.store_dict(Some(&self.0))?;
        Ok(())
    }
}
