//! Contract initial state
//!
//! ```text
//! tick_tock$_ tick:Bool tock:Bool = TickTock;
//! simple_lib$_ public:Bool root:^Cell = SimpleLib;
//! _ split_depth:(Maybe (## 5)) special:(Maybe TickTock)
//!   code:(Maybe ^Cell) data:(Maybe ^Cell)
//!   library:(HashmapE 256 SimpleLib) = StateInit;
//! ```

use std::sync::Arc;

use crate::tlb::{DictE, Tlb};
use crate::tvm::address::Address;
use crate::tvm::builder::Builder;
use crate::tvm::cell::Cell;
use crate::tvm::error::{CellError, Result};
use crate::tvm::slice::Slice;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickTock {
    pub tick: bool,
    pub tock: bool,
}

impl Tlb for TickTock {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        Ok(Self {
            tick: slice.load_bit()?,
            tock: slice.load_bit()?,
        })
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_bit(self.tick)?;
        builder.store_bit(self.tock)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleLib {
    pub public: bool,
    pub root: Arc<Cell>,
}

impl Tlb for SimpleLib {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        Ok(Self {
            public: slice.load_bit()?,
            root: slice.load_ref()?,
        })
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_bit(self.public)?;
        builder.store_ref(self.root.clone())?;
        Ok(())
    }
}

/// Code, data and libraries a contract is deployed with
///
/// The representation hash of its cell is the hash part of the contract address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateInit {
    /// `Maybe (## 5)`
    pub split_depth: Option<u8>,
    pub special: Option<TickTock>,
    pub code: Option<Arc<Cell>>,
    pub data: Option<Arc<Cell>>,
    /// Libraries keyed by the hash of their root cell
    pub library: DictE<256>,
}

impl StateInit {
    const SPLIT_DEPTH_BITS: usize = 5;

    pub fn new(code: Arc<Cell>, data: Arc<Cell>) -> Self {
        Self {
            code: Some(code),
            data: Some(data),
            ..Default::default()
        }
    }

    /// Adds a library, keyed by the hash of its root
    pub fn add_library(&mut self, library: SimpleLib) -> Result<()> {
        let key = num_bigint::BigUint::from_bytes_be(&library.root.hash());
        self.library.insert_as(key, &library)
    }

    /// Derives the address of the contract deployed with this state
    pub fn address(&self, workchain: i8) -> Result<Address> {
        Ok(Address::new(workchain, self.cell_hash()?))
    }
}

impl Tlb for StateInit {
    fn read_definition(slice: &mut Slice) -> Result<Self> {
        let split_depth = if slice.load_bit()? {
            Some(slice.load_uint(Self::SPLIT_DEPTH_BITS)? as u8)
        } else {
            None
        };

        Ok(Self {
            split_depth,
            special: Option::<TickTock>::read(slice)?,
            code: slice.load_maybe_ref()?,
            data: slice.load_maybe_ref()?,
            library: DictE::read(slice)?,
        })
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        match self.split_depth {
            Some(depth) => {
                if depth as usize >= 1 << Self::SPLIT_DEPTH_BITS {
                    return Err(CellError::out_of_range(format!(
                        "split depth {depth} doesn't fit into {} bits",
                        Self::SPLIT_DEPTH_BITS
                    )));
                }
                builder.store_bit(true)?;
                builder.store_uint(depth as u64, Self::SPLIT_DEPTH_BITS)?;
            }
            None => {
                builder.store_bit(false)?;
            }
        }
        self.special.write(builder)?;
        builder.store_maybe_ref(self.code.clone())?;
        builder.store_maybe_ref(self.data.clone())?;
        self.library.write(builder)
    }
}
