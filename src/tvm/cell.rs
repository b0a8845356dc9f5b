//! Cell implementation for TON blockchain
//!
//! A cell is a fundamental data structure in TON that can store up to 1023 bits
//! of data and maintain up to 4 references to other cells. Cells are immutable once
//! built and are shared through `Arc`, so a child may be referenced by many parents.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::tvm::error::{CellError, Result};
use crate::tvm::hash::{
    self, CellHash, CellHashes, CellType, LevelMask, bits_descriptor, refs_descriptor,
};

/// Maximum number of bits a cell can store
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of references a cell can have
pub const MAX_CELL_REFS: usize = 4;

/// Cell level range (0-3)
pub const MAX_CELL_LEVEL: u8 = LevelMask::MAX_LEVEL;

/// Represents a cell in the TON blockchain
#[derive(Debug, Clone)]
pub struct Cell {
    /// Kind of the cell
    cell_type: CellType,
    /// Cell data, exactly `ceil(bit_len / 8)` bytes with unused low bits cleared
    data: Vec<u8>,
    /// Number of bits in the cell (not necessarily a multiple of 8)
    bit_len: usize,
    /// References to other cells
    references: Vec<Arc<Cell>>,
    level_mask: LevelMask,
    /// Hashes and depths, filled in when the cell is finalized
    hashes: OnceLock<CellHashes>,
}

impl Cell {
    /// Creates a new empty cell
    pub fn new() -> Self {
        Self {
            cell_type: CellType::Ordinary,
            data: Vec::new(),
            bit_len: 0,
            references: Vec::new(),
            level_mask: LevelMask::EMPTY,
            hashes: OnceLock::new(),
        }
    }

    /// Creates an ordinary cell with the given data and bit length
    pub fn with_data(data: Vec<u8>, bit_len: usize) -> Result<Self> {
        Self::from_parts(CellType::Ordinary, data, bit_len, Vec::new())
    }

    /// Creates a cell from its parts, checking size limits and exotic layouts
    pub fn from_parts(
        cell_type: CellType,
        mut data: Vec<u8>,
        bit_len: usize,
        references: Vec<Arc<Cell>>,
    ) -> Result<Self> {
        if bit_len > MAX_CELL_BITS {
            return Err(CellError::bits(bit_len, MAX_CELL_BITS));
        }
        if references.len() > MAX_CELL_REFS {
            return Err(CellError::refs(references.len(), MAX_CELL_REFS));
        }

        let required_bytes = bit_len.div_ceil(8);
        if data.len() < required_bytes {
            return Err(CellError::format(format!(
                "data length {} is insufficient for {} bits",
                data.len(),
                bit_len
            )));
        }
        data.truncate(required_bytes);
        let rem = bit_len % 8;
        if rem != 0 {
            data[required_bytes - 1] &= 0xFFu8 << (8 - rem);
        }

        let level_mask = hash::resolve_level_mask(cell_type, &data, bit_len, &references)?;

        let cell = Self {
            cell_type,
            data,
            bit_len,
            references,
            level_mask,
            hashes: OnceLock::new(),
        };
        // children are already hashed, so this only looks one level down
        cell.hashes();
        Ok(cell)
    }

    /// Returns the cell's data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of bits in the cell
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Returns the cell's references
    pub fn references(&self) -> &[Arc<Cell>] {
        &self.references
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Returns whether this is an exotic cell
    pub fn is_exotic(&self) -> bool {
        self.cell_type.is_exotic()
    }

    pub fn level_mask(&self) -> LevelMask {
        self.level_mask
    }

    /// Returns the cell's level
    pub fn level(&self) -> u8 {
        self.level_mask.level()
    }

    /// Returns true if the cell holds no bits and no references
    pub fn is_empty(&self) -> bool {
        self.bit_len == 0 && self.references.is_empty()
    }

    /// Computes the cell's descriptors (2 bytes)
    pub fn descriptors(&self) -> [u8; 2] {
        [
            refs_descriptor(self.references.len(), self.is_exotic(), self.level_mask),
            bits_descriptor(self.bit_len),
        ]
    }

    /// Serializes the cell data with the completion tag if needed
    pub fn serialize_data(&self) -> Vec<u8> {
        hash::pad_data(&self.data, self.bit_len)
    }

    fn hashes(&self) -> &CellHashes {
        self.hashes.get_or_init(|| hash::compute_hashes(self))
    }

    /// Returns the representation hash of the cell
    pub fn hash(&self) -> CellHash {
        self.hash_at(MAX_CELL_LEVEL)
    }

    /// Returns the hash of the cell at the given level
    pub fn hash_at(&self, level: u8) -> CellHash {
        self.hashes().hashes[level.min(MAX_CELL_LEVEL) as usize]
    }

    /// Returns the representation depth of the cell
    pub fn depth(&self) -> u16 {
        self.depth_at(MAX_CELL_LEVEL)
    }

    pub fn depth_at(&self, level: u8) -> u16 {
        self.hashes().depths[level.min(MAX_CELL_LEVEL) as usize]
    }

    /// Returns the representation hash as a hex string
    pub fn hex_hash(&self) -> String {
        hex::encode(self.hash())
    }

    /// Returns the number of references
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Gets a reference by index
    pub fn reference(&self, index: usize) -> Option<&Arc<Cell>> {
        self.references.get(index)
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl fmt::Display for Cell {
    /// Prints the cell tree in fift notation, one cell per line
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_cell(cell: &Cell, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
            let nibbles = cell.bit_len.div_ceil(4);
            let body = if cell.bit_len % 4 == 0 {
                hex::encode_upper(&cell.data)[..nibbles].to_string()
            } else {
                format!("{}_", &hex::encode_upper(cell.serialize_data())[..nibbles])
            };
            let kind = if cell.is_exotic() {
                format!(" {:?}", cell.cell_type)
            } else {
                String::new()
            };
            writeln!(f, "{:indent$}x{{{}}}{}", "", body, kind, indent = indent)?;
            for reference in &cell.references {
                write_cell(reference, f, indent + 1)?;
            }
            Ok(())
        }
        write_cell(self, f, 0)
    }
}

/// Low-level builder for constructing cells
///
/// This is the core, minimal builder that provides basic bit/byte operations.
/// For a higher-level API with TON-specific convenience methods, see [`Builder`](crate::tvm::Builder).
///
/// # Example
///
/// ```rust
/// use toncell_rs::tvm::CellBuilder;
///
/// let mut builder = CellBuilder::new();
/// builder.store_u32(0x12345678).unwrap();
/// builder.store_byte(0xFF).unwrap();
/// let cell = builder.build().unwrap();
/// assert_eq!(cell.bit_len(), 40);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    references: Vec<Arc<Cell>>,
}

impl CellBuilder {
    /// Creates a new cell builder
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(MAX_CELL_BITS.div_ceil(8)),
            bit_len: 0,
            references: Vec::new(),
        }
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn ref_count(&self) -> usize {
        self.references.len()
    }

    pub fn available_bits(&self) -> usize {
        MAX_CELL_BITS - self.bit_len
    }

    pub fn available_refs(&self) -> usize {
        MAX_CELL_REFS - self.references.len()
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn references(&self) -> &[Arc<Cell>] {
        &self.references
    }

    /// Stores the first `bit_len` bits of a byte slice
    pub fn store_bits(&mut self, bits: &[u8], bit_len: usize) -> Result<&mut Self> {
        if bit_len > self.available_bits() {
            return Err(CellError::bits(bit_len, self.available_bits()));
        }

        let required_bytes = bit_len.div_ceil(8);
        if bits.len() < required_bytes {
            return Err(CellError::out_of_range(format!(
                "{} bytes can't hold {} bits",
                bits.len(),
                bit_len
            )));
        }

        let shift = self.bit_len % 8;
        if shift == 0 {
            // byte-aligned fast path
            self.data.extend_from_slice(&bits[..required_bytes]);
        } else {
            for &byte in &bits[..required_bytes] {
                let last = self.data.len() - 1;
                self.data[last] |= byte >> shift;
                self.data.push(byte << (8 - shift));
            }
        }
        self.bit_len += bit_len;

        // Drop bytes and bits beyond the new length
        self.data.truncate(self.bit_len.div_ceil(8));
        let rem = self.bit_len % 8;
        if rem != 0 {
            let last = self.data.len() - 1;
            self.data[last] &= 0xFFu8 << (8 - rem);
        }

        Ok(self)
    }

    /// Stores a byte
    pub fn store_byte(&mut self, byte: u8) -> Result<&mut Self> {
        self.store_bits(&[byte], 8)
    }

    /// Stores multiple bytes
    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.store_bits(bytes, bytes.len() * 8)
    }

    /// Stores a u32 value
    pub fn store_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.store_bits(&value.to_be_bytes(), 32)
    }

    /// Stores a u64 value
    pub fn store_u64(&mut self, value: u64) -> Result<&mut Self> {
        self.store_bits(&value.to_be_bytes(), 64)
    }

    /// Stores the least significant `bits` of the value in big-endian bit order
    pub fn store_uint(&mut self, value: u64, bits: usize) -> Result<&mut Self> {
        if bits > 64 {
            return Err(CellError::out_of_range(format!(
                "can't store {bits} bits from u64"
            )));
        }
        if bits == 0 {
            return Ok(self);
        }
        let aligned = if bits == 64 { value } else { value << (64 - bits) };
        self.store_bits(&aligned.to_be_bytes(), bits)
    }

    /// Stores a single bit
    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self> {
        self.store_bits(&[if bit { 0x80 } else { 0x00 }], 1)
    }

    /// Stores `count` zero bits
    pub fn store_zeroes(&mut self, count: usize) -> Result<&mut Self> {
        self.store_bits(&vec![0u8; count.div_ceil(8)], count)
    }

    /// Adds a reference to another cell
    pub fn store_reference(&mut self, cell: Arc<Cell>) -> Result<&mut Self> {
        if self.references.len() >= MAX_CELL_REFS {
            return Err(CellError::refs(1, 0));
        }
        self.references.push(cell);
        Ok(self)
    }

    /// Builds an ordinary cell
    pub fn build(self) -> Result<Arc<Cell>> {
        self.build_exotic(CellType::Ordinary)
    }

    /// Builds a cell of the given kind, validating exotic layouts
    pub fn build_exotic(self, cell_type: CellType) -> Result<Arc<Cell>> {
        let cell = Cell::from_parts(cell_type, self.data, self.bit_len, self.references)?;
        Ok(Arc::new(cell))
    }
}
