//! Cell descriptors, level masks and representation hashing
//!
//! Every cell is hashed as
//! `sha256(d1 || d2 || data || depth(ref_0) .. depth(ref_n) || hash(ref_0) .. hash(ref_n))`
//! where `d1 = refs + 8 * exotic + 32 * level_mask` and `d2 = floor(b/8) + ceil(b/8)`.
//! Cells with a non-zero level (those below a Merkle proof or update) carry one hash
//! per significant level; for levels above zero the data part is replaced by the hash
//! of the previous level.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::tvm::cell::Cell;
use crate::tvm::error::{CellError, Result};

/// Size of a cell hash in bytes
pub const HASH_BYTES: usize = 32;

/// Size of a serialized cell depth in bytes
pub const DEPTH_BYTES: usize = 2;

/// Representation hash of a cell
pub type CellHash = [u8; HASH_BYTES];

/// Hash of a cell without data and references
pub const EMPTY_CELL_HASH: CellHash = [
    0x96, 0xa2, 0x96, 0xd2, 0x24, 0xf2, 0x85, 0xc6, 0x7b, 0xee, 0x93, 0xc3, 0x0f, 0x8a, 0x30,
    0x91, 0x57, 0xf0, 0xda, 0xa3, 0x5d, 0xc5, 0xb8, 0x7e, 0x41, 0x0b, 0x78, 0x63, 0x0a, 0x09,
    0xcf, 0xc7,
];

/// Kind of a cell
///
/// Exotic kinds change the descriptor byte and the hashing rules, so the kind is
/// always carried explicitly instead of being guessed from the cell contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellType {
    #[default]
    Ordinary,
    PrunedBranch,
    Library,
    MerkleProof,
    MerkleUpdate,
}

impl CellType {
    /// Decodes the type byte stored in the first 8 bits of an exotic cell
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(CellType::PrunedBranch),
            2 => Some(CellType::Library),
            3 => Some(CellType::MerkleProof),
            4 => Some(CellType::MerkleUpdate),
            _ => None,
        }
    }

    /// Type byte of an exotic cell, `None` for ordinary cells
    pub fn type_byte(self) -> Option<u8> {
        match self {
            CellType::Ordinary => None,
            CellType::PrunedBranch => Some(1),
            CellType::Library => Some(2),
            CellType::MerkleProof => Some(3),
            CellType::MerkleUpdate => Some(4),
        }
    }

    pub fn is_exotic(self) -> bool {
        self != CellType::Ordinary
    }

    pub fn is_merkle(self) -> bool {
        matches!(self, CellType::MerkleProof | CellType::MerkleUpdate)
    }
}

/// Three-bit mask of the levels at which a cell has distinct hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LevelMask(u8);

impl LevelMask {
    pub const EMPTY: Self = LevelMask(0);

    /// Maximum cell level
    pub const MAX_LEVEL: u8 = 3;

    pub fn new(mask: u8) -> Self {
        LevelMask(mask & 0b111)
    }

    pub fn mask(self) -> u8 {
        self.0
    }

    /// Level of the cell: position of the highest set bit
    pub fn level(self) -> u8 {
        (8 - self.0.leading_zeros()) as u8
    }

    /// Index of the representation hash among the stored hashes
    pub fn hash_index(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn hash_count(self) -> usize {
        self.hash_index() + 1
    }

    /// Restricts the mask to the levels below `level`
    pub fn apply(self, level: u8) -> Self {
        LevelMask(self.0 & ((1u8 << level.min(Self::MAX_LEVEL)) - 1))
    }

    pub fn is_significant(self, level: u8) -> bool {
        level == 0 || (self.0 >> (level - 1)) & 1 != 0
    }

    pub(crate) fn virtualize(self, offset: u8) -> Self {
        LevelMask(self.0 >> offset)
    }
}

impl BitOr for LevelMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        LevelMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for LevelMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for LevelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03b}", self.0)
    }
}

/// First descriptor byte: `r + 8s + 32l`
pub fn refs_descriptor(ref_count: usize, is_exotic: bool, level_mask: LevelMask) -> u8 {
    ref_count as u8 + if is_exotic { 8 } else { 0 } + level_mask.mask() * 32
}

/// Second descriptor byte: `floor(b/8) + ceil(b/8)`
pub fn bits_descriptor(bit_len: usize) -> u8 {
    (bit_len / 8 + bit_len.div_ceil(8)) as u8
}

/// Returns the cell data with the completion tag appended when `bit_len` is not
/// byte aligned: a single `1` bit right after the data, zeros after it.
pub fn pad_data(data: &[u8], bit_len: usize) -> Vec<u8> {
    let mut result = data[..bit_len.div_ceil(8)].to_vec();
    let rem = bit_len % 8;
    if rem != 0 {
        let last = result.len() - 1;
        let tag_mask = 1u8 << (7 - rem);
        result[last] = (result[last] & !(tag_mask - 1)) | tag_mask;
    }
    result
}

/// Hashes and depths of a cell for each of the four levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CellHashes {
    pub hashes: [CellHash; 4],
    pub depths: [u16; 4],
}

/// Computes the level mask of a cell and checks exotic cell layouts
pub(crate) fn resolve_level_mask(
    cell_type: CellType,
    data: &[u8],
    bit_len: usize,
    references: &[Arc<Cell>],
) -> Result<LevelMask> {
    if let Some(type_byte) = cell_type.type_byte() {
        if bit_len < 8 || data.first() != Some(&type_byte) {
            return Err(CellError::format(format!(
                "{cell_type:?} cell must start with type byte {type_byte}"
            )));
        }
    }

    match cell_type {
        CellType::Ordinary => {
            let mut mask = LevelMask::EMPTY;
            for reference in references {
                mask |= reference.level_mask();
            }
            Ok(mask)
        }
        CellType::PrunedBranch => {
            if !references.is_empty() {
                return Err(CellError::format("pruned branch cell can't have references"));
            }
            if bit_len < 16 {
                return Err(CellError::format("pruned branch cell is too short"));
            }
            let mask = LevelMask::new(data[1]);
            if mask.mask() == 0 || data[1] > 7 {
                return Err(CellError::format(format!(
                    "invalid pruned branch level mask {}",
                    data[1]
                )));
            }
            let expected = 16 + mask.hash_index() * (HASH_BYTES + DEPTH_BYTES) * 8;
            if bit_len != expected {
                return Err(CellError::format(format!(
                    "pruned branch cell must have {expected} bits, got {bit_len}"
                )));
            }
            Ok(mask)
        }
        CellType::Library => {
            if !references.is_empty() {
                return Err(CellError::format("library cell can't have references"));
            }
            if bit_len != 8 + HASH_BYTES * 8 {
                return Err(CellError::format(format!(
                    "library cell must have 264 bits, got {bit_len}"
                )));
            }
            Ok(LevelMask::EMPTY)
        }
        CellType::MerkleProof => {
            if references.len() != 1 {
                return Err(CellError::format("merkle proof cell must have exactly one reference"));
            }
            if bit_len != 8 + (HASH_BYTES + DEPTH_BYTES) * 8 {
                return Err(CellError::format(format!(
                    "merkle proof cell must have 280 bits, got {bit_len}"
                )));
            }
            check_merkle_child(data, 1, 1 + HASH_BYTES, &references[0])?;
            Ok(references[0].level_mask().virtualize(1))
        }
        CellType::MerkleUpdate => {
            if references.len() != 2 {
                return Err(CellError::format("merkle update cell must have exactly two references"));
            }
            if bit_len != 8 + 2 * (HASH_BYTES + DEPTH_BYTES) * 8 {
                return Err(CellError::format(format!(
                    "merkle update cell must have 552 bits, got {bit_len}"
                )));
            }
            let depths_offset = 1 + 2 * HASH_BYTES;
            check_merkle_child(data, 1, depths_offset, &references[0])?;
            check_merkle_child(
                data,
                1 + HASH_BYTES,
                depths_offset + DEPTH_BYTES,
                &references[1],
            )?;
            Ok((references[0].level_mask() | references[1].level_mask()).virtualize(1))
        }
    }
}

fn check_merkle_child(
    data: &[u8],
    hash_offset: usize,
    depth_offset: usize,
    child: &Arc<Cell>,
) -> Result<()> {
    let stored_hash = &data[hash_offset..hash_offset + HASH_BYTES];
    if stored_hash != child.hash_at(0) {
        return Err(CellError::format("merkle cell hash does not match its child"));
    }
    let stored_depth = u16::from_be_bytes([data[depth_offset], data[depth_offset + 1]]);
    if stored_depth != child.depth_at(0) {
        return Err(CellError::format("merkle cell depth does not match its child"));
    }
    Ok(())
}

/// Computes hashes and depths for every level of a finalized cell
pub(crate) fn compute_hashes(cell: &Cell) -> CellHashes {
    let cell_type = cell.cell_type();
    let level_mask = cell.level_mask();
    let references = cell.references();

    let total_count = level_mask.hash_count();
    // A pruned branch stores every lower hash in its data and computes only its own
    let offset = if cell_type == CellType::PrunedBranch {
        total_count - 1
    } else {
        0
    };

    let mut hashes: Vec<CellHash> = Vec::with_capacity(total_count - offset);
    let mut depths: Vec<u16> = Vec::with_capacity(total_count - offset);
    let mut hash_i = 0;

    for level in 0..=level_mask.level() {
        if !level_mask.is_significant(level) {
            continue;
        }
        if hash_i < offset {
            hash_i += 1;
            continue;
        }

        let child_level = if cell_type.is_merkle() { level + 1 } else { level };

        let mut depth = 0u16;
        for reference in references {
            depth = depth.max(reference.depth_at(child_level));
        }
        if !references.is_empty() {
            depth += 1;
        }

        let mut hasher = Sha256::new();
        hasher.update([
            refs_descriptor(references.len(), cell_type.is_exotic(), level_mask.apply(level)),
            bits_descriptor(cell.bit_len()),
        ]);
        match hashes.last() {
            Some(previous) => hasher.update(previous),
            None => hasher.update(pad_data(cell.data(), cell.bit_len())),
        }
        for reference in references {
            hasher.update(reference.depth_at(child_level).to_be_bytes());
        }
        for reference in references {
            hasher.update(reference.hash_at(child_level));
        }

        hashes.push(hasher.finalize().into());
        depths.push(depth);
        hash_i += 1;
    }

    let mut resolved = CellHashes {
        hashes: [[0u8; HASH_BYTES]; 4],
        depths: [0u16; 4],
    };

    for level in 0..=LevelMask::MAX_LEVEL {
        let index = level_mask.apply(level).hash_index();
        let slot = level as usize;
        if cell_type == CellType::PrunedBranch {
            if index != level_mask.hash_index() {
                resolved.hashes[slot] = pruned_hash(cell.data(), index);
                resolved.depths[slot] = pruned_depth(cell.data(), level_mask, index);
            } else {
                resolved.hashes[slot] = hashes[0];
                resolved.depths[slot] = depths[0];
            }
        } else {
            resolved.hashes[slot] = hashes[index];
            resolved.depths[slot] = depths[index];
        }
    }

    resolved
}

fn pruned_hash(data: &[u8], index: usize) -> CellHash {
    let start = 2 + index * HASH_BYTES;
    let mut hash = [0u8; HASH_BYTES];
    hash.copy_from_slice(&data[start..start + HASH_BYTES]);
    hash
}

fn pruned_depth(data: &[u8], level_mask: LevelMask, index: usize) -> u16 {
    let start = 2 + level_mask.hash_index() * HASH_BYTES + index * DEPTH_BYTES;
    u16::from_be_bytes([data[start], data[start + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mask_levels() {
        assert_eq!(LevelMask::new(0).level(), 0);
        assert_eq!(LevelMask::new(1).level(), 1);
        assert_eq!(LevelMask::new(0b100).level(), 3);
        assert_eq!(LevelMask::new(0b101).hash_index(), 2);
        assert_eq!(LevelMask::new(0b101).apply(1), LevelMask::new(1));
        assert!(LevelMask::new(0b100).is_significant(3));
        assert!(!LevelMask::new(0b100).is_significant(1));
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(refs_descriptor(2, false, LevelMask::EMPTY), 2);
        assert_eq!(refs_descriptor(0, true, LevelMask::new(1)), 40);
        assert_eq!(bits_descriptor(0), 0);
        assert_eq!(bits_descriptor(8), 2);
        assert_eq!(bits_descriptor(9), 3);
        assert_eq!(bits_descriptor(1023), 255);
    }

    #[test]
    fn test_pad_data() {
        // 3 bits `101` -> 1011_0000
        assert_eq!(pad_data(&[0b1010_0000], 3), vec![0b1011_0000]);
        assert_eq!(pad_data(&[0xAB], 8), vec![0xAB]);
        assert!(pad_data(&[], 0).is_empty());
    }

    #[test]
    fn test_cell_type_bytes() {
        for byte in 1..=4 {
            let ty = CellType::from_type_byte(byte).unwrap();
            assert!(ty.is_exotic());
            assert_eq!(ty.type_byte(), Some(byte));
        }
        assert_eq!(CellType::from_type_byte(0), None);
        assert_eq!(CellType::Ordinary.type_byte(), None);
    }
}
