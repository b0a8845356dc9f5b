//! Bag of Cells (BoC) serialization and deserialization
//!
//! BoC is a serialization format that encodes cells into byte arrays.
//! It allows storing and transmitting cell structures efficiently.
//!
//! ```text
//! serialized_boc#b5ee9c72 has_idx:(## 1) has_crc32c:(## 1)
//!   has_cache_bits:(## 1) flags:(## 2) { flags = 0 }
//!   size:(## 3) { size <= 4 }
//!   off_bytes:(## 8) { off_bytes <= 8 }
//!   cells:(##(size * 8))
//!   roots:(##(size * 8)) { roots >= 1 }
//!   absent:(##(size * 8)) { roots + absent <= cells }
//!   tot_cells_size:(##(off_bytes * 8))
//!   root_list:(roots * ##(size * 8))
//!   index:has_idx?(cells * ##(off_bytes * 8))
//!   cell_data:(tot_cells_size * [ uint8 ])
//!   crc32c:has_crc32c?uint32
//!   = BagOfCells;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine;

use crate::config::BocConfig;
use crate::crc::CRC32C;
use crate::tvm::cell::{Cell, MAX_CELL_REFS};
use crate::tvm::error::{CellError, Result};
use crate::tvm::hash::{CellHash, CellType, LevelMask};

/// BoC magic number for standard format
const BOC_GENERIC_MAGIC: u32 = 0xb5ee9c72;

/// BoC magic number for the legacy indexed format
const BOC_INDEXED_MAGIC: u32 = 0x68ff65f3;

/// BoC magic number for the legacy indexed format with CRC32C
const BOC_INDEXED_CRC32C_MAGIC: u32 = 0xacc3a728;

const MAX_REF_SIZE: usize = 4;
const MAX_OFFSET_SIZE: usize = 8;

/// Optional sections written by the encoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BocFlags {
    /// Emit the cell offset index
    pub has_index: bool,
    /// Append a CRC32C checksum of the whole buffer
    pub has_crc32c: bool,
}

impl BocFlags {
    fn header_byte(self, ref_size: usize) -> u8 {
        let mut flags = ref_size as u8;
        if self.has_index {
            flags |= 0x80;
        }
        if self.has_crc32c {
            flags |= 0x40;
        }
        flags
    }
}

/// Serializes a cell and its references into a Bag of Cells (BoC) format
pub fn serialize_boc(root: &Arc<Cell>, has_crc32c: bool) -> Result<Vec<u8>> {
    serialize_boc_with(
        std::slice::from_ref(root),
        &BocFlags {
            has_index: false,
            has_crc32c,
        },
    )
}

/// Serializes several roots into one BoC, sharing common subtrees
pub fn serialize_boc_with(roots: &[Arc<Cell>], flags: &BocFlags) -> Result<Vec<u8>> {
    if roots.is_empty() {
        return Err(CellError::format("BoC needs at least one root"));
    }

    let cells = collect_cells(roots);
    let indices: HashMap<CellHash, usize> = cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| (cell.hash(), idx))
        .collect();

    let ref_size = bytes_needed(cells.len());

    let mut cell_data = Vec::new();
    let mut offsets = Vec::with_capacity(cells.len());
    for cell in &cells {
        serialize_cell(cell, &indices, ref_size, &mut cell_data)?;
        offsets.push(cell_data.len());
    }

    let offset_size = bytes_needed(cell_data.len());

    let mut result = Vec::with_capacity(cell_data.len() + 32);
    result.extend_from_slice(&BOC_GENERIC_MAGIC.to_be_bytes());
    result.push(flags.header_byte(ref_size));
    result.push(offset_size as u8);

    write_uint(&mut result, cells.len(), ref_size);
    write_uint(&mut result, roots.len(), ref_size);
    // absent
    write_uint(&mut result, 0, ref_size);
    write_uint(&mut result, cell_data.len(), offset_size);

    for root in roots {
        write_uint(&mut result, indices[&root.hash()], ref_size);
    }

    if flags.has_index {
        for offset in offsets {
            write_uint(&mut result, offset, offset_size);
        }
    }

    result.extend_from_slice(&cell_data);

    if flags.has_crc32c {
        let crc = CRC32C.checksum(&result);
        result.extend_from_slice(&crc.to_le_bytes());
    }

    log::debug!(
        "serialized BoC: {} roots, {} cells, {} bytes",
        roots.len(),
        cells.len(),
        result.len()
    );

    Ok(result)
}

/// Orders the reachable cells so every reference points to a higher index
fn collect_cells(roots: &[Arc<Cell>]) -> Vec<Arc<Cell>> {
    let mut post_order = Vec::new();
    let mut visited = HashSet::new();
    for root in roots.iter().rev() {
        visit_cell(root, &mut post_order, &mut visited);
    }
    post_order.reverse();
    post_order
}

fn visit_cell(
    cell: &Arc<Cell>,
    post_order: &mut Vec<Arc<Cell>>,
    visited: &mut HashSet<CellHash>,
) {
    if !visited.insert(cell.hash()) {
        return;
    }

    for reference in cell.references().iter().rev() {
        visit_cell(reference, post_order, visited);
    }
    post_order.push(cell.clone());
}

fn serialize_cell(
    cell: &Arc<Cell>,
    indices: &HashMap<CellHash, usize>,
    ref_size: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    out.extend_from_slice(&cell.descriptors());
    out.extend_from_slice(&cell.serialize_data());

    for reference in cell.references() {
        let ref_idx = indices
            .get(&reference.hash())
            .ok_or_else(|| CellError::format("reference not found in cell map"))?;
        write_uint(out, *ref_idx, ref_size);
    }

    log::trace!(
        "cell {} ({} bits, {} refs)",
        cell.hex_hash(),
        cell.bit_len(),
        cell.reference_count()
    );
    Ok(())
}

/// Serializes roots with the encoder flags of a [`BocConfig`]
pub fn serialize_boc_with_config(roots: &[Arc<Cell>], config: &BocConfig) -> Result<Vec<u8>> {
    serialize_boc_with(roots, &config.flags())
}

/// Deserializes a Bag of Cells (BoC) with exactly one root
pub fn deserialize_boc(data: &[u8]) -> Result<Arc<Cell>> {
    let mut roots = deserialize_boc_with(data, &BocConfig::default())?;
    if roots.len() != 1 {
        return Err(CellError::format(format!(
            "expected a single root, BoC has {}",
            roots.len()
        )));
    }
    Ok(roots.remove(0))
}

/// Deserializes all roots of a Bag of Cells
pub fn deserialize_boc_many(data: &[u8]) -> Result<Vec<Arc<Cell>>> {
    deserialize_boc_with(data, &BocConfig::default())
}

/// Deserializes all roots of a Bag of Cells under the given limits
pub fn deserialize_boc_with(data: &[u8], config: &BocConfig) -> Result<Vec<Arc<Cell>>> {
    parse_boc(data, config).inspect_err(|e| log::warn!("rejected BoC of {} bytes: {e}", data.len()))
}

struct BocHeader {
    has_index: bool,
    has_crc32c: bool,
    has_cache_bits: bool,
    ref_size: usize,
    offset_size: usize,
    cells_count: usize,
    tot_cells_size: usize,
    root_indices: Vec<usize>,
}

struct RawCell {
    cell_type: CellType,
    level_mask: u8,
    data: Vec<u8>,
    bit_len: usize,
    references: Vec<usize>,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(CellError::format(format!(
                "unexpected end of BoC at byte {}, need {n} more",
                self.pos
            )));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_uint(&mut self, size: usize) -> Result<usize> {
        let bytes = self.read_bytes(size)?;
        let mut result = 0u64;
        for &b in bytes {
            result = (result << 8) | b as u64;
        }
        usize::try_from(result).map_err(|_| CellError::format("BoC size field overflows usize"))
    }
}

fn read_header(reader: &mut Reader, config: &BocConfig) -> Result<BocHeader> {
    let magic = u32::from_be_bytes(
        reader
            .read_bytes(4)?
            .try_into()
            .map_err(|_| CellError::format("BoC magic must be 4 bytes"))?,
    );
    let first_byte = reader.read_u8()?;

    let (has_index, has_crc32c, has_cache_bits, ref_size) = match magic {
        BOC_GENERIC_MAGIC => {
            if first_byte & 0b0001_1000 != 0 {
                return Err(CellError::format("non-zero BoC flags field is not supported"));
            }
            (
                first_byte & 0x80 != 0,
                first_byte & 0x40 != 0,
                first_byte & 0x20 != 0,
                (first_byte & 0x07) as usize,
            )
        }
        BOC_INDEXED_MAGIC => (true, false, false, first_byte as usize),
        BOC_INDEXED_CRC32C_MAGIC => (true, true, false, first_byte as usize),
        _ => {
            return Err(CellError::format(format!(
                "invalid BoC magic number: 0x{magic:08x}"
            )));
        }
    };

    if has_cache_bits && !has_index {
        return Err(CellError::format("cache bits require an index"));
    }
    if ref_size == 0 || ref_size > MAX_REF_SIZE {
        return Err(CellError::format(format!(
            "ref size must be in 1..={MAX_REF_SIZE}, got {ref_size}"
        )));
    }

    let offset_size = reader.read_u8()? as usize;
    if offset_size == 0 || offset_size > MAX_OFFSET_SIZE {
        return Err(CellError::format(format!(
            "offset size must be in 1..={MAX_OFFSET_SIZE}, got {offset_size}"
        )));
    }

    let cells_count = reader.read_uint(ref_size)?;
    let roots_count = reader.read_uint(ref_size)?;
    let absent_count = reader.read_uint(ref_size)?;

    if cells_count == 0 {
        return Err(CellError::format("cell count is zero"));
    }
    if cells_count > config.max_cells {
        return Err(CellError::format(format!(
            "BoC has {cells_count} cells, limit is {}",
            config.max_cells
        )));
    }
    if roots_count == 0 {
        return Err(CellError::format("root count is zero"));
    }
    if roots_count > config.max_roots {
        return Err(CellError::format(format!(
            "BoC has {roots_count} roots, limit is {}",
            config.max_roots
        )));
    }
    if magic != BOC_GENERIC_MAGIC && roots_count != 1 {
        return Err(CellError::format(format!(
            "indexed BoC must have a single root, got {roots_count}"
        )));
    }
    if roots_count + absent_count > cells_count {
        return Err(CellError::format(format!(
            "roots ({roots_count}) + absent ({absent_count}) exceed cells ({cells_count})"
        )));
    }
    if absent_count != 0 {
        return Err(CellError::format("absent cells are not supported"));
    }

    let tot_cells_size = reader.read_uint(offset_size)?;
    if tot_cells_size < cells_count.saturating_mul(2) {
        return Err(CellError::format(
            "total cells size is too small for the cell count",
        ));
    }

    let root_indices = if magic == BOC_GENERIC_MAGIC {
        let mut root_indices = Vec::with_capacity(roots_count);
        for _ in 0..roots_count {
            let index = reader.read_uint(ref_size)?;
            if index >= cells_count {
                return Err(CellError::ReferenceOutOfRange {
                    index,
                    count: cells_count,
                });
            }
            root_indices.push(index);
        }
        root_indices
    } else {
        vec![0]
    };

    Ok(BocHeader {
        has_index,
        has_crc32c,
        has_cache_bits,
        ref_size,
        offset_size,
        cells_count,
        tot_cells_size,
        root_indices,
    })
}

fn read_index(reader: &mut Reader, header: &BocHeader) -> Result<Option<Vec<usize>>> {
    if !header.has_index {
        return Ok(None);
    }

    let mut index = Vec::with_capacity(header.cells_count);
    let mut prev = 0;
    for _ in 0..header.cells_count {
        let mut offset = reader.read_uint(header.offset_size)?;
        if header.has_cache_bits {
            offset >>= 1;
        }
        if offset < prev || offset > header.tot_cells_size {
            return Err(CellError::format(format!(
                "BoC index is not monotonic at offset {offset}"
            )));
        }
        prev = offset;
        index.push(offset);
    }
    if prev != header.tot_cells_size {
        return Err(CellError::format(
            "BoC index does not cover the total cells size",
        ));
    }
    Ok(Some(index))
}

fn read_cell(reader: &mut Reader, own_index: usize, header: &BocHeader) -> Result<RawCell> {
    let d1 = reader.read_u8()?;
    let d2 = reader.read_u8()?;

    let ref_count = (d1 & 0x07) as usize;
    let is_exotic = d1 & 0x08 != 0;
    let with_hashes = d1 & 0x10 != 0;
    let level_mask = d1 >> 5;

    if ref_count > MAX_CELL_REFS {
        return Err(CellError::format(format!(
            "cell {own_index} has {ref_count} refs, at most {MAX_CELL_REFS} allowed"
        )));
    }
    if with_hashes {
        return Err(CellError::format(format!(
            "cell {own_index} carries stored hashes, which are not supported"
        )));
    }

    let data_size = (d2 as usize).div_ceil(2);
    let data = reader.read_bytes(data_size)?.to_vec();

    let bit_len = if d2 % 2 == 0 {
        data_size * 8
    } else {
        // the last byte holds the completion tag
        let last = data[data_size - 1];
        if last == 0 {
            return Err(CellError::format(format!(
                "cell {own_index} is missing its padding tag"
            )));
        }
        data_size * 8 - last.trailing_zeros() as usize - 1
    };

    let cell_type = if is_exotic {
        if bit_len < 8 {
            return Err(CellError::format(format!(
                "exotic cell {own_index} has no type byte"
            )));
        }
        CellType::from_type_byte(data[0]).ok_or_else(|| {
            CellError::format(format!(
                "exotic cell {own_index} has unknown type 0x{:02x}",
                data[0]
            ))
        })?
    } else {
        CellType::Ordinary
    };

    let mut references = Vec::with_capacity(ref_count);
    for _ in 0..ref_count {
        let index = reader.read_uint(header.ref_size)?;
        if index >= header.cells_count {
            return Err(CellError::ReferenceOutOfRange {
                index,
                count: header.cells_count,
            });
        }
        if index <= own_index {
            return Err(CellError::format(format!(
                "cell {own_index} references cell {index}, references must point forward"
            )));
        }
        references.push(index);
    }

    Ok(RawCell {
        cell_type,
        level_mask,
        data,
        bit_len,
        references,
    })
}

fn parse_boc(data: &[u8], config: &BocConfig) -> Result<Vec<Arc<Cell>>> {
    let mut reader = Reader::new(data);
    let header = read_header(&mut reader, config)?;
    let index = read_index(&mut reader, &header)?;

    let cells_start = reader.pos;
    let crc_size = if header.has_crc32c { 4 } else { 0 };
    let available = data.len() - cells_start;
    let fits = header
        .tot_cells_size
        .checked_add(crc_size)
        .is_some_and(|required| required <= available);
    if !fits {
        return Err(CellError::format(format!(
            "BoC truncated: {} bytes of cells declared, {available} available",
            header.tot_cells_size
        )));
    }

    let mut raw_cells = Vec::with_capacity(header.cells_count);
    for i in 0..header.cells_count {
        raw_cells.push(read_cell(&mut reader, i, &header)?);
        let offset = reader.pos - cells_start;
        if offset > header.tot_cells_size {
            return Err(CellError::format(format!(
                "cell {i} overruns the declared cells size"
            )));
        }
        if let Some(expected) = index.as_ref().map(|index| index[i]) {
            if expected != offset {
                return Err(CellError::format(format!(
                    "cell {i} ends at {offset}, index says {expected}"
                )));
            }
        }
    }
    if reader.pos - cells_start != header.tot_cells_size {
        return Err(CellError::format(format!(
            "cells occupy {} bytes, header declares {}",
            reader.pos - cells_start,
            header.tot_cells_size
        )));
    }

    if header.has_crc32c {
        let crc_pos = reader.pos;
        let expected = u32::from_le_bytes(
            reader
                .read_bytes(4)?
                .try_into()
                .map_err(|_| CellError::format("CRC32C must be 4 bytes"))?,
        );
        if config.verify_crc {
            let actual = CRC32C.checksum(&data[..crc_pos]);
            if expected != actual {
                return Err(CellError::format(format!(
                    "CRC32C mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
                )));
            }
        }
    }

    if reader.pos != data.len() {
        return Err(CellError::format(format!(
            "{} trailing bytes after BoC",
            data.len() - reader.pos
        )));
    }

    let cells = build_cells(raw_cells, config)?;
    let roots = header
        .root_indices
        .iter()
        .map(|&i| cells[i].clone())
        .collect::<Vec<_>>();

    log::debug!(
        "deserialized BoC: {} roots, {} cells, {} bytes",
        roots.len(),
        cells.len(),
        data.len()
    );

    Ok(roots)
}

/// Builds cells from the last record to the first so references always exist
fn build_cells(raw_cells: Vec<RawCell>, config: &BocConfig) -> Result<Vec<Arc<Cell>>> {
    let count = raw_cells.len();
    let mut cells: Vec<Option<Arc<Cell>>> = vec![None; count];
    let mut by_hash: HashMap<CellHash, Arc<Cell>> = HashMap::new();

    for (i, raw) in raw_cells.into_iter().enumerate().rev() {
        let references = raw
            .references
            .iter()
            .map(|&r| {
                cells[r]
                    .clone()
                    .ok_or_else(|| CellError::format(format!("cell {r} is not built yet")))
            })
            .collect::<Result<Vec<_>>>()?;

        let cell = Cell::from_parts(raw.cell_type, raw.data, raw.bit_len, references)?;
        if cell.level_mask() != LevelMask::new(raw.level_mask) {
            return Err(CellError::format(format!(
                "cell {i} declares level mask {}, computed {}",
                raw.level_mask,
                cell.level_mask()
            )));
        }

        let depth = cell.depth() as usize;
        if depth > config.max_depth {
            return Err(CellError::format(format!(
                "cell {i} depth {depth} exceeds limit {}",
                config.max_depth
            )));
        }

        let hash = cell.hash();
        let cell = by_hash
            .entry(hash)
            .or_insert_with(|| Arc::new(cell))
            .clone();
        log::trace!("decoded cell {i}: {}", hex::encode(hash));
        cells[i] = Some(cell);
    }

    cells
        .into_iter()
        .enumerate()
        .map(|(i, c)| c.ok_or_else(|| CellError::format(format!("cell {i} was not decoded"))))
        .collect()
}

fn bytes_needed(value: usize) -> usize {
    if value == 0 {
        return 1;
    }

    let bits = (usize::BITS - value.leading_zeros()) as usize;
    bits.div_ceil(8)
}

fn write_uint(buf: &mut Vec<u8>, value: usize, size: usize) {
    let bytes = (value as u64).to_be_bytes();
    buf.extend_from_slice(&bytes[8 - size..]);
}

/// Converts a hex string to a BoC
pub fn hex_to_boc(hex: &str) -> Result<Arc<Cell>> {
    let hex: String = hex.split_whitespace().collect();
    let bytes =
        hex::decode(&hex).map_err(|e| CellError::format(format!("failed to decode hex: {e}")))?;
    deserialize_boc(&bytes)
}

/// Converts a BoC to a hex string
pub fn boc_to_hex(cell: &Arc<Cell>, has_crc32c: bool) -> Result<String> {
    let bytes = serialize_boc(cell, has_crc32c)?;
    Ok(hex::encode(bytes))
}

/// Converts a BoC to base64
pub fn boc_to_base64(cell: &Arc<Cell>, has_crc32c: bool) -> Result<String> {
    let bytes = serialize_boc(cell, has_crc32c)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Converts a base64 string (standard or url-safe alphabet) to a BoC
pub fn base64_to_boc(b64: &str) -> Result<Arc<Cell>> {
    let b64 = b64.trim();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(b64))
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(b64))
        .map_err(|e| CellError::format(format!("failed to decode base64: {e}")))?;
    deserialize_boc(&bytes)
}
