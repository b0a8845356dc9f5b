//! TON Dictionary (HashmapE) implementation
//!
//! Dictionaries in TON are binary tries over fixed-width keys stored in cells:
//!
//! ```text
//! hm_edge#_ {n:#} {X:Type} {l:#} {m:#} label:(HmLabel ~l n)
//!           {n = (~m) + l} node:(HashmapNode m X) = Hashmap n X;
//! hmn_leaf#_ {X:Type} value:X = HashmapNode 0 X;
//! hmn_fork#_ {n:#} {X:Type} left:^(Hashmap n X) right:^(Hashmap n X) = HashmapNode (n + 1) X;
//! hml_short$0 {m:#} {n:#} len:(Unary ~n) {n <= m} s:(n * Bit) = HmLabel ~n m;
//! hml_long$10 {m:#} n:(#<= m) s:(n * Bit) = HmLabel ~n m;
//! hml_same$11 {m:#} v:Bit n:(#<= m) = HmLabel ~n m;
//! ```
//!
//! Entries are kept sorted and every label uses its shortest encoding, so the same
//! contents always serialize to the same cells regardless of insertion order.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_bigint::BigUint;

use crate::tvm::address::{Address, address_cell_bits};
use crate::tvm::builder::Builder;
use crate::tvm::cell::Cell;
use crate::tvm::error::{CellError, Result};
use crate::tvm::slice::Slice;

/// Dictionary key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    /// Integer key
    Int(u64),
    /// Arbitrary width unsigned key
    Big(BigUint),
    /// Binary key (left-aligned data, bit length)
    Bits(Vec<u8>, usize),
    /// Address key (267 bits)
    Address(Address),
}

impl DictKey {
    /// Converts the key to its numeric form for a dictionary with `key_bits` wide keys
    pub fn to_biguint(&self, key_bits: usize) -> Result<BigUint> {
        match self {
            DictKey::Int(k) => Ok(BigUint::from(*k)),
            DictKey::Big(k) => Ok(k.clone()),
            DictKey::Bits(data, bit_len) => {
                if *bit_len != key_bits {
                    return Err(CellError::out_of_range(format!(
                        "key has {bit_len} bits, dictionary expects {key_bits}"
                    )));
                }
                bits_to_key(data, *bit_len)
            }
            DictKey::Address(addr) => {
                if key_bits != Address::BIT_LEN {
                    return Err(CellError::out_of_range(format!(
                        "address keys require {} bit keys, dictionary has {key_bits}",
                        Address::BIT_LEN
                    )));
                }
                bits_to_key(&address_cell_bits(addr)?, Address::BIT_LEN)
            }
        }
    }
}

impl From<u64> for DictKey {
    fn from(key: u64) -> Self {
        DictKey::Int(key)
    }
}

impl From<BigUint> for DictKey {
    fn from(key: BigUint) -> Self {
        DictKey::Big(key)
    }
}

impl From<Address> for DictKey {
    fn from(key: Address) -> Self {
        DictKey::Address(key)
    }
}

fn bits_to_key(data: &[u8], bit_len: usize) -> Result<BigUint> {
    let needed = bit_len.div_ceil(8);
    if data.len() < needed {
        return Err(CellError::out_of_range(format!(
            "{} bytes can't hold a {bit_len} bit key",
            data.len()
        )));
    }
    let value = BigUint::from_bytes_be(&data[..needed]);
    Ok(value >> (needed * 8 - bit_len))
}

/// TON Dictionary (HashmapE n X) with cell values
///
/// Leaf values are stored inline: the value cell's bits and references are
/// appended to the leaf edge right after its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dict {
    /// Key size in bits
    key_bits: usize,
    entries: BTreeMap<BigUint, Arc<Cell>>,
}

impl Dict {
    /// Creates a new dictionary with the specified key size
    pub fn new(key_bits: usize) -> Self {
        Self {
            key_bits,
            entries: BTreeMap::new(),
        }
    }

    /// Returns the key size in bits
    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Returns the number of entries in the dictionary
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_key(&self, key: &BigUint) -> Result<()> {
        if key.bits() as usize > self.key_bits {
            return Err(CellError::out_of_range(format!(
                "key {key} doesn't fit into {} bits",
                self.key_bits
            )));
        }
        Ok(())
    }

    /// Sets a value, returning the previous one
    pub fn set(&mut self, key: impl Into<DictKey>, value: Arc<Cell>) -> Result<Option<Arc<Cell>>> {
        let key = key.into().to_biguint(self.key_bits)?;
        self.check_key(&key)?;
        Ok(self.entries.insert(key, value))
    }

    /// Sets a value for an integer key
    pub fn set_int_key(&mut self, key: u64, value: Arc<Cell>) -> Result<Option<Arc<Cell>>> {
        self.set(DictKey::Int(key), value)
    }

    /// Gets a value by key
    pub fn get(&self, key: impl Into<DictKey>) -> Result<Option<&Arc<Cell>>> {
        let key = key.into().to_biguint(self.key_bits)?;
        Ok(self.entries.get(&key))
    }

    /// Gets a value by integer key
    pub fn get_int_key(&self, key: u64) -> Option<&Arc<Cell>> {
        self.entries.get(&BigUint::from(key))
    }

    /// Removes a key, returning its value
    pub fn delete(&mut self, key: impl Into<DictKey>) -> Result<Option<Arc<Cell>>> {
        let key = key.into().to_biguint(self.key_bits)?;
        Ok(self.entries.remove(&key))
    }

    /// Iterates entries in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&BigUint, &Arc<Cell>)> {
        self.entries.iter()
    }

    /// Serializes the dictionary root, `None` when the dictionary is empty
    pub fn to_cell(&self) -> Result<Option<Arc<Cell>>> {
        if self.is_empty() {
            return Ok(None);
        }

        let entries: Vec<(Vec<bool>, &Arc<Cell>)> = self
            .entries
            .iter()
            .map(|(key, value)| (key_to_bits(key, self.key_bits), value))
            .collect();

        log::trace!(
            "serializing dict with {} entries, {} bit keys",
            entries.len(),
            self.key_bits
        );
        build_edge(&entries, 0, self.key_bits).map(Some)
    }

    /// Parses a dictionary from its root cell
    pub fn from_cell(cell: &Arc<Cell>, key_bits: usize) -> Result<Self> {
        let mut dict = Self::new(key_bits);
        let mut prefix = Vec::with_capacity(key_bits);
        parse_edge(cell.clone(), &mut prefix, key_bits, &mut dict.entries)?;
        Ok(dict)
    }
}

impl Default for Dict {
    fn default() -> Self {
        Self::new(256)
    }
}

fn key_to_bits(key: &BigUint, key_bits: usize) -> Vec<bool> {
    (0..key_bits)
        .map(|i| key.bit((key_bits - 1 - i) as u64))
        .collect()
}

fn bits_to_biguint(bits: &[bool]) -> BigUint {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (7 - i % 8);
        }
    }
    BigUint::from_bytes_be(&bytes) >> (bytes.len() * 8 - bits.len())
}

/// Bits needed to store any value in `0..=max`
fn len_bits(max: usize) -> usize {
    (usize::BITS - max.leading_zeros()) as usize
}

fn build_edge(entries: &[(Vec<bool>, &Arc<Cell>)], offset: usize, m: usize) -> Result<Arc<Cell>> {
    let mut builder = Builder::new();

    if let [(key, value)] = entries {
        store_label(&mut builder, &key[offset..], m)?;
        builder.store_cell(value)?;
        return builder.end_cell();
    }

    // Entries are sorted, so the first and the last key bound the common prefix
    let first = &entries[0].0;
    let last = &entries[entries.len() - 1].0;
    let mut label_len = 0;
    while first[offset + label_len] == last[offset + label_len] {
        label_len += 1;
    }

    store_label(&mut builder, &first[offset..offset + label_len], m)?;

    let fork_bit = offset + label_len;
    let split = entries.partition_point(|(key, _)| !key[fork_bit]);
    let remaining = m - label_len - 1;
    builder.store_ref(build_edge(&entries[..split], fork_bit + 1, remaining)?)?;
    builder.store_ref(build_edge(&entries[split..], fork_bit + 1, remaining)?)?;
    builder.end_cell()
}

fn store_label(builder: &mut Builder, label: &[bool], m: usize) -> Result<()> {
    let n = label.len();
    let k = len_bits(m);

    let short_len = 2 * n + 2;
    let long_len = 2 + k + n;
    let is_same = n > 0 && label.iter().all(|&b| b == label[0]);
    let same_len = 3 + k;

    if is_same && same_len < short_len.min(long_len) {
        // hml_same$11 v:Bit n:(#<= m)
        builder.store_uint(0b11, 2)?;
        builder.store_bit(label[0])?;
        builder.store_uint(n as u64, k)?;
    } else if long_len < short_len {
        // hml_long$10 n:(#<= m) s:(n * Bit)
        builder.store_uint(0b10, 2)?;
        builder.store_uint(n as u64, k)?;
        for &bit in label {
            builder.store_bit(bit)?;
        }
    } else {
        // hml_short$0 len:(Unary ~n) s:(n * Bit)
        builder.store_bit(false)?;
        for _ in 0..n {
            builder.store_bit(true)?;
        }
        builder.store_bit(false)?;
        for &bit in label {
            builder.store_bit(bit)?;
        }
    }
    Ok(())
}

fn load_label(slice: &mut Slice, m: usize) -> Result<Vec<bool>> {
    let k = len_bits(m);

    if !slice.load_bit()? {
        let mut n = 0;
        while slice.load_bit()? {
            n += 1;
            if n > m {
                return Err(CellError::format(format!(
                    "dict label longer than remaining {m} key bits"
                )));
            }
        }
        return load_label_bits(slice, n);
    }

    let is_same = slice.load_bit()?;
    if is_same {
        let bit = slice.load_bit()?;
        let n = slice.load_uint(k)? as usize;
        check_label_len(n, m)?;
        Ok(vec![bit; n])
    } else {
        let n = slice.load_uint(k)? as usize;
        check_label_len(n, m)?;
        load_label_bits(slice, n)
    }
}

fn check_label_len(n: usize, m: usize) -> Result<()> {
    if n > m {
        return Err(CellError::format(format!(
            "dict label of {n} bits exceeds remaining {m} key bits"
        )));
    }
    Ok(())
}

fn load_label_bits(slice: &mut Slice, n: usize) -> Result<Vec<bool>> {
    (0..n).map(|_| slice.load_bit()).collect()
}

fn parse_edge(
    cell: Arc<Cell>,
    prefix: &mut Vec<bool>,
    m: usize,
    out: &mut BTreeMap<BigUint, Arc<Cell>>,
) -> Result<()> {
    let mut slice = Slice::ordinary(cell)?;
    let label = load_label(&mut slice, m)?;
    let label_len = label.len();
    let prefix_len = prefix.len();
    prefix.extend(label);

    if label_len == m {
        out.insert(bits_to_biguint(prefix), slice.to_cell()?);
    } else {
        if slice.remaining_refs() != 2 || slice.remaining_bits() != 0 {
            return Err(CellError::format(format!(
                "dict fork must hold exactly two refs and no data, got {} bits and {} refs",
                slice.remaining_bits(),
                slice.remaining_refs()
            )));
        }
        let remaining = m - label_len - 1;
        for bit in [false, true] {
            let child = slice.load_ref()?;
            prefix.push(bit);
            parse_edge(child, prefix, remaining, out)?;
            prefix.pop();
        }
    }

    prefix.truncate(prefix_len);
    Ok(())
}

/// Builder extension for dictionary operations
impl Builder {
    /// Stores a dictionary as `HashmapE`: a zero bit when absent or empty,
    /// otherwise a one bit and a reference to the root
    pub fn store_dict(&mut self, dict: Option<&Dict>) -> Result<&mut Self> {
        let root = match dict {
            Some(d) => d.to_cell()?,
            None => None,
        };
        self.store_maybe_ref(root)
    }
}

/// Slice extension for dictionary operations
impl Slice {
    /// Loads a `HashmapE` with `key_bits` wide keys
    pub fn load_dict(&mut self, key_bits: usize) -> Result<Dict> {
        match self.load_maybe_ref()? {
            Some(root) => Dict::from_cell(&root, key_bits),
            None => Ok(Dict::new(key_bits)),
        }
    }
}
