//! Integration tests and additional test coverage for TVM modules

use crate::tvm::*;
use num_bigint::BigUint;
use std::sync::Arc;

/// Helper function to create a cell with specific data
fn create_test_cell(data: Vec<u8>, bit_len: usize) -> Arc<Cell> {
    Arc::new(Cell::with_data(data, bit_len).unwrap())
}

fn u32_cell(value: u32) -> Arc<Cell> {
    let mut builder = Builder::new();
    builder.store_u32(value).unwrap();
    builder.end_cell().unwrap()
}

fn pruned(cell: &Cell) -> Arc<Cell> {
    pruned_with_mask(cell, 1)
}

fn pruned_with_mask(cell: &Cell, mask: u8) -> Arc<Cell> {
    let mut builder = Builder::new();
    builder.store_u8(1).unwrap();
    builder.store_u8(mask).unwrap();
    builder.store_bytes(&cell.hash_at(0)).unwrap();
    builder.store_u16(cell.depth_at(0)).unwrap();
    builder.end_exotic_cell(CellType::PrunedBranch).unwrap()
}

fn merkle_proof(root: &Arc<Cell>) -> Arc<Cell> {
    let mut builder = Builder::new();
    builder.store_u8(3).unwrap();
    builder.store_bytes(&root.hash_at(0)).unwrap();
    builder.store_u16(root.depth_at(0)).unwrap();
    builder.store_ref(root.clone()).unwrap();
    builder.end_exotic_cell(CellType::MerkleProof).unwrap()
}

fn chain(depth: usize) -> Arc<Cell> {
    let mut cell = u32_cell(0);
    for i in 0..depth {
        let mut builder = Builder::new();
        builder.store_u16(i as u16).unwrap();
        builder.store_ref(cell).unwrap();
        cell = builder.end_cell().unwrap();
    }
    cell
}

fn wrap(tag: u8, child: Arc<Cell>) -> Arc<Cell> {
    let mut builder = Builder::new();
    builder.store_u8(tag).unwrap();
    builder.store_ref(child).unwrap();
    builder.end_cell().unwrap()
}

/// Test basic cell operations
#[test]
fn test_cell_operations() {
    let cell = create_test_cell(vec![0xFF, 0x00], 16);
    assert_eq!(cell.bit_len(), 16);
    assert_eq!(cell.data()[0], 0xFF);
    assert_eq!(cell.data()[1], 0x00);

    // Test hash consistency
    let hash1 = cell.hash();
    let hash2 = cell.hash();
    assert_eq!(hash1, hash2);
}

#[test]
fn test_empty_cell_hash() {
    let cell = Builder::new().end_cell().unwrap();
    assert_eq!(cell.hash(), EMPTY_CELL_HASH);
    assert_eq!(cell.depth(), 0);
}

#[test]
fn test_store_uint_roundtrip() {
    let mut builder = Builder::new();
    builder.store_uint(700, 32).unwrap();
    let cell = builder.end_cell().unwrap();

    let mut slice = Slice::new(cell);
    assert_eq!(slice.load_uint(32).unwrap(), 700);
    assert!(slice.end_parse().is_ok());
}

#[test]
fn test_structurally_equal_cells_hash_equal() {
    let a = {
        let mut builder = Builder::new();
        builder.store_u8(0xAB).unwrap();
        builder.store_ref(u32_cell(1)).unwrap();
        builder.end_cell().unwrap()
    };
    let b = {
        let mut builder = Builder::new();
        builder.store_bits(&[0xAB], 8).unwrap();
        builder.store_ref(u32_cell(1)).unwrap();
        builder.end_cell().unwrap()
    };
    assert_eq!(a.hash(), b.hash());
    assert_eq!(a, b);
    assert_ne!(a.hash(), u32_cell(1).hash());
}

#[test]
fn test_depth_follows_longest_branch() {
    let leaf = u32_cell(0);
    let mut mid = Builder::new();
    mid.store_ref(leaf.clone()).unwrap();
    let mid = mid.end_cell().unwrap();

    let mut root = Builder::new();
    root.store_ref(leaf).unwrap();
    root.store_ref(mid).unwrap();
    let root = root.end_cell().unwrap();

    assert_eq!(root.depth(), 2);
}

#[test]
fn test_capacity_errors_leave_builder_intact() {
    let mut builder = Builder::new();
    builder.store_zeroes(1020).unwrap();
    let err = builder.store_uint(1, 8).unwrap_err();
    assert!(matches!(err, CellError::CapacityExceeded { .. }));
    assert_eq!(builder.bit_len(), 1020);

    for i in 0..MAX_CELL_REFS {
        builder.store_ref(u32_cell(i as u32)).unwrap();
    }
    assert!(matches!(
        builder.store_ref(u32_cell(9)),
        Err(CellError::CapacityExceeded { .. })
    ));
    assert_eq!(builder.ref_count(), MAX_CELL_REFS);
}

/// Test builder integration
#[test]
fn test_builder_and_cell_integration() {
    let mut builder = Builder::new();

    let addr = Address::new(0, [1u8; 32]);
    builder.store_address(Some(&addr)).unwrap();
    builder.store_u32(42).unwrap();
    builder.store_bool(true).unwrap();
    builder.store_big_coins(&BigUint::from(1_000_000_000u64)).unwrap();

    let cell = builder.end_cell().unwrap();

    let mut slice = Slice::new(cell);
    assert_eq!(slice.load_address().unwrap(), Some(addr));
    assert_eq!(slice.load_u32().unwrap(), 42);
    assert!(slice.load_bool().unwrap());
    assert_eq!(
        slice.load_big_coins().unwrap(),
        BigUint::from(1_000_000_000u64)
    );
    assert!(slice.end_parse().is_ok());
}

/// Test BoC serialization/deserialization roundtrip
#[test]
fn test_boc_roundtrip() {
    let mut builder = Builder::new();
    builder.store_u64(0xDEADBEEFCAFEBABE).unwrap();
    builder.store_byte(0xFF).unwrap();

    let original = builder.end_cell().unwrap();

    let boc = serialize_boc(&original, false).unwrap();
    let deserialized = deserialize_boc(&boc).unwrap();

    assert_eq!(original.hash(), deserialized.hash());
}

/// Test BoC with references
#[test]
fn test_boc_with_references() {
    let mut root_builder = Builder::new();
    root_builder.store_u32(999).unwrap();
    root_builder.store_ref(u32_cell(111)).unwrap();
    root_builder.store_ref(u32_cell(222)).unwrap();

    let root = root_builder.end_cell().unwrap();
    assert_eq!(root.reference_count(), 2);

    let boc = serialize_boc(&root, true).unwrap();
    let deserialized = deserialize_boc(&boc).unwrap();

    assert_eq!(root.reference_count(), deserialized.reference_count());
    for (original, decoded) in root.references().iter().zip(deserialized.references()) {
        assert_eq!(original.hash(), decoded.hash());
    }
    assert_eq!(root.hash(), deserialized.hash());
}

#[test]
fn test_boc_base64_roundtrip() {
    let mut builder = Builder::new();
    builder.store_snake_string("a long comment ".repeat(20).as_str(), true).unwrap();
    let cell = builder.end_cell().unwrap();

    let b64 = boc_to_base64(&cell, true).unwrap();
    assert!(b64.starts_with("te6cck"));
    let decoded = base64_to_boc(&b64).unwrap();
    assert_eq!(decoded.hash(), cell.hash());

    let mut slice = Slice::new(decoded);
    assert_eq!(slice.load_u8().unwrap(), 0);
    assert_eq!(slice.load_snake_string().unwrap(), "a long comment ".repeat(20));
}

#[test]
fn test_pruned_branch_keeps_level_zero_hash() {
    let secret = u32_cell(0x5EC2E7);
    let mut full = Builder::new();
    full.store_u8(7).unwrap();
    full.store_ref(secret.clone()).unwrap();
    let full = full.end_cell().unwrap();

    let mut partial = Builder::new();
    partial.store_u8(7).unwrap();
    partial.store_ref(pruned(&secret)).unwrap();
    let partial = partial.end_cell().unwrap();

    assert_eq!(partial.level(), 1);
    assert_eq!(partial.hash_at(0), full.hash());
    assert_eq!(partial.depth_at(0), full.depth());
    assert_ne!(partial.hash(), full.hash());
}

#[test]
fn test_merkle_proof_boc_roundtrip() {
    let secret = u32_cell(42);
    let mut partial = Builder::new();
    partial.store_u16(1).unwrap();
    partial.store_ref(pruned(&secret)).unwrap();
    let partial = partial.end_cell().unwrap();

    let proof = merkle_proof(&partial);
    assert!(proof.is_exotic());
    assert_eq!(proof.level(), 0);

    let boc = serialize_boc(&proof, true).unwrap();
    let decoded = deserialize_boc(&boc).unwrap();
    assert_eq!(decoded.cell_type(), CellType::MerkleProof);
    assert_eq!(decoded.hash(), proof.hash());
    assert_eq!(
        decoded.references()[0].references()[0].cell_type(),
        CellType::PrunedBranch
    );

    assert!(matches!(
        Slice::ordinary(decoded),
        Err(CellError::UnsupportedCellKind(CellType::MerkleProof))
    ));
}

#[test]
fn test_merkle_proof_rejects_wrong_hash() {
    let child = u32_cell(1);
    let mut builder = Builder::new();
    builder.store_u8(3).unwrap();
    builder.store_bytes(&[0u8; 32]).unwrap();
    builder.store_u16(child.depth()).unwrap();
    builder.store_ref(child).unwrap();
    assert!(matches!(
        builder.end_exotic_cell(CellType::MerkleProof),
        Err(CellError::Format(_))
    ));
}

#[test]
fn test_dict_through_boc() {
    let mut dict = Dict::new(64);
    for key in [3u64, 1, 4, 1_000_000, 9, 26] {
        dict.set_int_key(key, u32_cell(key as u32)).unwrap();
    }

    let mut builder = Builder::new();
    builder.store_dict(Some(&dict)).unwrap();
    let cell = builder.end_cell().unwrap();

    let decoded = deserialize_boc(&serialize_boc(&cell, false).unwrap()).unwrap();
    let mut slice = Slice::new(decoded);
    let parsed = slice.load_dict(64).unwrap();

    assert_eq!(parsed.len(), 6);
    let keys: Vec<u64> = parsed
        .iter()
        .map(|(k, _)| u64::try_from(k).unwrap())
        .collect();
    assert_eq!(keys, vec![1, 3, 4, 9, 26, 1_000_000]);
    assert_eq!(parsed.get_int_key(26), Some(&u32_cell(26)));
}

#[test]
fn test_peek_ref_is_relative_and_non_consuming() {
    let mut builder = Builder::new();
    builder.store_ref(u32_cell(1)).unwrap();
    builder.store_ref(u32_cell(2)).unwrap();
    let mut slice = builder.to_slice().unwrap();

    assert_eq!(slice.peek_ref(1).unwrap().hash(), u32_cell(2).hash());
    slice.load_ref().unwrap();
    assert_eq!(slice.peek_ref(0).unwrap().hash(), u32_cell(2).hash());
    assert!(matches!(
        slice.peek_ref(1),
        Err(CellError::ReferenceOutOfRange { .. })
    ));
    assert_eq!(slice.remaining_refs(), 1);
}

#[test]
fn test_slice_underflow_never_zero_fills() {
    let mut slice = Slice::new(create_test_cell(vec![0xF0], 4));
    assert!(matches!(
        slice.load_uint(8),
        Err(CellError::Underflow {
            requested: 8,
            available: 4
        })
    ));
    assert_eq!(slice.load_uint(4).unwrap(), 0xF);
}

#[test]
fn test_address_builder_integration() {
    let addr = Address::new(-1, [0x12; 32]);

    let mut builder = Builder::new();
    builder.store_address(Some(&addr)).unwrap();

    let cell = builder.end_cell().unwrap();
    assert_eq!(cell.bit_len(), Address::BIT_LEN);

    let mut slice = Slice::new(cell);
    let loaded = slice.load_address().unwrap().unwrap();
    assert_eq!(loaded.workchain, -1);
    assert_eq!(loaded.hash_part, [0x12; 32]);
}

#[test]
fn test_cell_display_fift_notation() {
    let mut builder = Builder::new();
    builder.store_uint(0xA, 4).unwrap();
    builder.store_ref(create_test_cell(vec![0xB0], 3)).unwrap();
    let cell = builder.end_cell().unwrap();

    let text = cell.to_string();
    assert!(text.starts_with("x{A}"));
    assert!(text.contains("x{B_}"));
}

#[test]
fn test_deep_chain_hash_and_boc() {
    let root = chain(1024);
    assert_eq!(root.depth(), 1024);
    assert_ne!(root.hash(), chain(1023).hash());

    let boc = serialize_boc(&root, true).unwrap();
    let decoded = deserialize_boc(&boc).unwrap();
    assert_eq!(decoded.hash(), root.hash());
    assert_eq!(decoded.depth(), 1024);

    let shallow = crate::config::BocConfig {
        max_depth: 1023,
        ..Default::default()
    };
    assert!(deserialize_boc_with(&boc, &shallow).is_err());
}

#[test]
fn test_merkle_update_level_and_boc() {
    let old = wrap(1, pruned_with_mask(&u32_cell(10), 2));
    let new = wrap(2, pruned(&u32_cell(20)));
    assert_eq!(old.level_mask(), LevelMask::new(2));
    assert_eq!(new.level_mask(), LevelMask::new(1));

    let mut builder = Builder::new();
    builder.store_u8(4).unwrap();
    builder.store_bytes(&old.hash_at(0)).unwrap();
    builder.store_bytes(&new.hash_at(0)).unwrap();
    builder.store_u16(old.depth_at(0)).unwrap();
    builder.store_u16(new.depth_at(0)).unwrap();
    builder.store_ref(old.clone()).unwrap();
    builder.store_ref(new.clone()).unwrap();
    let update = builder.end_exotic_cell(CellType::MerkleUpdate).unwrap();

    // (2 | 1) >> 1
    assert_eq!(update.level_mask(), LevelMask::new(1));
    assert_eq!(update.level(), 1);

    let decoded = deserialize_boc(&serialize_boc(&update, false).unwrap()).unwrap();
    assert_eq!(decoded.cell_type(), CellType::MerkleUpdate);
    assert_eq!(decoded.hash(), update.hash());
    assert_eq!(decoded.hash_at(0), update.hash_at(0));

    // hashes in the wrong order
    let mut swapped = Builder::new();
    swapped.store_u8(4).unwrap();
    swapped.store_bytes(&new.hash_at(0)).unwrap();
    swapped.store_bytes(&old.hash_at(0)).unwrap();
    swapped.store_u16(old.depth_at(0)).unwrap();
    swapped.store_u16(new.depth_at(0)).unwrap();
    swapped.store_ref(old).unwrap();
    swapped.store_ref(new).unwrap();
    assert!(matches!(
        swapped.end_exotic_cell(CellType::MerkleUpdate),
        Err(CellError::Format(_))
    ));
}

#[test]
fn test_library_cell() {
    let code = u32_cell(0xC0DE);
    let mut builder = Builder::new();
    builder.store_u8(2).unwrap();
    builder.store_bytes(&code.hash()).unwrap();
    let library = builder.end_exotic_cell(CellType::Library).unwrap();

    assert!(library.is_exotic());
    assert_eq!(library.level(), 0);
    assert_eq!(library.bit_len(), 8 + 256);

    let decoded = deserialize_boc(&serialize_boc(&library, true).unwrap()).unwrap();
    assert_eq!(decoded.cell_type(), CellType::Library);
    assert_eq!(decoded.hash(), library.hash());

    let mut too_long = Builder::new();
    too_long.store_u8(2).unwrap();
    too_long.store_bytes(&code.hash()).unwrap();
    too_long.store_u8(0).unwrap();
    assert!(matches!(
        too_long.end_exotic_cell(CellType::Library),
        Err(CellError::Format(_))
    ));
}
