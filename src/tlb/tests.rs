//! Tests for tlb module

use std::sync::Arc;

use num_bigint::BigUint;

use super::*;
use crate::tvm::{Builder, Cell, CellError, Slice};

fn bytes_cell(len: usize) -> Arc<Cell> {
    let mut builder = Builder::new();
    builder.store_bytes(&vec![0x5A; len]).unwrap();
    builder.end_cell().unwrap()
}

fn destination() -> Address {
    "0:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8"
        .parse()
        .unwrap()
}

fn jetton_schema() -> Schema {
    Schema::parse(&[
        ("op", "#0f8a7ea5"),
        ("query_id", "## 64"),
        ("amount", "coins"),
        ("destination", "addr"),
        ("response_destination", "addr"),
        ("custom_payload", "maybe ^"),
        ("forward_ton_amount", "coins"),
        ("forward_payload", "either . ^"),
    ])
    .unwrap()
}

#[test]
fn test_jetton_transfer_roundtrip() {
    let transfer = JettonTransfer::new(destination(), 1_000_000_000u64)
        .with_query_id(42)
        .with_response_destination(destination())
        .with_forward_ton_amount(1u64)
        .with_comment("hello")
        .unwrap();

    let cell = transfer.to_cell().unwrap();
    let mut slice = Slice::new(cell.clone());
    assert_eq!(slice.load_u32().unwrap(), 0x0f8a7ea5);
    assert_eq!(slice.load_u64().unwrap(), 42);

    assert_eq!(JettonTransfer::from_cell(&cell).unwrap(), transfer);

    let b64 = transfer.to_boc_base64(true).unwrap();
    assert_eq!(JettonTransfer::from_boc_base64(&b64).unwrap(), transfer);
}

#[test]
fn test_from_boc_base64_accepts_url_safe() {
    let transfer = JettonTransfer::new(destination(), 7u64).with_forward_payload(bytes_cell(40));
    let b64 = transfer.to_boc_base64(true).unwrap();
    let url_safe = b64.replace('+', "-").replace('/', "_");
    let unpadded = url_safe.trim_end_matches('=');

    assert_eq!(JettonTransfer::from_boc_base64(&url_safe).unwrap(), transfer);
    assert_eq!(JettonTransfer::from_boc_base64(unpadded).unwrap(), transfer);
    assert!(JettonTransfer::from_boc_base64("not base64!").is_err());
}

#[test]
fn test_jetton_transfer_tag_mismatch() {
    let mut builder = Builder::new();
    builder.store_u32(0x12345678).unwrap();
    builder.store_u64(0).unwrap();
    let cell = builder.end_cell().unwrap();

    assert_eq!(
        JettonTransfer::from_cell(&cell),
        Err(CellError::TagMismatch {
            expected: 0x0f8a7ea5,
            actual: 0x12345678
        })
    );
}

#[test]
fn test_either_exact_fit_goes_inline() {
    // 32 + 64 + 36 + 267 + 2 + 1 + 4 bits precede the selector
    let fits = JettonTransfer::new(destination(), 1_000_000_000u64)
        .with_forward_payload(bytes_cell(77));
    let cell = fits.to_cell().unwrap();
    assert_eq!(cell.bit_len(), 1023);
    assert_eq!(cell.reference_count(), 0);

    let spills = JettonTransfer::new(destination(), 1_000_000_000u64)
        .with_forward_payload(bytes_cell(78));
    let cell = spills.to_cell().unwrap();
    assert_eq!(cell.bit_len(), 407);
    assert_eq!(cell.reference_count(), 1);
    assert_eq!(JettonTransfer::from_cell(&cell).unwrap(), spills);
}

#[test]
fn test_schema_matches_typed_codec() {
    let transfer = JettonTransfer::new(destination(), 5u64)
        .with_query_id(7)
        .with_forward_payload(bytes_cell(100));

    let record = Record::new()
        .with("query_id", 7u64)
        .with("amount", Value::Coins(BigUint::from(5u8)))
        .with("destination", destination())
        .with("response_destination", Value::Address(None))
        .with("custom_payload", Value::None)
        .with("forward_ton_amount", Value::Coins(BigUint::from(0u8)))
        .with("forward_payload", bytes_cell(100));

    let schema = jetton_schema();
    let cell = schema.to_cell(&record).unwrap();
    assert_eq!(cell.hash(), transfer.to_cell().unwrap().hash());

    let decoded = schema.load_from_cell(&cell).unwrap();
    assert_eq!(decoded, record);
    assert_eq!(decoded.get("query_id").and_then(Value::as_u64), Some(7));
    assert_eq!(decoded.get("destination").and_then(Value::as_address), Some(&destination()));
}

#[test]
fn test_schema_tag_mismatch() {
    let cell = Builder::new().end_cell().unwrap();
    let mut builder = Builder::new();
    builder.store_u32(0xDEADBEEF).unwrap();
    builder.store_ref(cell).unwrap();
    let cell = builder.end_cell().unwrap();

    let schema = Schema::parse(&[("op", "#0f8a7ea5"), ("body", "^")]).unwrap();
    assert!(matches!(
        schema.load_from_cell(&cell),
        Err(CellError::TagMismatch {
            expected: 0x0f8a7ea5,
            actual: 0xDEADBEEF
        })
    ));
}

#[test]
fn test_schema_missing_field() {
    let schema = Schema::parse(&[("a", "## 8"), ("b", "bool")]).unwrap();
    let record = Record::new().with("a", 3u64);
    assert_eq!(
        schema.to_cell(&record),
        Err(CellError::MissingField("b".to_string()))
    );
}

#[test]
fn test_schema_value_out_of_range() {
    let schema = Schema::parse(&[("a", "## 4")]).unwrap();
    let record = Record::new().with("a", 16u64);
    assert!(matches!(
        schema.to_cell(&record),
        Err(CellError::ValueOutOfRange(_))
    ));
}

#[test]
fn test_schema_nested_records() {
    let point = Schema::parse(&[("x", "int 16"), ("y", "int 16")]).unwrap();
    let schema = Schema::parse(&[("tag", "$101"), ("flags", "bits 4")])
        .unwrap()
        .nested("origin", "^", point.clone())
        .unwrap()
        .nested("extra", "maybe .", point.clone())
        .unwrap()
        .either_nested("target", point)
        .unwrap()
        .field("owners", "dict 32")
        .unwrap();

    let mut owners = Dict::new(32);
    owners.set_int_key(1, bytes_cell(1)).unwrap();

    let origin = Record::new().with("x", -5i64).with("y", 10i64);
    let target = Record::new().with("x", 300i64).with("y", -300i64);
    let record = Record::new()
        .with("flags", Value::Bits(vec![0xA0]))
        .with("origin", origin.clone())
        .with("extra", Value::None)
        .with("target", target.clone())
        .with("owners", owners);

    let cell = schema.to_cell(&record).unwrap();
    assert_eq!(cell.reference_count(), 2);
    // $101, 4 flag bits, maybe bit, either bit, x and y, dict bit
    assert_eq!(cell.bit_len(), 3 + 4 + 1 + 1 + 32 + 1);

    let decoded = schema.load_from_cell(&cell).unwrap();
    assert_eq!(decoded.get("origin").and_then(Value::as_record), Some(&origin));
    assert_eq!(decoded.get("target").and_then(Value::as_record), Some(&target));
    assert!(decoded.get("extra").is_some_and(Value::is_none));
    assert_eq!(decoded, record);
}

#[test]
fn test_state_init_layout() {
    let code = bytes_cell(4);
    let data = bytes_cell(8);
    let state_init = StateInit::new(code.clone(), data.clone());

    let cell = state_init.to_cell().unwrap();
    // split_depth, special, code, data, library
    assert_eq!(cell.bit_len(), 5);
    assert_eq!(cell.data(), &[0x30]);
    assert_eq!(cell.references().len(), 2);

    let address = state_init.address(0).unwrap();
    assert_eq!(address.workchain, 0);
    assert_eq!(address.hash_part, cell.hash());
    assert_eq!(state_init.address(-1).unwrap().hash_part, cell.hash());
}

#[test]
fn test_state_init_roundtrip() {
    let mut state_init = StateInit::new(bytes_cell(2), bytes_cell(3));
    state_init.split_depth = Some(31);
    state_init.special = Some(TickTock {
        tick: true,
        tock: false,
    });
    state_init
        .add_library(SimpleLib {
            public: true,
            root: bytes_cell(16),
        })
        .unwrap();

    let boc = state_init.to_boc(true).unwrap();
    let decoded = StateInit::from_boc(&boc).unwrap();
    assert_eq!(decoded, state_init);

    let key = BigUint::from_bytes_be(&bytes_cell(16).hash());
    let lib: SimpleLib = decoded.library.get_as(key).unwrap().unwrap();
    assert!(lib.public);
    assert_eq!(lib.root.hash(), bytes_cell(16).hash());
}

#[test]
fn test_state_init_split_depth_range() {
    let mut state_init = StateInit::default();
    state_init.split_depth = Some(32);
    assert!(matches!(
        state_init.to_cell(),
        Err(CellError::ValueOutOfRange(_))
    ));
}

#[test]
fn test_from_cell_rejects_leftovers() {
    let mut builder = Builder::new();
    builder.store_u32(1).unwrap();
    builder.store_bit(true).unwrap();
    let cell = builder.end_cell().unwrap();

    assert!(matches!(u32::from_cell(&cell), Err(CellError::Format(_))));
}

#[test]
fn test_maybe_ref_adapters() {
    let value: Option<Ref<u16>> = Some(Ref(0xBEEF));
    let cell = value.to_cell().unwrap();
    assert_eq!(cell.bit_len(), 1);
    assert_eq!(Option::<Ref<u16>>::from_cell(&cell).unwrap(), value);

    let none: Option<Arc<Cell>> = None;
    assert_eq!(Option::<Arc<Cell>>::from_cell(&none.to_cell().unwrap()).unwrap(), None);
}

#[test]
fn test_msg_address_none() {
    let cell = MsgAddress::NONE.to_cell().unwrap();
    assert_eq!(cell.bit_len(), 2);
    assert_eq!(MsgAddress::from_cell(&cell).unwrap(), MsgAddress::NONE);
    assert!(Address::from_cell(&cell).is_err());
}

#[test]
fn test_coins_roundtrip() {
    let coins = Coins::from(u128::MAX >> 8);
    let cell = coins.to_cell().unwrap();
    assert_eq!(cell.bit_len(), 4 + 120);
    assert_eq!(Coins::from_cell(&cell).unwrap(), coins);

    let too_big = Coins::from(u128::MAX);
    assert!(matches!(too_big.to_cell(), Err(CellError::ValueOutOfRange(_))));
    assert!(Coins::zero().is_zero());
}
