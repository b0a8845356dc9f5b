//! Declarative TL-B schemas
//!
//! A [`Schema`] is an ordered list of named fields, each described by a short tag:
//!
//! | tag           | wire form                                  | value               |
//! |---------------|--------------------------------------------|---------------------|
//! | `## N`        | unsigned N-bit integer                     | [`Value::Uint`]     |
//! | `int N`       | two's complement N-bit integer             | [`Value::Int`]      |
//! | `bits N`      | N raw bits                                 | [`Value::Bits`]     |
//! | `bool`        | one bit                                    | [`Value::Bool`]     |
//! | `coins`       | `VarUInteger 16`                           | [`Value::Coins`]    |
//! | `addr`        | `MsgAddressInt` or `addr_none`             | [`Value::Address`]  |
//! | `#0f8a7ea5`   | constant, 4 bits per hex digit             | none                |
//! | `$0101`       | constant, 1 bit per digit                  | none                |
//! | `^`           | cell in a reference                        | [`Value::Cell`]     |
//! | `.`           | cell contents inline                       | [`Value::Cell`]     |
//! | `either . ^`  | inline when it fits, otherwise a reference | [`Value::Cell`]     |
//! | `maybe <tag>` | presence bit, then `<tag>`                 | [`Value::None`] or the inner value |
//! | `dict N`      | `HashmapE N`                               | [`Value::Dict`]     |
//!
//! Nested records replace the cell payload of `^`, `.` and `either . ^` through
//! [`Schema::nested`] and [`Schema::either_nested`].

use std::collections::BTreeMap;
use std::sync::Arc;

use num_bigint::{BigInt, BigUint};
use num_traits::ToPrimitive;

use crate::tlb::store_either;
use crate::tvm::address::Address;
use crate::tvm::builder::Builder;
use crate::tvm::cell::{Cell, MAX_CELL_BITS};
use crate::tvm::dict::Dict;
use crate::tvm::error::{CellError, Result};
use crate::tvm::slice::Slice;

/// What a cell-valued field carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// An opaque cell
    Cell,
    /// A record described by another schema
    Record(Schema),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTag {
    Uint(usize),
    Int(usize),
    Bits(usize),
    Bool,
    Coins,
    Address,
    Magic { value: u64, bit_len: usize },
    Ref(Payload),
    Inline(Payload),
    Either(Payload),
    Maybe(Box<FieldTag>),
    Dict(usize),
}

impl FieldTag {
    pub fn parse(tag: &str) -> Result<Self> {
        let tokens: Vec<&str> = tag.split_whitespace().collect();
        Self::parse_tokens(&tokens).map_err(|e| match e {
            CellError::Format(msg) => CellError::Format(format!("field tag `{tag}`: {msg}")),
            other => other,
        })
    }

    fn parse_tokens(tokens: &[&str]) -> Result<Self> {
        match tokens {
            ["maybe", rest @ ..] if !rest.is_empty() => {
                Ok(FieldTag::Maybe(Box::new(Self::parse_tokens(rest)?)))
            }
            ["##", n] => Ok(FieldTag::Uint(parse_width(n)?)),
            ["int", n] => Ok(FieldTag::Int(parse_width(n)?)),
            ["bits", n] => Ok(FieldTag::Bits(parse_width(n)?)),
            ["dict", n] => Ok(FieldTag::Dict(parse_width(n)?)),
            ["bool"] => Ok(FieldTag::Bool),
            ["coins"] => Ok(FieldTag::Coins),
            ["addr"] => Ok(FieldTag::Address),
            ["^"] => Ok(FieldTag::Ref(Payload::Cell)),
            ["."] => Ok(FieldTag::Inline(Payload::Cell)),
            ["either", ".", "^"] => Ok(FieldTag::Either(Payload::Cell)),
            [magic] if magic.starts_with('#') => parse_magic(&magic[1..], 16, 4),
            [magic] if magic.starts_with('$') => parse_magic(&magic[1..], 2, 1),
            _ => Err(CellError::format("unknown tag")),
        }
    }

    /// True when decoding the field takes whatever is left of the slice
    fn consumes_rest(&self) -> bool {
        match self {
            FieldTag::Inline(payload) | FieldTag::Either(payload) => match payload {
                Payload::Cell => true,
                Payload::Record(schema) => schema.consumes_rest(),
            },
            FieldTag::Maybe(inner) => inner.consumes_rest(),
            _ => false,
        }
    }

    /// Swaps the innermost cell payload for a nested record
    fn with_record(self, schema: Schema) -> Result<Self> {
        match self {
            FieldTag::Ref(Payload::Cell) => Ok(FieldTag::Ref(Payload::Record(schema))),
            FieldTag::Inline(Payload::Cell) => Ok(FieldTag::Inline(Payload::Record(schema))),
            FieldTag::Either(Payload::Cell) => Ok(FieldTag::Either(Payload::Record(schema))),
            FieldTag::Maybe(inner) => Ok(FieldTag::Maybe(Box::new(inner.with_record(schema)?))),
            other => Err(CellError::format(format!(
                "{other:?} can't hold a nested record"
            ))),
        }
    }
}

fn parse_width(n: &str) -> Result<usize> {
    let width: usize = n
        .parse()
        .map_err(|_| CellError::format(format!("invalid width `{n}`")))?;
    if width > MAX_CELL_BITS {
        return Err(CellError::format(format!(
            "width {width} exceeds {MAX_CELL_BITS} bits"
        )));
    }
    Ok(width)
}

fn parse_magic(digits: &str, radix: u32, bits_per_digit: usize) -> Result<FieldTag> {
    let bit_len = digits.len() * bits_per_digit;
    if digits.is_empty() || bit_len > 64 {
        return Err(CellError::format(format!(
            "constant must have 1..=64 bits, got {bit_len}"
        )));
    }
    let value = u64::from_str_radix(digits, radix)
        .map_err(|_| CellError::format(format!("invalid constant `{digits}`")))?;
    Ok(FieldTag::Magic { value, bit_len })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub tag: FieldTag,
}

/// Dynamically typed field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Absent `maybe` field
    None,
    Uint(BigUint),
    Int(BigInt),
    /// Left-aligned bits
    Bits(Vec<u8>),
    Bool(bool),
    Coins(BigUint),
    Address(Option<Address>),
    Cell(Arc<Cell>),
    Record(Record),
    Dict(Dict),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) | Value::Coins(v) => v.to_u64(),
            Value::Int(v) => v.to_u64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => v.to_i64(),
            Value::Uint(v) => v.to_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<&Arc<Cell>> {
        match self {
            Value::Cell(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<&Address> {
        match self {
            Value::Address(address) => address.as_ref(),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Uint(BigUint::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(BigInt::from(value))
    }
}

impl From<BigUint> for Value {
    fn from(value: BigUint) -> Self {
        Value::Uint(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Address> for Value {
    fn from(value: Address) -> Self {
        Value::Address(Some(value))
    }
}

impl From<Arc<Cell>> for Value {
    fn from(value: Arc<Cell>) -> Self {
        Value::Cell(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

impl From<Dict> for Value {
    fn from(value: Dict) -> Self {
        Value::Dict(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

/// Field values of one record, looked up by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Record::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from `(name, tag)` pairs
    pub fn parse(fields: &[(&str, &str)]) -> Result<Self> {
        fields
            .iter()
            .try_fold(Self::new(), |schema, (name, tag)| schema.field(*name, tag))
    }

    /// Appends a field described by a tag string
    pub fn field(self, name: impl Into<String>, tag: &str) -> Result<Self> {
        self.push(name.into(), FieldTag::parse(tag)?)
    }

    /// Appends a nested record placed by `tag` (`^`, `.`, `either . ^`, optionally under `maybe`)
    pub fn nested(self, name: impl Into<String>, tag: &str, schema: Schema) -> Result<Self> {
        self.push(name.into(), FieldTag::parse(tag)?.with_record(schema)?)
    }

    // An inline opaque cell has no length of its own, so nothing may follow it
    fn push(mut self, name: String, tag: FieldTag) -> Result<Self> {
        if let Some(last) = self.fields.last() {
            if last.tag.consumes_rest() {
                return Err(CellError::format(format!(
                    "field `{name}` follows `{}`, which takes the rest of the cell",
                    last.name
                )));
            }
        }
        self.fields.push(Field { name, tag });
        Ok(self)
    }

    fn consumes_rest(&self) -> bool {
        self.fields.last().is_some_and(|field| field.tag.consumes_rest())
    }

    /// Appends a nested record stored as `Either X ^X`
    pub fn either_nested(self, name: impl Into<String>, schema: Schema) -> Result<Self> {
        self.nested(name, "either . ^", schema)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Encodes a record into a new cell
    pub fn to_cell(&self, record: &Record) -> Result<Arc<Cell>> {
        let mut builder = Builder::new();
        self.store(record, &mut builder)?;
        builder.end_cell()
    }

    /// Appends a record to a builder, leaving it untouched on failure
    pub fn store(&self, record: &Record, builder: &mut Builder) -> Result<()> {
        let mut staged = builder.clone();
        for field in &self.fields {
            if let FieldTag::Magic { value, bit_len } = field.tag {
                staged.store_uint(value, bit_len)?;
                continue;
            }
            let value = record
                .get(&field.name)
                .ok_or_else(|| CellError::MissingField(field.name.clone()))?;
            store_value(&field.name, &field.tag, value, &mut staged)?;
        }
        *builder = staged;
        Ok(())
    }

    /// Decodes a record occupying the whole cell
    pub fn load_from_cell(&self, cell: &Arc<Cell>) -> Result<Record> {
        let mut slice = Slice::ordinary(cell.clone())?;
        let record = self.load(&mut slice)?;
        slice.end_parse()?;
        Ok(record)
    }

    /// Reads a record from the slice cursor
    pub fn load(&self, slice: &mut Slice) -> Result<Record> {
        let mut record = Record::new();
        for field in &self.fields {
            if let FieldTag::Magic { value, bit_len } = field.tag {
                let actual = slice.preload_uint(bit_len)?;
                if actual != value {
                    return Err(CellError::TagMismatch {
                        expected: value,
                        actual,
                    });
                }
                slice.skip_bits(bit_len)?;
                continue;
            }
            let value = load_value(&field.tag, slice)?;
            record.set(field.name.clone(), value);
        }
        Ok(record)
    }
}

fn mismatch(name: &str, tag: &FieldTag, value: &Value) -> CellError {
    CellError::out_of_range(format!(
        "field `{name}` tagged {tag:?} can't hold {value:?}"
    ))
}

fn payload_cell(name: &str, payload: &Payload, value: &Value) -> Result<Arc<Cell>> {
    match (payload, value) {
        (Payload::Cell, Value::Cell(cell)) => Ok(cell.clone()),
        (Payload::Record(schema), Value::Record(record)) => schema.to_cell(record),
        _ => Err(CellError::out_of_range(format!(
            "field `{name}` expects a {}, got {value:?}",
            match payload {
                Payload::Cell => "cell",
                Payload::Record(_) => "record",
            }
        ))),
    }
}

fn store_value(name: &str, tag: &FieldTag, value: &Value, builder: &mut Builder) -> Result<()> {
    match (tag, value) {
        (FieldTag::Uint(bits), Value::Uint(v)) => {
            builder.store_big_uint(v, *bits)?;
        }
        (FieldTag::Int(bits), Value::Int(v)) => {
            builder.store_big_int(v, *bits)?;
        }
        (FieldTag::Bits(bits), Value::Bits(data)) => {
            if data.len() * 8 < *bits {
                return Err(CellError::out_of_range(format!(
                    "field `{name}` needs {bits} bits, got {} bytes",
                    data.len()
                )));
            }
            builder.store_bits(data, *bits)?;
        }
        (FieldTag::Bool, Value::Bool(b)) => {
            builder.store_bit(*b)?;
        }
        (FieldTag::Coins, Value::Coins(v) | Value::Uint(v)) => {
            builder.store_big_coins(v)?;
        }
        (FieldTag::Address, Value::Address(address)) => {
            builder.store_address(address.as_ref())?;
        }
        (FieldTag::Address, Value::None) => {
            builder.store_address(None)?;
        }
        (FieldTag::Magic { value, bit_len }, _) => {
            builder.store_uint(*value, *bit_len)?;
        }
        (FieldTag::Ref(payload), _) => {
            builder.store_ref(payload_cell(name, payload, value)?)?;
        }
        (FieldTag::Inline(Payload::Cell), Value::Cell(cell)) => {
            builder.store_cell(cell)?;
        }
        (FieldTag::Inline(Payload::Record(schema)), Value::Record(record)) => {
            schema.store(record, builder)?;
        }
        (FieldTag::Either(payload), _) => {
            store_either(builder, payload_cell(name, payload, value)?)?;
        }
        (FieldTag::Maybe(_), Value::None) => {
            builder.store_bit(false)?;
        }
        (FieldTag::Maybe(inner), _) => {
            builder.store_bit(true)?;
            store_value(name, inner, value, builder)?;
        }
        (FieldTag::Dict(key_bits), Value::Dict(dict)) => {
            if dict.key_bits() != *key_bits {
                return Err(CellError::out_of_range(format!(
                    "field `{name}` expects {key_bits} bit keys, dictionary has {}",
                    dict.key_bits()
                )));
            }
            builder.store_dict(Some(dict))?;
        }
        (FieldTag::Dict(_), Value::None) => {
            builder.store_dict(None)?;
        }
        _ => return Err(mismatch(name, tag, value)),
    }
    Ok(())
}

fn load_payload(payload: &Payload, slice: &mut Slice) -> Result<Value> {
    match payload {
        Payload::Cell => Ok(Value::Cell(slice.to_cell()?)),
        Payload::Record(schema) => Ok(Value::Record(schema.load(slice)?)),
    }
}

fn load_ref_payload(payload: &Payload, cell: Arc<Cell>) -> Result<Value> {
    match payload {
        Payload::Cell => Ok(Value::Cell(cell)),
        Payload::Record(schema) => Ok(Value::Record(schema.load_from_cell(&cell)?)),
    }
}

fn load_value(tag: &FieldTag, slice: &mut Slice) -> Result<Value> {
    let value = match tag {
        FieldTag::Uint(bits) => Value::Uint(slice.load_big_uint(*bits)?),
        FieldTag::Int(bits) => Value::Int(slice.load_big_int(*bits)?),
        FieldTag::Bits(bits) => Value::Bits(slice.load_bits(*bits)?),
        FieldTag::Bool => Value::Bool(slice.load_bit()?),
        FieldTag::Coins => Value::Coins(slice.load_big_coins()?),
        FieldTag::Address => Value::Address(slice.load_address()?),
        FieldTag::Magic { value, bit_len } => {
            let actual = slice.load_uint(*bit_len)?;
            if actual != *value {
                return Err(CellError::TagMismatch {
                    expected: *value,
                    actual,
                });
            }
            Value::None
        }
        FieldTag::Ref(payload) => load_ref_payload(payload, slice.load_ref()?)?,
        FieldTag::Inline(payload) => load_payload(payload, slice)?,
        FieldTag::Either(payload) => {
            if slice.load_bit()? {
                load_ref_payload(payload, slice.load_ref()?)?
            } else {
                load_payload(payload, slice)?
            }
        }
        FieldTag::Maybe(inner) => {
            if slice.load_bit()? {
                load_value(inner, slice)?
            } else {
                Value::None
            }
        }
        FieldTag::Dict(key_bits) => Value::Dict(slice.load_dict(*key_bits)?),
    };
    Ok(value)
}
