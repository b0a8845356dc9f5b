//! Jetton wallet transfer message body
//!
//! ```text
//! transfer#0f8a7ea5 query_id:uint64 amount:(VarUInteger 16) destination:MsgAddress
//!                   response_destination:MsgAddress custom_payload:(Maybe ^Cell)
//!                   forward_ton_amount:(VarUInteger 16) forward_payload:(Either Cell ^Cell)
//!                   = InternalMsgBody;
//! ```

use std::sync::Arc;

use crate::tlb::{Coins, EitherRef, MsgAddress, Remainder, Tlb, TlbPrefix};
use crate::tvm::address::Address;
use crate::tvm::builder::Builder;
use crate::tvm::cell::Cell;
use crate::tvm::error::Result;
use crate::tvm::slice::Slice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JettonTransfer {
    pub query_id: u64,
    pub amount: Coins,
    pub destination: Address,
    pub response_destination: MsgAddress,
    pub custom_payload: Option<Arc<Cell>>,
    pub forward_ton_amount: Coins,
    pub forward_payload: EitherRef<Remainder>,
}

impl JettonTransfer {
    pub fn new(destination: Address, amount: impl Into<Coins>) -> Self {
        Self {
            query_id: 0,
            amount: amount.into(),
            destination,
            response_destination: MsgAddress::NONE,
            custom_payload: None,
            forward_ton_amount: Coins::zero(),
            forward_payload: EitherRef(Remainder::default()),
        }
    }

    pub fn with_query_id(mut self, query_id: u64) -> Self {
        self.query_id = query_id;
        self
    }

    pub fn with_response_destination(mut self, address: Address) -> Self {
        self.response_destination = address.into();
        self
    }

    pub fn with_forward_ton_amount(mut self, amount: impl Into<Coins>) -> Self {
        self.forward_ton_amount = amount.into();
        self
    }

    pub fn with_forward_payload(mut self, payload: Arc<Cell>) -> Self {
        self.forward_payload = EitherRef(Remainder(payload));
        self
    }

    /// Attaches a text comment (`op = 0` followed by a snake string) as the forward payload
    pub fn with_comment(self, comment: &str) -> Result<Self> {
        let mut builder = Builder::new();
        builder.store_u32(0)?;
        builder.store_snake_bytes(comment.as_bytes())?;
        Ok(self.with_forward_payload(builder.end_cell()?))
    }
}

impl Tlb for JettonTransfer {
    const PREFIX: TlbPrefix = TlbPrefix::new(0x0f8a7ea5, 32);

    fn read_definition(slice: &mut Slice) -> Result<Self> {
        Ok(Self {
            query_id: slice.load_u64()?,
            amount: Coins::read(slice)?,
            destination: Address::read(slice)?,
            response_destination: MsgAddress::read(slice)?,
            custom_payload: slice.load_maybe_ref()?,
            forward_ton_amount: Coins::read(slice)?,
            forward_payload: EitherRef::read(slice)?,
        })
    }

    fn write_definition(&self, builder: &mut Builder) -> Result<()> {
        builder.store_u64(self.query_id)?;
        self.amount.write(builder)?;
        self.destination.write(builder)?;
        self.response_destination.write(builder)?;
        builder.store_maybe_ref(self.custom_payload.clone())?;
        self.forward_ton_amount.write(builder)?;
        self.forward_payload.write(builder)
    }
}
