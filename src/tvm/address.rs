//! TON Address implementation
//!
//! Supports internal `addr_std` addresses (workchain + hash) in raw and user-friendly
//! form, and external `addr_extern` addresses, along with their cell encodings.

use std::fmt;

use anyhow::{Result, bail};
use base64::Engine;

use crate::crc::CRC16;
use crate::tvm::builder::Builder;
use crate::tvm::error::CellError;
use crate::tvm::slice::Slice;

/// Represents a TON blockchain address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Workchain ID (-1 for masterchain, 0 for basechain)
    pub workchain: i8,
    /// 32-byte hash part of the address
    pub hash_part: [u8; 32],
    /// Whether the address is bounceable
    pub is_bounceable: bool,
    /// Whether this is a test-only address
    pub is_test_only: bool,
}

impl Address {
    /// Bits taken by `addr_std` without anycast
    pub const BIT_LEN: usize = 2 + 1 + 8 + 256;

    /// Creates a new address from workchain and hash part
    pub fn new(workchain: i8, hash_part: [u8; 32]) -> Self {
        Self {
            workchain,
            hash_part,
            is_bounceable: true,
            is_test_only: false,
        }
    }

    /// Parses an address from string (supports both raw and base64 formats)
    pub fn parse(address: &str) -> Result<Self> {
        if address.contains(':') {
            return Self::from_hex(address);
        }
        Self::from_base64(address)
    }

    /// Parses address from raw format: "workchain:hash"
    pub fn from_hex(address: &str) -> Result<Self> {
        let Some((workchain, hash_hex)) = address.split_once(':') else {
            bail!("Invalid raw address format: {address}");
        };

        let workchain = workchain.parse::<i8>()?;
        if hash_hex.len() != 64 {
            bail!("Hash part must be 64 hex characters");
        }

        let mut hash_part = [0u8; 32];
        hex::decode_to_slice(hash_hex, &mut hash_part)?;

        Ok(Self::new(workchain, hash_part))
    }

    /// Parses address from base64 user-friendly format
    pub fn from_base64(address: &str) -> Result<Self> {
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(address)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(address))?;

        if decoded.len() != 36 {
            bail!("Invalid base64 address length: {}", decoded.len());
        }

        let mut tag = decoded[0];
        let is_test_only = tag & 0x80 != 0;
        tag &= 0x7F;

        let is_bounceable = match tag {
            0x11 => true,
            0x51 => false,
            _ => bail!("Invalid address tag 0x{tag:02x}"),
        };

        let expected_crc = u16::from_be_bytes([decoded[34], decoded[35]]);
        let actual_crc = CRC16.checksum(&decoded[..34]);
        if expected_crc != actual_crc {
            bail!("Invalid address CRC: expected 0x{expected_crc:04x}, got 0x{actual_crc:04x}");
        }

        let mut hash_part = [0u8; 32];
        hash_part.copy_from_slice(&decoded[2..34]);

        Ok(Self {
            workchain: decoded[1] as i8,
            hash_part,
            is_bounceable,
            is_test_only,
        })
    }

    /// Formats the address in user-friendly base64 form
    pub fn to_user_friendly(&self, url_safe: bool, bounceable: bool, test_only: bool) -> String {
        let mut tag = if bounceable { 0x11u8 } else { 0x51u8 };
        if test_only {
            tag |= 0x80;
        }

        let mut data = Vec::with_capacity(36);
        data.push(tag);
        data.push(self.workchain as u8);
        data.extend_from_slice(&self.hash_part);
        let crc = CRC16.checksum(&data);
        data.extend_from_slice(&crc.to_be_bytes());

        if url_safe {
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&data)
        } else {
            base64::engine::general_purpose::STANDARD.encode(&data)
        }
    }

    /// Converts to raw format (workchain:hash)
    pub fn to_hex(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash_part))
    }

    /// Converts to user-friendly url-safe base64 using the address flags
    pub fn to_base64(&self) -> String {
        self.to_user_friendly(true, self.is_bounceable, self.is_test_only)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl std::str::FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

/// Represents an external address (`addr_extern`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAddress {
    /// Left-aligned address bits
    pub data: Vec<u8>,
    /// Bit length of the address, at most 511
    pub bit_len: usize,
}

impl ExternalAddress {
    pub fn new(data: Vec<u8>, bit_len: usize) -> Self {
        Self { data, bit_len }
    }

    /// Creates an external address from bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec(), bytes.len() * 8)
    }

    /// Creates an external address from hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        Ok(Self::from_bytes(&hex::decode(hex)?))
    }
}

impl fmt::Display for ExternalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bit_len == 0 {
            write!(f, "ExternalAddress<null>")
        } else {
            write!(f, "ExternalAddress<{}:{}>", self.bit_len, hex::encode(&self.data))
        }
    }
}

/// Slice extension for addresses
impl Slice {
    /// Loads `MsgAddressInt` or `addr_none`
    pub fn load_address(&mut self) -> crate::tvm::error::Result<Option<Address>> {
        match self.preload_uint(2)? {
            0b00 => {
                self.skip_bits(2)?;
                Ok(None)
            }
            0b10 => {
                self.ensure_address_bits()?;
                self.skip_bits(2)?;
                if self.load_bit()? {
                    return Err(CellError::format("anycast addresses are not supported"));
                }
                let workchain = self.load_int(8)? as i8;
                let mut hash_part = [0u8; 32];
                hash_part.copy_from_slice(&self.load_bytes(32)?);
                Ok(Some(Address::new(workchain, hash_part)))
            }
            0b01 => Err(CellError::format("expected internal address, got addr_extern")),
            _ => Err(CellError::format("addr_var is not supported")),
        }
    }

    /// Loads an `addr_extern`
    pub fn load_external_address(&mut self) -> crate::tvm::error::Result<ExternalAddress> {
        let tag = self.preload_uint(2)?;
        if tag != 0b01 {
            return Err(CellError::TagMismatch {
                expected: 0b01,
                actual: tag,
            });
        }
        self.skip_bits(2)?;
        let bit_len = self.load_uint(9)? as usize;
        let data = self.load_bits(bit_len)?;
        Ok(ExternalAddress::new(data, bit_len))
    }

    fn ensure_address_bits(&self) -> crate::tvm::error::Result<()> {
        if !self.can_read_bits(Address::BIT_LEN) {
            return Err(CellError::Underflow {
                requested: Address::BIT_LEN,
                available: self.remaining_bits(),
            });
        }
        Ok(())
    }
}

/// Builds the `addr_std` cell of an address, used as a dictionary key
pub fn address_cell_bits(address: &Address) -> crate::tvm::error::Result<Vec<u8>> {
    let mut builder = Builder::new();
    builder.store_address(Some(address))?;
    let mut slice = builder.to_slice()?;
    slice.load_bits(Address::BIT_LEN)
}
