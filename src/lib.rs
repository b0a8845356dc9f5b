//! Cells, Bags of Cells and TL-B codecs for the TON blockchain

pub mod config;
pub mod crc;
pub mod tlb;
pub mod tvm;
pub mod utils;
