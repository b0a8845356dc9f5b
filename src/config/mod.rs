//! Bag of Cells decoding limits and encoding defaults
//!
//! Loaded from JSON; missing fields take their default values.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tvm::boc::BocFlags;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BocConfig {
    /// Maximum depth of any decoded cell
    pub max_depth: usize,
    /// Maximum number of cells in a decoded BoC
    pub max_cells: usize,
    /// Maximum number of roots in a decoded BoC
    pub max_roots: usize,
    /// Reject buffers whose CRC32C trailer does not match
    pub verify_crc: bool,
    /// Append a CRC32C trailer when encoding
    pub write_crc32c: bool,
    /// Emit the cell offset index when encoding
    pub write_index: bool,
}

impl Default for BocConfig {
    fn default() -> Self {
        Self {
            max_depth: 1024,
            max_cells: 1 << 20,
            max_roots: 16,
            verify_crc: true,
            write_crc32c: false,
            write_index: false,
        }
    }
}

impl BocConfig {
    /// Encoder flags described by this config
    pub fn flags(&self) -> BocFlags {
        BocFlags {
            has_index: self.write_index,
            has_crc32c: self.write_crc32c,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read BoC config {}", path.display()))?;
        json.parse()
    }
}

impl FromStr for BocConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("invalid BoC config")
    }
}
