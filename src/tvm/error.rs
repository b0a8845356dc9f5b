use thiserror::Error;

use crate::tvm::hash::CellType;

/// Errors produced while building, parsing, hashing or serializing cells
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("cell capacity exceeded: need {requested} {unit}, {available} available")]
    CapacityExceeded {
        requested: usize,
        available: usize,
        unit: &'static str,
    },
    #[error("not enough bits remaining: requested {requested}, available {available}")]
    Underflow { requested: usize, available: usize },
    #[error("malformed data: {0}")]
    Format(String),
    #[error("tag mismatch: expected 0x{expected:x}, got 0x{actual:x}")]
    TagMismatch { expected: u64, actual: u64 },
    #[error("reference index {index} out of range ({count} available)")]
    ReferenceOutOfRange { index: usize, count: usize },
    #[error("operation is not supported for {0:?} cells")]
    UnsupportedCellKind(CellType),
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),
    #[error("missing field `{0}`")]
    MissingField(String),
}

pub type Result<T> = std::result::Result<T, CellError>;

impl CellError {
    pub(crate) fn bits(requested: usize, available: usize) -> Self {
        CellError::CapacityExceeded {
            requested,
            available,
            unit: "bits",
        }
    }

    pub(crate) fn refs(requested: usize, available: usize) -> Self {
        CellError::CapacityExceeded {
            requested,
            available,
            unit: "refs",
        }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        CellError::Format(msg.into())
    }

    pub(crate) fn out_of_range(msg: impl Into<String>) -> Self {
        CellError::ValueOutOfRange(msg.into())
    }
}
