//! Error types reported by `HashOpen`.

use std::collections::TryReserveError;
use thiserror::Error;

/// Errors raised while building or reorganising the bucket array.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to allocate bucket storage for 2^{bit} slots")]
    Alloc {
        bit: u32,
        #[source]
        source: TryReserveError,
    },

    #[error("minimum bucket bit {bit} out of range ({min}..={max})")]
    InvalidMinBit { bit: u32, min: u32, max: u32 },

    /// `requested` committed slots cannot stay under half load even at
    /// `2^MAX_BIT` slots.
    #[error("capacity overflow: {requested} slots exceed the largest bucket array")]
    CapacityOverflow { requested: usize },
}

/// Failed insert. The payload is handed back untouched, and so is the table.
#[derive(Debug, Error)]
#[error("insert failed: {source}")]
pub struct InsertError<T> {
    pub payload: T,
    #[source]
    pub source: TableError,
}

impl<T> InsertError<T> {
    pub fn into_payload(self) -> T {
        self.payload
    }
}
