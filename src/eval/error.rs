//! Runtime errors
use thiserror::Error;

use super::memory::{heap::HeapError, object::ObjectKind};

#[derive(Debug, Error)]
pub enum VmError {
    #[error("out of memory ({0})")]
    OutOfMemory(#[source] HeapError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("array bounds error: index {index} out of bounds for array of length {length}")]
    OutOfBounds { index: usize, length: usize },
    #[error("type mismatch: cannot combine {0} with {1}")]
    TypeMismatch(ObjectKind, ObjectKind),
    #[error("type mismatch: expected array, found {0}")]
    NotAnArray(ObjectKind),
}

impl From<HeapError> for VmError {
    fn from(e: HeapError) -> Self {
        VmError::OutOfMemory(e)
    }
}

impl VmError {
    /// Whether the failure is resource exhaustion the caller may retry
    /// after freeing memory
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, VmError::OutOfMemory(_))
    }
}
