//! Overall high-level error type for the tvm driver
use std::io;

use thiserror::Error;

use crate::eval::error::VmError;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("unknown scenario {0}")]
    UnknownScenario(String),
    #[error("scenario {scenario} expected {expected} but observed {observed}")]
    UnexpectedOutcome {
        scenario: String,
        expected: String,
        observed: String,
    },
}
