use std::fmt;

use thiserror::Error;

use super::{EmitError, ParseError};
use crate::host::MemoryError;

/// One argument that could not be turned into code.
#[derive(Debug)]
pub struct ArgumentFailure {
    pub location: usize,
    /// 1-based, as in the `argN` local
    pub argument: usize,
    pub error: EmitError,
}

impl fmt::Display for ArgumentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "location {} arg{}: {}", self.location, self.argument, self.error)
    }
}

#[derive(Debug, Error)]
pub enum UsdtError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("location {address:#x} has {found} arguments, the probe has {expected}")]
    ArgumentCountMismatch { address: u64, expected: usize, found: usize },
    #[error("probe {probe} is not guarded by a semaphore")]
    NoSemaphore { probe: String },
    #[error("{binary} is not mapped into process {pid}")]
    ModuleNotMapped { pid: i32, binary: String },
    #[error("cannot list modules of process {pid}: {reason}")]
    Modules { pid: i32, reason: String },
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("probe {probe} was not enabled in process {pid}")]
    NotEnabled { probe: String, pid: i32 },
    #[error("process {pid} changed image since probe {probe} was enabled")]
    ProcessChanged { probe: String, pid: i32 },
    #[error("semaphore of {probe} in process {pid} is already 0")]
    SemaphoreUnderflow { probe: String, pid: i32 },
    #[error("semaphore of {probe} in process {pid} is saturated")]
    SemaphoreOverflow { probe: String, pid: i32 },
    #[error("{} argument(s) of {probe} could not be emitted", .failures.len())]
    Emission { probe: String, failures: Vec<ArgumentFailure> },
    #[error(transparent)]
    Fmt(#[from] fmt::Error),
}
