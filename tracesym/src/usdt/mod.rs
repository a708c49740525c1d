//! Statically defined tracing probes (SystemTap SDT notes): discovery,
//! argument decoding, semaphores and argument-fetch code generation.

pub mod argument;
pub mod error;
pub mod parser;
pub mod probe;
pub mod registry;

pub use argument::{Argument, EmitError};
pub use error::{ArgumentFailure, UsdtError};
pub use parser::{parse_all, OperandParser, ParseError};
pub use probe::{Probe, ProbeLocation};
pub use registry::{ProbeId, ProbeRegistry};
