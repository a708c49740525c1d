#![cfg_attr(not(any(feature = "user", test)), no_std)]

pub mod arch;
pub mod sdt;

pub use arch::{Arch, MemoryOperand, Register};
