//! Everything the resolvers and the probe engine learn about the running
//! system goes through the traits in this module: ELF parsing, process memory
//! maps, kernel symbols and cross-process memory access.
//!
//! [`Host`] bundles one implementation of each. [`Host::system`] wires the
//! real ones; tests substitute in-memory fakes.

use std::{path::PathBuf, rc::Rc};

use anyhow::Result;
use tracesym_common::Arch;

use crate::config::TracesymConfig;
use crate::symbolication::Symbol;

pub mod elf;
pub mod kallsyms;
pub mod libpath;
pub mod maps;
pub mod memory;
pub mod procinfo;

#[cfg(test)]
pub(crate) mod fake;

pub use elf::ElfInspector;
pub use kallsyms::Kallsyms;
pub use libpath::LibrarySearch;
pub use maps::{ProcMaps, ProcMapsError};
pub use memory::{MemoryError, ProcMem};
pub use procinfo::ProcFs;

/// One SDT note as found in a binary, addresses already adjusted for
/// prelinking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsdtNote {
    pub provider: String,
    pub name: String,
    pub pc: u64,
    pub semaphore: u64,
    pub arg_fmt: String,
}

/// An executable, file-backed mapping of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMapping {
    pub path: String,
    pub start: u64,
    pub end: u64,
    /// runtime address of the image's first byte (its offset-0 mapping)
    pub base: u64,
}

pub trait BinaryInspector {
    /// Every defined symbol of the binary, in file order.
    fn symbols(&self, path: &str) -> Result<Vec<Symbol>>;
    /// Virtual address of the first loadable segment.
    fn load_address(&self, path: &str) -> Result<u64>;
    /// True for `ET_DYN` images, whose addresses are relative to a load base.
    fn is_shared_object(&self, path: &str) -> Result<bool>;
    fn usdt_notes(&self, path: &str) -> Result<Vec<UsdtNote>>;
}

pub trait ProcessInspector {
    fn exists(&self, pid: i32) -> bool;
    /// Executable mappings of the process, in address order.
    fn modules(&self, pid: i32) -> Result<Vec<ModuleMapping>>;
    /// Resolves a program name the way a shell would.
    fn which(&self, name: &str) -> Option<String>;
    /// Resolves a bare library name (`c`, `libc.so.6`) to a path.
    fn which_so(&self, name: &str) -> Option<String>;
    /// File whose inode identifies the image the process runs.
    fn exe_path(&self, pid: i32) -> PathBuf {
        PathBuf::from(format!("/proc/{pid}/exe"))
    }
}

pub trait KernelSymbolSource {
    /// Kernel symbols with their addresses; sizes are unknown and left at 0.
    fn kernel_symbols(&self) -> Result<Vec<Symbol>>;
}

pub trait ProcessMemory {
    fn read_u16(&self, pid: i32, address: u64) -> Result<u16, MemoryError>;
    fn write_u16(&self, pid: i32, address: u64, value: u16) -> Result<(), MemoryError>;
}

/// The set of collaborators used to inspect the system.
///
/// Cloning is cheap; the collaborators are shared.
#[derive(Clone)]
pub struct Host {
    pub binary: Rc<dyn BinaryInspector>,
    pub process: Rc<dyn ProcessInspector>,
    pub kernel: Rc<dyn KernelSymbolSource>,
    pub memory: Rc<dyn ProcessMemory>,
    /// argument syntax used when parsing probe descriptors
    pub arch: Arch,
}

impl Host {
    pub fn system() -> Self {
        Self::from_config(&TracesymConfig::default())
    }

    pub fn from_config(config: &TracesymConfig) -> Self {
        let search = LibrarySearch::new(&config.symbols.library_paths);
        Self {
            binary: Rc::new(ElfInspector),
            process: Rc::new(ProcFs::new(search)),
            kernel: Rc::new(Kallsyms::new(config.symbols.kallsyms.clone())),
            memory: Rc::new(ProcMem),
            arch: config.usdt.arch,
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("arch", &self.arch)
            .finish()
    }
}
