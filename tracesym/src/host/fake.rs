//! In-memory collaborators for unit tests.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    path::PathBuf,
    rc::Rc,
};

use anyhow::{anyhow, Result};
use tracesym_common::Arch;

use super::*;
use crate::symbolication::Symbol;

pub(crate) fn sym(name: &str, start: u64, size: u64) -> Symbol {
    Symbol { name: name.to_owned(), start, size, flags: 0 }
}

#[derive(Default)]
pub(crate) struct FakeBinaries {
    pub symbols: HashMap<String, Vec<Symbol>>,
    pub shared: HashSet<String>,
    pub load_addresses: HashMap<String, u64>,
    pub notes: HashMap<String, Vec<UsdtNote>>,
    pub symbol_loads: Cell<usize>,
}

impl FakeBinaries {
    pub fn with_symbols(mut self, path: &str, symbols: Vec<Symbol>) -> Self {
        self.symbols.insert(path.to_owned(), symbols);
        self
    }

    pub fn shared(mut self, path: &str) -> Self {
        self.shared.insert(path.to_owned());
        self
    }

    pub fn with_load_address(mut self, path: &str, addr: u64) -> Self {
        self.load_addresses.insert(path.to_owned(), addr);
        self
    }

    pub fn with_notes(mut self, path: &str, notes: Vec<UsdtNote>) -> Self {
        self.notes.insert(path.to_owned(), notes);
        self
    }
}

impl BinaryInspector for FakeBinaries {
    fn symbols(&self, path: &str) -> Result<Vec<Symbol>> {
        self.symbol_loads.set(self.symbol_loads.get() + 1);
        self.symbols
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such binary {path}"))
    }

    fn load_address(&self, path: &str) -> Result<u64> {
        Ok(self.load_addresses.get(path).copied().unwrap_or(0))
    }

    fn is_shared_object(&self, path: &str) -> Result<bool> {
        Ok(self.shared.contains(path))
    }

    fn usdt_notes(&self, path: &str) -> Result<Vec<UsdtNote>> {
        self.notes
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such binary {path}"))
    }
}

#[derive(Default)]
pub(crate) struct FakeProcesses {
    pub modules: RefCell<HashMap<i32, Vec<ModuleMapping>>>,
    pub programs: HashMap<String, String>,
    pub libraries: HashMap<String, String>,
    pub exes: RefCell<HashMap<i32, PathBuf>>,
    pub enumerations: Cell<usize>,
}

impl FakeProcesses {
    pub fn with_modules(self, pid: i32, modules: Vec<ModuleMapping>) -> Self {
        self.modules.borrow_mut().insert(pid, modules);
        self
    }

    pub fn with_program(mut self, name: &str, path: &str) -> Self {
        self.programs.insert(name.to_owned(), path.to_owned());
        self
    }

    pub fn with_library(mut self, name: &str, path: &str) -> Self {
        self.libraries.insert(name.to_owned(), path.to_owned());
        self
    }

    pub fn with_exe(self, pid: i32, path: PathBuf) -> Self {
        self.exes.borrow_mut().insert(pid, path);
        self
    }
}

impl ProcessInspector for FakeProcesses {
    fn exists(&self, pid: i32) -> bool {
        self.modules.borrow().contains_key(&pid)
    }

    fn modules(&self, pid: i32) -> Result<Vec<ModuleMapping>> {
        self.enumerations.set(self.enumerations.get() + 1);
        self.modules
            .borrow()
            .get(&pid)
            .cloned()
            .ok_or_else(|| anyhow!("no such process {pid}"))
    }

    fn which(&self, name: &str) -> Option<String> {
        if name.starts_with('/') {
            return Some(name.to_owned());
        }
        self.programs.get(name).cloned()
    }

    fn which_so(&self, name: &str) -> Option<String> {
        if name.starts_with('/') {
            return Some(name.to_owned());
        }
        self.libraries.get(name).cloned()
    }

    fn exe_path(&self, pid: i32) -> PathBuf {
        self.exes
            .borrow()
            .get(&pid)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(format!("/nonexistent/{pid}/exe")))
    }
}

#[derive(Default)]
pub(crate) struct FakeKernel {
    pub symbols: Vec<Symbol>,
    pub reads: Cell<usize>,
}

impl KernelSymbolSource for FakeKernel {
    fn kernel_symbols(&self) -> Result<Vec<Symbol>> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.symbols.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeMemory {
    pub cells: RefCell<HashMap<(i32, u64), u16>>,
    pub writes: Cell<usize>,
}

impl FakeMemory {
    pub fn get(&self, pid: i32, address: u64) -> Option<u16> {
        self.cells.borrow().get(&(pid, address)).copied()
    }

    pub fn set(&self, pid: i32, address: u64, value: u16) {
        self.cells.borrow_mut().insert((pid, address), value);
    }
}

impl ProcessMemory for FakeMemory {
    fn read_u16(&self, pid: i32, address: u64) -> Result<u16, MemoryError> {
        self.get(pid, address)
            .ok_or(MemoryError::AddressOutOfRange(address))
    }

    fn write_u16(&self, pid: i32, address: u64, value: u16) -> Result<(), MemoryError> {
        if self.get(pid, address).is_none() {
            return Err(MemoryError::AddressOutOfRange(address));
        }
        self.writes.set(self.writes.get() + 1);
        self.set(pid, address, value);
        Ok(())
    }
}

/// Keeps typed handles on the fakes so tests can inspect them after handing
/// a [`Host`] to the code under test.
pub(crate) struct FakeHost {
    pub binaries: Rc<FakeBinaries>,
    pub processes: Rc<FakeProcesses>,
    pub kernel: Rc<FakeKernel>,
    pub memory: Rc<FakeMemory>,
    pub arch: Arch,
}

impl FakeHost {
    pub fn new(binaries: FakeBinaries, processes: FakeProcesses) -> Self {
        Self {
            binaries: Rc::new(binaries),
            processes: Rc::new(processes),
            kernel: Rc::new(FakeKernel::default()),
            memory: Rc::new(FakeMemory::default()),
            arch: Arch::X86_64,
        }
    }

    pub fn with_kernel(mut self, symbols: Vec<Symbol>) -> Self {
        self.kernel = Rc::new(FakeKernel { symbols, reads: Cell::new(0) });
        self
    }

    pub fn host(&self) -> Host {
        Host {
            binary: self.binaries.clone(),
            process: self.processes.clone(),
            kernel: self.kernel.clone(),
            memory: self.memory.clone(),
            arch: self.arch,
        }
    }
}
