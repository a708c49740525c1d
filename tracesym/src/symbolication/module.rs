use std::fmt::Debug;

use once_cell::unsync::OnceCell;
use tracing::{debug, warn};

use super::Symbol;
use crate::host::{BinaryInspector, ModuleMapping};

/// Symbols of one mapped binary, loaded on first use.
///
/// Shared objects are addressed relative to `base`, everything else by
/// absolute address.
pub struct SymbolTable {
    pub path: String,
    pub start: u64,
    pub end: u64,
    pub base: u64,
    shared: OnceCell<bool>,
    symbols: OnceCell<Vec<Symbol>>,
}

impl Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("path", &self.path)
            .field("start", &format_args!("{:#x}", self.start))
            .field("end", &format_args!("{:#x}", self.end))
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// What an address maps to inside one table.
#[derive(Debug, PartialEq, Eq)]
pub struct AddrLookup<'a> {
    pub module: &'a str,
    /// the symbol and the distance from its start
    pub symbol: Option<(&'a Symbol, u64)>,
}

impl SymbolTable {
    pub fn new(path: &str, start: u64, end: u64) -> Self {
        Self {
            path: path.to_owned(),
            start,
            end,
            base: start,
            shared: OnceCell::new(),
            symbols: OnceCell::new(),
        }
    }

    pub fn from_mapping(mapping: &ModuleMapping) -> Self {
        Self {
            base: mapping.base,
            ..Self::new(&mapping.path, mapping.start, mapping.end)
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    pub fn is_loaded(&self) -> bool {
        self.symbols.get().is_some()
    }

    pub fn is_shared(&self, binary: &dyn BinaryInspector) -> bool {
        *self.shared.get_or_init(|| {
            binary.is_shared_object(&self.path).unwrap_or_else(|e| {
                warn!("cannot tell the type of {}: {e:#}", self.path);
                false
            })
        })
    }

    /// Sorted by start address. An unreadable binary yields an empty table.
    pub fn symbols(&self, binary: &dyn BinaryInspector) -> &[Symbol] {
        self.symbols.get_or_init(|| match binary.symbols(&self.path) {
            Ok(mut symbols) => {
                symbols.sort_by_key(|s| s.start);
                debug!("loaded {} symbols from {}", symbols.len(), self.path);
                symbols
            }
            Err(e) => {
                warn!("no symbols for {}: {e:#}", self.path);
                Vec::new()
            }
        })
    }

    fn to_offset(&self, addr: u64, binary: &dyn BinaryInspector) -> Option<u64> {
        if self.is_shared(binary) {
            addr.checked_sub(self.base)
        } else {
            Some(addr)
        }
    }

    fn to_addr(&self, offset: u64, binary: &dyn BinaryInspector) -> u64 {
        if self.is_shared(binary) {
            self.base.wrapping_add(offset)
        } else {
            offset
        }
    }

    pub fn resolve_addr(&self, addr: u64, binary: &dyn BinaryInspector) -> AddrLookup<'_> {
        let symbol = self
            .to_offset(addr, binary)
            .and_then(|offset| find_symbol(self.symbols(binary), offset).map(|s| (s, offset - s.start)));
        AddrLookup {
            module: &self.path,
            symbol,
        }
    }

    pub fn resolve_name(&self, name: &str, binary: &dyn BinaryInspector) -> Option<u64> {
        self.symbols(binary)
            .iter()
            .find(|s| s.name == name)
            .map(|s| self.to_addr(s.start, binary))
    }
}

/// The symbol with the greatest start that still covers `offset`, looking
/// past nested symbols that end early.
pub(crate) fn find_symbol(symbols: &[Symbol], offset: u64) -> Option<&Symbol> {
    let upper = symbols.partition_point(|s| s.start <= offset);
    symbols[..upper].iter().rev().find(|s| s.contains(offset))
}
