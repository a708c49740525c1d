use std::fmt;

use symbolic::demangle::demangle;

/// A named address range of a binary or of the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub start: u64,
    /// 0 when unknown
    pub size: u64,
    /// `st_info` for ELF symbols
    pub flags: u32,
}

impl Symbol {
    /// Whether `offset` falls inside the symbol. The end is inclusive, so a
    /// size-0 symbol still matches its own start.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset <= self.start.saturating_add(self.size)
    }
}

/// Result of an address lookup. Owns its strings; nothing borrows from the
/// cache that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    /// raw (mangled) symbol name
    pub name: String,
    /// path of the module, or `[kernel]`
    pub module: String,
    /// distance from the symbol start
    pub offset: u64,
}

impl ResolvedSymbol {
    /// Human readable name, falling back to the raw one when it does not
    /// demangle.
    pub fn demangled(&self) -> String {
        demangle(&self.name).into_owned()
    }
}

impl fmt::Display for ResolvedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:#x} ({})", self.demangled(), self.offset, self.module)
    }
}
