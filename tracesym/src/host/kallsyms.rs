use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

use super::KernelSymbolSource;
use crate::symbolication::Symbol;

/// Kernel symbols read from a `/proc/kallsyms` formatted file.
#[derive(Debug, Clone)]
pub struct Kallsyms {
    path: PathBuf,
}

impl Kallsyms {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl KernelSymbolSource for Kallsyms {
    fn kernel_symbols(&self) -> Result<Vec<Symbol>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(parse_kallsyms(&contents))
    }
}

/// Parses `address type name [module]` lines.
///
/// Lines with a zero address are dropped: they are what an unprivileged
/// reader sees when `kptr_restrict` hides the addresses.
pub fn parse_kallsyms(contents: &str) -> Vec<Symbol> {
    let mut symbols = Vec::new();
    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let (Some(addr), Some(_ty), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let Ok(start) = u64::from_str_radix(addr, 16) else {
            continue;
        };
        if start == 0 {
            continue;
        }
        symbols.push(Symbol {
            name: name.to_owned(),
            start,
            size: 0,
            flags: 0,
        });
    }
    symbols
}
