use tracing::debug;

use crate::host::Host;

/// A symbol located inside a binary on disk, as needed to place a uprobe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySymbol {
    /// full path of the binary
    pub module: String,
    pub name: Option<String>,
    /// relative to the binary's load address
    pub offset: u64,
}

/// Link-time address of `name` in the binary at `module_path`.
pub fn find_symbol_addr(host: &Host, module_path: &str, name: &str) -> Option<u64> {
    let symbols = match host.binary.symbols(module_path) {
        Ok(symbols) => symbols,
        Err(e) => {
            debug!("cannot read symbols of {module_path}: {e:#}");
            return None;
        }
    };
    symbols.iter().find(|s| s.name == name).map(|s| s.start)
}

/// Locates `symname` (or the explicit `addr`) inside `module`.
///
/// A module without a `/` is looked up as a library name. When `addr` is 0
/// the symbol's own address is used. The returned offset is relative to the
/// binary's load address; an address of 0 after lookup is a failure.
pub fn resolve_symname(host: &Host, module: &str, symname: Option<&str>, addr: u64) -> Option<BinarySymbol> {
    let module = if module.contains('/') {
        module.to_owned()
    } else {
        host.process.which_so(module)?
    };

    let load_addr = match host.binary.load_address(&module) {
        Ok(addr) => addr,
        Err(e) => {
            debug!("cannot read load address of {module}: {e:#}");
            return None;
        }
    };

    let mut offset = addr;
    if let (Some(name), 0) = (symname, offset) {
        offset = find_symbol_addr(host, &module, name)?;
    }
    if offset == 0 {
        return None;
    }

    Some(BinarySymbol {
        module,
        name: symname.map(str::to_owned),
        offset: offset.wrapping_sub(load_addr),
    })
}
