use std::{fs, path::Path};

use tracing::{debug, warn};

use super::{ProcessIdentity, ResolvedSymbol, Resolver, SymbolTable};
use crate::host::Host;

/// Resolves addresses of one process against the binaries it has mapped.
///
/// Every lookup first checks whether the process now runs another image; if
/// so the module list is rebuilt before answering.
#[derive(Debug)]
pub struct ProcessResolver {
    pid: i32,
    identity: ProcessIdentity,
    modules: Vec<SymbolTable>,
    host: Host,
}

impl ProcessResolver {
    pub fn new(pid: i32, host: &Host) -> Self {
        Self::with_identity(pid, host, ProcessIdentity::new(host.process.exe_path(pid)))
    }

    pub(crate) fn with_identity(pid: i32, host: &Host, identity: ProcessIdentity) -> Self {
        let mut resolver = Self {
            pid,
            identity,
            modules: Vec::new(),
            host: host.clone(),
        };
        resolver.refresh();
        resolver
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn modules(&self) -> &[SymbolTable] {
        &self.modules
    }

    fn ensure_fresh(&mut self) {
        if self.identity.is_stale() {
            debug!("process {} changed image, reloading modules", self.pid);
            self.refresh();
        }
    }

    /// Path of the module mapped at `addr`, whether or not a symbol covers it.
    pub fn module_of(&mut self, addr: u64) -> Option<String> {
        self.ensure_fresh();
        self.modules
            .iter()
            .find(|m| m.contains(addr))
            .map(|m| m.path.clone())
    }
}

/// Whether the mapped image at `mapped` is the binary named by `wanted`: the
/// same path, the same file name for a bare `wanted`, or the same file once
/// symlinks are resolved.
pub(crate) fn is_same_binary(mapped: &str, wanted: &str) -> bool {
    if mapped == wanted {
        return true;
    }
    let mapped = Path::new(mapped);
    if !wanted.contains('/') {
        return mapped.file_name().map_or(false, |f| f == wanted);
    }
    match (fs::canonicalize(mapped), fs::canonicalize(wanted)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

impl Resolver for ProcessResolver {
    fn resolve_addr(&mut self, addr: u64) -> Option<ResolvedSymbol> {
        self.ensure_fresh();
        let binary = self.host.binary.as_ref();
        let table = self.modules.iter().find(|m| m.contains(addr))?;
        let lookup = table.resolve_addr(addr, binary);
        let (sym, offset) = lookup.symbol?;
        Some(ResolvedSymbol {
            name: sym.name.clone(),
            module: lookup.module.to_owned(),
            offset,
        })
    }

    fn resolve_name(&mut self, module: Option<&str>, name: &str) -> Option<u64> {
        self.ensure_fresh();
        let binary = self.host.binary.as_ref();
        self.modules
            .iter()
            .filter(|m| module.map_or(true, |wanted| is_same_binary(&m.path, wanted)))
            .find_map(|m| m.resolve_name(name, binary))
    }

    fn refresh(&mut self) {
        self.modules = match self.host.process.modules(self.pid) {
            Ok(mappings) => mappings.iter().map(SymbolTable::from_mapping).collect(),
            Err(e) => {
                warn!("cannot list modules of {}: {e:#}", self.pid);
                Vec::new()
            }
        };
        debug!("process {}: {} modules", self.pid, self.modules.len());
        self.identity.reset();
    }
}
