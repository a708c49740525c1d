//! Address to symbol resolution for the kernel and for user processes.

use crate::host::Host;

pub mod identity;
pub mod kernel;
pub mod lookup;
pub mod module;
pub mod process;
pub mod symbol;

pub use identity::ProcessIdentity;
pub use kernel::{KernelResolver, KERNEL_MODULE};
pub use lookup::{find_symbol_addr, resolve_symname, BinarySymbol};
pub use module::SymbolTable;
pub use process::ProcessResolver;
pub use symbol::{ResolvedSymbol, Symbol};

pub trait Resolver {
    fn resolve_addr(&mut self, addr: u64) -> Option<ResolvedSymbol>;
    /// Address of `name`, restricted to `module` when given.
    fn resolve_name(&mut self, module: Option<&str>, name: &str) -> Option<u64>;
    fn refresh(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Kernel,
    Process(i32),
}

#[derive(Debug)]
pub enum SymbolCache {
    Kernel(KernelResolver),
    Process(ProcessResolver),
}

impl SymbolCache {
    pub fn new(target: Target, host: &Host) -> Self {
        match target {
            Target::Kernel => {
                let mut k = KernelResolver::new(host.kernel.clone());
                k.refresh();
                SymbolCache::Kernel(k)
            }
            Target::Process(pid) => SymbolCache::Process(ProcessResolver::new(pid, host)),
        }
    }

    pub fn target(&self) -> Target {
        match self {
            SymbolCache::Kernel(_) => Target::Kernel,
            SymbolCache::Process(p) => Target::Process(p.pid()),
        }
    }
}

impl Resolver for SymbolCache {
    fn resolve_addr(&mut self, addr: u64) -> Option<ResolvedSymbol> {
        match self {
            SymbolCache::Kernel(k) => k.resolve_addr(addr),
            SymbolCache::Process(p) => p.resolve_addr(addr),
        }
    }

    fn resolve_name(&mut self, module: Option<&str>, name: &str) -> Option<u64> {
        match self {
            SymbolCache::Kernel(k) => k.resolve_name(module, name),
            SymbolCache::Process(p) => p.resolve_name(module, name),
        }
    }

    fn refresh(&mut self) {
        match self {
            SymbolCache::Kernel(k) => k.refresh(),
            SymbolCache::Process(p) => p.refresh(),
        }
    }
}
