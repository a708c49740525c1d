use std::rc::Rc;

use fxhash::FxHashMap;
use tracing::{debug, warn};

use super::{ResolvedSymbol, Resolver, Symbol};
use crate::host::KernelSymbolSource;

pub const KERNEL_MODULE: &str = "[kernel]";

/// Resolves kernel addresses against one global, sorted symbol list.
pub struct KernelResolver {
    source: Rc<dyn KernelSymbolSource>,
    symbols: Vec<Symbol>,
    names: FxHashMap<String, u64>,
    /// length of `symbols` when `names` was built
    indexed_len: Option<usize>,
}

impl std::fmt::Debug for KernelResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelResolver")
            .field("symbols", &self.symbols.len())
            .finish()
    }
}

impl KernelResolver {
    pub fn new(source: Rc<dyn KernelSymbolSource>) -> Self {
        Self {
            source,
            symbols: Vec::new(),
            names: FxHashMap::default(),
            indexed_len: None,
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Drops the symbol list; the next refresh reads it again.
    pub fn invalidate(&mut self) {
        self.symbols.clear();
    }

    fn ensure_index(&mut self) {
        if self.indexed_len == Some(self.symbols.len()) {
            return;
        }
        self.names.clear();
        for sym in &self.symbols {
            // sorted, so the lowest address wins for duplicated names
            self.names.entry(sym.name.clone()).or_insert(sym.start);
        }
        self.indexed_len = Some(self.symbols.len());
    }
}

impl Resolver for KernelResolver {
    fn resolve_addr(&mut self, addr: u64) -> Option<ResolvedSymbol> {
        self.refresh();
        let first = self.symbols.first()?;
        if addr < first.start {
            return None;
        }
        let idx = self.symbols.partition_point(|s| s.start <= addr) - 1;
        let sym = &self.symbols[idx];
        Some(ResolvedSymbol {
            name: sym.name.clone(),
            module: KERNEL_MODULE.to_owned(),
            offset: addr - sym.start,
        })
    }

    fn resolve_name(&mut self, _module: Option<&str>, name: &str) -> Option<u64> {
        self.refresh();
        self.ensure_index();
        self.names.get(name).copied()
    }

    fn refresh(&mut self) {
        if !self.symbols.is_empty() {
            return;
        }
        match self.source.kernel_symbols() {
            Ok(mut symbols) => {
                symbols.sort_by_key(|s| s.start);
                debug!("loaded {} kernel symbols", symbols.len());
                self.symbols = symbols;
            }
            Err(e) => warn!("cannot read kernel symbols: {e:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::{sym, FakeKernel};

    fn resolver(symbols: Vec<Symbol>) -> (Rc<FakeKernel>, KernelResolver) {
        let source = Rc::new(FakeKernel { symbols, ..Default::default() });
        (source.clone(), KernelResolver::new(source))
    }

    #[test]
    fn resolves_greatest_start_below() {
        let (_, mut k) = resolver(vec![
            sym("b", 0xffff_2000, 0),
            sym("a", 0xffff_1000, 0),
            sym("c", 0xffff_3000, 0),
        ]);
        k.refresh();
        assert!(k.symbols().windows(2).all(|w| w[0].start <= w[1].start));

        let r = k.resolve_addr(0xffff_2010).unwrap();
        assert_eq!(r.name, "b");
        assert_eq!(r.offset, 0x10);
        assert_eq!(r.module, KERNEL_MODULE);

        assert_eq!(k.resolve_addr(0xffff_3000).unwrap().name, "c");
        assert_eq!(k.resolve_addr(0xffff_1000).unwrap().offset, 0);
    }

    #[test]
    fn name_and_address_lookups_agree() {
        let names = ["do_sys_open", "vfs_read", "schedule", "_stext", "tcp_sendmsg"];
        let (_, mut k) = resolver(
            names
                .iter()
                .enumerate()
                .map(|(i, n)| sym(n, 0xffff_ffff_8100_0000 - (i as u64) * 0x100, 0))
                .collect(),
        );
        for name in names {
            let addr = k.resolve_name(None, name).unwrap();
            let hit = k.resolve_addr(addr).unwrap();
            assert_eq!((hit.name.as_str(), hit.offset), (name, 0));
        }
    }

    #[test]
    fn below_first_symbol_is_not_found() {
        let (_, mut k) = resolver(vec![sym("a", 0x1000, 0)]);
        assert!(k.resolve_addr(0xfff).is_none());
        assert!(k.resolve_addr(0).is_none());
    }

    #[test]
    fn empty_table_resolves_nothing() {
        let (_, mut k) = resolver(vec![]);
        assert!(k.resolve_addr(0x1000).is_none());
        assert!(k.resolve_name(None, "a").is_none());
    }

    #[test]
    fn refresh_only_populates_when_empty() {
        let (src, mut k) = resolver(vec![sym("a", 0x1000, 0)]);
        k.refresh();
        k.refresh();
        k.resolve_addr(0x1000);
        assert_eq!(src.reads.get(), 1);

        k.invalidate();
        assert!(k.symbols().is_empty());
        k.refresh();
        assert_eq!(src.reads.get(), 2);
        assert_eq!(k.symbols().len(), 1);
    }

    #[test]
    fn name_lookup_prefers_lowest_address() {
        let (_, mut k) = resolver(vec![
            sym("dup", 0x3000, 0),
            sym("dup", 0x2000, 0),
            sym("uniq", 0x1000, 0),
        ]);
        assert_eq!(k.resolve_name(None, "dup"), Some(0x2000));
        assert_eq!(k.resolve_name(Some("ignored"), "uniq"), Some(0x1000));
        assert_eq!(k.resolve_name(None, "missing"), None);
    }

    #[test]
    fn index_follows_reload() {
        let (_, mut k) = resolver(vec![sym("a", 0x1000, 0)]);
        assert_eq!(k.resolve_name(None, "a"), Some(0x1000));
        k.invalidate();
        assert_eq!(k.resolve_name(None, "a"), Some(0x1000));
    }
}
