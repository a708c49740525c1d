use anyhow::{Context, Result};
use procfs::process::Process;

use super::{libpath::LibrarySearch, maps::ProcMaps, ModuleMapping, ProcessInspector};

/// Process information read from procfs.
#[derive(Debug, Clone)]
pub struct ProcFs {
    search: LibrarySearch,
}

impl ProcFs {
    pub fn new(search: LibrarySearch) -> Self {
        Self { search }
    }
}

impl ProcessInspector for ProcFs {
    fn exists(&self, pid: i32) -> bool {
        pid > 0 && Process::new(pid).is_ok()
    }

    fn modules(&self, pid: i32) -> Result<Vec<ModuleMapping>> {
        let maps = ProcMaps::from_process_id(pid)
            .with_context(|| format!("reading modules of {pid}"))?;
        Ok(maps.modules())
    }

    fn which(&self, name: &str) -> Option<String> {
        self.search.which(name)
    }

    fn which_so(&self, name: &str) -> Option<String> {
        self.search.which_so(name)
    }
}
