use indexmap::{IndexMap, IndexSet};
use tracesym_common::Arch;
use tracing::{debug, info, warn};

use super::{Probe, ProbeLocation};
use crate::host::{Host, UsdtNote};

/// Index of a probe inside its [`ProbeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(pub usize);

/// The probes found in one binary or in everything a process has mapped.
///
/// Probes are keyed by `(binary, provider, name)` and keep discovery order.
#[derive(Debug)]
pub struct ProbeRegistry {
    probes: IndexMap<(String, String, String), Probe>,
    loaded: bool,
    arch: Arch,
}

fn resolve_bin_path(bin_path: &str, host: &Host) -> Option<String> {
    host.process
        .which(bin_path)
        .or_else(|| host.process.which_so(bin_path))
}

impl ProbeRegistry {
    fn empty(arch: Arch) -> Self {
        Self {
            probes: IndexMap::new(),
            loaded: false,
            arch,
        }
    }

    /// Discovers the probes of a program or library, given by path or by
    /// bare name.
    pub fn from_binary(bin_path: &str, host: &Host) -> Self {
        let mut registry = Self::empty(host.arch);
        let Some(path) = resolve_bin_path(bin_path, host) else {
            warn!("cannot find binary {bin_path}");
            return registry;
        };
        match host.binary.usdt_notes(&path) {
            Ok(notes) => {
                for note in &notes {
                    registry.add_probe(&path, note);
                }
                registry.loaded = true;
            }
            Err(e) => warn!("cannot read probes of {path}: {e:#}"),
        }
        info!("{path}: {} probes", registry.num_probes());
        registry
    }

    /// Discovers the probes of every binary mapped executable into `pid`.
    /// Binaries without notes or that cannot be read are skipped.
    pub fn from_pid(pid: i32, host: &Host) -> Self {
        let mut registry = Self::empty(host.arch);
        if !host.process.exists(pid) {
            warn!("process {pid} does not exist");
            return registry;
        }
        let modules = match host.process.modules(pid) {
            Ok(modules) => modules,
            Err(e) => {
                warn!("cannot list modules of {pid}: {e:#}");
                return registry;
            }
        };
        registry.loaded = true;

        let paths: IndexSet<String> = modules.into_iter().map(|m| m.path).collect();
        for module in &paths {
            let path = if module.contains('/') {
                module.clone()
            } else {
                match resolve_bin_path(module, host) {
                    Some(path) => path,
                    None => continue,
                }
            };
            match host.binary.usdt_notes(&path) {
                Ok(notes) => {
                    for note in &notes {
                        registry.add_probe(&path, note);
                    }
                }
                Err(e) => debug!("skipping {path}: {e:#}"),
            }
        }
        info!("process {pid}: {} probes in {} modules", registry.num_probes(), paths.len());
        registry
    }

    /// Adds one note, grouping it with earlier notes of the same probe.
    /// Notes whose arguments do not parse are dropped.
    pub fn add_probe(&mut self, bin_path: &str, note: &UsdtNote) {
        let location = match ProbeLocation::parse(note.pc, &note.arg_fmt, self.arch) {
            Ok(location) => location,
            Err(e) => {
                warn!("{bin_path}: dropping {}:{} at {:#x}: {e}", note.provider, note.name, note.pc);
                return;
            }
        };
        let key = (bin_path.to_owned(), note.provider.clone(), note.name.clone());
        let probe = self
            .probes
            .entry(key)
            .or_insert_with(|| Probe::new(bin_path, &note.provider, &note.name, note.semaphore));
        if let Err(e) = probe.add_location(location) {
            warn!("{bin_path}: {e}");
        }
    }

    /// False only when discovery could not start; an empty registry that
    /// loaded fine just has no probes.
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn num_probes(&self) -> usize {
        self.probes.len()
    }

    pub fn probes(&self) -> impl Iterator<Item = (ProbeId, &Probe)> {
        self.probes.values().enumerate().map(|(i, p)| (ProbeId(i), p))
    }

    pub fn probe(&self, id: ProbeId) -> Option<&Probe> {
        self.probes.get_index(id.0).map(|(_, p)| p)
    }

    pub fn probe_mut(&mut self, id: ProbeId) -> Option<&mut Probe> {
        self.probes.get_index_mut(id.0).map(|(_, p)| p)
    }

    /// First probe called `name`, whatever its provider.
    pub fn find_probe(&self, name: &str) -> Option<ProbeId> {
        self.probes.values().position(|p| p.name() == name).map(ProbeId)
    }
}
