use std::fmt::Write;

use fxhash::FxHashMap;
use once_cell::unsync::OnceCell;
use tracesym_common::Arch;
use tracing::{debug, info};

use super::{parser::parse_all, Argument, ArgumentFailure, ParseError, UsdtError};
use crate::host::Host;
use crate::symbolication::{process::is_same_binary, ProcessIdentity};

/// One site where a probe was compiled in. Inlining produces several per probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeLocation {
    pub address: u64,
    pub arguments: Vec<Argument>,
}

impl ProbeLocation {
    pub fn parse(address: u64, arg_fmt: &str, arch: Arch) -> Result<Self, ParseError> {
        Ok(Self {
            address,
            arguments: parse_all(arch, arg_fmt)?,
        })
    }
}

#[derive(Debug)]
struct SemaphoreState {
    address: u64,
    refcount: usize,
    identity: ProcessIdentity,
}

/// All sites of one `provider:name` probe inside one binary.
#[derive(Debug)]
pub struct Probe {
    bin_path: String,
    provider: String,
    name: String,
    semaphore: u64,
    locations: Vec<ProbeLocation>,
    in_shared_object: OnceCell<bool>,
    enabled: FxHashMap<i32, SemaphoreState>,
}

impl Probe {
    pub fn new(bin_path: &str, provider: &str, name: &str, semaphore: u64) -> Self {
        Self {
            bin_path: bin_path.to_owned(),
            provider: provider.to_owned(),
            name: name.to_owned(),
            semaphore,
            locations: Vec::new(),
            in_shared_object: OnceCell::new(),
            enabled: FxHashMap::default(),
        }
    }

    pub fn bin_path(&self) -> &str {
        &self.bin_path
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semaphore(&self) -> u64 {
        self.semaphore
    }

    pub fn locations(&self) -> &[ProbeLocation] {
        &self.locations
    }

    pub fn num_locations(&self) -> usize {
        self.locations.len()
    }

    /// Argument count shared by every location; the first one sets it.
    pub fn num_arguments(&self) -> usize {
        self.locations.first().map_or(0, |l| l.arguments.len())
    }

    pub fn need_enable(&self) -> bool {
        self.semaphore != 0
    }

    pub fn in_shared_object(&self, host: &Host) -> bool {
        *self
            .in_shared_object
            .get_or_init(|| host.binary.is_shared_object(&self.bin_path).unwrap_or(false))
    }

    /// Number of outstanding `enable` calls for `pid`.
    pub fn enabled_count(&self, pid: i32) -> usize {
        self.enabled.get(&pid).map_or(0, |s| s.refcount)
    }

    pub fn add_location(&mut self, location: ProbeLocation) -> Result<(), UsdtError> {
        if let Some(first) = self.locations.first() {
            if first.arguments.len() != location.arguments.len() {
                return Err(UsdtError::ArgumentCountMismatch {
                    address: location.address,
                    expected: first.arguments.len(),
                    found: location.arguments.len(),
                });
            }
        }
        self.locations.push(location);
        Ok(())
    }

    /// One `{prefix}_thunk_N` per location, each forwarding its location index.
    pub fn usdt_thunks<W: Write>(&self, out: &mut W, prefix: &str) -> std::fmt::Result {
        for i in 0..self.locations.len() {
            writeln!(
                out,
                "int {prefix}_thunk_{i}(struct pt_regs *ctx) {{ return {prefix}(ctx, {i}); }}"
            )?;
        }
        Ok(())
    }

    /// Declares `arg1..argN` with the widest type any location uses, then
    /// fills them in one `__loc_id` branch per location.
    ///
    /// An argument that cannot be emitted is left at 0 and the rest of the
    /// output is still written; the failures are returned afterwards.
    pub fn usdt_cases<W: Write>(&self, out: &mut W, pid: Option<i32>, host: &Host) -> Result<(), UsdtError> {
        for n in 0..self.num_arguments() {
            // first of the widest wins
            let widest = self
                .locations
                .iter()
                .map(|l| &l.arguments[n])
                .fold(None, |best: Option<&Argument>, a| match best {
                    Some(b) if b.arg_size().unsigned_abs() >= a.arg_size().unsigned_abs() => Some(b),
                    _ => Some(a),
                })
                .map(Argument::ctype)
                .unwrap_or("uint64_t");
            writeln!(out, "{widest} arg{} = 0;", n + 1)?;
        }

        let mut failures = Vec::new();
        for (i, location) in self.locations.iter().enumerate() {
            writeln!(out, "if (__loc_id == {i}) {{")?;
            for (n, arg) in location.arguments.iter().enumerate() {
                let local = format!("arg{}", n + 1);
                if let Err(error) = arg.assign_to_local(out, &local, &self.bin_path, pid, host) {
                    failures.push(ArgumentFailure {
                        location: i,
                        argument: n + 1,
                        error,
                    });
                }
            }
            writeln!(out, "}}")?;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(UsdtError::Emission {
                probe: self.to_string(),
                failures,
            })
        }
    }

    fn semaphore_address(&self, pid: i32, host: &Host) -> Result<u64, UsdtError> {
        if !self.in_shared_object(host) {
            return Ok(self.semaphore);
        }
        let modules = host.process.modules(pid).map_err(|e| UsdtError::Modules {
            pid,
            reason: format!("{e:#}"),
        })?;
        modules
            .iter()
            .find(|m| is_same_binary(&m.path, &self.bin_path))
            .map(|m| m.base.wrapping_add(self.semaphore))
            .ok_or_else(|| UsdtError::ModuleNotMapped {
                pid,
                binary: self.bin_path.clone(),
            })
    }

    fn prune_stale(&mut self, pid: i32) -> bool {
        let stale = self.enabled.get(&pid).map_or(false, |s| s.identity.is_stale());
        if stale {
            debug!("{self}: process {pid} changed image, dropping semaphore state");
            self.enabled.remove(&pid);
        }
        stale
    }

    /// Increments the probe's semaphore in `pid`, returning the new value.
    pub fn enable(&mut self, pid: i32, host: &Host) -> Result<u16, UsdtError> {
        if !self.need_enable() {
            return Err(UsdtError::NoSemaphore { probe: self.to_string() });
        }
        self.prune_stale(pid);

        let address = match self.enabled.get(&pid) {
            Some(state) => state.address,
            None => self.semaphore_address(pid, host)?,
        };
        let current = host.memory.read_u16(pid, address)?;
        let value = current.checked_add(1).ok_or_else(|| UsdtError::SemaphoreOverflow {
            probe: self.to_string(),
            pid,
        })?;
        host.memory.write_u16(pid, address, value)?;

        self.enabled
            .entry(pid)
            .or_insert_with(|| SemaphoreState {
                address,
                refcount: 0,
                identity: ProcessIdentity::new(host.process.exe_path(pid)),
            })
            .refcount += 1;
        info!("{self}: semaphore in {pid} at {address:#x} now {value}");
        Ok(value)
    }

    /// Decrements the semaphore in `pid`, returning the new value. A counter
    /// already at 0 is left alone and reported as an error.
    pub fn disable(&mut self, pid: i32, host: &Host) -> Result<u16, UsdtError> {
        if self.prune_stale(pid) {
            return Err(UsdtError::ProcessChanged {
                probe: self.to_string(),
                pid,
            });
        }
        let address = match self.enabled.get(&pid) {
            Some(state) => state.address,
            None => {
                return Err(UsdtError::NotEnabled {
                    probe: self.to_string(),
                    pid,
                })
            }
        };

        let current = host.memory.read_u16(pid, address)?;
        let result = match current.checked_sub(1) {
            Some(value) => {
                host.memory.write_u16(pid, address, value)?;
                info!("{self}: semaphore in {pid} at {address:#x} now {value}");
                Ok(value)
            }
            None => Err(UsdtError::SemaphoreUnderflow {
                probe: self.to_string(),
                pid,
            }),
        };

        if let Some(state) = self.enabled.get_mut(&pid) {
            state.refcount -= 1;
            if state.refcount == 0 {
                self.enabled.remove(&pid);
            }
        }
        result
    }
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.name)
    }
}
