use std::fmt::Write;

use thiserror::Error;
use tracesym_common::Arch;

use crate::host::Host;
use crate::symbolication::{find_symbol_addr, ProcessResolver, Resolver};

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("global `{ident}` not found in {binary}")]
    GlobalNotFound { ident: String, binary: String },
    #[error("global `{ident}` lives in shared object {binary}; a pid is needed to place it")]
    NeedsPid { ident: String, binary: String },
    #[error("argument has neither a value nor a location")]
    Incomplete,
    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),
}

/// Where one probe argument lives when the probe fires.
///
/// A constant if there is neither a register nor a dereference; a register
/// read if there is a register and no dereference; otherwise a memory load
/// from `register + deref_offset (+ address of deref_ident)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Argument {
    /// byte width, negative for signed values
    pub arg_size: Option<i32>,
    pub constant: Option<i64>,
    pub deref_offset: Option<i64>,
    pub deref_ident: Option<String>,
    /// `struct pt_regs` field
    pub register_name: Option<String>,
    pub(crate) register_size: Option<i32>,
}

impl Argument {
    /// Byte width of the value; the parser fills in the pointer width of its
    /// architecture when the descriptor gives none.
    pub fn arg_size(&self) -> i32 {
        self.arg_size.unwrap_or_else(|| Arch::native().pointer_size())
    }

    pub fn is_deref(&self) -> bool {
        self.deref_offset.is_some() || self.deref_ident.is_some()
    }

    /// Registers read directly take their width from the register name,
    /// unless the descriptor gave an explicit size.
    pub(crate) fn apply_register_size(&mut self) {
        if self.arg_size.is_none() {
            self.arg_size = self.register_size;
        }
    }

    pub fn ctype(&self) -> &'static str {
        let size = self.arg_size();
        let bits = match size.unsigned_abs() {
            0..=1 => 8,
            2 => 16,
            3..=4 => 32,
            _ => 64,
        };
        match (size < 0, bits) {
            (true, 8) => "int8_t",
            (true, 16) => "int16_t",
            (true, 32) => "int32_t",
            (true, _) => "int64_t",
            (false, 8) => "uint8_t",
            (false, 16) => "uint16_t",
            (false, 32) => "uint32_t",
            (false, _) => "uint64_t",
        }
    }

    /// Resolves `deref_ident` inside `bin_path`. With a pid the address is
    /// taken from that process's mapping of the binary; without one only
    /// binaries loaded at fixed addresses can be placed.
    pub fn global_address(&self, bin_path: &str, pid: Option<i32>, host: &Host) -> Result<u64, EmitError> {
        let ident = self.deref_ident.as_deref().ok_or(EmitError::Incomplete)?;
        let not_found = || EmitError::GlobalNotFound {
            ident: ident.to_owned(),
            binary: bin_path.to_owned(),
        };
        match pid {
            Some(pid) => ProcessResolver::new(pid, host)
                .resolve_name(Some(bin_path), ident)
                .ok_or_else(not_found),
            None => {
                if host.binary.is_shared_object(bin_path).unwrap_or(false) {
                    return Err(EmitError::NeedsPid {
                        ident: ident.to_owned(),
                        binary: bin_path.to_owned(),
                    });
                }
                find_symbol_addr(host, bin_path, ident).ok_or_else(not_found)
            }
        }
    }

    /// Writes C that stores this argument into `local`.
    pub fn assign_to_local<W: Write>(
        &self,
        out: &mut W,
        local: &str,
        bin_path: &str,
        pid: Option<i32>,
        host: &Host,
    ) -> Result<(), EmitError> {
        if !self.is_deref() {
            return match (&self.register_name, self.constant) {
                (Some(reg), _) => Ok(writeln!(out, "{local} = ({})ctx->{reg};", self.ctype())?),
                (None, Some(c)) => Ok(writeln!(out, "{local} = {c};")?),
                (None, None) => Err(EmitError::Incomplete),
            };
        }

        let mut terms = Vec::new();
        let global = match self.deref_ident {
            Some(_) => Some(self.global_address(bin_path, pid, host)?),
            None => None,
        };
        if let Some(reg) = &self.register_name {
            // pc-relative globals were already turned into absolute addresses
            if global.is_none() || reg != host.arch.program_counter() {
                terms.push(format!("ctx->{reg}"));
            }
        }
        if let Some(addr) = global {
            terms.push(format!("{addr:#x}ull"));
        }
        match self.deref_offset {
            Some(off) if off != 0 || terms.is_empty() => terms.push(format!("({off})")),
            None if terms.is_empty() => terms.push("0".to_owned()),
            _ => {}
        }

        let ctype = self.ctype();
        writeln!(
            out,
            "{{ u64 __addr = {}; {ctype} __res = 0x0; \
             bpf_probe_read_user(&__res, sizeof(__res), (void *)__addr); \
             {local} = __res; }}",
            terms.join(" + ")
        )?;
        Ok(())
    }
}
