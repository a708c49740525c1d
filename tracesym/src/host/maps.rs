use std::{io::{BufReader, BufRead}, fs::File};
use thiserror::Error;
use std::io;

use super::ModuleMapping;

/// Parsed line for /proc/[pid]/maps
#[derive(Debug, Clone)]
pub struct ProcMapsEntry {
    /// avma address
    pub address_range: (u64, u64),
    /// is executable
    pub is_exec: bool,
    /// offset into the file
    pub offset: u64,
    pub inode: u64,
    /// path of the object file
    pub object_path: String,
}

impl ProcMapsEntry {
    /// Mapped from a file on disk, as opposed to anonymous memory or one of the
    /// kernel's pseudo entries (`[vdso]`, `[stack]`, ...).
    pub fn is_file_backed(&self) -> bool {
        self.object_path.starts_with('/')
    }
}

/// Holds the memory map of a process, which can be obtained by reading `/proc/[pid]/maps`.
///
/// Example of a `/proc/[pid]/maps` entry:
/// 563b0178b000-563b01807000 r--p 00000000 00:40 3659174697971092           /usr/bin/server
/// 563b01807000-563b01c4b000 r-xp 0007c000 00:40 3659174697971092           /usr/bin/server
/// 563b01c4b000-563b01d85000 r--p 004c0000 00:40 3659174697971092           /usr/bin/server
/// 7f38911ff000-7f38913ff000 rw-p 00000000 00:00 0
/// 7f3892fbc000-7f3892fbd000 r--p 00000000 08:20 42625                      /usr/lib/x86_64-linux-gnu/ld-2.31.so
/// 7f3892fbd000-7f3892fe0000 r-xp 00001000 08:20 42625                      /usr/lib/x86_64-linux-gnu/ld-2.31.so
pub struct ProcMaps {
    pub entries: Vec<ProcMapsEntry>,
}

impl ProcMaps {
    /// Loads the memory map for a given process from procfs
    pub fn from_process_id(pid: i32) -> Result<Self, ProcMapsError> {
        let reader = BufReader::new(File::open(format!("/proc/{}/maps", pid)).map_err(|e| {
            ProcMapsError::OpenError {
                process_id: pid,
                source: e,
            }
        })?);
        parse_maps(reader)
    }

    pub fn parse(reader: impl BufRead) -> Result<Self, ProcMapsError> {
        parse_maps(reader)
    }

    /// Executable file-backed mappings, each with the load base of its image.
    ///
    /// The base is where the image's offset-0 mapping starts. When that mapping
    /// is missing the base is derived from the executable mapping's own offset.
    pub fn modules(&self) -> Vec<ModuleMapping> {
        self.entries
            .iter()
            .filter(|e| e.is_exec && e.is_file_backed())
            .map(|e| {
                let base = self
                    .entries
                    .iter()
                    .filter(|o| o.object_path == e.object_path && o.inode == e.inode && o.offset == 0)
                    .map(|o| o.address_range.0)
                    .min()
                    .unwrap_or_else(|| e.address_range.0.saturating_sub(e.offset));
                ModuleMapping {
                    path: e.object_path.clone(),
                    start: e.address_range.0,
                    end: e.address_range.1,
                    base,
                }
            })
            .collect()
    }
}

/// Error type for interaction with process memory maps
#[derive(Debug, Error)]
pub enum ProcMapsError {
    /// Failed to open the maps file of the process
    #[error("Failed to open memory map for process {process_id}")]
    OpenError {
        /// Process ID
        process_id: i32,
        /// The original io::Error
        source: io::Error,
    },
    /// Failed to read a full line in the process memory map
    #[error("Can not parse line")]
    ReadLineError {
        /// The original io::Error
        source: std::io::Error,
    },
    /// Failed to parse address information in the process memory map
    #[error("Can not parse address: Line: {line}")]
    InvalidAddress {
        /// The line which could not be parsed
        line: String,
    },
    /// Failed to parse permissions in the process memory map
    #[error("Can not parse permissions: Line: {line}")]
    InvalidPermissions {
        /// The line which could not be parsed
        line: String,
    },
    /// Failed to parse an offset in the process memory map
    #[error("Can not parse offset: Line: {line}")]
    InvalidOffset {
        /// The line which could not be parsed
        line: String,
    },
    /// Failed to parse device data in the process memory map
    #[error("Can not parse device: Line: {line}")]
    InvalidDevice {
        /// The line which could not be parsed
        line: String,
    },
    /// Failed to parse inode data in the process memory map
    #[error("Can not parse inode: Line: {line}")]
    InvalidInode {
        /// The line which could not be parsed
        line: String,
    },
}

fn parse_maps(reader: impl BufRead) -> Result<ProcMaps, ProcMapsError> {
    // See https://man7.org/linux/man-pages/man5/proc.5.html for details
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(|e| ProcMapsError::ReadLineError { source: e })?;
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.splitn(6, ' ');
        let address = parts
            .next()
            .ok_or_else(|| ProcMapsError::InvalidAddress { line: line.clone() })?;
        let mut address_parts = address.split('-');
        let start_address = address_parts
            .next()
            .and_then(|o| u64::from_str_radix(o, 16).ok())
            .ok_or_else(|| ProcMapsError::InvalidAddress { line: line.clone() })?;
        let end_address = address_parts
            .next()
            .and_then(|o| u64::from_str_radix(o, 16).ok())
            .ok_or_else(|| ProcMapsError::InvalidAddress { line: line.clone() })?;
        let perms = parts
            .next()
            .ok_or_else(|| ProcMapsError::InvalidPermissions { line: line.clone() })?;
        let offset = parts
            .next()
            .and_then(|o| u64::from_str_radix(o, 16).ok())
            .ok_or_else(|| ProcMapsError::InvalidOffset { line: line.clone() })?;
        let _dev = parts
            .next()
            .ok_or_else(|| ProcMapsError::InvalidDevice { line: line.clone() })?;
        let inode = parts
            .next()
            .and_then(|i| i.parse::<u64>().ok())
            .ok_or_else(|| ProcMapsError::InvalidInode { line: line.clone() })?;
        // Newlines in the path are escaped by the kernel as octal sequences and kept as-is here.
        let object_path = parts.next().unwrap_or("").trim().to_string();
        let is_exec = perms.contains('x');

        entries.push(ProcMapsEntry {
            address_range: (start_address, end_address),
            is_exec,
            offset,
            inode,
            object_path,
        });
    }

    Ok(ProcMaps { entries })
}
