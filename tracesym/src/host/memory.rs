use std::{fs::OpenOptions, io, os::unix::io::AsRawFd};

use nix::{
    libc::off_t,
    sys::uio::{pread, pwrite},
};
use thiserror::Error;
use tracing::trace;

use super::ProcessMemory;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to open memory of process {pid}")]
    Open { pid: i32, source: io::Error },
    #[error("failed to read {pid}:{address:#x}")]
    Read { pid: i32, address: u64, source: nix::Error },
    #[error("failed to write {pid}:{address:#x}")]
    Write { pid: i32, address: u64, source: nix::Error },
    #[error("short transfer at {pid}:{address:#x} ({done} of {wanted} bytes)")]
    ShortIo { pid: i32, address: u64, done: usize, wanted: usize },
    #[error("address {0:#x} is not representable as a file offset")]
    AddressOutOfRange(u64),
}

/// Reads and writes another process's memory through `/proc/[pid]/mem`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMem;

fn offset(address: u64) -> Result<off_t, MemoryError> {
    off_t::try_from(address).map_err(|_| MemoryError::AddressOutOfRange(address))
}

impl ProcessMemory for ProcMem {
    fn read_u16(&self, pid: i32, address: u64) -> Result<u16, MemoryError> {
        let file = OpenOptions::new()
            .read(true)
            .open(format!("/proc/{pid}/mem"))
            .map_err(|source| MemoryError::Open { pid, source })?;
        let mut buf = [0u8; 2];
        let n = pread(file.as_raw_fd(), &mut buf, offset(address)?)
            .map_err(|source| MemoryError::Read { pid, address, source })?;
        if n != buf.len() {
            return Err(MemoryError::ShortIo { pid, address, done: n, wanted: buf.len() });
        }
        let value = u16::from_ne_bytes(buf);
        trace!("read {pid}:{address:#x} = {value}");
        Ok(value)
    }

    fn write_u16(&self, pid: i32, address: u64, value: u16) -> Result<(), MemoryError> {
        let file = OpenOptions::new()
            .write(true)
            .open(format!("/proc/{pid}/mem"))
            .map_err(|source| MemoryError::Open { pid, source })?;
        let buf = value.to_ne_bytes();
        let n = pwrite(file.as_raw_fd(), &buf, offset(address)?)
            .map_err(|source| MemoryError::Write { pid, address, source })?;
        if n != buf.len() {
            return Err(MemoryError::ShortIo { pid, address, done: n, wanted: buf.len() });
        }
        trace!("wrote {pid}:{address:#x} = {value}");
        Ok(())
    }
}
