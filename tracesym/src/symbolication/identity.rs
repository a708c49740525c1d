use std::{fs, os::unix::fs::MetadataExt, path::{Path, PathBuf}};

use tracing::debug;

const UNKNOWN: i64 = -1;

/// Identifies the image a process is running by the inode of its executable.
///
/// The inode changes when the process execs another binary (or the binary is
/// replaced on disk), which is when cached module and symbol state must go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    path: PathBuf,
    inode: i64,
}

impl ProcessIdentity {
    pub fn for_pid(pid: i32) -> Self {
        Self::new(PathBuf::from(format!("/proc/{pid}/exe")))
    }

    /// Captures the current inode of `path`.
    pub fn new(path: PathBuf) -> Self {
        let inode = current_inode(&path);
        Self { path, inode }
    }

    pub fn inode(&self) -> i64 {
        self.inode
    }

    /// True when the file now has a known inode that differs from the
    /// captured one. A path that can no longer be read is not stale.
    pub fn is_stale(&self) -> bool {
        let current = current_inode(&self.path);
        let stale = current != UNKNOWN && current != self.inode;
        if stale {
            debug!("{} changed: inode {} -> {}", self.path.display(), self.inode, current);
        }
        stale
    }

    /// Re-captures the identity after the caller rebuilt its state.
    pub fn reset(&mut self) {
        self.inode = current_inode(&self.path);
    }

    /// Forgets the captured inode so the next staleness check fires.
    pub fn invalidate(&mut self) {
        self.inode = UNKNOWN;
    }
}

fn current_inode(path: &Path) -> i64 {
    fs::metadata(path)
        .ok()
        .and_then(|m| i64::try_from(m.ino()).ok())
        .unwrap_or(UNKNOWN)
}
