use std::{
    env, fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use tracing::debug;

const SYSTEM_LIB_DIRS: &[&str] = &[
    "/lib64",
    "/usr/lib64",
    "/lib",
    "/usr/lib",
    "/lib/x86_64-linux-gnu",
    "/usr/lib/x86_64-linux-gnu",
    "/lib/aarch64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
    "/usr/local/lib",
];

/// Turns program and library names into paths.
#[derive(Debug, Clone, Default)]
pub struct LibrarySearch {
    lib_dirs: Vec<PathBuf>,
}

impl LibrarySearch {
    /// Configured directories come first, then `LD_LIBRARY_PATH`, then the
    /// usual system directories.
    pub fn new(configured: &[PathBuf]) -> Self {
        let mut lib_dirs: Vec<PathBuf> = configured.to_vec();
        if let Some(ld) = env::var_os("LD_LIBRARY_PATH") {
            lib_dirs.extend(env::split_paths(&ld).filter(|p| !p.as_os_str().is_empty()));
        }
        lib_dirs.extend(SYSTEM_LIB_DIRS.iter().map(PathBuf::from));
        Self { lib_dirs }
    }

    pub fn with_dirs(lib_dirs: Vec<PathBuf>) -> Self {
        Self { lib_dirs }
    }

    /// Names containing a `/` are taken as paths, anything else is looked up
    /// in `PATH`.
    pub fn which(&self, name: &str) -> Option<String> {
        if name.contains('/') {
            return Path::new(name).is_file().then(|| name.to_owned());
        }
        let path = env::var_os("PATH")?;
        env::split_paths(&path)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
            .map(|p| p.to_string_lossy().into_owned())
    }

    /// Accepts `c`, `libc.so` or `libc.so.6`. The first directory with a match
    /// wins; inside a directory the lexically smallest versioned name is taken.
    pub fn which_so(&self, name: &str) -> Option<String> {
        if name.contains('/') {
            return Path::new(name).is_file().then(|| name.to_owned());
        }
        let stem = if name.starts_with("lib") {
            name.to_owned()
        } else {
            format!("lib{name}")
        };
        let bare = if stem.contains(".so") {
            stem.clone()
        } else {
            format!("{stem}.so")
        };
        let versioned = format!("{bare}.");

        for dir in &self.lib_dirs {
            let exact = dir.join(&bare);
            if exact.is_file() {
                return Some(exact.to_string_lossy().into_owned());
            }
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            let mut hits: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with(&versioned))
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            hits.sort();
            if let Some(hit) = hits.into_iter().next() {
                return Some(hit.to_string_lossy().into_owned());
            }
        }
        debug!("no library found for {name}");
        None
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
