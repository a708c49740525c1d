use anyhow::{Context, Result};
use std::{fs::File, io::Read, path::{Path, PathBuf}};

use serde::Deserialize;
use tracesym_common::Arch;

pub const CONFIG_FILE: &str = "Tracesym.toml";

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct TracesymConfig {
    pub symbols: Symbols,
    pub usdt: Usdt,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Symbols {
    /// kernel symbol listing, `/proc/kallsyms` format
    pub kallsyms: PathBuf,
    /// searched, in order, before the system library directories when a
    /// bare library name has to be turned into a path
    pub library_paths: Vec<PathBuf>,
}

impl Default for Symbols {
    fn default() -> Self {
        Self {
            kallsyms: PathBuf::from("/proc/kallsyms"),
            library_paths: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Usdt {
    /// argument syntax of the probes that will be discovered
    pub arch: Arch,
}

impl TracesymConfig {
    pub fn new() -> Result<Self> {
        Self::from_path(CONFIG_FILE)
    }

    /// Reads `Tracesym.toml` from the current directory, falling back to the
    /// defaults when there is none.
    pub fn load_or_default() -> Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            Self::new()
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config_file = File::open(path).with_context(|| format!("{} not found", path.display()))?;
        let mut contents = String::new();
        config_file
            .read_to_string(&mut contents)
            .with_context(|| format!("something went wrong reading {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: TracesymConfig = toml::from_str(contents).context("invalid configuration")?;
        Ok(config)
    }
}
