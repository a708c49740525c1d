pub mod config;
pub mod host;
pub mod symbolication;
pub mod usdt;

pub use config::TracesymConfig;
pub use host::Host;
pub use symbolication::{ResolvedSymbol, Resolver, SymbolCache, Target};
pub use tracesym_common::Arch;
pub use usdt::{ProbeId, ProbeRegistry};
