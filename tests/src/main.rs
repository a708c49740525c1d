use std::env::args;

use anyhow::{bail, Context, Result};
use tracesym::{
    host::ProcMaps,
    symbolication::SymbolCache,
    Host, ProbeRegistry, Resolver, Target, TracesymConfig,
};
use tracing::info;

#[no_mangle]
#[inline(never)]
pub extern "C" fn tracesym_tests_marker() -> u64 {
    std::hint::black_box(0x5ca1ab1e)
}

fn self_symbols(host: &Host) -> Result<()> {
    let pid = std::process::id() as i32;
    let marker = tracesym_tests_marker as usize as u64;
    let mut cache = SymbolCache::new(Target::Process(pid), host);

    let resolved = cache
        .resolve_addr(marker)
        .context("marker did not resolve")?;
    println!("resolved: {} +{:#x}", resolved.name, resolved.offset);
    println!("module: {}", resolved.module);

    let addr = cache.resolve_name(None, "tracesym_tests_marker");
    println!("address matches: {}", addr == Some(marker));
    Ok(())
}

fn kernel_symbols(host: &Host) -> Result<()> {
    let cache = SymbolCache::new(Target::Kernel, host);
    let SymbolCache::Kernel(kernel) = &cache else {
        bail!("expected a kernel cache");
    };
    let symbols = kernel.symbols();
    info!("{} kernel symbols", symbols.len());
    println!("sorted: {}", symbols.windows(2).all(|w| w[0].start <= w[1].start));
    Ok(())
}

fn self_maps() -> Result<()> {
    let exe = std::env::current_exe()?;
    let maps = ProcMaps::from_process_id(std::process::id() as i32)?;
    let mapped = maps
        .modules()
        .iter()
        .any(|m| std::path::Path::new(&m.path) == exe);
    println!("self mapped: {mapped}");
    Ok(())
}

fn self_probes(host: &Host) -> Result<()> {
    let registry = ProbeRegistry::from_pid(std::process::id() as i32, host);
    println!("loaded: {}", registry.loaded());
    for (_, probe) in registry.probes() {
        println!("{probe} in {} ({} locations)", probe.bin_path(), probe.num_locations());
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = TracesymConfig::load_or_default()?;
    let host = Host::from_config(&config);

    let test = args().nth(1).context("no scenario given")?;
    match test.as_str() {
        "self" => self_symbols(&host),
        "kernel" => kernel_symbols(&host),
        "maps" => self_maps(),
        "usdt" => self_probes(&host),
        other => bail!("unknown scenario {other}"),
    }
}
