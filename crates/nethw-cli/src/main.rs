//! nethw-exporter — transceiver diagnostics over ethtool.
//!
//! Serves `/metrics` and `/influx` by default; the `--test*` flags run a
//! single collection pass and print it instead, `--probe` dumps one
//! interface for bring-up debugging.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;

use nethw_core::{Collector, InfoFlags, IoctlTransport, Module, discover_interfaces, eeprom};
use nethw_server::{AppState, run_server, scrape_influx, scrape_prometheus};

const DEFAULT_DEVICES: &str = "/sys/bus/pci/drivers/ixgbe/*:*/net/*";

#[derive(Parser)]
#[command(name = "nethw-exporter")]
#[command(about = "Optical transceiver telemetry over SIOCETHTOOL")]
#[command(version = nethw_core::VERSION)]
struct Cli {
    /// Shell glob that enumerates network devices to scrape; the last
    /// path component must resolve to the interface name. Repeatable.
    #[arg(long = "devices", value_name = "GLOB")]
    devices: Vec<String>,

    /// Regular expression matched against interface names. Interfaces
    /// that differ in capture groups are collected in parallel:
    /// "^(.*)$" is fully parallel, "^(.*[^0-9])" collects enp1s2f0 and
    /// enp1s2f1 in series but parallel to the enp1s3f* series.
    #[arg(long, default_value = "^(.*)$", value_name = "REGEX")]
    parallel: String,

    /// The address to listen on for HTTP requests.
    #[arg(long = "web.listen-address", default_value = "127.0.0.1:9992")]
    listen_address: String,

    /// One-shot run: gather metrics and print them in Prometheus text
    /// format.
    #[arg(long)]
    test: bool,

    /// One-shot run: gather metrics and print them in influx line
    /// format.
    #[arg(long = "test-influx")]
    test_influx: bool,

    /// One-shot dump of a single interface's identity fields and
    /// diagnostics.
    #[arg(long, value_name = "IFACE")]
    probe: Option<String>,

    /// Verbose logging (device globbing, partition assignment, cache
    /// hits).
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let transport = Arc::new(IoctlTransport::new());
    let collector = Collector::new(transport.clone(), &cli.parallel)
        .context("invalid --parallel pattern")?;

    if let Some(iface) = &cli.probe {
        return probe(transport, iface);
    }

    let devices = if cli.devices.is_empty() {
        vec![DEFAULT_DEVICES.to_string()]
    } else {
        cli.devices.clone()
    };

    // Fail a broken --devices config at startup, not on the first scrape.
    let ifaces = discover_interfaces(&devices).context("device discovery failed")?;

    if cli.test_influx {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as i64);
        print!("{}", scrape_influx(&collector, &ifaces, now));
        return Ok(());
    }
    if cli.test || cli.debug {
        print!("{}", scrape_prometheus(&collector, &ifaces)?);
        return Ok(());
    }

    let state = Arc::new(AppState {
        collector,
        device_globs: devices,
    });
    tokio::runtime::Runtime::new()
        .context("starting tokio runtime")?
        .block_on(run_server(state, &cli.listen_address))
}

/// Bring-up helper: open one module and print everything we know about
/// it, bypassing the cache.
fn probe(transport: Arc<IoctlTransport>, iface: &str) -> anyhow::Result<()> {
    let module = Module::open(transport, iface)
        .with_context(|| format!("opening module on {iface}"))?;
    println!(
        "{iface}: module class {:#x}, EEPROM {} bytes",
        module.kind(),
        module.eeprom_len()
    );

    let tags = eeprom::read_fields(&module, InfoFlags::ALL)?;
    let mut names: Vec<&String> = tags.keys().collect();
    names.sort();
    for name in names {
        println!("  {name:<9} '{}'", tags[name]);
    }

    let d = module.diagnostics()?;
    println!("  temperature {:.2} C", d.temperature_c);
    println!("  voltage     {:.3} V", d.voltage_v);
    println!("  bias        {:.3} mA", d.bias_ma);
    println!("  tx power    {:.4} mW ({:.2} dBm)", d.transmit_mw, d.transmit_dbm);
    println!("  rx power    {:.4} mW ({:.2} dBm)", d.receive_mw, d.receive_dbm);
    Ok(())
}
