//! # nethw-core
//!
//! **Per-interface optical-link health without shelling out to `ethtool`.**
//!
//! `nethw-core` reads SFF-8472 transceiver EEPROMs directly over the
//! `SIOCETHTOOL` device-control channel and turns them into telemetry:
//! identity tags (vendor, product, serial, ...) and live diagnostics
//! (temperature, voltage, laser bias, optical power). A full EEPROM dump
//! costs ~0.1s per transceiver, so the engine works hard to avoid reads:
//!
//! - nearby EEPROM fields are coalesced into single device reads
//!   ([`eeprom`]),
//! - identity tags are cached for the process lifetime, keyed by the
//!   module's own serial number ([`cache`]) — a repeat scrape of the same
//!   module costs one serial read instead of a full identity read,
//! - interfaces are partitioned by a configurable pattern and the
//!   partitions collected in parallel ([`collect`]).
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use nethw_core::{Collector, InfluxSink, IoctlTransport};
//!
//! let collector = Collector::new(Arc::new(IoctlTransport::new()), "^(.*)$").unwrap();
//! let ifaces = nethw_core::discover_interfaces(&["/sys/class/net/*".into()]).unwrap();
//! let sink = InfluxSink::new(1_700_000_000_000_000_000);
//! collector.collect(&ifaces, &sink);
//! for line in sink.into_lines() {
//!     println!("{line}");
//! }
//! ```
//!
//! ## Architecture
//!
//! Interfaces → [`Collector`] → [`ModuleTransport`] + field registry +
//! serial cache → [`CollectionRecord`] per interface → [`RecordSink`]
//! (Prometheus samples or influx line protocol).
//!
//! Every failure is local to one interface: a missing module, an
//! unsupported class or a rejected ioctl becomes that interface's
//! `present=0` record, never an aborted pass.

pub mod cache;
pub mod collect;
pub mod diag;
pub mod discover;
pub mod eeprom;
pub mod emit;
pub mod error;
pub mod ethtool;
pub mod mock;

pub use cache::ModuleCache;
pub use collect::{CollectionRecord, Collector, RecordSink};
pub use diag::TransceiverDiagnostics;
pub use discover::discover_interfaces;
pub use eeprom::{InfoFlags, TagSet, valid_serial};
pub use emit::{FULL_LABELS, InfluxSink, MetricSink, NAMESPACE};
pub use error::{Error, Result};
pub use ethtool::{Module, ModuleTransport};
#[cfg(target_os = "linux")]
pub use ethtool::IoctlTransport;
pub use mock::MockTransport;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
