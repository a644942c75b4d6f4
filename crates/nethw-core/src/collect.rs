//! Multi-interface collection orchestrator.
//!
//! Interfaces are partitioned by the capture groups of a configurable
//! pattern: names with identical captures share a partition and are
//! collected serially (modules on the same controller dislike
//! concurrent EEPROM access); distinct partitions run on their own
//! threads with a join barrier at the end of the pass.
//!
//! A failure on one interface becomes that interface's record error and
//! nothing more — siblings and other partitions are unaffected, and
//! every interface yields exactly one record per pass.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::cache::ModuleCache;
use crate::diag::TransceiverDiagnostics;
use crate::eeprom::{InfoFlags, TagSet};
use crate::error::{Error, Result};
use crate::ethtool::{Module, ModuleTransport};

/// Partition key for interfaces the pattern does not match at all.
/// Starts with a byte that cannot occur in an interface name, so it can
/// never collide with a capture-derived key.
const NO_MATCH_KEY: &str = "\u{1}!nil!";

/// Separator between capture groups in a partition key; likewise absent
/// from interface names.
const CAPTURE_SEP: &str = "\u{2}";

/// The unit handed to emission sinks: one interface's outcome.
///
/// When `error` is set, `diag` is `None` and sinks emit a
/// "not present" sample instead of fabricated values. `tags` may still
/// hold identity fields when only the diagnostic read failed.
pub struct CollectionRecord {
    pub iface: String,
    pub error: Option<Error>,
    pub tags: TagSet,
    pub diag: Option<TransceiverDiagnostics>,
}

/// Consumer of the per-interface record stream.
///
/// Implementations are shared across partition threads, so emission
/// must be safe under concurrency; cross-partition record order is
/// unspecified.
pub trait RecordSink: Sync {
    fn emit(&self, record: CollectionRecord);
}

/// Drives one collection pass: partition, fan out, read, emit.
pub struct Collector {
    transport: Arc<dyn ModuleTransport>,
    cache: ModuleCache,
    flags: InfoFlags,
    parallel: Regex,
}

impl Collector {
    /// Build a collector with the given transport and concurrency
    /// pattern (e.g. `"^(.*)$"` for full parallelism, `"^(.*[^0-9])"`
    /// to serialize interfaces that differ only in a trailing digit).
    ///
    /// # Errors
    ///
    /// [`Error::Pattern`] when the pattern does not compile.
    pub fn new(transport: Arc<dyn ModuleTransport>, parallel_pattern: &str) -> Result<Self> {
        // CACHE alone already selects every field; naming them spells
        // out what the emitters expect to get back.
        let flags = InfoFlags::from_names(&[
            "CACHE", "vendor", "revision", "product", "serial", "wavelen", "mfgdate",
        ])?;
        Ok(Self {
            transport,
            cache: ModuleCache::new(),
            flags,
            parallel: Regex::new(parallel_pattern)?,
        })
    }

    /// Group interfaces by the capture tuple of the parallel pattern.
    fn partition<'a>(&self, ifaces: &'a [String]) -> HashMap<String, Vec<&'a str>> {
        let mut partitions: HashMap<String, Vec<&'a str>> = HashMap::new();
        for iface in ifaces {
            let key = match self.parallel.captures(iface) {
                None => NO_MATCH_KEY.to_string(),
                Some(caps) => caps
                    .iter()
                    .skip(1)
                    .map(|m| m.map_or("", |m| m.as_str()))
                    .collect::<Vec<_>>()
                    .join(CAPTURE_SEP),
            };
            partitions.entry(key).or_default().push(iface);
        }
        partitions
    }

    /// Run one pass over `ifaces`, emitting one record per interface.
    ///
    /// With fewer than two partitions everything runs on the calling
    /// thread; otherwise each partition gets its own thread and the
    /// scope's join barrier holds the pass open until the slowest
    /// partition finishes.
    pub fn collect(&self, ifaces: &[String], sink: &dyn RecordSink) {
        let partitions = self.partition(ifaces);
        if partitions.len() < 2 {
            let all: Vec<&str> = ifaces.iter().map(String::as_str).collect();
            self.collect_serially(&all, sink);
            return;
        }
        std::thread::scope(|s| {
            for (key, group) in &partitions {
                s.spawn(move || {
                    log::debug!("collecting partition {key:?}: {group:?}");
                    self.collect_serially(group, sink);
                });
            }
        });
    }

    fn collect_serially(&self, ifaces: &[&str], sink: &dyn RecordSink) {
        for iface in ifaces {
            sink.emit(self.collect_one(iface));
        }
    }

    /// module-open → identity-read → diagnostic-read, stopping at the
    /// first failure. Identity tags survive a diagnostics failure.
    fn collect_one(&self, iface: &str) -> CollectionRecord {
        let module = match Module::open(self.transport.clone(), iface) {
            Ok(module) => module,
            Err(e) => {
                return CollectionRecord {
                    iface: iface.to_string(),
                    error: Some(e),
                    tags: TagSet::new(),
                    diag: None,
                };
            }
        };
        let tags = match self.cache.module_info(&module, self.flags) {
            Ok(tags) => tags,
            Err(e) => {
                return CollectionRecord {
                    iface: iface.to_string(),
                    error: Some(e),
                    tags: TagSet::new(),
                    diag: None,
                };
            }
        };
        match module.diagnostics() {
            Ok(diag) => CollectionRecord {
                iface: iface.to_string(),
                error: None,
                tags,
                diag: Some(diag),
            },
            Err(e) => CollectionRecord {
                iface: iface.to_string(),
                error: Some(e),
                tags,
                diag: None,
            },
        }
    }
}
