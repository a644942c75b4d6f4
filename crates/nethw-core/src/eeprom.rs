//! SFF-8472 identity field registry and coalescing query planner.
//!
//! The registry is a static table of named EEPROM fields sorted by
//! offset. [`read_fields`] walks it once per request and merges fields
//! whose byte ranges sit within [`GAP_MERGE`] bytes of each other into a
//! single device read — a full identity read costs two device round
//! trips instead of seven.

use std::collections::HashMap;
use std::ops::BitOr;

use crate::error::{Error, Result};
use crate::ethtool::Module;

/// Decoded identity fields of one module, keyed by field name.
pub type TagSet = HashMap<String, String>;

/// Merge two reads when the gap between them is at most this many bytes.
pub const GAP_MERGE: u32 = 4;

/// Bitmask selecting which identity fields to read.
///
/// One bit per table entry plus two meta-bits: [`InfoFlags::ALL`]
/// selects every field, the cache bit (carried by
/// [`InfoFlags::ALLOW_CACHE`]) permits [`crate::ModuleCache`] to serve
/// the request from its serial-keyed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InfoFlags(u16);

impl InfoFlags {
    pub const VENDOR: InfoFlags = InfoFlags(1 << 0);
    pub const OUI: InfoFlags = InfoFlags(1 << 1);
    pub const PRODUCT: InfoFlags = InfoFlags(1 << 2);
    pub const REVISION: InfoFlags = InfoFlags(1 << 3);
    pub const WAVELEN: InfoFlags = InfoFlags(1 << 4);
    pub const SERIAL: InfoFlags = InfoFlags(1 << 5);
    pub const MFGDATE: InfoFlags = InfoFlags(1 << 6);

    /// Every identity field, no caching.
    pub const ALL: InfoFlags = InfoFlags(0x3fff);
    /// Meta-bit: the caller accepts a cached snapshot.
    pub const CACHE: InfoFlags = InfoFlags(0x4000);
    /// Every identity field, cache permitted.
    pub const ALLOW_CACHE: InfoFlags = InfoFlags(0x7fff);

    pub fn empty() -> Self {
        InfoFlags(0)
    }

    /// True when any bit of `other` is set in `self`.
    pub fn intersects(self, other: InfoFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn without(self, other: InfoFlags) -> Self {
        InfoFlags(self.0 & !other.0)
    }

    /// Build a flag set from field names plus the meta-names `"ALL"` and
    /// `"CACHE"`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownEntry`] naming the offending string.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut ret = InfoFlags::empty();
        for name in names {
            let name = name.as_ref();
            match name {
                "ALL" => ret = ret | Self::ALL,
                "CACHE" => ret = ret | Self::ALLOW_CACHE,
                _ => {
                    let def = FIELDS
                        .iter()
                        .find(|def| def.name == name)
                        .ok_or_else(|| Error::UnknownEntry(name.to_string()))?;
                    ret = ret | def.flag;
                }
            }
        }
        Ok(ret)
    }
}

impl BitOr for InfoFlags {
    type Output = InfoFlags;

    fn bitor(self, rhs: InfoFlags) -> InfoFlags {
        InfoFlags(self.0 | rhs.0)
    }
}

/// How a field's raw bytes become a tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeKind {
    /// Latin-1 text, right-trimmed of NUL and space padding.
    Text,
    /// Big-endian unsigned integer rendered in decimal.
    BigEndianInt,
    /// Exactly 3 bytes as a colon-separated hex triplet.
    Oui,
}

struct FieldDef {
    name: &'static str,
    offset: u32,
    length: u32,
    flag: InfoFlags,
    decode: DecodeKind,
}

/// SFF-8472 identity page layout. Must stay sorted ascending by offset;
/// the planner's span merging depends on it.
static FIELDS: [FieldDef; 7] = [
    FieldDef { name: "vendor",   offset: 0x14, length: 16, flag: InfoFlags::VENDOR,   decode: DecodeKind::Text },
    FieldDef { name: "oui",      offset: 0x25, length: 3,  flag: InfoFlags::OUI,      decode: DecodeKind::Oui },
    FieldDef { name: "product",  offset: 0x28, length: 16, flag: InfoFlags::PRODUCT,  decode: DecodeKind::Text },
    FieldDef { name: "revision", offset: 0x38, length: 4,  flag: InfoFlags::REVISION, decode: DecodeKind::Text },
    FieldDef { name: "wavelen",  offset: 0x3c, length: 2,  flag: InfoFlags::WAVELEN,  decode: DecodeKind::BigEndianInt },
    FieldDef { name: "serial",   offset: 0x44, length: 16, flag: InfoFlags::SERIAL,   decode: DecodeKind::Text },
    FieldDef { name: "mfgdate",  offset: 0x54, length: 8,  flag: InfoFlags::MFGDATE,  decode: DecodeKind::Text },
];

/// Latin-1 bytes to text, keeping everything up to the last byte that is
/// neither NUL nor space. Right-trim only: leading and embedded blanks
/// survive.
fn from_latin1(bytes: &[u8]) -> String {
    let mut last = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b != 0 && b != 0x20 {
            last = i + 1;
        }
    }
    bytes[..last].iter().map(|&b| b as char).collect()
}

/// A serial is trustworthy as a cache key iff it has more than 3
/// alphanumeric characters and nothing outside printable ASCII.
pub fn valid_serial(sn: &str) -> bool {
    let mut alnum = 0;
    for c in sn.chars() {
        if c < ' ' || c > '~' {
            return false;
        }
        if c.is_ascii_alphanumeric() {
            alnum += 1;
        }
    }
    alnum > 3
}

fn decode(buf: &[u8], kind: DecodeKind) -> String {
    match kind {
        DecodeKind::Text => from_latin1(buf),
        DecodeKind::Oui => format!("{:02x}:{:02x}:{:02x}", buf[0], buf[1], buf[2]),
        DecodeKind::BigEndianInt => {
            let acc = buf.iter().fold(0u64, |acc, &b| acc * 256 + u64::from(b));
            format!("{acc}")
        }
    }
}

/// Read and decode the selected fields, coalescing nearby byte ranges
/// into single device reads.
///
/// This is the uncached read path; [`crate::ModuleCache::module_info`]
/// wraps it with the serial-keyed snapshot lookup.
pub fn read_fields(module: &Module, flags: InfoFlags) -> Result<TagSet> {
    module.ensure_sff8472()?;

    let mut tags = TagSet::new();
    let mut pending: Vec<&FieldDef> = Vec::new();
    let mut span_start = 0u32;
    let mut span_end = 0u32;

    for def in FIELDS.iter() {
        if !flags.intersects(def.flag) {
            continue;
        }
        if !pending.is_empty() && def.offset > span_end + GAP_MERGE {
            flush_span(module, span_start, span_end, &pending, &mut tags)?;
            pending.clear();
        }
        if pending.is_empty() {
            span_start = def.offset;
        }
        pending.push(def);
        span_end = def.offset + def.length;
    }
    if !pending.is_empty() {
        flush_span(module, span_start, span_end, &pending, &mut tags)?;
    }
    Ok(tags)
}

fn flush_span(
    module: &Module,
    span_start: u32,
    span_end: u32,
    pending: &[&FieldDef],
    tags: &mut TagSet,
) -> Result<()> {
    let wanted = (span_end - span_start) as usize;
    let buf = module.read(span_start, span_end - span_start)?;
    log::debug!(
        "{}: read {:#x}..{:#x} covering {} field(s)",
        module.iface(),
        span_start,
        span_end,
        pending.len()
    );
    for def in pending {
        let pos = (def.offset - span_start) as usize;
        let field = buf
            .get(pos..pos + def.length as usize)
            .ok_or(Error::TruncatedRead {
                wanted,
                got: buf.len(),
            })?;
        tags.insert(def.name.to_string(), decode(field, def.decode));
    }
    Ok(())
}
