//! Error taxonomy for the acquisition path.
//!
//! Everything except [`Error::Pattern`] and [`Error::Glob`] is local to a
//! single interface's collection and ends up as that interface's
//! `present=0` record. The configuration variants are fatal before a pass
//! starts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Device-control channel unobtainable or request rejected by the
    /// driver (interface absent, no module support, permission denied).
    #[error("ethtool: {0}")]
    Io(#[from] std::io::Error),

    /// Module class is not SFF-8472 (0x2), the one supported layout.
    #[error("unsupported module type: {0:#x}")]
    UnsupportedModule(u32),

    /// The module reports a zero-length EEPROM.
    #[error("ethtool: no EEPROM to read")]
    NoEeprom,

    /// Read offset beyond the module's reported EEPROM length.
    #[error("ethtool: offset {offset:#x} out of bounds (EEPROM length {eeprom_len:#x})")]
    OffsetOutOfBounds { offset: u32, eeprom_len: u32 },

    /// The driver returned fewer bytes than the decoder needs.
    #[error("ethtool: truncated read: wanted {wanted} bytes, got {got}")]
    TruncatedRead { wanted: usize, got: usize },

    /// Unknown field name passed to [`crate::InfoFlags::from_names`].
    #[error("unknown entry '{0}'")]
    UnknownEntry(String),

    /// Invalid concurrency-partitioning pattern. Fatal at startup.
    #[error("invalid parallel pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Invalid device path pattern. Fatal at startup.
    #[error("invalid device glob: {0}")]
    Glob(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, Error>;
