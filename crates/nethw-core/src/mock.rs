//! In-memory transport double for tests.
//!
//! Serves one module image to every interface name and counts EEPROM
//! reads, so tests can assert how many device round trips an operation
//! cost.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::ethtool::{ETH_MODULE_SFF_8472, ModuleTransport};

pub struct MockTransport {
    kind: u32,
    image: Vec<u8>,
    reads: AtomicUsize,
}

impl MockTransport {
    /// An SFF-8472 module backed by `image`.
    pub fn sff8472(image: Vec<u8>) -> Self {
        Self::with_kind(ETH_MODULE_SFF_8472, image)
    }

    /// A module of an arbitrary class code, e.g. to provoke the
    /// unsupported-module path.
    pub fn with_kind(kind: u32, image: Vec<u8>) -> Self {
        Self {
            kind,
            image,
            reads: AtomicUsize::new(0),
        }
    }

    /// Number of EEPROM reads issued so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ModuleTransport for MockTransport {
    fn module_info(&self, _iface: &str) -> Result<(u32, u32)> {
        Ok((self.kind, self.image.len() as u32))
    }

    fn read_eeprom(&self, _iface: &str, offset: u32, len: u32) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let start = (offset as usize).min(self.image.len());
        let end = (start + len as usize).min(self.image.len());
        Ok(self.image[start..end].to_vec())
    }
}

/// A 512-byte SFF-8472 image with plausible identity fields and the
/// diagnostic page `27 09 80 79 0b 5d 14 ce 16 02`:
/// vendor `ACME CORP`, OUI `00:1b:21`, product `SFP-10G-LR`,
/// revision `A1`, wavelength 1310 nm, serial `SN12345678`,
/// manufacture date `240115`.
pub fn sample_image() -> Vec<u8> {
    let mut image = vec![0u8; 512];

    let mut put = |offset: usize, bytes: &[u8]| {
        image[offset..offset + bytes.len()].copy_from_slice(bytes);
    };
    put(0x14, b"ACME CORP       ");
    put(0x25, &[0x00, 0x1b, 0x21]);
    put(0x28, b"SFP-10G-LR      ");
    put(0x38, b"A1  ");
    put(0x3c, &[0x05, 0x1e]); // 1310 nm
    put(0x44, b"SN12345678      ");
    put(0x54, b"240115  ");
    put(0x160, &[0x27, 0x09, 0x80, 0x79, 0x0b, 0x5d, 0x14, 0xce, 0x16, 0x02]);

    image
}
