//! Device-control transport and per-interface module handle.
//!
//! The kernel exposes transceiver EEPROMs through `SIOCETHTOOL` ioctls on
//! an ordinary datagram socket. [`ModuleTransport`] is the seam between
//! the engine and that channel: production code uses [`IoctlTransport`],
//! tests substitute [`crate::MockTransport`].

use std::sync::Arc;

use crate::error::{Error, Result};

/// SFF-8472 module class code as reported by `ETHTOOL_GMODULEINFO`.
pub const ETH_MODULE_SFF_8472: u32 = 0x2;

/// EEPROM size of an SFF-8472 module (identity page + diagnostic page).
pub const ETH_MODULE_SFF_8472_LEN: usize = 512;

/// Raw access to a network interface's transceiver module.
///
/// Both operations map to one blocking device-control request. There are
/// no retries and no timeouts anywhere on this path: a hung request
/// blocks its caller.
pub trait ModuleTransport: Send + Sync {
    /// Query module class code and EEPROM byte length for `iface`.
    fn module_info(&self, iface: &str) -> Result<(u32, u32)>;

    /// Read `len` bytes of module EEPROM starting at `offset`.
    ///
    /// Callers go through [`Module::read`], which validates the range
    /// against the reported EEPROM length first.
    fn read_eeprom(&self, iface: &str, offset: u32, len: u32) -> Result<Vec<u8>>;
}

/// One interface's transceiver: name, module class, EEPROM length.
///
/// Created per collection pass and discarded afterwards; the module's
/// persistent identity is its serial number, not this handle.
pub struct Module {
    transport: Arc<dyn ModuleTransport>,
    iface: String,
    kind: u32,
    eeprom_len: u32,
}

impl Module {
    /// Open the module on `iface` by querying the driver for its class
    /// and EEPROM length.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Io`] when the control channel cannot be
    /// obtained or the driver rejects the request (interface absent, no
    /// module support, permission denied).
    pub fn open(transport: Arc<dyn ModuleTransport>, iface: &str) -> Result<Self> {
        let (kind, eeprom_len) = transport.module_info(iface)?;
        Ok(Self {
            transport,
            iface: iface.to_string(),
            kind,
            eeprom_len,
        })
    }

    pub fn iface(&self) -> &str {
        &self.iface
    }

    /// Module class code reported by the driver.
    pub fn kind(&self) -> u32 {
        self.kind
    }

    pub fn eeprom_len(&self) -> u32 {
        self.eeprom_len
    }

    /// Read up to `len` bytes at `offset`, clamped to the reported EEPROM
    /// length. `offset == eeprom_len` yields an empty buffer, not an
    /// error.
    pub fn read(&self, offset: u32, mut len: u32) -> Result<Vec<u8>> {
        if self.eeprom_len == 0 {
            return Err(Error::NoEeprom);
        }
        if offset > self.eeprom_len {
            return Err(Error::OffsetOutOfBounds {
                offset,
                eeprom_len: self.eeprom_len,
            });
        }
        if offset == self.eeprom_len {
            return Ok(Vec::new());
        }
        if self.eeprom_len - offset < len {
            len = self.eeprom_len - offset;
        }
        self.transport.read_eeprom(&self.iface, offset, len)
    }

    /// Everything past the module-info query only understands SFF-8472.
    pub(crate) fn ensure_sff8472(&self) -> Result<()> {
        if self.kind != ETH_MODULE_SFF_8472 {
            return Err(Error::UnsupportedModule(self.kind));
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub use self::ioctl::IoctlTransport;

#[cfg(target_os = "linux")]
mod ioctl {
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::sync::OnceLock;

    use super::{ETH_MODULE_SFF_8472_LEN, ModuleTransport};
    use crate::error::{Error, Result};

    const ETHTOOL_GMODULEINFO: u32 = 0x42;
    const ETHTOOL_GMODULEEEPROM: u32 = 0x43;

    #[repr(C)]
    struct IfReq {
        ifr_name: [libc::c_char; libc::IFNAMSIZ],
        ifr_data: *mut libc::c_void,
    }

    #[repr(C)]
    struct EthtoolModInfo {
        cmd: u32,
        kind: u32,
        eeprom_len: u32,
        reserved: [u32; 8],
    }

    #[repr(C)]
    struct EthtoolEeprom {
        cmd: u32,
        magic: u32,
        offset: u32,
        len: u32,
        data: [u8; ETH_MODULE_SFF_8472_LEN],
    }

    /// `SIOCETHTOOL` transport over a shared datagram socket.
    ///
    /// The socket is opened lazily on first use and reused for the
    /// process lifetime; concurrent collection partitions issue their
    /// ioctls against the same descriptor, which the kernel handles
    /// independently per call.
    pub struct IoctlTransport {
        socket: OnceLock<std::result::Result<OwnedFd, i32>>,
    }

    impl IoctlTransport {
        pub fn new() -> Self {
            Self {
                socket: OnceLock::new(),
            }
        }

        fn socket_fd(&self) -> Result<RawFd> {
            let slot = self.socket.get_or_init(|| {
                let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, libc::IPPROTO_IP) };
                if fd < 0 {
                    Err(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO))
                } else {
                    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
                }
            });
            match slot {
                Ok(fd) => Ok(fd.as_raw_fd()),
                Err(errno) => Err(Error::Io(io::Error::from_raw_os_error(*errno))),
            }
        }

        fn ethtool(&self, iface: &str, data: *mut libc::c_void) -> Result<()> {
            let fd = self.socket_fd()?;
            let mut ifr = IfReq {
                ifr_name: [0; libc::IFNAMSIZ],
                ifr_data: data,
            };
            // Room for the trailing NUL the kernel expects.
            for (dst, src) in ifr
                .ifr_name
                .iter_mut()
                .zip(iface.as_bytes().iter().take(libc::IFNAMSIZ - 1))
            {
                *dst = *src as libc::c_char;
            }
            let rc = unsafe { libc::ioctl(fd, libc::SIOCETHTOOL, &mut ifr as *mut IfReq) };
            if rc < 0 {
                return Err(Error::Io(io::Error::last_os_error()));
            }
            Ok(())
        }
    }

    impl Default for IoctlTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ModuleTransport for IoctlTransport {
        fn module_info(&self, iface: &str) -> Result<(u32, u32)> {
            let mut info = EthtoolModInfo {
                cmd: ETHTOOL_GMODULEINFO,
                kind: 0,
                eeprom_len: 0,
                reserved: [0; 8],
            };
            self.ethtool(iface, &mut info as *mut EthtoolModInfo as *mut libc::c_void)?;
            Ok((info.kind, info.eeprom_len))
        }

        fn read_eeprom(&self, iface: &str, offset: u32, len: u32) -> Result<Vec<u8>> {
            let len = len.min(ETH_MODULE_SFF_8472_LEN as u32);
            let mut req = EthtoolEeprom {
                cmd: ETHTOOL_GMODULEEEPROM,
                magic: 0,
                offset,
                len,
                data: [0; ETH_MODULE_SFF_8472_LEN],
            };
            self.ethtool(iface, &mut req as *mut EthtoolEeprom as *mut libc::c_void)?;
            Ok(req.data[..req.len as usize].to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Module;
    use crate::error::Error;
    use crate::mock::MockTransport;

    #[test]
    fn read_rejects_empty_eeprom() {
        let transport = Arc::new(MockTransport::sff8472(Vec::new()));
        let module = Module::open(transport, "eth0").unwrap();
        assert!(matches!(module.read(0, 4), Err(Error::NoEeprom)));
    }

    #[test]
    fn read_rejects_offset_past_end() {
        let transport = Arc::new(MockTransport::sff8472(vec![0u8; 64]));
        let module = Module::open(transport, "eth0").unwrap();
        assert!(matches!(
            module.read(65, 1),
            Err(Error::OffsetOutOfBounds { offset: 65, eeprom_len: 64 })
        ));
    }

    #[test]
    fn read_at_end_is_empty_not_error() {
        let transport = Arc::new(MockTransport::sff8472(vec![0u8; 64]));
        let module = Module::open(transport, "eth0").unwrap();
        assert!(module.read(64, 8).unwrap().is_empty());
    }

    #[test]
    fn read_clamps_length_to_eeprom_end() {
        let transport = Arc::new(MockTransport::sff8472((0..32u8).collect()));
        let module = Module::open(transport, "eth0").unwrap();
        let data = module.read(28, 100).unwrap();
        assert_eq!(data, vec![28, 29, 30, 31]);
    }
}
