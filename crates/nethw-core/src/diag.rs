//! Live diagnostics decoder for the SFF-8472 diagnostic page.
//!
//! Ten bytes at offset 0x160, five big-endian 16-bit words in fixed
//! order:
//!
//! ```text
//! 0x0160:  27 09 80 79 0b 5d 14 ce 16 02
//!          TT TT VV VV CC CC OO OO RR RR
//! ```
//!
//! temperature in 1/256 °C, voltage in 1/10000 V, laser bias in
//! 1/500 mA, laser output and receiver power in 1/10000 mW.

use crate::error::{Error, Result};
use crate::ethtool::Module;

const DIAG_OFFSET: u32 = 0x160;
const DIAG_LEN: usize = 10;

const MULT_C: f64 = 1.0 / 256.0;
const MULT_V: f64 = 1.0 / 10_000.0;
const MULT_MA: f64 = 1.0 / 500.0;
const MULT_MW: f64 = 1.0 / 10_000.0;

/// One module's physical measurements at one point in time.
///
/// Diagnostics are always read fresh; only identity fields are cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransceiverDiagnostics {
    pub temperature_c: f64,
    pub voltage_v: f64,
    pub bias_ma: f64,
    pub transmit_mw: f64,
    pub receive_mw: f64,
    /// `10·log10(transmit_mw)`; `-inf` when the laser reports 0 mW.
    /// Degenerate but not an error — consumers render it as-is.
    pub transmit_dbm: f64,
    /// `10·log10(receive_mw)`; `-inf` at 0 mW, same as transmit.
    pub receive_dbm: f64,
}

impl Module {
    /// Read and decode the diagnostic page.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedModule`] for anything but SFF-8472, transport
    /// errors from the read, [`Error::TruncatedRead`] when the driver
    /// returns fewer than 10 bytes.
    pub fn diagnostics(&self) -> Result<TransceiverDiagnostics> {
        self.ensure_sff8472()?;
        let data = self.read(DIAG_OFFSET, DIAG_LEN as u32)?;
        if data.len() < DIAG_LEN {
            return Err(Error::TruncatedRead {
                wanted: DIAG_LEN,
                got: data.len(),
            });
        }

        let mut w = [0.0f64; 5];
        for (i, word) in w.iter_mut().enumerate() {
            *word = f64::from(u16::from_be_bytes([data[i * 2], data[i * 2 + 1]]));
        }

        let transmit_mw = w[3] * MULT_MW;
        let receive_mw = w[4] * MULT_MW;
        Ok(TransceiverDiagnostics {
            temperature_c: w[0] * MULT_C,
            voltage_v: w[1] * MULT_V,
            bias_ma: w[2] * MULT_MA,
            transmit_mw,
            receive_mw,
            transmit_dbm: transmit_mw.log10() * 10.0,
            receive_dbm: receive_mw.log10() * 10.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::Error;
    use crate::ethtool::Module;
    use crate::mock::{MockTransport, sample_image};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn decodes_reference_page() {
        let transport = Arc::new(MockTransport::sff8472(sample_image()));
        let module = Module::open(transport, "eth0").unwrap();
        let d = module.diagnostics().unwrap();

        assert!(close(d.temperature_c, f64::from(0x2709u16) / 256.0));
        assert!(close(d.voltage_v, 3.2889));
        assert!(close(d.bias_ma, f64::from(0x0b5du16) / 500.0));
        assert!(close(d.transmit_mw, 0.5326));
        assert!(close(d.receive_mw, 0.5634));
        assert!(close(d.transmit_dbm, 0.5326f64.log10() * 10.0));
        assert!(close(d.receive_dbm, 0.5634f64.log10() * 10.0));
    }

    #[test]
    fn zero_power_yields_negative_infinity_dbm() {
        let mut image = sample_image();
        image[0x166..0x16a].fill(0);
        let transport = Arc::new(MockTransport::sff8472(image));
        let module = Module::open(transport, "eth0").unwrap();
        let d = module.diagnostics().unwrap();
        assert_eq!(d.transmit_mw, 0.0);
        assert!(d.transmit_dbm.is_infinite() && d.transmit_dbm < 0.0);
        assert!(d.receive_dbm.is_infinite() && d.receive_dbm < 0.0);
    }

    #[test]
    fn wrong_module_class_is_rejected() {
        let transport = Arc::new(MockTransport::with_kind(0xb, sample_image()));
        let module = Module::open(transport, "eth0").unwrap();
        assert!(matches!(
            module.diagnostics(),
            Err(Error::UnsupportedModule(0xb))
        ));
    }

    #[test]
    fn short_diagnostic_page_is_a_truncated_read() {
        // EEPROM ends inside the diagnostic page.
        let image = sample_image()[..0x165].to_vec();
        let transport = Arc::new(MockTransport::sff8472(image));
        let module = Module::open(transport, "eth0").unwrap();
        assert!(matches!(
            module.diagnostics(),
            Err(Error::TruncatedRead { wanted: 10, got: 5 })
        ));
    }
}
