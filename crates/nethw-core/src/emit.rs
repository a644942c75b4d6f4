//! Emission encoders: Prometheus samples and influx line protocol.
//!
//! Both sinks consume the same [`CollectionRecord`] stream and share the
//! label vocabulary; they differ only in wire shape. Metric names and
//! the line-protocol field layout are compatibility surface — changing
//! them breaks downstream dashboards.

use std::sync::{Mutex, OnceLock};

use prometheus::{GaugeVec, Opts, Registry};
use regex::Regex;

use crate::collect::{CollectionRecord, RecordSink};

/// Metric namespace prefix.
pub const NAMESPACE: &str = "ethtool";

/// Label set of the presence sample. `FULL_LABELS[2..]` are the tag
/// names produced by the identity read.
pub const FULL_LABELS: [&str; 8] = [
    "iface", "error", "vendor", "revision", "product", "serial", "wavelen", "mfgdate",
];

const IFACE_LABELS: [&str; 1] = ["iface"];

fn label_values<'a>(record: &'a CollectionRecord, err_text: &'a str) -> Vec<&'a str> {
    FULL_LABELS
        .iter()
        .map(|&label| match label {
            "iface" => record.iface.as_str(),
            "error" => err_text,
            _ => record.tags.get(label).map_or("", String::as_str),
        })
        .collect()
}

/// Per-scrape Prometheus gauges.
///
/// Registered on a caller-supplied registry so every scrape starts from
/// a clean slate — stale interfaces simply stop appearing.
pub struct MetricSink {
    present: GaugeVec,
    temp: GaugeVec,
    volt: GaugeVec,
    bias: GaugeVec,
    txw: GaugeVec,
    rxw: GaugeVec,
}

impl MetricSink {
    /// Create the metric family and register it with `registry`.
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let gauge = |name: &str, help: &str, labels: &[&str]| -> prometheus::Result<GaugeVec> {
            let vec = GaugeVec::new(Opts::new(format!("{NAMESPACE}_{name}"), help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        Ok(Self {
            present: gauge(
                "transciever_present",
                "Scrape of transciever was successfull",
                &FULL_LABELS,
            )?,
            temp: gauge("transciever_temp", "Transciever temperature (C)", &IFACE_LABELS)?,
            volt: gauge("transciever_volt", "Transciever voltage (V)", &IFACE_LABELS)?,
            bias: gauge("transciever_bias", "Laser bias current (A)", &IFACE_LABELS)?,
            txw: gauge("transciever_txw", "Laser output power (W)", &IFACE_LABELS)?,
            rxw: gauge(
                "transciever_rxw",
                "Receiver signal average optical power (W)",
                &IFACE_LABELS,
            )?,
        })
    }
}

impl RecordSink for MetricSink {
    fn emit(&self, record: CollectionRecord) {
        let err_text = record
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let labels = label_values(&record, &err_text);

        match &record.diag {
            Some(d) if record.error.is_none() => {
                let iface = [record.iface.as_str()];
                self.present.with_label_values(&labels).set(1.0);
                self.temp.with_label_values(&iface).set(d.temperature_c);
                self.volt.with_label_values(&iface).set(d.voltage_v);
                // milli-units to base units at the emission boundary
                self.bias.with_label_values(&iface).set(d.bias_ma * 0.001);
                self.txw.with_label_values(&iface).set(d.transmit_mw * 0.001);
                self.rxw.with_label_values(&iface).set(d.receive_mw * 0.001);
            }
            _ => {
                self.present.with_label_values(&labels).set(0.0);
            }
        }
    }
}

// Influxdb is not consistent with itself when parsing quotes and when
// parsing consecutive backslashes, so quotes are replaced outright
// rather than escaped.
fn dangerous_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[\"'`]").expect("static pattern"))
}

fn white_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[[:cntrl:][:space:]]").expect("static pattern"))
}

fn escape_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("([,=])").expect("static pattern"))
}

fn escape_tag_value(value: &str) -> String {
    let value = dangerous_chars().replace_all(value, "~");
    let value = white_chars().replace_all(&value, "\\ ");
    escape_chars().replace_all(&value, "\\${1}").into_owned()
}

/// Line-protocol encoder. Lines are buffered behind a mutex (partitions
/// emit concurrently) and carry one caller-supplied timestamp.
pub struct InfluxSink {
    timestamp_ns: i64,
    lines: Mutex<Vec<String>>,
}

impl InfluxSink {
    pub fn new(timestamp_ns: i64) -> Self {
        Self {
            timestamp_ns,
            lines: Mutex::new(Vec::new()),
        }
    }

    /// The collected lines, in emission order.
    pub fn into_lines(self) -> Vec<String> {
        self.lines.into_inner().unwrap()
    }
}

impl RecordSink for InfluxSink {
    fn emit(&self, record: CollectionRecord) {
        let err_text = record
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        let mut tag_list = Vec::with_capacity(FULL_LABELS.len());
        for (label, value) in FULL_LABELS.iter().zip(label_values(&record, &err_text)) {
            if !value.is_empty() {
                tag_list.push(format!("{label}={}", escape_tag_value(value)));
            }
        }
        let tag_str = tag_list.join(",");

        let line = match &record.diag {
            Some(d) if record.error.is_none() => format!(
                "{NAMESPACE}_transciever,{tag_str} present=1i,temperature_C={:.2},voltage_V={:.3},bias_A={:.6},receive_power_dBm={:.2},transmit_power_dBm={:.2},receive_power_W={:.7},transmit_power_W={:.7} {}",
                d.temperature_c,
                d.voltage_v,
                d.bias_ma * 0.001,
                d.receive_dbm,
                d.transmit_dbm,
                d.receive_mw * 0.001,
                d.transmit_mw * 0.001,
                self.timestamp_ns,
            ),
            _ => format!(
                "{NAMESPACE}_transciever,{tag_str} present=0i {}",
                self.timestamp_ns
            ),
        };
        self.lines.lock().unwrap().push(line);
    }
}

#[cfg(test)]
mod tests {
    use prometheus::{Registry, TextEncoder};

    use super::*;
    use crate::collect::CollectionRecord;
    use crate::diag::TransceiverDiagnostics;
    use crate::eeprom::TagSet;
    use crate::error::Error;

    fn sample_diag() -> TransceiverDiagnostics {
        TransceiverDiagnostics {
            temperature_c: 39.03515625,
            voltage_v: 3.2889,
            bias_ma: 5.818,
            transmit_mw: 0.5326,
            receive_mw: 0.5634,
            transmit_dbm: -2.736,
            receive_dbm: -2.492,
        }
    }

    fn ok_record() -> CollectionRecord {
        let mut tags = TagSet::new();
        tags.insert("vendor".to_string(), "ACME CORP".to_string());
        tags.insert("serial".to_string(), "SN12345678".to_string());
        CollectionRecord {
            iface: "eth0".to_string(),
            error: None,
            tags,
            diag: Some(sample_diag()),
        }
    }

    fn failed_record() -> CollectionRecord {
        CollectionRecord {
            iface: "eth0".to_string(),
            error: Some(Error::UnsupportedModule(0x1)),
            tags: TagSet::new(),
            diag: None,
        }
    }

    #[test]
    fn tag_escaping_passes_apply_in_order() {
        assert_eq!(escape_tag_value(r#"ab"c, d"#), r"ab~c\,\ d");
        assert_eq!(escape_tag_value("a=b"), r"a\=b");
        assert_eq!(escape_tag_value("tab\there"), r"tab\ here");
        assert_eq!(escape_tag_value("`quoted'"), "~quoted~");
    }

    #[test]
    fn influx_success_line_layout() {
        let sink = InfluxSink::new(1_700_000_000_000_000_000);
        sink.emit(ok_record());
        let lines = sink.into_lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.starts_with("ethtool_transciever,iface=eth0,vendor=ACME\\ CORP,serial=SN12345678 "));
        assert!(line.contains("present=1i,temperature_C=39.04,voltage_V=3.289,bias_A=0.005818,"));
        assert!(line.contains("receive_power_dBm=-2.49,transmit_power_dBm=-2.74,"));
        assert!(line.contains("receive_power_W=0.0005634,transmit_power_W=0.0005326"));
        assert!(line.ends_with(" 1700000000000000000"));
    }

    #[test]
    fn influx_failure_line_has_error_tag_and_present_zero() {
        let sink = InfluxSink::new(42);
        sink.emit(failed_record());
        let lines = sink.into_lines();
        assert_eq!(
            lines[0],
            "ethtool_transciever,iface=eth0,error=unsupported\\ module\\ type:\\ 0x1 present=0i 42"
        );
    }

    #[test]
    fn metric_sink_renders_present_zero_with_error_label() {
        let registry = Registry::new();
        let sink = MetricSink::register(&registry).unwrap();
        sink.emit(failed_record());

        let text = TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();
        assert!(text.contains("ethtool_transciever_present"));
        assert!(text.contains("error=\"unsupported module type: 0x1\""));
        assert!(text.contains("iface=\"eth0\""));
        // No fabricated gauges for a failed interface.
        assert!(!text.contains("ethtool_transciever_temp{"));
    }

    #[test]
    fn metric_sink_renders_all_gauges_on_success() {
        let registry = Registry::new();
        let sink = MetricSink::register(&registry).unwrap();
        sink.emit(ok_record());

        let text = TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();
        assert!(text.contains("ethtool_transciever_present{"));
        assert!(text.contains("ethtool_transciever_temp{iface=\"eth0\"} 39.03515625"));
        assert!(text.contains("ethtool_transciever_volt{iface=\"eth0\"}"));
        assert!(text.contains("ethtool_transciever_bias{iface=\"eth0\"}"));
        assert!(text.contains("ethtool_transciever_txw{iface=\"eth0\"}"));
        assert!(text.contains("ethtool_transciever_rxw{iface=\"eth0\"}"));
    }
}
