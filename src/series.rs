//! Series encoding.
//!
//! A [`DataPoint`] is turned into exactly one output line by a
//! [`SeriesFormat`], which carries the process-wide output settings: the
//! selected [`OutputFormat`], the class separator and the default labels. The
//! format is built once at startup and shared read-only by every source.

use std::collections::BTreeMap;
use std::fmt;

use log::warn;

/// Label or attribute set. Ordered by key so encoded lines are stable.
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    /// Coerces a raw token the way collectors expect: integer, then float,
    /// otherwise the text itself.
    pub fn parse(raw: &str) -> Self {
        if let Ok(v) = raw.parse::<i64>() {
            return Value::Int(v);
        }
        match raw.parse::<f64>() {
            Ok(v) => Value::Float(v),
            Err(_) => Value::Text(raw.to_string()),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write_float(f, *v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// Shortest representation, switching to `1e+21` style exponents outside
/// `[1e-4, 1e21)` so huge or tiny values stay short.
fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    let magnitude = v.abs();
    if v == 0.0 || !v.is_finite() || (1e-4..1e21).contains(&magnitude) {
        return write!(f, "{}", v);
    }
    let formatted = format!("{:e}", v);
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    write!(f, "{}e{}{:0>2}", mantissa, sign, digits)
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::Float(value as f64),
        }
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::from(value as u64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

/// One observation.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub class: String,
    /// Microseconds since the epoch.
    pub timestamp: i64,
    pub labels: Labels,
    /// Sensision attributes, ignored by formats that have no such concept.
    pub attributes: Labels,
    pub value: Value,
}

impl DataPoint {
    pub fn new(class: impl Into<String>, timestamp: i64, value: impl Into<Value>) -> Self {
        DataPoint {
            class: class.into(),
            timestamp,
            labels: Labels::new(),
            attributes: Labels::new(),
            value: value.into(),
        }
    }

    pub fn label(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.labels.insert(key.into(), value.to_string());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.insert(key.into(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `<ts>// <class>{<labels>} <value>`, supports text values.
    #[default]
    Sensision,
    /// `<class>{<labels>} <value> <ts_seconds>`, numeric values only.
    Prometheus,
}

impl OutputFormat {
    /// Resolves a configured format identifier. Unknown identifiers fall back
    /// to Sensision.
    pub fn from_identifier(identifier: &str) -> Self {
        match identifier.trim().to_ascii_lowercase().as_str() {
            "sensision" | "sensition" | "" => OutputFormat::Sensision,
            "prometheus" => OutputFormat::Prometheus,
            other => {
                warn!("unknown output format '{}', using sensision", other);
                OutputFormat::Sensision
            }
        }
    }
}

/// Percent-escapes the characters that delimit labels in the line protocol.
pub fn escape_label(raw: &str) -> String {
    raw.replace(',', "%2C")
        .replace('}', "%7D")
        .replace('=', "%3D")
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFormat {
    format: OutputFormat,
    separator: String,
    default_labels: Labels,
}

impl Default for SeriesFormat {
    fn default() -> Self {
        SeriesFormat {
            format: OutputFormat::Sensision,
            separator: ".".to_string(),
            default_labels: Labels::new(),
        }
    }
}

impl SeriesFormat {
    pub fn new(format: OutputFormat, separator: impl Into<String>, default_labels: Labels) -> Self {
        SeriesFormat {
            format,
            separator: separator.into(),
            default_labels,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn default_labels(&self) -> &Labels {
        &self.default_labels
    }

    /// Same separator and default labels, different output format.
    pub fn with_format(&self, format: OutputFormat) -> Self {
        SeriesFormat {
            format,
            ..self.clone()
        }
    }

    /// Renders one line, newline included. Returns an empty string when the
    /// format cannot represent the value.
    pub fn encode(&self, point: &DataPoint) -> String {
        let class = if self.separator != "." {
            point.class.replace('.', &self.separator)
        } else {
            point.class.clone()
        };

        match self.format {
            OutputFormat::Sensision => self.encode_sensision(&class, point),
            OutputFormat::Prometheus => self.encode_prometheus(&class, point),
        }
    }

    /// Appends the encoded line to `buf`.
    pub fn write_point(&self, buf: &mut Vec<u8>, point: &DataPoint) {
        buf.extend_from_slice(self.encode(point).as_bytes());
    }

    fn encode_sensision(&self, class: &str, point: &DataPoint) -> String {
        let labels = self.render_labels(&point.labels, |k, v| format!("{}={}", k, v));
        let attributes = if point.attributes.is_empty() {
            String::new()
        } else {
            let pairs: Vec<String> = point
                .attributes
                .iter()
                .map(|(k, v)| format!("{}={}", escape_label(k), escape_label(v)))
                .collect();
            format!("{{{}}}", pairs.join(","))
        };
        let value = match &point.value {
            Value::Text(text) => format!("'{}'", urlencoding::encode(text)),
            other => other.to_string(),
        };
        format!(
            "{}// {}{{{}}}{} {}\n",
            point.timestamp, class, labels, attributes, value
        )
    }

    fn encode_prometheus(&self, class: &str, point: &DataPoint) -> String {
        if point.value.is_text() {
            return String::new();
        }
        let labels = self.render_labels(&point.labels, |k, v| {
            format!("{}=\"{}\"", k, v.replace('"', "\\\""))
        });
        format!(
            "{}{{{}}} {} {}\n",
            class,
            labels,
            point.value,
            point.timestamp / 1_000_000
        )
    }

    fn render_labels(&self, labels: &Labels, pair: impl Fn(&str, &str) -> String) -> String {
        // Default labels win over a point label with the same key.
        let own = labels
            .iter()
            .filter(|(k, _)| !self.default_labels.contains_key(*k));
        self.default_labels
            .iter()
            .chain(own)
            .map(|(k, v)| pair(&escape_label(k), &escape_label(v)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: i64 = 1_620_000_000_000_000;

    #[test]
    fn sensision_numeric_line() {
        let format = SeriesFormat::default();
        let point = DataPoint::new("os.cpu", TS, 42.5f64);
        assert_eq!(format.encode(&point), "1620000000000000// os.cpu{} 42.5\n");
    }

    #[test]
    fn sensision_text_value_is_quoted_and_escaped() {
        let format = SeriesFormat::default();
        let point = DataPoint::new("app.state", TS, "up and/running");
        assert_eq!(
            format.encode(&point),
            "1620000000000000// app.state{} 'up%20and%2Frunning'\n"
        );
    }

    #[test]
    fn separator_rewrites_every_dot() {
        let format = SeriesFormat::new(OutputFormat::Sensision, "_", Labels::new());
        let point = DataPoint::new("os.disk.fs.used", TS, 10i64);
        assert_eq!(format.encode(&point), "1620000000000000// os_disk_fs_used{} 10\n");
    }

    #[test]
    fn default_labels_come_first() {
        let mut defaults = Labels::new();
        defaults.insert("zone".to_string(), "eu".to_string());
        let format = SeriesFormat::new(OutputFormat::Sensision, ".", defaults);
        let point = DataPoint::new("os.load1", TS, 0.5f64).label("a", "b");
        assert_eq!(
            format.encode(&point),
            "1620000000000000// os.load1{zone=eu,a=b} 0.5\n"
        );
    }

    #[test]
    fn label_delimiters_are_escaped() {
        let format = SeriesFormat::default();
        let point = DataPoint::new("x", TS, true).label("k", "a,b}c=d");
        assert_eq!(
            format.encode(&point),
            "1620000000000000// x{k=a%2Cb%7Dc%3Dd} true\n"
        );
    }

    #[test]
    fn escaping_is_stable() {
        let once = escape_label("a=b,c}");
        assert_eq!(once, "a%3Db%2Cc%7D");
        assert_eq!(escape_label(&once), once);
    }

    #[test]
    fn attributes_follow_labels_in_sensision_only() {
        let point = DataPoint::new("os.disk.fs", TS, 12.5f64)
            .label("disk", "/dev/sda1")
            .attribute("mount", "/");
        let sensision = SeriesFormat::default();
        assert_eq!(
            sensision.encode(&point),
            "1620000000000000// os.disk.fs{disk=/dev/sda1}{mount=/} 12.5\n"
        );
        let prometheus = sensision.with_format(OutputFormat::Prometheus);
        assert_eq!(
            prometheus.encode(&point),
            "os.disk.fs{disk=\"/dev/sda1\"} 12.5 1620000000\n"
        );
    }

    #[test]
    fn prometheus_drops_text_values() {
        let format = SeriesFormat::new(OutputFormat::Prometheus, "_", Labels::new());
        let point = DataPoint::new("app.version", TS, "1.2.3");
        assert_eq!(format.encode(&point), "");
    }

    #[test]
    fn prometheus_quotes_default_labels() {
        let mut defaults = Labels::new();
        defaults.insert("host".to_string(), "node-1".to_string());
        let format = SeriesFormat::new(OutputFormat::Prometheus, "_", defaults);
        let point = DataPoint::new("os.mem", TS, 87i64);
        assert_eq!(format.encode(&point), "os_mem{host=\"node-1\"} 87 1620000000\n");
    }

    #[test]
    fn point_label_does_not_repeat_a_default_key() {
        let mut defaults = Labels::new();
        defaults.insert("host".to_string(), "a".to_string());
        let format = SeriesFormat::new(OutputFormat::Sensision, ".", defaults);
        let point = DataPoint::new("os.up", TS, 1i64)
            .label("host", "b")
            .label("role", "db");
        assert_eq!(
            format.encode(&point),
            "1620000000000000// os.up{host=a,role=db} 1\n"
        );
    }

    #[test]
    fn extreme_floats_use_exponents() {
        assert_eq!(Value::Float(1e21).to_string(), "1e+21");
        assert_eq!(Value::Float(-2.5e-7).to_string(), "-2.5e-07");
        assert_eq!(Value::Float(1.5e300).to_string(), "1.5e+300");
        assert_eq!(Value::Float(123456.75).to_string(), "123456.75");
        assert_eq!(Value::Float(0.0001).to_string(), "0.0001");
        assert_eq!(Value::Float(0.0).to_string(), "0");
    }

    #[test]
    fn value_parse_tries_int_then_float_then_text() {
        assert_eq!(Value::parse("42"), Value::Int(42));
        assert_eq!(Value::parse("42.5"), Value::Float(42.5));
        assert_eq!(Value::parse("hello world"), Value::Text("hello world".to_string()));
    }

    #[test]
    fn unknown_format_falls_back_to_sensision() {
        assert_eq!(OutputFormat::from_identifier("Prometheus"), OutputFormat::Prometheus);
        assert_eq!(OutputFormat::from_identifier("sensition"), OutputFormat::Sensision);
        assert_eq!(OutputFormat::from_identifier("graphite"), OutputFormat::Sensision);
    }
}
