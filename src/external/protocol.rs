//! Line protocol spoken by external collectors on stdout.
//!
//! Two dialects share one stream. A line starting with `{` is an OpenTSDB
//! style JSON object, anything else is the plain
//! `<class> <timestamp> <value> [k=v ...]` form.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::series::{DataPoint, Labels, Value};

lazy_static! {
    static ref TAG_PART: Regex = Regex::new(r"^[A-Za-z0-9_./-]+$").unwrap();
}

/// Outcome of parsing one stdout line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Point(DataPoint),
    /// Empty or whitespace-only line.
    Blank,
    /// A JSON metadata record, skipped without complaint.
    Metadata,
    /// Unusable line, with the reason to log.
    Invalid(String),
}

pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        ParsedLine::Blank
    } else if line.starts_with('{') {
        parse_json(line)
    } else {
        parse_plain(line)
    }
}

fn invalid_point(line: &str) -> ParsedLine {
    ParsedLine::Invalid(format!("invalid data point - {}", line))
}

/// Splits off the first whitespace-delimited token.
fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    let idx = input.find(char::is_whitespace)?;
    Some((&input[..idx], input[idx..].trim_start()))
}

fn parse_plain(line: &str) -> ParsedLine {
    if line.split_whitespace().count() < 3 {
        return invalid_point(line);
    }
    let Some((class, rest)) = next_token(line) else {
        return invalid_point(line);
    };
    let Some((raw_ts, rest)) = next_token(rest) else {
        return invalid_point(line);
    };
    let timestamp = match raw_ts.parse::<i64>() {
        Ok(ts) => ts,
        Err(_) => return ParsedLine::Invalid(format!("invalid timestamp - {}", raw_ts)),
    };

    // Tags are peeled off the right end until a token does not look like one.
    let mut rest = rest.trim_end();
    let mut labels = Labels::new();
    while let Some(idx) = rest.rfind(char::is_whitespace) {
        let token = rest[idx..].trim_start();
        let Some((key, value)) = token.split_once('=') else {
            break;
        };
        if !TAG_PART.is_match(key) || !TAG_PART.is_match(value) {
            break;
        }
        labels.insert(key.to_string(), value.to_string());
        rest = rest[..idx].trim_end();
    }

    ParsedLine::Point(DataPoint {
        class: class.to_string(),
        timestamp,
        labels,
        attributes: Labels::new(),
        value: Value::parse(rest),
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(v) => Value::Bool(v),
            Scalar::Int(v) => Value::Int(v),
            Scalar::Float(v) => Value::Float(v),
            Scalar::Text(v) => Value::Text(v),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonPoint {
    metric: String,
    timestamp: i64,
    value: Scalar,
    #[serde(default)]
    tags: Option<Labels>,
}

/// OpenTSDB metadata record. Every field is optional, so most objects that
/// are not data points land here.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Metadata {
    #[serde(alias = "Metric")]
    metric: Option<String>,
    #[serde(alias = "Tags")]
    tags: Option<Labels>,
    #[serde(alias = "Name")]
    name: Option<String>,
    #[serde(alias = "Value")]
    value: Option<serde_json::Value>,
    #[serde(alias = "Time")]
    time: Option<String>,
}

fn parse_json(line: &str) -> ParsedLine {
    match serde_json::from_str::<JsonPoint>(line) {
        Ok(point) => ParsedLine::Point(DataPoint {
            class: point.metric,
            timestamp: point.timestamp,
            labels: point.tags.unwrap_or_default(),
            attributes: Labels::new(),
            value: point.value.into(),
        }),
        Err(_) if serde_json::from_str::<Metadata>(line).is_ok() => ParsedLine::Metadata,
        Err(_) => invalid_point(line),
    }
}
