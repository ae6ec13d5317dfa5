use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    /// The line is not wrapped in `{` and `}`. Such lines are ignored silently.
    #[error("line is not framed by braces")]
    NotFramed,
    #[error("expected 3 fields, got {0}")]
    FieldCount(usize),
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Local>,
    pub ambient_temperature: f64,
    pub humidity: f64,
    pub liquid_temperature: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Local>, values: [f64; 3]) -> Self {
        let [ambient_temperature, humidity, liquid_temperature] = values;
        Self {
            timestamp,
            ambient_temperature,
            humidity,
            liquid_temperature,
        }
    }

    pub fn to_row(&self, layout: RowLayout) -> Vec<Value> {
        let mut row = match layout {
            RowLayout::Combined => vec![Value::from(
                self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            )],
            RowLayout::Split => vec![
                Value::from(self.timestamp.format("%Y-%m-%d").to_string()),
                Value::from(self.timestamp.format("%H:%M:%S").to_string()),
            ],
        };
        row.extend([
            Value::from(self.ambient_temperature),
            Value::from(self.humidity),
            Value::from(self.liquid_temperature),
        ]);
        row
    }
}

/// Column layout of an appended row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowLayout {
    /// `[timestamp, v1, v2, v3]`
    #[default]
    Combined,
    /// `[date, time, v1, v2, v3]`
    Split,
}

/// Parses a `{f1,f2%,f3}` record into its three measurements.
pub fn parse_line(line: &str) -> Result<[f64; 3], ParseError> {
    let inner = line
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or(ParseError::NotFramed)?;

    let parts: Vec<&str> = inner.split(',').collect();
    let &[first, second, third] = parts.as_slice() else {
        return Err(ParseError::FieldCount(parts.len()));
    };
    let second = second.trim_end().strip_suffix('%').unwrap_or(second);

    Ok([
        parse_number(first)?,
        parse_number(second)?,
        parse_number(third)?,
    ])
}

fn parse_number(field: &str) -> Result<f64, ParseError> {
    // `f64::from_str` also accepts `nan` and `inf`, which have no cell value.
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber(field.to_string()))
}
