//! Field coercion helpers: speed unit conversion, timestamp parsing with a
//! fallback chain, and auto-typing of open attribute values.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::model::AttributeValue;

const KNOTS_PER_MPS: f64 = 1.943_844_492_440_6;
const KNOTS_PER_KPH: f64 = 0.539_956_803_455_7;

/// Speed units seen on the wire. Stored speed is always knots.
#[derive(Debug, Clone, Copy)]
pub enum SpeedUnit {
    Knots,
    Kph,
    Mps,
}

pub fn to_knots(value: f64, unit: SpeedUnit) -> f64 {
    match unit {
        SpeedUnit::Knots => value,
        SpeedUnit::Kph => value * KNOTS_PER_KPH,
        SpeedUnit::Mps => value * KNOTS_PER_MPS,
    }
}

/// Parses a wire timestamp, trying each variant in order:
///
/// 1. an integer, interpreted as Unix seconds when it fits below the 32-bit
///    signed maximum and as milliseconds otherwise
/// 2. ISO 8601, attempted only when the value contains a `T`
/// 3. the fixed pattern `%Y-%m-%d %H:%M:%S`, read as UTC
///
/// Exhausting the chain is a hard decode failure.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(number) = value.parse::<i64>() {
        let millis = if number < i64::from(i32::MAX) {
            number * 1000
        } else {
            number
        };
        return DateTime::from_timestamp_millis(millis)
            .with_context(|| format!("timestamp out of range: {value}"));
    }
    if value.contains('T') {
        return parse_iso8601(value);
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("unsupported timestamp: {value}"))?;
    Ok(naive.and_utc())
}

/// ISO 8601 with or without an explicit offset; zoneless values are UTC.
pub fn parse_iso8601(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("unsupported timestamp: {value}"))?;
    Ok(naive.and_utc())
}

/// Guesses the narrowest type for an open attribute value. Never fails:
/// anything that is not a float or a boolean literal stays a string.
pub fn guess_value(value: &str) -> AttributeValue {
    if let Ok(number) = value.parse::<f64>() {
        return AttributeValue::Number(number);
    }
    match value {
        "true" => AttributeValue::Bool(true),
        "false" => AttributeValue::Bool(false),
        _ => AttributeValue::Text(value.to_owned()),
    }
}
