//! Canonical, protocol-agnostic position model produced by the decoders.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const KEY_HDOP: &str = "hdop";
pub const KEY_BATTERY_LEVEL: &str = "batteryLevel";
pub const KEY_DRIVER_UNIQUE_ID: &str = "driverUniqueId";
pub const KEY_CHARGE: &str = "charge";
pub const KEY_EVENT: &str = "event";
pub const KEY_MOTION: &str = "motion";
pub const KEY_ODOMETER: &str = "odometer";
pub const KEY_ALARM: &str = "alarm";

/// One decoded telemetry sample. Constructed fresh per request, populated by
/// a decoder and never mutated after it is handed downstream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub protocol: &'static str,
    /// Internal device handle; zero until identity resolution succeeds. A
    /// position with a zero device id is never handed downstream.
    pub device_id: i64,
    pub device_time: Option<DateTime<Utc>>,
    pub fix_time: Option<DateTime<Utc>>,
    /// True when the coordinates were reused from the last known location
    /// instead of being reported on the wire.
    pub outdated: bool,
    pub valid: bool,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Always stored in knots, whatever the wire unit was.
    pub speed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
}

impl Position {
    pub fn new(protocol: &'static str) -> Self {
        Position {
            protocol,
            device_id: 0,
            device_time: None,
            fix_time: None,
            outdated: false,
            valid: false,
            latitude: 0.0,
            longitude: 0.0,
            altitude: None,
            speed: 0.0,
            course: None,
            accuracy: None,
            attributes: BTreeMap::new(),
            network: None,
        }
    }

    /// Sets device and fix time to the same instant.
    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.device_time = Some(time);
        self.fix_time = Some(time);
    }

    /// Stores an open attribute. Storing the same key twice keeps the later
    /// value.
    pub fn set(&mut self, key: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.to_owned(), value.into());
    }
}

/// Value of an open attribute: the narrowest of float, boolean or string
/// that fits the wire data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_owned())
    }
}

/// Radio environment reported alongside a fix. Attached to a position only
/// when at least one tower or access point was observed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cell_towers: Vec<CellTower>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub wifi_access_points: Vec<WifiAccessPoint>,
}

impl Network {
    pub fn is_empty(&self) -> bool {
        self.cell_towers.is_empty() && self.wifi_access_points.is_empty()
    }

    pub fn add_cell_tower(&mut self, tower: CellTower) {
        self.cell_towers.push(tower);
    }

    pub fn add_wifi_access_point(&mut self, ap: WifiAccessPoint) {
        self.wifi_access_points.push(ap);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellTower {
    pub mobile_country_code: i32,
    pub mobile_network_code: i32,
    pub location_area_code: i32,
    pub cell_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i32>,
}

impl CellTower {
    pub fn new(mcc: i32, mnc: i32, lac: i32, cid: i64) -> Self {
        CellTower {
            mobile_country_code: mcc,
            mobile_network_code: mnc,
            location_area_code: lac,
            cell_id: cid,
            signal_strength: None,
        }
    }

    pub fn with_signal(mcc: i32, mnc: i32, lac: i32, cid: i64, signal: i32) -> Self {
        CellTower {
            signal_strength: Some(signal),
            ..CellTower::new(mcc, mnc, lac, cid)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiAccessPoint {
    pub mac_address: String,
    pub signal_strength: i32,
}

impl WifiAccessPoint {
    pub fn new(mac: impl Into<String>, signal: i32) -> Self {
        WifiAccessPoint {
            mac_address: mac.into(),
            signal_strength: signal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_overwrite_keeps_last() {
        let mut position = Position::new("test");
        position.set("batt", 50.0);
        position.set("batt", 60.0);
        assert_eq!(
            position.attributes.get("batt"),
            Some(&AttributeValue::Number(60.0))
        );
    }

    #[test]
    fn network_empty_until_observed() {
        let mut network = Network::default();
        assert!(network.is_empty());
        network.add_wifi_access_point(WifiAccessPoint::new("00:11:22:33:44:55", -70));
        assert!(!network.is_empty());
    }
}
