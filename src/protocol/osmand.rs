//! Decoder for the OsmAnd-style telemetry protocol: a flat key-value format
//! (query string or form body) and a nested JSON format, selected by the
//! request content type.

use std::sync::Arc;

use actix_web::http::StatusCode;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::coerce::{self, SpeedUnit};
use crate::commands::CommandQueue;
use crate::model::{self, CellTower, Network, Position, WifiAccessPoint};
use crate::registry::DeviceRegistry;

const PROTOCOL: &str = "osmand";

/// Outcome of one decode: a position plus an optional piggybacked command
/// payload, or a rejection status when device identity cannot be resolved.
#[derive(Debug)]
pub enum Decoded {
    Accepted {
        position: Position,
        response: Option<String>,
    },
    Rejected(StatusCode),
}

pub struct OsmAndDecoder {
    registry: Arc<dyn DeviceRegistry>,
    commands: Arc<dyn CommandQueue>,
}

impl OsmAndDecoder {
    pub fn new(registry: Arc<dyn DeviceRegistry>, commands: Arc<dyn CommandQueue>) -> Self {
        OsmAndDecoder { registry, commands }
    }

    pub async fn record(&self, position: &Position) -> Result<()> {
        self.registry.record(position).await
    }

    /// Decodes the key-value format. Pairs come from the query string, or
    /// from the form body when the query string is empty, and are processed
    /// in wire encounter order. Later pairs overwrite earlier ones, and the
    /// notification token only registers once the device id has been seen.
    pub async fn decode_query(&self, query: &str, body: &[u8]) -> Result<Decoded> {
        let mut params: Vec<(String, String)> =
            serde_urlencoded::from_str(query).context("malformed query string")?;
        if params.is_empty() {
            params = serde_urlencoded::from_bytes(body).context("malformed form body")?;
        }

        let mut position = Position::new(PROTOCOL);
        position.valid = true;

        let mut network = Network::default();
        let mut latitude = None;
        let mut longitude = None;

        for (key, value) in &params {
            let value = value.as_str();
            match key.as_str() {
                "id" | "deviceid" => match self.registry.resolve(value).await? {
                    Some(session) => position.device_id = session.device_id,
                    None => return Ok(Decoded::Rejected(StatusCode::BAD_REQUEST)),
                },
                "notificationToken" => {
                    if position.device_id > 0 {
                        self.commands
                            .update_notification_token(position.device_id, value)
                            .await?;
                    }
                }
                "valid" => {
                    position.valid = value.eq_ignore_ascii_case("true") || value == "1";
                }
                "timestamp" => {
                    let time = coerce::parse_timestamp(value)?;
                    position.set_time(time);
                }
                "lat" => {
                    latitude = Some(parse_float(value, "latitude")?);
                }
                "lon" => {
                    longitude = Some(parse_float(value, "longitude")?);
                }
                "location" => {
                    let (lat, lon) = value
                        .split_once(',')
                        .with_context(|| format!("malformed location pair: {value}"))?;
                    latitude = Some(parse_float(lat, "latitude")?);
                    longitude = Some(parse_float(lon, "longitude")?);
                }
                "cell" => network.add_cell_tower(parse_cell(value)?),
                "wifi" => network.add_wifi_access_point(parse_wifi(value)?),
                "speed" => {
                    position.speed = coerce::to_knots(parse_float(value, "speed")?, SpeedUnit::Knots);
                }
                "bearing" | "heading" => {
                    position.course = Some(parse_float(value, "course")?);
                }
                "altitude" => {
                    position.altitude = Some(parse_float(value, "altitude")?);
                }
                "accuracy" => {
                    position.accuracy = Some(parse_float(value, "accuracy")?);
                }
                "hdop" => position.set(model::KEY_HDOP, parse_float(value, "hdop")?),
                "batt" => position.set(model::KEY_BATTERY_LEVEL, parse_float(value, "batt")?),
                "driverUniqueId" => position.set(model::KEY_DRIVER_UNIQUE_ID, value),
                "charge" => position.set(model::KEY_CHARGE, value.eq_ignore_ascii_case("true")),
                _ => position.set(key, coerce::guess_value(value)),
            }
        }

        if position.fix_time.is_none() {
            position.set_time(Utc::now());
        }

        if !network.is_empty() {
            position.network = Some(network);
        }

        if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
            position.latitude = latitude;
            position.longitude = longitude;
        } else {
            let device_time = position.device_time;
            self.last_location(&mut position, device_time).await?;
        }

        if position.device_id == 0 {
            return Ok(Decoded::Rejected(StatusCode::BAD_REQUEST));
        }

        let mut response = None;
        for command in self.commands.dequeue(position.device_id, 1).await? {
            response = command.data;
        }

        Ok(Decoded::Accepted { position, response })
    }

    /// Decodes the nested JSON format. This path never piggybacks commands.
    pub async fn decode_json(&self, body: &[u8]) -> Result<Decoded> {
        let report: JsonReport = serde_json::from_slice(body).context("malformed json report")?;

        let session = match self.registry.resolve(&report.device_id).await? {
            Some(session) => session,
            None => return Ok(Decoded::Rejected(StatusCode::NOT_FOUND)),
        };

        let mut position = Position::new(PROTOCOL);
        position.device_id = session.device_id;

        let location = report.location;
        position.set_time(coerce::parse_iso8601(&location.timestamp)?);

        match location.coords {
            Some(coords) => {
                position.valid = true;
                position.latitude = coords.latitude;
                position.longitude = coords.longitude;
                let speed = coords.speed.filter(|x| *x >= 0.0);
                if let Some(speed) = speed {
                    position.speed = coerce::to_knots(speed, SpeedUnit::Mps);
                }
                let heading = coords.heading.filter(|x| *x >= 0.0);
                if let Some(heading) = heading {
                    position.course = Some(heading);
                }
                // accuracy is only meaningful when motion data was present
                if speed.is_some() || heading.is_some() {
                    position.accuracy = Some(coords.accuracy);
                }
                position.altitude = Some(coords.altitude);
            }
            None => self.last_location(&mut position, None).await?,
        }

        if let Some(event) = location.event {
            position.set(model::KEY_EVENT, event);
        }
        if let Some(moving) = location.is_moving {
            position.set(model::KEY_MOTION, moving);
        }
        if let Some(odometer) = location.odometer {
            position.set(model::KEY_ODOMETER, odometer);
        }
        if let Some(mock) = location.mock {
            position.set("mock", mock);
        }
        if let Some(activity) = location.activity {
            position.set("activity", activity.kind);
        }
        if let Some(battery) = location.battery {
            if battery.level >= 0.0 {
                position.set(model::KEY_BATTERY_LEVEL, (battery.level * 100.0) as i64);
            }
            if battery.is_charging {
                position.set(model::KEY_CHARGE, true);
            }
        }
        if let Some(alarm) = location.alarm {
            position.set(model::KEY_ALARM, alarm);
        } else if let Some(alarm) = location.extras.and_then(|x| x.alarm) {
            position.set(model::KEY_ALARM, alarm);
        }

        Ok(Decoded::Accepted {
            position,
            response: None,
        })
    }

    /// Reuses the device's last known location when a report carried no
    /// coordinates. The position is marked outdated; when no previous fix
    /// exists it stays invalid at the origin with the fix time at the epoch.
    async fn last_location(
        &self,
        position: &mut Position,
        device_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if position.device_id == 0 {
            return Ok(());
        }
        position.outdated = true;
        position.device_time = Some(device_time.unwrap_or_else(Utc::now));
        match self.registry.last_position(position.device_id).await? {
            Some(last) => {
                position.fix_time = Some(last.fix_time);
                position.valid = last.valid;
                position.latitude = last.latitude;
                position.longitude = last.longitude;
                position.altitude = last.altitude;
                position.course = last.course;
                position.accuracy = last.accuracy;
            }
            None => {
                position.fix_time = Some(DateTime::UNIX_EPOCH);
                position.valid = false;
            }
        }
        Ok(())
    }
}

fn parse_float(value: &str, field: &str) -> Result<f64> {
    value
        .parse()
        .with_context(|| format!("malformed {field}: {value}"))
}

fn parse_cell(value: &str) -> Result<CellTower> {
    let fields: Vec<&str> = value.split(',').collect();
    if fields.len() < 4 {
        bail!("malformed cell tuple: {value}");
    }
    let mcc: i32 = fields[0].parse().context("malformed cell mcc")?;
    let mnc: i32 = fields[1].parse().context("malformed cell mnc")?;
    let lac: i32 = fields[2].parse().context("malformed cell lac")?;
    let cid: i64 = fields[3].parse().context("malformed cell id")?;
    if fields.len() > 4 {
        let signal: i32 = fields[4].parse().context("malformed cell signal")?;
        Ok(CellTower::with_signal(mcc, mnc, lac, cid, signal))
    } else {
        Ok(CellTower::new(mcc, mnc, lac, cid))
    }
}

fn parse_wifi(value: &str) -> Result<WifiAccessPoint> {
    let (mac, signal) = value
        .split_once(',')
        .with_context(|| format!("malformed wifi pair: {value}"))?;
    let signal: i32 = signal.parse().context("malformed wifi signal")?;
    Ok(WifiAccessPoint::new(mac.replace('-', ":"), signal))
}

/// Serde representation of the JSON wire format. Unrecognized fields are
/// ignored, not stored.
#[derive(Deserialize)]
struct JsonReport {
    device_id: String,
    location: JsonLocation,
}

#[derive(Deserialize)]
struct JsonLocation {
    timestamp: String,
    coords: Option<JsonCoords>,
    event: Option<String>,
    is_moving: Option<bool>,
    odometer: Option<i64>,
    mock: Option<bool>,
    activity: Option<JsonActivity>,
    battery: Option<JsonBattery>,
    alarm: Option<String>,
    extras: Option<JsonExtras>,
}

#[derive(Deserialize)]
struct JsonCoords {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    heading: Option<f64>,
    accuracy: f64,
    altitude: f64,
}

#[derive(Deserialize)]
struct JsonActivity {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct JsonBattery {
    level: f64,
    #[serde(default)]
    is_charging: bool,
}

#[derive(Deserialize)]
struct JsonExtras {
    alarm: Option<String>,
}
