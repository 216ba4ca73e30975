//! Device identity resolution and fix storage.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::model::Position;

/// Resolved binding between a wire-level identifier and an internal device,
/// valid for the current request.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSession {
    pub device_id: i64,
}

/// The subset of a stored fix that is reused when a report carries no
/// coordinates.
#[derive(Debug, Clone, Copy)]
pub struct LastFix {
    pub fix_time: DateTime<Utc>,
    pub valid: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub course: Option<f64>,
    pub accuracy: Option<f64>,
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Maps a wire-level identifier to a device session. `None` means the
    /// identifier is unknown, an expected outcome rather than a fault.
    async fn resolve(&self, unique_id: &str) -> Result<Option<DeviceSession>>;

    /// Most recent stored fix for a device, if any.
    async fn last_position(&self, device_id: i64) -> Result<Option<LastFix>>;

    /// Hands an accepted position to the rest of the pipeline.
    async fn record(&self, position: &Position) -> Result<()>;
}

pub struct PgDeviceRegistry {
    pool: PgPool,
}

impl PgDeviceRegistry {
    pub fn new(pool: PgPool) -> Self {
        PgDeviceRegistry { pool }
    }
}

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn resolve(&self, unique_id: &str) -> Result<Option<DeviceSession>> {
        let row = sqlx::query("select id from device where unique_id = $1")
            .bind(unique_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| DeviceSession {
            device_id: row.get("id"),
        }))
    }

    async fn last_position(&self, device_id: i64) -> Result<Option<LastFix>> {
        let row = sqlx::query(
            "select fix_time, valid, latitude, longitude, altitude, course, accuracy \
             from fix where device_id = $1 order by fix_time desc limit 1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| LastFix {
            fix_time: row.get("fix_time"),
            valid: row.get("valid"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            altitude: row.get("altitude"),
            course: row.get("course"),
            accuracy: row.get("accuracy"),
        }))
    }

    async fn record(&self, position: &Position) -> Result<()> {
        sqlx::query(
            "insert into fix (device_id, protocol, device_time, fix_time, outdated, valid, \
             latitude, longitude, altitude, speed, course, accuracy, network, attributes) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(position.device_id)
        .bind(position.protocol)
        .bind(position.device_time)
        .bind(position.fix_time)
        .bind(position.outdated)
        .bind(position.valid)
        .bind(position.latitude)
        .bind(position.longitude)
        .bind(position.altitude)
        .bind(position.speed)
        .bind(position.course)
        .bind(position.accuracy)
        .bind(
            position
                .network
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(serde_json::to_value(&position.attributes)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
