//! Outbound command queue, drained by piggybacking on device reports.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

/// A queued instruction for a device. `data` is the raw payload written
/// into the response body when the command is piggybacked.
#[derive(Debug, Clone)]
pub struct Command {
    pub device_id: i64,
    pub command_type: String,
    pub data: Option<String>,
}

#[async_trait]
pub trait CommandQueue: Send + Sync {
    /// One-shot dequeue of at most `limit` queued commands for a device.
    /// Returned commands are consumed and will not be returned again.
    async fn dequeue(&self, device_id: i64, limit: i64) -> Result<Vec<Command>>;

    /// Stores the push-notification token reported by the device agent.
    async fn update_notification_token(&self, device_id: i64, token: &str) -> Result<()>;
}

pub struct PgCommandQueue {
    pool: PgPool,
}

impl PgCommandQueue {
    pub fn new(pool: PgPool) -> Self {
        PgCommandQueue { pool }
    }
}

#[async_trait]
impl CommandQueue for PgCommandQueue {
    async fn dequeue(&self, device_id: i64, limit: i64) -> Result<Vec<Command>> {
        let rows = sqlx::query(
            "delete from command_queue where id in \
             (select id from command_queue where device_id = $1 order by id limit $2) \
             returning device_id, command_type, data",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| Command {
                device_id: row.get("device_id"),
                command_type: row.get("command_type"),
                data: row.get("data"),
            })
            .collect())
    }

    async fn update_notification_token(&self, device_id: i64, token: &str) -> Result<()> {
        sqlx::query("update device set notification_token = $2 where id = $1")
            .bind(device_id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
