//! SQLite-backed registry store
//!
//! Persists the server snapshot in a single `servers` table. Quarter
//! schedules are stored as a JSON document per record; the engine only
//! ever reads and replaces whole snapshots, so there is no per-field
//! update surface to keep normalized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{error, info};

use super::{QuarterMap, Registry, ServerRecord, ServerStatus};
use crate::errors::PersistenceError;

pub struct SqliteRegistry {
    pool: Pool<Sqlite>,
}

impl SqliteRegistry {
    /// Expose pool for integration test queries
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self, PersistenceError> {
        info!("Opening registry database at {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("Failed to create registry directory {:?}: {}", parent, e);
                return Err(PersistenceError::ConnectionFailed {
                    reason: e.to_string(),
                });
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = SqlitePool::connect(&database_url).await.map_err(|e| {
            error!("Failed to connect registry database: {}", e);
            PersistenceError::ConnectionFailed {
                reason: e.to_string(),
            }
        })?;

        let registry = Self { pool };
        registry.initialize_tables().await?;
        info!("Registry database ready");
        Ok(registry)
    }

    async fn initialize_tables(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS servers (
                name TEXT PRIMARY KEY,
                timezone TEXT NOT NULL,
                host_group TEXT NOT NULL,
                schedules TEXT NOT NULL,
                status TEXT NOT NULL,
                primary_owner TEXT NOT NULL,
                secondary_owner TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::ConnectionFailed {
            reason: format!("table initialization failed: {}", e),
        })?;

        Ok(())
    }

    fn parse_status(raw: &str) -> Result<ServerStatus, PersistenceError> {
        serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|_| {
            PersistenceError::ReadFailed {
                reason: format!("unknown server status '{}'", raw),
            }
        })
    }
}

#[async_trait]
impl Registry for SqliteRegistry {
    async fn read_all(&self) -> Result<Vec<ServerRecord>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM servers ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersistenceError::ReadFailed {
                reason: e.to_string(),
            })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let schedules_json: String =
                row.try_get("schedules").map_err(|e| PersistenceError::ReadFailed {
                    reason: e.to_string(),
                })?;
            let schedules: QuarterMap =
                serde_json::from_str(&schedules_json).map_err(|e| PersistenceError::ReadFailed {
                    reason: format!("schedule document corrupt: {}", e),
                })?;

            let status_raw: String =
                row.try_get("status").map_err(|e| PersistenceError::ReadFailed {
                    reason: e.to_string(),
                })?;

            let created_at: DateTime<Utc> =
                row.try_get("created_at").map_err(|e| PersistenceError::ReadFailed {
                    reason: e.to_string(),
                })?;
            let updated_at: DateTime<Utc> =
                row.try_get("updated_at").map_err(|e| PersistenceError::ReadFailed {
                    reason: e.to_string(),
                })?;

            records.push(ServerRecord {
                name: row.try_get("name").map_err(|e| PersistenceError::ReadFailed {
                    reason: e.to_string(),
                })?,
                timezone: row
                    .try_get("timezone")
                    .map_err(|e| PersistenceError::ReadFailed {
                        reason: e.to_string(),
                    })?,
                host_group: row
                    .try_get("host_group")
                    .map_err(|e| PersistenceError::ReadFailed {
                        reason: e.to_string(),
                    })?,
                schedules,
                status: Self::parse_status(&status_raw)?,
                primary_owner: row
                    .try_get("primary_owner")
                    .map_err(|e| PersistenceError::ReadFailed {
                        reason: e.to_string(),
                    })?,
                secondary_owner: row
                    .try_get("secondary_owner")
                    .map_err(|e| PersistenceError::ReadFailed {
                        reason: e.to_string(),
                    })?,
                created_at,
                updated_at,
            });
        }

        Ok(records)
    }

    async fn write_all(&self, records: &[ServerRecord]) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await.map_err(|e| PersistenceError::WriteFailed {
            reason: e.to_string(),
        })?;

        // Full snapshot replace: the engine never patches partial fields.
        sqlx::query("DELETE FROM servers")
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::WriteFailed {
                reason: e.to_string(),
            })?;

        for record in records {
            let schedules_json =
                serde_json::to_string(&record.schedules).map_err(|e| PersistenceError::WriteFailed {
                    reason: format!("schedule serialization failed: {}", e),
                })?;

            sqlx::query(
                r#"
                INSERT INTO servers
                    (name, timezone, host_group, schedules, status,
                     primary_owner, secondary_owner, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.name)
            .bind(&record.timezone)
            .bind(&record.host_group)
            .bind(&schedules_json)
            .bind(record.status.as_str())
            .bind(&record.primary_owner)
            .bind(&record.secondary_owner)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::WriteFailed {
                reason: e.to_string(),
            })?;
        }

        tx.commit().await.map_err(|e| PersistenceError::WriteFailed {
            reason: e.to_string(),
        })?;

        Ok(())
    }
}
