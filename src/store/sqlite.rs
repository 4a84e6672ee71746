//! SQLite-backed registration store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool};
use tracing::{debug, info};

use super::{RegistrationRecord, RegistrationStore, StoreError};

/// Attempts for operations that hit SQLite lock contention before the error
/// is treated as persistent.
const TRANSIENT_RETRIES: u32 = 5;
const TRANSIENT_BACKOFF: Duration = Duration::from_millis(50);

pub struct SqliteRegistrationStore {
    pool: SqlitePool,
}

impl SqliteRegistrationStore {
    /// Connect to (creating if missing) the database and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if !Sqlite::database_exists(database_url).await? {
            info!("creating registration database at {}", database_url);
            Sqlite::create_database(database_url).await?;
        }
        let pool = SqlitePool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Runs `op` with bounded retries on lock/busy errors, which SQLite
    /// reports under concurrent writers. Persistent errors surface as-is.
    async fn with_transient_retry<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < TRANSIENT_RETRIES => {
                    attempt += 1;
                    debug!(attempt, error = %err, "transient database error, retrying");
                    tokio::time::sleep(TRANSIENT_BACKOFF).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_ascii_lowercase();
            message.contains("locked") || message.contains("busy")
        }
        _ => false,
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RegistrationRecord, StoreError> {
    let parse_time = |column: &str| -> Result<DateTime<Utc>, StoreError> {
        let raw: String = row.get(column);
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|err| StoreError::Corrupt {
                reason: format!("bad {} timestamp: {}", column, err),
            })
    };
    Ok(RegistrationRecord {
        url: row.get("url"),
        request_id: row.get("request_id"),
        resolved_name: row.get("resolved_name"),
        access_token: row.get("access_token"),
        bot_id: row.get("bot_id"),
        setup_done: row.get::<i64, _>("setup_done") != 0,
        notified: row.get::<i64, _>("notified") != 0,
        replied: row.get::<i64, _>("replied") != 0,
        finished: row.get::<i64, _>("finished") != 0,
        created_at: parse_time("created_at")?,
        updated_at: parse_time("updated_at")?,
    })
}

#[async_trait]
impl RegistrationStore for SqliteRegistrationStore {
    async fn find(
        &self,
        url: &str,
        request_id: &str,
    ) -> Result<Option<RegistrationRecord>, StoreError> {
        let row = self
            .with_transient_retry(|| {
                sqlx::query(
                    r#"
                    SELECT url, request_id, resolved_name, access_token, bot_id,
                           setup_done, notified, replied, finished, created_at, updated_at
                    FROM registrations
                    WHERE url = ?1 AND request_id = ?2
                    "#,
                )
                .bind(url)
                .bind(request_id)
                .fetch_optional(&self.pool)
            })
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert(&self, record: &RegistrationRecord) -> Result<(), StoreError> {
        record.validate()?;
        if self.find(&record.url, &record.request_id).await?.is_some() {
            return Err(StoreError::Duplicate {
                url: record.url.clone(),
                request_id: record.request_id.clone(),
            });
        }
        self.with_transient_retry(|| {
            sqlx::query(
                r#"
                INSERT INTO registrations
                    (url, request_id, resolved_name, access_token, bot_id,
                     setup_done, notified, replied, finished, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&record.url)
            .bind(&record.request_id)
            .bind(&record.resolved_name)
            .bind(&record.access_token)
            .bind(&record.bot_id)
            .bind(record.setup_done as i64)
            .bind(record.notified as i64)
            .bind(record.replied as i64)
            .bind(record.finished as i64)
            .bind(record.created_at.to_rfc3339())
            .bind(record.updated_at.to_rfc3339())
            .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    async fn update(&self, record: &RegistrationRecord) -> Result<RegistrationRecord, StoreError> {
        record.validate()?;
        let existing = self
            .find(&record.url, &record.request_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                url: record.url.clone(),
                request_id: record.request_id.clone(),
            })?;
        existing.allows_transition_to(record)?;
        self.with_transient_retry(|| {
            sqlx::query(
                r#"
                UPDATE registrations
                SET resolved_name = ?3, access_token = ?4, bot_id = ?5,
                    setup_done = ?6, notified = ?7, replied = ?8, finished = ?9,
                    updated_at = ?10
                WHERE url = ?1 AND request_id = ?2
                "#,
            )
            .bind(&record.url)
            .bind(&record.request_id)
            .bind(&record.resolved_name)
            .bind(&record.access_token)
            .bind(&record.bot_id)
            .bind(record.setup_done as i64)
            .bind(record.notified as i64)
            .bind(record.replied as i64)
            .bind(record.finished as i64)
            .bind(record.updated_at.to_rfc3339())
            .execute(&self.pool)
        })
        .await?;
        // Hand back the stored version so callers observe their own write.
        self.find(&record.url, &record.request_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                url: record.url.clone(),
                request_id: record.request_id.clone(),
            })
    }

    async fn list_unfinished(&self) -> Result<Vec<RegistrationRecord>, StoreError> {
        let rows = self
            .with_transient_retry(|| {
                sqlx::query(
                    r#"
                    SELECT url, request_id, resolved_name, access_token, bot_id,
                           setup_done, notified, replied, finished, created_at, updated_at
                    FROM registrations
                    WHERE finished = 0
                    ORDER BY created_at ASC
                    "#,
                )
                .fetch_all(&self.pool)
            })
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}
