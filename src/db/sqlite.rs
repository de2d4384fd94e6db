use crate::db::schema::SQLITE_INIT;
use crate::error::VetdeskError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

pub type SqlitePool = Pool<Sqlite>;

/// Typed storage functions over the clinic database.
///
/// Each area (clinic, staff, commerce, relay, integrations) adds its own
/// `impl Storage` block in a sibling module.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, VetdeskError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        info!(database_url, "storage ready");
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), VetdeskError> {
        // sqlx::query runs a single statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }
}

impl Storage {
    /// NotFound unless `table` holds a row with this id.
    pub(crate) async fn ensure_exists(
        &self,
        table: &'static str,
        entity: &'static str,
        id: i64,
    ) -> Result<(), VetdeskError> {
        let found: Option<(i64,)> = sqlx::query_as(&format!("SELECT id FROM {table} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        found
            .map(|_| ())
            .ok_or_else(|| VetdeskError::not_found(entity, id))
    }
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), VetdeskError> {
    if value.trim().is_empty() {
        return Err(VetdeskError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

pub(crate) fn require_non_negative(field: &str, value: i64) -> Result<(), VetdeskError> {
    if value < 0 {
        return Err(VetdeskError::validation(format!(
            "{field} must not be negative"
        )));
    }
    Ok(())
}

pub(crate) fn check_opt<T>(
    value: Option<T>,
    check: impl FnOnce(T) -> Result<(), VetdeskError>,
) -> Result<(), VetdeskError> {
    value.map_or(Ok(()), check)
}
