//! `PostgreSQL` implementation of the `EventLog` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use chronicle_core::datetime::Datetime;
use chronicle_core::error::DomainError;
use chronicle_core::event::EventRecord;
use chronicle_core::identifier::Identifier;

use crate::log::{EventLog, batch_horizon, check_horizon};
use crate::schema::{DEFAULT_EVENTS_TABLE, create_events_table, validate_table_name};

const COLUMNS: &str = "id, record_date, name, emitter_id, emitter_class_name, payload";

fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

fn uuids(ids: &[Identifier]) -> Vec<Uuid> {
    ids.iter().map(Identifier::as_uuid).collect()
}

fn record_from_row(row: &PgRow) -> Result<EventRecord, DomainError> {
    let payload = match row.try_get::<Value, _>("payload").map_err(infrastructure)? {
        Value::Object(map) => map,
        other => {
            return Err(DomainError::PayloadDecode(format!(
                "stored payload is not a tagged map: {other}"
            )));
        }
    };
    Ok(EventRecord {
        id: row.try_get("id").map_err(infrastructure)?,
        record_date: Datetime::from(row.try_get::<DateTime<Utc>, _>("record_date").map_err(infrastructure)?),
        name: row.try_get("name").map_err(infrastructure)?,
        emitter_id: Identifier::from(row.try_get::<Uuid, _>("emitter_id").map_err(infrastructure)?),
        emitter_class_name: row.try_get("emitter_class_name").map_err(infrastructure)?,
        payload,
    })
}

/// PostgreSQL-backed event log.
///
/// Appends for one emitter are serialized by a transaction-scoped advisory
/// lock keyed on the emitter, so the concurrency check and the insert see
/// the same history.
#[derive(Debug, Clone)]
pub struct PgEventLog {
    pool: PgPool,
    table: String,
}

impl PgEventLog {
    /// Creates a log over the default `events` table.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: DEFAULT_EVENTS_TABLE.to_owned(),
        }
    }

    /// Creates a log over `table`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `table` is not a plain SQL
    /// identifier.
    pub fn with_table(pool: PgPool, table: &str) -> Result<Self, DomainError> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_owned(),
        })
    }

    /// Returns the events table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the events table and its indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on database failure.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(&create_events_table(&self.table))
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        debug!("events table ready");
        Ok(())
    }

    async fn insert_all(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        records: &[EventRecord],
    ) -> Result<(), DomainError> {
        let sql = format!("INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)", self.table);
        for record in records {
            sqlx::query(&sql)
                .bind(record.id)
                .bind(record.record_date.as_chrono())
                .bind(&record.name)
                .bind(record.emitter_id.as_uuid())
                .bind(&record.emitter_class_name)
                .bind(Value::Object(record.payload.clone()))
                .execute(&mut **tx)
                .await
                .map_err(infrastructure)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn append(&self, emitter_id: Identifier, records: Vec<EventRecord>) -> Result<(), DomainError> {
        let attempted = batch_horizon(emitter_id, &records)?;
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
            .bind(emitter_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(infrastructure)?;

        let last_recorded: Option<DateTime<Utc>> = sqlx::query_scalar(&format!(
            "SELECT MAX(record_date) FROM {} WHERE emitter_id = $1",
            self.table
        ))
        .bind(emitter_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(infrastructure)?;
        check_horizon(emitter_id, last_recorded.map(Datetime::from), attempted)?;

        self.insert_all(&mut tx, &records).await?;
        tx.commit().await.map_err(infrastructure)?;
        debug!("appended events");
        Ok(())
    }

    async fn emitter_ids(&self, emitter_type: &str) -> Result<Vec<Identifier>, DomainError> {
        let sql = format!(
            "SELECT emitter_id FROM {} WHERE emitter_class_name = $1 GROUP BY emitter_id ORDER BY MIN(seq)",
            self.table
        );
        let ids: Vec<Uuid> = sqlx::query_scalar(&sql)
            .bind(emitter_type)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(ids.into_iter().map(Identifier::from).collect())
    }

    #[instrument(skip(self, emitter_ids), fields(emitters = emitter_ids.len()))]
    async fn load(&self, emitter_type: &str, emitter_ids: &[Identifier]) -> Result<Vec<EventRecord>, DomainError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE emitter_class_name = $1 AND emitter_id = ANY($2) \
             ORDER BY record_date, seq",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(emitter_type)
            .bind(uuids(emitter_ids))
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn erase(&self, emitter_ids: &[Identifier]) -> Result<u64, DomainError> {
        let sql = format!("DELETE FROM {} WHERE emitter_id = ANY($1)", self.table);
        let result = sqlx::query(&sql)
            .bind(uuids(emitter_ids))
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(result.rows_affected())
    }

    async fn by_name(&self, name: &str) -> Result<Vec<EventRecord>, DomainError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE name = $1 ORDER BY record_date, seq",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn remove_events(&self, ids: &[Uuid]) -> Result<u64, DomainError> {
        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", self.table);
        let result = sqlx::query(&sql)
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(result.rows_affected())
    }

    async fn insert_events(&self, records: Vec<EventRecord>) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infrastructure)?;
        self.insert_all(&mut tx, &records).await?;
        tx.commit().await.map_err(infrastructure)
    }
}
