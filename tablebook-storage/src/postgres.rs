//! PostgreSQL record store.
//!
//! Uses deadpool-postgres for pooling. The active-slot invariant is enforced
//! by a partial unique index, so a lost race surfaces as
//! `StorageError::SlotTaken` even when both writers passed the conflict check.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tablebook_core::{
    new_entity_id, EngineError, EngineResult, EntityId, MonthCounts, MonthWindow,
    NewReservation, NewTable, NewUser, PeakSlot, PopularTable, Reservation, ReservationFilter,
    ReservationPatch, ReservationStatus, SlotTime, StorageError, Table, TableAvailabilityFilter,
    User, UserPatch, ValidationError, YearMonth,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::query::{self, SqlParam};
use crate::store::{RecordStore, TableRef};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Time to wait for a pooled connection
    pub timeout: Duration,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "tablebook".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PgConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("TABLEBOOK_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("TABLEBOOK_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("TABLEBOOK_DB_NAME").unwrap_or_else(|_| "tablebook".to_string()),
            user: std::env::var("TABLEBOOK_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("TABLEBOOK_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("TABLEBOOK_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("TABLEBOOK_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> EngineResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| EngineError::Internal(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          UUID PRIMARY KEY,
    email       TEXT NOT NULL,
    name        TEXT NOT NULL,
    phone       TEXT,
    photo       TEXT,
    role        TEXT NOT NULL DEFAULT 'user',
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users (lower(email));

CREATE TABLE IF NOT EXISTS tables (
    id            UUID PRIMARY KEY,
    number        TEXT NOT NULL UNIQUE,
    capacity      INT4 NOT NULL CHECK (capacity > 0),
    is_available  BOOLEAN NOT NULL DEFAULT TRUE,
    location      TEXT NOT NULL DEFAULT 'main',
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS reservations (
    id                UUID PRIMARY KEY,
    user_id           UUID NOT NULL,
    guest_name        TEXT NOT NULL,
    guest_phone       TEXT NOT NULL,
    guest_email       TEXT NOT NULL,
    date              DATE NOT NULL,
    time              TIME NOT NULL,
    guests            INT4 NOT NULL CHECK (guests > 0),
    table_number      TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'pending',
    special_requests  TEXT,
    created_at        TIMESTAMPTZ NOT NULL,
    updated_at        TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS reservations_active_slot_key
    ON reservations (table_number, date, time)
    WHERE status IN ('pending', 'confirmed');
CREATE INDEX IF NOT EXISTS reservations_user_idx ON reservations (user_id);
CREATE INDEX IF NOT EXISTS reservations_date_idx ON reservations (date);
"#;

const ACTIVE_SLOT_INDEX: &str = "reservations_active_slot_key";

const TABLE_COLUMNS: &str = "id, number, capacity, is_available, location, created_at, updated_at";

const RESERVATION_COLUMNS: &str = "id, user_id, guest_name, guest_phone, guest_email, date, \
     time, guests, table_number, status, special_requests, created_at, updated_at";

const USER_COLUMNS: &str = "id, email, name, phone, photo, role, created_at, updated_at";

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn is_transient_state(state: &SqlState) -> bool {
    let code = state.code();
    code.starts_with("08")
        || code.starts_with("53")
        || code.starts_with("57P")
        || *state == SqlState::T_R_SERIALIZATION_FAILURE
        || *state == SqlState::T_R_DEADLOCK_DETECTED
}

/// Map a driver error. `slot` names the reservation slot being written, if
/// any, so a unique violation on the active-slot index becomes `SlotTaken`.
fn map_pg(e: tokio_postgres::Error, slot: Option<(&str, NaiveDate, SlotTime)>) -> EngineError {
    let Some(db) = e.as_db_error() else {
        return StorageError::Unavailable {
            reason: e.to_string(),
        }
        .into();
    };
    if *db.code() == SqlState::UNIQUE_VIOLATION {
        if db.constraint() == Some(ACTIVE_SLOT_INDEX) {
            if let Some((table_number, date, time)) = slot {
                return StorageError::SlotTaken {
                    table_number: table_number.to_string(),
                    date,
                    time,
                }
                .into();
            }
        }
        let entity = match db.table() {
            Some("tables") => "table",
            Some("users") => "user",
            _ => "reservation",
        };
        return StorageError::Duplicate {
            entity,
            reason: db.message().to_string(),
        }
        .into();
    }
    if *db.code() == SqlState::CHECK_VIOLATION {
        let field = db.constraint().map_or("value", check_field);
        return ValidationError::InvalidValue {
            field: field.to_string(),
            reason: db.message().to_string(),
        }
        .into();
    }
    if is_transient_state(db.code()) {
        return StorageError::Unavailable {
            reason: db.message().to_string(),
        }
        .into();
    }
    EngineError::Internal(db.message().to_string())
}

/// Column named by a default `{table}_{column}_check` constraint.
fn check_field(constraint: &str) -> &str {
    let column = constraint.strip_suffix("_check").unwrap_or(constraint);
    ["tables_", "reservations_", "users_"]
        .iter()
        .find_map(|table| column.strip_prefix(table))
        .unwrap_or(column)
}

fn corrupt(e: impl std::fmt::Display) -> EngineError {
    StorageError::Corrupt {
        reason: e.to_string(),
    }
    .into()
}

fn table_from_row(row: &Row) -> EngineResult<Table> {
    let location: String = row.try_get("location").map_err(corrupt)?;
    Ok(Table {
        id: row.try_get("id").map_err(corrupt)?,
        number: row.try_get("number").map_err(corrupt)?,
        capacity: row.try_get("capacity").map_err(corrupt)?,
        is_available: row.try_get("is_available").map_err(corrupt)?,
        location: location.parse().map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
    })
}

fn reservation_from_row(row: &Row) -> EngineResult<Reservation> {
    let status: String = row.try_get("status").map_err(corrupt)?;
    let time: NaiveTime = row.try_get("time").map_err(corrupt)?;
    Ok(Reservation {
        id: row.try_get("id").map_err(corrupt)?,
        user_id: row.try_get("user_id").map_err(corrupt)?,
        guest_name: row.try_get("guest_name").map_err(corrupt)?,
        guest_phone: row.try_get("guest_phone").map_err(corrupt)?,
        guest_email: row.try_get("guest_email").map_err(corrupt)?,
        date: row.try_get("date").map_err(corrupt)?,
        time: SlotTime::from_naive(time),
        guests: row.try_get("guests").map_err(corrupt)?,
        table_number: row.try_get("table_number").map_err(corrupt)?,
        status: status.parse().map_err(corrupt)?,
        special_requests: row.try_get("special_requests").map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
    })
}

fn user_from_row(row: &Row) -> EngineResult<User> {
    let role: String = row.try_get("role").map_err(corrupt)?;
    Ok(User {
        id: row.try_get("id").map_err(corrupt)?,
        email: row.try_get("email").map_err(corrupt)?,
        name: row.try_get("name").map_err(corrupt)?,
        phone: row.try_get("phone").map_err(corrupt)?,
        photo: row.try_get("photo").map_err(corrupt)?,
        role: role.parse().map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
    })
}

fn counts_from_row(row: &Row) -> EngineResult<MonthCounts> {
    Ok(MonthCounts {
        total: row.try_get("total").map_err(corrupt)?,
        completed: row.try_get("completed").map_err(corrupt)?,
        cancelled: row.try_get("cancelled").map_err(corrupt)?,
    })
}

fn pg_params(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(SqlParam::as_pg).collect()
}

fn not_found(entity: &'static str, id: EntityId) -> EngineError {
    StorageError::NotFound {
        entity,
        key: id.to_string(),
    }
    .into()
}

// ============================================================================
// STORE
// ============================================================================

/// [`RecordStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: Pool,
}

impl PgRecordStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &PgConfig) -> EngineResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> EngineResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA)
            .await
            .map_err(|e| map_pg(e, None))?;
        tracing::info!("record store schema ensured");
        Ok(())
    }

    async fn get_conn(&self) -> EngineResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::Unavailable {
                reason: e.to_string(),
            }
            .into()
        })
    }

    async fn fetch_reservation(&self, id: EntityId) -> EngineResult<Option<Reservation>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM reservations WHERE id = $1", RESERVATION_COLUMNS);
        conn.query_opt(sql.as_str(), &[&id])
            .await
            .map_err(|e| map_pg(e, None))?
            .as_ref()
            .map(reservation_from_row)
            .transpose()
    }

    async fn aggregate_ranked(
        &self,
        sql: &str,
        window: MonthWindow,
        limit: usize,
    ) -> EngineResult<Vec<Row>> {
        let conn = self.get_conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        conn.query(sql, &[&window.start, &window.end_exclusive, &limit])
            .await
            .map_err(|e| map_pg(e, None))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn create_table(&self, table: &NewTable) -> EngineResult<Table> {
        let conn = self.get_conn().await?;
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO tables ({}) VALUES ($1, $2, $3, TRUE, $4, $5, $5) RETURNING {}",
            TABLE_COLUMNS, TABLE_COLUMNS
        );
        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &new_entity_id(),
                    &table.number,
                    &table.capacity,
                    &table.location.as_str(),
                    &now,
                ],
            )
            .await
            .map_err(|e| map_pg(e, None))?;
        table_from_row(&row)
    }

    async fn get_table(&self, by: &TableRef) -> EngineResult<Option<Table>> {
        let conn = self.get_conn().await?;
        let row = match by {
            TableRef::Id(id) => {
                let sql = format!("SELECT {} FROM tables WHERE id = $1", TABLE_COLUMNS);
                conn.query_opt(sql.as_str(), &[id]).await
            }
            TableRef::Number(number) => {
                let sql = format!("SELECT {} FROM tables WHERE number = $1", TABLE_COLUMNS);
                conn.query_opt(sql.as_str(), &[number]).await
            }
        }
        .map_err(|e| map_pg(e, None))?;
        row.as_ref().map(table_from_row).transpose()
    }

    async fn list_tables(&self) -> EngineResult<Vec<Table>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM tables ORDER BY number", TABLE_COLUMNS);
        conn.query(sql.as_str(), &[])
            .await
            .map_err(|e| map_pg(e, None))?
            .iter()
            .map(table_from_row)
            .collect()
    }

    async fn list_available_tables(
        &self,
        filter: &TableAvailabilityFilter,
    ) -> EngineResult<Vec<Table>> {
        let conn = self.get_conn().await?;
        let builder = query::availability_filter(filter);
        let columns: Vec<String> = TABLE_COLUMNS
            .split(", ")
            .map(|c| format!("t.{}", c))
            .collect();
        let sql = format!(
            "SELECT {} FROM tables t{} ORDER BY t.number",
            columns.join(", "),
            builder.where_clause()
        );
        conn.query(sql.as_str(), &pg_params(builder.params()))
            .await
            .map_err(|e| map_pg(e, None))?
            .iter()
            .map(table_from_row)
            .collect()
    }

    async fn update_table_availability(
        &self,
        id: EntityId,
        is_available: bool,
    ) -> EngineResult<Table> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE tables SET is_available = $1, updated_at = $2 WHERE id = $3 RETURNING {}",
            TABLE_COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&is_available, &Utc::now(), &id])
            .await
            .map_err(|e| map_pg(e, None))?
            .ok_or_else(|| not_found("table", id))?;
        table_from_row(&row)
    }

    async fn create_reservation(&self, new: &NewReservation) -> EngineResult<Reservation> {
        let conn = self.get_conn().await?;
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO reservations ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, $11, $11) RETURNING {}",
            RESERVATION_COLUMNS, RESERVATION_COLUMNS
        );
        let time = new.time.as_naive();
        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &new_entity_id(),
                    &new.user_id,
                    &new.guest_name,
                    &new.guest_phone,
                    &new.guest_email,
                    &new.date,
                    &time,
                    &new.guests,
                    &new.table_number,
                    &new.special_requests,
                    &now,
                ],
            )
            .await
            .map_err(|e| map_pg(e, Some((new.table_number.as_str(), new.date, new.time))))?;
        reservation_from_row(&row)
    }

    async fn get_reservation(&self, id: EntityId) -> EngineResult<Option<Reservation>> {
        self.fetch_reservation(id).await
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> EngineResult<Vec<Reservation>> {
        let conn = self.get_conn().await?;
        let builder = query::reservation_filter(filter);
        let sql = format!(
            "SELECT {} FROM reservations{} ORDER BY date DESC, time DESC, created_at DESC",
            RESERVATION_COLUMNS,
            builder.where_clause()
        );
        conn.query(sql.as_str(), &pg_params(builder.params()))
            .await
            .map_err(|e| map_pg(e, None))?
            .iter()
            .map(reservation_from_row)
            .collect()
    }

    async fn update_reservation(
        &self,
        id: EntityId,
        patch: &ReservationPatch,
    ) -> EngineResult<Reservation> {
        if patch.is_empty() {
            return self
                .fetch_reservation(id)
                .await?
                .ok_or_else(|| not_found("reservation", id));
        }
        let mut builder = query::reservation_patch(patch, Utc::now());
        let id_p = builder.bind(SqlParam::Uuid(id));
        builder.and(format!("id = {}", id_p));
        let sql = format!(
            "UPDATE reservations SET {}{} RETURNING {}",
            builder.set_clause(),
            builder.where_clause(),
            RESERVATION_COLUMNS
        );

        // The target slot is only known after merging with the current row.
        let target = if patch.table_number.is_some() || patch.date.is_some() || patch.time.is_some()
        {
            self.fetch_reservation(id)
                .await?
                .map(|current| patch.apply_to(&current))
        } else {
            None
        };

        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(sql.as_str(), &pg_params(builder.params()))
            .await
            .map_err(|e| map_pg(e, target.as_ref().map(Reservation::slot)))?
            .ok_or_else(|| not_found("reservation", id))?;
        reservation_from_row(&row)
    }

    async fn update_reservation_status(
        &self,
        id: EntityId,
        status: ReservationStatus,
    ) -> EngineResult<Reservation> {
        let current = self
            .fetch_reservation(id)
            .await?
            .ok_or_else(|| not_found("reservation", id))?;
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE reservations SET status = $1, updated_at = $2 WHERE id = $3 RETURNING {}",
            RESERVATION_COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&status.as_str(), &Utc::now(), &id])
            .await
            .map_err(|e| map_pg(e, Some(current.slot())))?
            .ok_or_else(|| not_found("reservation", id))?;
        reservation_from_row(&row)
    }

    async fn delete_reservation(&self, id: EntityId) -> EngineResult<Reservation> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "DELETE FROM reservations WHERE id = $1 RETURNING {}",
            RESERVATION_COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&id])
            .await
            .map_err(|e| map_pg(e, None))?
            .ok_or_else(|| not_found("reservation", id))?;
        reservation_from_row(&row)
    }

    async fn check_conflict(
        &self,
        table_number: &str,
        date: NaiveDate,
        time: SlotTime,
    ) -> EngineResult<bool> {
        let conn = self.get_conn().await?;
        let time = time.as_naive();
        let row = conn
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM reservations \
                 WHERE table_number = $1 AND date = $2 AND time = $3 \
                 AND status IN ('pending', 'confirmed'))",
                &[&table_number, &date, &time],
            )
            .await
            .map_err(|e| map_pg(e, None))?;
        row.try_get(0).map_err(corrupt)
    }

    async fn aggregate_overview(&self) -> EngineResult<Vec<(YearMonth, MonthCounts)>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT to_char(date, 'YYYY-MM') AS month, \
                 COUNT(*) AS total, \
                 COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
                 COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled \
                 FROM reservations GROUP BY 1 ORDER BY 1 DESC",
                &[],
            )
            .await
            .map_err(|e| map_pg(e, None))?;
        rows.iter()
            .map(|row| -> EngineResult<(YearMonth, MonthCounts)> {
                let month: String = row.try_get("month").map_err(corrupt)?;
                Ok((month.parse().map_err(corrupt)?, counts_from_row(row)?))
            })
            .collect()
    }

    async fn aggregate_monthly(&self, window: MonthWindow) -> EngineResult<MonthCounts> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) AS total, \
                 COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
                 COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled \
                 FROM reservations WHERE date >= $1 AND date < $2",
                &[&window.start, &window.end_exclusive],
            )
            .await
            .map_err(|e| map_pg(e, None))?;
        counts_from_row(&row)
    }

    async fn aggregate_popular_tables(
        &self,
        window: MonthWindow,
        limit: usize,
    ) -> EngineResult<Vec<PopularTable>> {
        let rows = self
            .aggregate_ranked(
                "SELECT table_number, COUNT(*) AS count FROM reservations \
                 WHERE status = 'completed' AND date >= $1 AND date < $2 \
                 GROUP BY table_number ORDER BY count DESC, table_number ASC LIMIT $3",
                window,
                limit,
            )
            .await?;
        rows.iter()
            .map(|row| -> EngineResult<PopularTable> {
                Ok(PopularTable {
                    table_number: row.try_get("table_number").map_err(corrupt)?,
                    count: row.try_get("count").map_err(corrupt)?,
                })
            })
            .collect()
    }

    async fn aggregate_peak_slots(
        &self,
        window: MonthWindow,
        limit: usize,
    ) -> EngineResult<Vec<PeakSlot>> {
        let rows = self
            .aggregate_ranked(
                "SELECT time, COUNT(*) AS count FROM reservations \
                 WHERE status = 'completed' AND date >= $1 AND date < $2 \
                 GROUP BY time ORDER BY count DESC, time ASC LIMIT $3",
                window,
                limit,
            )
            .await?;
        rows.iter()
            .map(|row| -> EngineResult<PeakSlot> {
                let time: NaiveTime = row.try_get("time").map_err(corrupt)?;
                Ok(PeakSlot {
                    time: SlotTime::from_naive(time),
                    count: row.try_get("count").map_err(corrupt)?,
                })
            })
            .collect()
    }

    async fn create_user(&self, user: &NewUser) -> EngineResult<User> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "INSERT INTO users ({}) VALUES ($1, $2, $3, $4, NULL, $5, $6, $6) RETURNING {}",
            USER_COLUMNS, USER_COLUMNS
        );
        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &new_entity_id(),
                    &user.email,
                    &user.name,
                    &user.phone,
                    &user.role.as_str(),
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| map_pg(e, None))?;
        user_from_row(&row)
    }

    async fn get_user(&self, id: EntityId) -> EngineResult<Option<User>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        conn.query_opt(sql.as_str(), &[&id])
            .await
            .map_err(|e| map_pg(e, None))?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> EngineResult<Option<User>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
        conn.query_opt(sql.as_str(), &[&email])
            .await
            .map_err(|e| map_pg(e, None))?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn update_user(&self, id: EntityId, patch: &UserPatch) -> EngineResult<User> {
        let mut builder = query::user_patch(patch, Utc::now());
        let id_p = builder.bind(SqlParam::Uuid(id));
        builder.and(format!("id = {}", id_p));
        let sql = format!(
            "UPDATE users SET {}{} RETURNING {}",
            builder.set_clause(),
            builder.where_clause(),
            USER_COLUMNS
        );
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(sql.as_str(), &pg_params(builder.params()))
            .await
            .map_err(|e| map_pg(e, None))?
            .ok_or_else(|| not_found("user", id))?;
        user_from_row(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_constraint_names_column() {
        assert_eq!(check_field("tables_capacity_check"), "capacity");
        assert_eq!(check_field("reservations_guests_check"), "guests");
        assert_eq!(check_field("custom"), "custom");
    }
}
