//! Parameterized SQL fragments built from typed filters and patches.
//!
//! Only fields that are actually set produce a predicate or an assignment,
//! and every value travels as a numbered parameter, never as SQL text.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tablebook_core::{ReservationFilter, ReservationPatch, TableAvailabilityFilter, UserPatch};
use uuid::Uuid;

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Uuid(Uuid),
    Text(String),
    Int(i32),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
}

/// Accumulates `SET` assignments and `WHERE` predicates that share one
/// parameter numbering.
#[derive(Debug, Default, Clone)]
pub struct SqlBuilder {
    assignments: Vec<String>,
    predicates: Vec<String>,
    params: Vec<SqlParam>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter and return its placeholder (`$n`).
    pub fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    /// Add a predicate verbatim. Values must already be bound.
    pub fn and(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.predicates.push(predicate.into());
        self
    }

    pub fn and_eq(&mut self, column: &str, param: SqlParam) -> &mut Self {
        let p = self.bind(param);
        self.and(format!("{} = {}", column, p))
    }

    /// `(a ILIKE $n OR b ILIKE $n ...)` with `%term%` bound once.
    pub fn and_ilike_any(&mut self, columns: &[&str], term: &str) -> &mut Self {
        if columns.is_empty() {
            return self;
        }
        let p = self.bind(SqlParam::Text(format!("%{}%", escape_like(term))));
        let ors: Vec<String> = columns
            .iter()
            .map(|c| format!("{} ILIKE {}", c, p))
            .collect();
        self.and(format!("({})", ors.join(" OR ")))
    }

    pub fn set(&mut self, column: &str, param: SqlParam) -> &mut Self {
        let p = self.bind(param);
        self.assignments.push(format!("{} = {}", column, p));
        self
    }

    /// `a = $1, b = $2`, or empty.
    pub fn set_clause(&self) -> String {
        self.assignments.join(", ")
    }

    /// ` WHERE p1 AND p2`, or empty when there are no predicates.
    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

const ACTIVE_STATUS_SQL: &str = "('pending', 'confirmed')";

/// Predicates for listing reservations.
pub fn reservation_filter(filter: &ReservationFilter) -> SqlBuilder {
    let mut sql = SqlBuilder::new();
    if let Some(owner) = filter.owner {
        sql.and_eq("user_id", SqlParam::Uuid(owner));
    }
    if let Some(status) = filter.status {
        sql.and_eq("status", SqlParam::Text(status.as_str().to_string()));
    }
    if let Some(date) = filter.date {
        sql.and_eq("date", SqlParam::Date(date));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sql.and_ilike_any(&["guest_name", "guest_phone", "guest_email"], search);
    }
    sql
}

/// Predicates for the available-tables query over `tables t`.
pub fn availability_filter(filter: &TableAvailabilityFilter) -> SqlBuilder {
    let mut sql = SqlBuilder::new();
    sql.and("t.is_available = TRUE");
    if let Some(guests) = filter.guests {
        let p = sql.bind(SqlParam::Int(guests));
        sql.and(format!("t.capacity >= {}", p));
    }
    if let Some(date) = filter.date {
        let date_p = sql.bind(SqlParam::Date(date));
        let time_clause = match filter.time {
            Some(time) => format!(" AND r.time = {}", sql.bind(SqlParam::Time(time.as_naive()))),
            None => String::new(),
        };
        sql.and(format!(
            "NOT EXISTS (SELECT 1 FROM reservations r WHERE r.table_number = t.number \
             AND r.status IN {} AND r.date = {}{})",
            ACTIVE_STATUS_SQL, date_p, time_clause
        ));
    }
    sql
}

/// Assignments for a reservation patch. `updated_at` is always set.
pub fn reservation_patch(patch: &ReservationPatch, now: DateTime<Utc>) -> SqlBuilder {
    let mut sql = SqlBuilder::new();
    if let Some(v) = &patch.guest_name {
        sql.set("guest_name", SqlParam::Text(v.clone()));
    }
    if let Some(v) = &patch.guest_phone {
        sql.set("guest_phone", SqlParam::Text(v.clone()));
    }
    if let Some(v) = &patch.guest_email {
        sql.set("guest_email", SqlParam::Text(v.clone()));
    }
    if let Some(v) = patch.date {
        sql.set("date", SqlParam::Date(v));
    }
    if let Some(v) = patch.time {
        sql.set("time", SqlParam::Time(v.as_naive()));
    }
    if let Some(v) = patch.guests {
        sql.set("guests", SqlParam::Int(v));
    }
    if let Some(v) = &patch.table_number {
        sql.set("table_number", SqlParam::Text(v.clone()));
    }
    if let Some(v) = &patch.special_requests {
        sql.set("special_requests", SqlParam::Text(v.clone()));
    }
    sql.set("updated_at", SqlParam::Timestamp(now));
    sql
}

/// Assignments for a user patch. `updated_at` is always set.
pub fn user_patch(patch: &UserPatch, now: DateTime<Utc>) -> SqlBuilder {
    let mut sql = SqlBuilder::new();
    if let Some(v) = &patch.name {
        sql.set("name", SqlParam::Text(v.clone()));
    }
    if let Some(v) = &patch.email {
        sql.set("email", SqlParam::Text(v.clone()));
    }
    if let Some(v) = &patch.phone {
        sql.set("phone", SqlParam::Text(v.clone()));
    }
    if let Some(v) = &patch.photo {
        sql.set("photo", SqlParam::Text(v.clone()));
    }
    sql.set("updated_at", SqlParam::Timestamp(now));
    sql
}

#[cfg(feature = "postgres")]
impl SqlParam {
    /// Borrow as a tokio-postgres parameter.
    pub fn as_pg(&self) -> &(dyn tokio_postgres::types::ToSql + Sync) {
        match self {
            SqlParam::Uuid(v) => v,
            SqlParam::Text(v) => v,
            SqlParam::Int(v) => v,
            SqlParam::Date(v) => v,
            SqlParam::Time(v) => v,
            SqlParam::Timestamp(v) => v,
        }
    }
}
