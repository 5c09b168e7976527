//! Cache key taxonomy.
//!
//! The rendered strings are shared with existing deployments and must not
//! change:
//!
//! | Key | Holds |
//! |-----|-------|
//! | `token:{token}` | user id the token belongs to |
//! | `token:blacklist:{token}` | revocation marker |
//! | `user:{id}` / `user:email:{email}` | user profile |
//! | `table:{id}` / `table:number:{number}` | single table |
//! | `tables:all` | every table |
//! | `tables:available:{date}:{time}:{guests}` | availability query result |
//! | `reservation:{id}` | single reservation |
//! | `reservations:user:{userId}` | one user's reservations |
//! | `reservations:list:{key}` | filtered reservation list |
//! | `reports:monthly:list` | monthly overview |
//! | `reports:monthly:{yyyy-mm}` | one month's detail |

use chrono::NaiveDate;
use std::fmt;
use tablebook_core::{EntityId, ReservationFilter, TableAvailabilityFilter, YearMonth};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Token(String),
    TokenBlacklist(String),
    User(EntityId),
    /// Rendered lower-cased.
    UserEmail(String),
    Table(EntityId),
    TableNumber(String),
    TablesAll,
    TablesAvailable(TableAvailabilityFilter),
    Reservation(EntityId),
    ReservationsByUser(EntityId),
    ReservationsList(ReservationFilter),
    ReportsMonthlyList,
    ReportsMonthly(YearMonth),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Token(token) => write!(f, "token:{}", token),
            CacheKey::TokenBlacklist(token) => write!(f, "token:blacklist:{}", token),
            CacheKey::User(id) => write!(f, "user:{}", id),
            CacheKey::UserEmail(email) => write!(f, "user:email:{}", email.to_lowercase()),
            CacheKey::Table(id) => write!(f, "table:{}", id),
            CacheKey::TableNumber(number) => write!(f, "table:number:{}", number),
            CacheKey::TablesAll => f.write_str("tables:all"),
            CacheKey::TablesAvailable(filter) => write!(
                f,
                "tables:available:{}:{}:{}",
                filter.date.map(|d| d.to_string()).unwrap_or_default(),
                filter.time.map(|t| t.to_string()).unwrap_or_default(),
                filter.guests.unwrap_or(0),
            ),
            CacheKey::Reservation(id) => write!(f, "reservation:{}", id),
            CacheKey::ReservationsByUser(user_id) => write!(f, "reservations:user:{}", user_id),
            CacheKey::ReservationsList(filter) => {
                write!(f, "reservations:list:{}", filter.cache_suffix())
            }
            CacheKey::ReportsMonthlyList => f.write_str("reports:monthly:list"),
            CacheKey::ReportsMonthly(month) => write!(f, "reports:monthly:{}", month),
        }
    }
}

/// Prefixes used for sweeping invalidation.
pub mod prefix {
    use super::NaiveDate;

    /// Every single-table key, by id and by number.
    pub const TABLE: &str = "table:";
    /// The full list and every availability query.
    pub const TABLES: &str = "tables:";
    pub const RESERVATION_LISTS: &str = "reservations:list:";
    pub const MONTHLY_REPORTS: &str = "reports:monthly:";

    /// Availability queries that consulted reservations on `date`.
    pub fn availability_on(date: NaiveDate) -> String {
        format!("tables:available:{}:", date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablebook_core::SlotTime;
    use uuid::Uuid;

    #[test]
    fn test_fixed_keys() {
        assert_eq!(CacheKey::TablesAll.to_string(), "tables:all");
        assert_eq!(CacheKey::ReportsMonthlyList.to_string(), "reports:monthly:list");
        assert_eq!(
            CacheKey::ReportsMonthly(YearMonth::new(2025, 2).unwrap()).to_string(),
            "reports:monthly:2025-02"
        );
        assert_eq!(CacheKey::Token("abc".into()).to_string(), "token:abc");
        assert_eq!(
            CacheKey::TokenBlacklist("abc".into()).to_string(),
            "token:blacklist:abc"
        );
        assert_eq!(
            CacheKey::UserEmail("Ada@Example.com".into()).to_string(),
            "user:email:ada@example.com"
        );
        assert_eq!(CacheKey::TableNumber("T1".into()).to_string(), "table:number:T1");
    }

    #[test]
    fn test_entity_keys_embed_ids() {
        let id = Uuid::nil();
        assert_eq!(
            CacheKey::Reservation(id).to_string(),
            "reservation:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            CacheKey::ReservationsByUser(id).to_string(),
            "reservations:user:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            CacheKey::User(id).to_string(),
            "user:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_availability_key_segments() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 25).unwrap();
        let full = TableAvailabilityFilter::for_slot(date, SlotTime::from_hm(19, 0).unwrap())
            .with_guests(4);
        assert_eq!(
            CacheKey::TablesAvailable(full).to_string(),
            "tables:available:2025-12-25:19:00:4"
        );
        assert_eq!(
            CacheKey::TablesAvailable(TableAvailabilityFilter::default()).to_string(),
            "tables:available:::0"
        );
        assert!(CacheKey::TablesAvailable(full)
            .to_string()
            .starts_with(&prefix::availability_on(date)));
    }

    #[test]
    fn test_sweep_prefixes_cover_namespaces() {
        let id = Uuid::now_v7();
        assert!(CacheKey::Table(id).to_string().starts_with(prefix::TABLE));
        assert!(CacheKey::TableNumber("T1".into())
            .to_string()
            .starts_with(prefix::TABLE));
        assert!(CacheKey::TablesAll.to_string().starts_with(prefix::TABLES));
        assert!(!CacheKey::TablesAll.to_string().starts_with(prefix::TABLE));
        assert!(CacheKey::ReservationsList(ReservationFilter::default())
            .to_string()
            .starts_with(prefix::RESERVATION_LISTS));
    }
}
