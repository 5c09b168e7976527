//! Per-namespace cache handlers.

use chrono::{NaiveDate, Utc};
use std::future::Future;
use std::time::Duration;
use tablebook_core::{
    EngineResult, EntityId, MonthDetail, MonthSummary, Reservation, ReservationFilter, Table,
    TableAvailabilityFilter, Timestamp, User, YearMonth,
};

use super::coordinator::CacheHandle;
use super::freshness::{CacheRead, Freshness};
use super::keys::{prefix, CacheKey};

// ============================================================================
// TOKENS
// ============================================================================

/// What the cache knows about a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Remembered as belonging to this user and not revoked.
    Valid(EntityId),
    Revoked,
    /// Nothing cached, or the cache could not answer. Verify the token itself.
    Unknown,
}

/// Token validity and revocation entries. Their TTL is the token's own
/// remaining lifetime, so nothing outlives the token.
pub struct TokenCache {
    handle: CacheHandle,
}

fn remaining(expires_at: Timestamp) -> Option<Duration> {
    (expires_at - Utc::now())
        .to_std()
        .ok()
        .filter(|d| !d.is_zero())
}

impl TokenCache {
    pub(crate) fn new(handle: CacheHandle) -> Self {
        Self { handle }
    }

    /// Cache `token` as belonging to `user_id` until `expires_at`.
    /// Returns false (and caches nothing) for an already-expired token.
    pub async fn remember(&self, token: &str, user_id: EntityId, expires_at: Timestamp) -> bool {
        let Some(ttl) = remaining(expires_at) else {
            return false;
        };
        let key = CacheKey::Token(token.to_string()).to_string();
        self.handle.set_json(&key, &user_id, ttl).await;
        true
    }

    /// Forget the token and mark it revoked for the rest of its lifetime.
    pub async fn revoke(&self, token: &str, expires_at: Timestamp) {
        self.handle
            .delete(&CacheKey::Token(token.to_string()).to_string())
            .await;
        if let Some(ttl) = remaining(expires_at) {
            let key = CacheKey::TokenBlacklist(token.to_string()).to_string();
            self.handle.set_json(&key, &true, ttl).await;
        }
    }

    pub async fn status(&self, token: &str) -> TokenStatus {
        let revoked_key = CacheKey::TokenBlacklist(token.to_string()).to_string();
        if self.handle.get_json::<bool>(&revoked_key).await.is_some() {
            return TokenStatus::Revoked;
        }
        let key = CacheKey::Token(token.to_string()).to_string();
        match self.handle.get_json::<EntityId>(&key).await {
            Some(user_id) => TokenStatus::Valid(user_id),
            None => TokenStatus::Unknown,
        }
    }
}

// ============================================================================
// USERS
// ============================================================================

pub struct UserCache {
    handle: CacheHandle,
    ttl: Duration,
}

impl UserCache {
    pub(crate) fn new(handle: CacheHandle, ttl: Duration) -> Self {
        Self { handle, ttl }
    }

    pub async fn by_id<F, Fut>(
        &self,
        id: EntityId,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<Option<CacheRead<User>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Option<User>>>,
    {
        self.handle
            .read_through_optional(&CacheKey::User(id), self.ttl, freshness, load)
            .await
    }

    pub async fn by_email<F, Fut>(
        &self,
        email: &str,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<Option<CacheRead<User>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Option<User>>>,
    {
        self.handle
            .read_through_optional(
                &CacheKey::UserEmail(email.to_string()),
                self.ttl,
                freshness,
                load,
            )
            .await
    }

    /// Drop both lookups for `user`, plus the e-mail key it had before an
    /// e-mail change.
    pub async fn invalidate(&self, user: &User, previous_email: Option<&str>) {
        self.handle.delete(&CacheKey::User(user.id).to_string()).await;
        self.handle
            .delete(&CacheKey::UserEmail(user.email.clone()).to_string())
            .await;
        if let Some(old) = previous_email.filter(|old| !old.eq_ignore_ascii_case(&user.email)) {
            self.handle
                .delete(&CacheKey::UserEmail(old.to_string()).to_string())
                .await;
        }
    }
}

// ============================================================================
// TABLES
// ============================================================================

pub struct TableCache {
    handle: CacheHandle,
    ttl: Duration,
    availability_ttl: Duration,
}

impl TableCache {
    pub(crate) fn new(handle: CacheHandle, ttl: Duration, availability_ttl: Duration) -> Self {
        Self {
            handle,
            ttl,
            availability_ttl,
        }
    }

    pub async fn all<F, Fut>(
        &self,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<CacheRead<Vec<Table>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Vec<Table>>>,
    {
        self.handle
            .read_through(&CacheKey::TablesAll, self.ttl, freshness, load)
            .await
    }

    pub async fn by_id<F, Fut>(
        &self,
        id: EntityId,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<Option<CacheRead<Table>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Option<Table>>>,
    {
        self.handle
            .read_through_optional(&CacheKey::Table(id), self.ttl, freshness, load)
            .await
    }

    pub async fn by_number<F, Fut>(
        &self,
        number: &str,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<Option<CacheRead<Table>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Option<Table>>>,
    {
        self.handle
            .read_through_optional(
                &CacheKey::TableNumber(number.to_string()),
                self.ttl,
                freshness,
                load,
            )
            .await
    }

    /// Availability-query results use the shorter availability TTL.
    pub async fn available<F, Fut>(
        &self,
        filter: &TableAvailabilityFilter,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<CacheRead<Vec<Table>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Vec<Table>>>,
    {
        self.handle
            .read_through(
                &CacheKey::TablesAvailable(*filter),
                self.availability_ttl,
                freshness,
                load,
            )
            .await
    }

    /// Availability queries cannot be targeted by table, so the whole
    /// namespace goes.
    pub async fn invalidate_all(&self) {
        self.handle.delete_prefix(prefix::TABLE).await;
        self.handle.delete_prefix(prefix::TABLES).await;
    }

    /// Availability queries for `date`. Queries without a date never consult
    /// reservations and are unaffected by reservation writes.
    pub async fn invalidate_availability_on(&self, date: NaiveDate) {
        self.handle
            .delete_prefix(&prefix::availability_on(date))
            .await;
    }
}

// ============================================================================
// RESERVATIONS
// ============================================================================

pub struct ReservationCache {
    handle: CacheHandle,
    ttl: Duration,
}

impl ReservationCache {
    pub(crate) fn new(handle: CacheHandle, ttl: Duration) -> Self {
        Self { handle, ttl }
    }

    pub async fn by_id<F, Fut>(
        &self,
        id: EntityId,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<Option<CacheRead<Reservation>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Option<Reservation>>>,
    {
        self.handle
            .read_through_optional(&CacheKey::Reservation(id), self.ttl, freshness, load)
            .await
    }

    pub async fn for_user<F, Fut>(
        &self,
        user_id: EntityId,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<CacheRead<Vec<Reservation>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Vec<Reservation>>>,
    {
        self.handle
            .read_through(
                &CacheKey::ReservationsByUser(user_id),
                self.ttl,
                freshness,
                load,
            )
            .await
    }

    pub async fn list<F, Fut>(
        &self,
        filter: &ReservationFilter,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<CacheRead<Vec<Reservation>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Vec<Reservation>>>,
    {
        self.handle
            .read_through(
                &CacheKey::ReservationsList(filter.clone()),
                self.ttl,
                freshness,
                load,
            )
            .await
    }

    /// The reservation's own key and its owner's list.
    pub async fn invalidate(&self, reservation: &Reservation) {
        self.handle
            .delete(&CacheKey::Reservation(reservation.id).to_string())
            .await;
        self.handle
            .delete(&CacheKey::ReservationsByUser(reservation.user_id).to_string())
            .await;
    }

    /// Every filtered list.
    pub async fn invalidate_lists(&self) {
        self.handle.delete_prefix(prefix::RESERVATION_LISTS).await;
    }
}

// ============================================================================
// REPORTS
// ============================================================================

pub struct ReportCache {
    handle: CacheHandle,
    list_ttl: Duration,
    open_month_ttl: Duration,
    closed_month_ttl: Duration,
}

impl ReportCache {
    pub(crate) fn new(
        handle: CacheHandle,
        list_ttl: Duration,
        open_month_ttl: Duration,
        closed_month_ttl: Duration,
    ) -> Self {
        Self {
            handle,
            list_ttl,
            open_month_ttl,
            closed_month_ttl,
        }
    }

    /// TTL for a month's snapshot as seen on `today`.
    pub fn month_ttl(&self, month: YearMonth, today: NaiveDate) -> Duration {
        if month.window().is_closed(today) {
            self.closed_month_ttl
        } else {
            self.open_month_ttl
        }
    }

    pub async fn overview<F, Fut>(
        &self,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<CacheRead<Vec<MonthSummary>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Vec<MonthSummary>>>,
    {
        self.handle
            .read_through(&CacheKey::ReportsMonthlyList, self.list_ttl, freshness, load)
            .await
    }

    pub async fn month<F, Fut>(
        &self,
        month: YearMonth,
        today: NaiveDate,
        freshness: Freshness,
        load: F,
    ) -> EngineResult<Option<CacheRead<MonthDetail>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Option<MonthDetail>>>,
    {
        let ttl = self.month_ttl(month, today);
        self.handle
            .read_through_optional(&CacheKey::ReportsMonthly(month), ttl, freshness, load)
            .await
    }

    /// Drop one month's snapshot and the overview that summarises it.
    pub async fn invalidate_month(&self, month: YearMonth) {
        self.handle
            .delete(&CacheKey::ReportsMonthly(month).to_string())
            .await;
        self.handle
            .delete(&CacheKey::ReportsMonthlyList.to_string())
            .await;
    }

    pub async fn invalidate_all(&self) {
        self.handle.delete_prefix(prefix::MONTHLY_REPORTS).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCacheStore;
    use crate::cache::traits::CacheStore;
    use std::sync::Arc;
    use uuid::Uuid;

    fn tokens() -> (TokenCache, Arc<InMemoryCacheStore>) {
        let store = Arc::new(InMemoryCacheStore::new());
        (TokenCache::new(CacheHandle::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_expired_token_not_cached() {
        let (cache, store) = tokens();
        let remembered = cache
            .remember("tok", Uuid::now_v7(), Utc::now() - chrono::Duration::seconds(1))
            .await;
        assert!(!remembered);
        assert!(store.keys().is_empty());
        assert_eq!(cache.status("tok").await, TokenStatus::Unknown);
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let (cache, store) = tokens();
        let user = Uuid::now_v7();
        let expires = Utc::now() + chrono::Duration::hours(1);
        assert!(cache.remember("tok", user, expires).await);
        assert_eq!(cache.status("tok").await, TokenStatus::Valid(user));

        cache.revoke("tok", expires).await;
        assert_eq!(cache.status("tok").await, TokenStatus::Revoked);
        assert!(!store.contains("token:tok"));
        assert!(store.contains("token:blacklist:tok"));
    }

    #[tokio::test]
    async fn test_token_cache_failure_is_unknown() {
        let (cache, store) = tokens();
        store
            .set("token:tok", b"garbage", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.status("tok").await, TokenStatus::Unknown);
    }

    #[test]
    fn test_month_ttl_open_vs_closed() {
        let store = Arc::new(InMemoryCacheStore::new());
        let reports = ReportCache::new(
            CacheHandle::new(store),
            Duration::from_secs(60),
            Duration::from_secs(300),
            Duration::from_secs(86_400),
        );
        let today = NaiveDate::from_ymd_opt(2025, 12, 10).unwrap();
        let current = YearMonth::new(2025, 12).unwrap();
        let past = YearMonth::new(2025, 11).unwrap();
        let future = YearMonth::new(2026, 1).unwrap();
        assert_eq!(reports.month_ttl(current, today), Duration::from_secs(300));
        assert_eq!(reports.month_ttl(future, today), Duration::from_secs(300));
        assert_eq!(reports.month_ttl(past, today), Duration::from_secs(86_400));
    }
}
