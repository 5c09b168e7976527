//! Stats Aggregator
//!
//! Monthly reports are derived on demand from reservation history. Months
//! are calendar months, `[first day, first day of next month)`. Rankings
//! count completed reservations only and bucket peak hours by the exact
//! stored time, so 19:00 and 19:30 are separate entries.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tablebook_core::{
    EngineError, EngineResult, MonthDetail, MonthSummary, ReportPolicy, YearMonth,
};
use tablebook_storage::{CacheCoordinator, CacheRead, Freshness, RecordStore};
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::validation::parse_month;

#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn RecordStore>,
    cache: Arc<CacheCoordinator>,
    policy: ReportPolicy,
}

impl StatsAggregator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<CacheCoordinator>,
        policy: ReportPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
        }
    }

    /// One summary per month with any reservation, newest first.
    pub async fn monthly_overview(
        &self,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<Vec<MonthSummary>>> {
        let per_completed = self.policy.revenue_per_completed;
        let store = &self.store;
        cancellable(
            cancel,
            self.cache.reports().overview(freshness, || async move {
                let months = store.aggregate_overview().await?;
                Ok(months
                    .into_iter()
                    .map(|(month, counts)| MonthSummary::from_counts(month, counts, per_completed))
                    .collect())
            }),
        )
        .await
    }

    /// Detail for a `YYYY-MM` month. NotFound if the month has no reservations.
    pub async fn month_detail(
        &self,
        month: &str,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<MonthDetail>> {
        let month = parse_month(month)?;
        let today = Utc::now().date_naive();
        self.month_detail_on(month, today, freshness, cancel).await
    }

    /// [`month_detail`](Self::month_detail) as seen on `today`, which decides
    /// whether the month is closed and gets the long snapshot TTL.
    pub async fn month_detail_on(
        &self,
        month: YearMonth,
        today: NaiveDate,
        freshness: Freshness,
        cancel: &CancellationToken,
    ) -> EngineResult<CacheRead<MonthDetail>> {
        let policy = &self.policy;
        let store = &self.store;
        let window = month.window();
        let found = cancellable(
            cancel,
            self.cache
                .reports()
                .month(month, today, freshness, || async move {
                    let counts = store.aggregate_monthly(window).await?;
                    if counts.is_empty() {
                        return Ok(None);
                    }
                    let popular_tables =
                        store.aggregate_popular_tables(window, policy.top_n).await?;
                    let peak_hours = store.aggregate_peak_slots(window, policy.top_n).await?;
                    Ok(Some(MonthDetail {
                        summary: MonthSummary::from_counts(
                            month,
                            counts,
                            policy.revenue_per_completed,
                        ),
                        popular_tables,
                        peak_hours,
                    }))
                }),
        )
        .await
        .inspect_err(|e| {
            if e.is_transient() {
                tracing::error!(%month, error = %e, "monthly aggregate failed");
            }
        })?;
        found.ok_or_else(|| EngineError::not_found("monthly report", month))
    }

    /// Drop one month's snapshot and the overview, after a historical
    /// correction.
    pub async fn invalidate_month(&self, month: YearMonth) {
        self.cache.reports().invalidate_month(month).await;
        tracing::info!(%month, "monthly report invalidated");
    }

    pub async fn invalidate_all_reports(&self) {
        self.cache.reports().invalidate_all().await;
        tracing::info!("all monthly reports invalidated");
    }
}
