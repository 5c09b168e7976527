//! Engine configuration: cache TTLs and report policy.

use std::time::Duration;

use crate::error::{ConfigError, EngineError, EngineResult};

/// Time-to-live per cache namespace.
///
/// Token entries have no configured TTL; they live exactly as long as the
/// token itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheTtlPolicy {
    pub user: Duration,
    pub table: Duration,
    /// Availability-query results, the most volatile derived view.
    pub availability: Duration,
    pub reservation: Duration,
    pub report_list: Duration,
    /// Snapshot of the current (or a future) month, still being written to.
    pub open_month_report: Duration,
    /// Snapshot of a month that is over.
    pub closed_month_report: Duration,
}

impl Default for CacheTtlPolicy {
    fn default() -> Self {
        Self {
            user: Duration::from_secs(30 * 60),
            table: Duration::from_secs(30 * 60),
            availability: Duration::from_secs(5 * 60),
            reservation: Duration::from_secs(5 * 60),
            report_list: Duration::from_secs(5 * 60),
            open_month_report: Duration::from_secs(5 * 60),
            closed_month_report: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// How monthly reports are derived.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPolicy {
    /// Fixed revenue credited per completed reservation.
    pub revenue_per_completed: f64,
    /// Length of the popular-table and peak-hour rankings.
    pub top_n: usize,
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self {
            revenue_per_completed: 50.0,
            top_n: 10,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub ttl: CacheTtlPolicy,
    pub reports: ReportPolicy,
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> EngineError {
    EngineError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

impl EngineConfig {
    /// Load from `TABLEBOOK_*` environment variables. TTLs are in seconds.
    /// Unset or unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl: CacheTtlPolicy {
                user: env_secs("TABLEBOOK_TTL_USER_SECS", defaults.ttl.user),
                table: env_secs("TABLEBOOK_TTL_TABLE_SECS", defaults.ttl.table),
                availability: env_secs(
                    "TABLEBOOK_TTL_AVAILABILITY_SECS",
                    defaults.ttl.availability,
                ),
                reservation: env_secs("TABLEBOOK_TTL_RESERVATION_SECS", defaults.ttl.reservation),
                report_list: env_secs("TABLEBOOK_TTL_REPORT_LIST_SECS", defaults.ttl.report_list),
                open_month_report: env_secs(
                    "TABLEBOOK_TTL_OPEN_MONTH_SECS",
                    defaults.ttl.open_month_report,
                ),
                closed_month_report: env_secs(
                    "TABLEBOOK_TTL_CLOSED_MONTH_SECS",
                    defaults.ttl.closed_month_report,
                ),
            },
            reports: ReportPolicy {
                revenue_per_completed: std::env::var("TABLEBOOK_REVENUE_PER_COMPLETED")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.reports.revenue_per_completed),
                top_n: std::env::var("TABLEBOOK_REPORT_TOP_N")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.reports.top_n),
            },
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        let ttl = &self.ttl;
        let named = [
            ("ttl.user", ttl.user),
            ("ttl.table", ttl.table),
            ("ttl.availability", ttl.availability),
            ("ttl.reservation", ttl.reservation),
            ("ttl.report_list", ttl.report_list),
            ("ttl.open_month_report", ttl.open_month_report),
            ("ttl.closed_month_report", ttl.closed_month_report),
        ];
        for (field, value) in named {
            if value.is_zero() {
                return Err(invalid(field, format!("{:?}", value), "must be positive"));
            }
        }

        if ttl.availability > ttl.table {
            return Err(invalid(
                "ttl.availability",
                format!("{:?}", ttl.availability),
                "must not exceed ttl.table",
            ));
        }

        if ttl.open_month_report > ttl.closed_month_report {
            return Err(invalid(
                "ttl.open_month_report",
                format!("{:?}", ttl.open_month_report),
                "must not exceed ttl.closed_month_report",
            ));
        }

        let revenue = self.reports.revenue_per_completed;
        if !revenue.is_finite() || revenue < 0.0 {
            return Err(invalid(
                "reports.revenue_per_completed",
                revenue,
                "must be a finite, non-negative amount",
            ));
        }

        if self.reports.top_n == 0 {
            return Err(invalid("reports.top_n", 0, "must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = EngineConfig::default();
        config.ttl.reservation = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ttl.reservation"));
    }

    #[test]
    fn test_availability_longer_than_table_rejected() {
        let mut config = EngineConfig::default();
        config.ttl.availability = config.ttl.table + Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_open_month_longer_than_closed_rejected() {
        let mut config = EngineConfig::default();
        config.ttl.open_month_report = Duration::from_secs(48 * 3600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_report_policy_rejected() {
        let mut config = EngineConfig::default();
        config.reports.revenue_per_completed = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.reports.top_n = 0;
        assert!(config.validate().is_err());
    }
}
