//! Monthly report snapshot types.

use serde::{Deserialize, Serialize};

use crate::month::YearMonth;
use crate::slot::SlotTime;

/// Raw per-month counts as aggregated by the record store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthCounts {
    pub total: i64,
    pub completed: i64,
    pub cancelled: i64,
}

impl MonthCounts {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Revenue proxy: a fixed unit value per completed reservation.
    pub fn revenue(&self, per_completed: f64) -> f64 {
        self.completed as f64 * per_completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub month: YearMonth,
    pub total_reservations: i64,
    pub completed_reservations: i64,
    pub cancelled_reservations: i64,
    pub revenue: f64,
}

impl MonthSummary {
    pub fn from_counts(month: YearMonth, counts: MonthCounts, per_completed: f64) -> Self {
        Self {
            month,
            total_reservations: counts.total,
            completed_reservations: counts.completed,
            cancelled_reservations: counts.cancelled,
            revenue: counts.revenue(per_completed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularTable {
    pub table_number: String,
    pub count: i64,
}

/// Completed reservations bucketed by exact stored time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakSlot {
    pub time: SlotTime,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthDetail {
    #[serde(flatten)]
    pub summary: MonthSummary,
    pub popular_tables: Vec<PopularTable>,
    pub peak_hours: Vec<PeakSlot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revenue_counts_completed_only() {
        let counts = MonthCounts {
            total: 10,
            completed: 4,
            cancelled: 3,
        };
        assert_eq!(counts.revenue(50.0), 200.0);
        let summary = MonthSummary::from_counts(YearMonth::new(2025, 12).unwrap(), counts, 50.0);
        assert_eq!(summary.revenue, 200.0);
        assert_eq!(summary.total_reservations, 10);
    }

    #[test]
    fn test_detail_serde_roundtrip() {
        let detail = MonthDetail {
            summary: MonthSummary::from_counts(
                YearMonth::new(2025, 12).unwrap(),
                MonthCounts {
                    total: 4,
                    completed: 4,
                    cancelled: 0,
                },
                50.0,
            ),
            popular_tables: vec![PopularTable {
                table_number: "T1".to_string(),
                count: 3,
            }],
            peak_hours: vec![PeakSlot {
                time: SlotTime::from_hm(19, 0).unwrap(),
                count: 4,
            }],
        };
        let json = serde_json::to_string(&detail).unwrap();
        assert!(json.contains("\"month\":\"2025-12\""));
        let back: MonthDetail = serde_json::from_str(&json).unwrap();
        assert_eq!(back, detail);
    }
}
