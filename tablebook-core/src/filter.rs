//! Typed query filters shared by stores and cache keys.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::entities::{Reservation, Table};
use crate::enums::ReservationStatus;
use crate::identity::EntityId;
use crate::slot::SlotTime;

/// Filters for the available-tables query.
///
/// Reservation blocking depends on which fields are present:
/// - date and time: only an active reservation at that exact slot blocks.
/// - date only: any active reservation on that day blocks the table for the
///   whole day. This is stricter than the single-slot check and is kept for
///   compatibility with existing clients.
/// - time only, or neither: reservations are not consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableAvailabilityFilter {
    pub date: Option<NaiveDate>,
    pub time: Option<SlotTime>,
    /// Minimum seating capacity.
    pub guests: Option<i32>,
}

impl TableAvailabilityFilter {
    pub fn for_slot(date: NaiveDate, time: SlotTime) -> Self {
        Self {
            date: Some(date),
            time: Some(time),
            guests: None,
        }
    }

    pub fn on_date(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }

    pub fn with_guests(mut self, guests: i32) -> Self {
        self.guests = Some(guests);
        self
    }

    /// Table-level criteria: the administrative flag and capacity.
    pub fn admits_table(&self, table: &Table) -> bool {
        table.is_available && self.guests.map_or(true, |g| table.capacity >= g)
    }

    /// Whether an active reservation at (`date`, `time`) excludes its table.
    pub fn blocked_by(&self, date: NaiveDate, time: SlotTime) -> bool {
        match (self.date, self.time) {
            (Some(d), Some(t)) => d == date && t == time,
            (Some(d), None) => d == date,
            _ => false,
        }
    }

    /// Whether reservation state affects this query's result at all.
    pub fn consults_reservations(&self) -> bool {
        self.date.is_some()
    }
}

/// Filters for listing reservations. Absent fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub owner: Option<EntityId>,
    pub status: Option<ReservationStatus>,
    pub date: Option<NaiveDate>,
    /// Case-insensitive substring over guest name, phone and e-mail.
    pub search: Option<String>,
}

impl ReservationFilter {
    pub fn for_owner(owner: EntityId) -> Self {
        Self {
            owner: Some(owner),
            ..Default::default()
        }
    }

    fn normalized_search(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, reservation: &Reservation) -> bool {
        if self.owner.is_some_and(|o| o != reservation.user_id) {
            return false;
        }
        if self.status.is_some_and(|s| s != reservation.status) {
            return false;
        }
        if self.date.is_some_and(|d| d != reservation.date) {
            return false;
        }
        match self.normalized_search() {
            None => true,
            Some(needle) => [
                &reservation.guest_name,
                &reservation.guest_phone,
                &reservation.guest_email,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle)),
        }
    }

    /// Canonical suffix for the filtered-list cache key. Equal filters map to
    /// equal strings; search is trimmed and lower-cased first.
    pub fn cache_suffix(&self) -> String {
        format!(
            "owner={}&status={}&date={}&search={}",
            self.owner.map(|o| o.to_string()).unwrap_or_default(),
            self.status.map(|s| s.as_str()).unwrap_or_default(),
            self.date.map(|d| d.to_string()).unwrap_or_default(),
            self.normalized_search().unwrap_or_default(),
        )
    }
}
