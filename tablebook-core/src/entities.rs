//! Entity types and their write payloads

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::enums::{ReservationStatus, TableLocation, UserRole};
use crate::identity::{EntityId, Timestamp};
use crate::slot::SlotTime;

// ============================================================================
// TABLE
// ============================================================================

/// A bookable table. Reservations reference it by `number`, not by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: EntityId,
    /// Unique, human-facing number such as "T1".
    pub number: String,
    pub capacity: i32,
    /// Administrative switch, independent of bookings.
    pub is_available: bool,
    pub location: TableLocation,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Payload for creating a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTable {
    pub number: String,
    pub capacity: i32,
    pub location: TableLocation,
}

// ============================================================================
// RESERVATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: EntityId,
    pub user_id: EntityId,
    pub guest_name: String,
    pub guest_phone: String,
    pub guest_email: String,
    pub date: NaiveDate,
    pub time: SlotTime,
    pub guests: i32,
    pub table_number: String,
    pub status: ReservationStatus,
    pub special_requests: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Reservation {
    /// The (table number, date, time) tuple this reservation targets.
    pub fn slot(&self) -> (&str, NaiveDate, SlotTime) {
        (self.table_number.as_str(), self.date, self.time)
    }

    pub fn occupies(&self, table_number: &str, date: NaiveDate, time: SlotTime) -> bool {
        self.status.is_active()
            && self.table_number == table_number
            && self.date == date
            && self.time == time
    }
}

/// Raw reservation input as received from a caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    pub guest_name: String,
    pub guest_phone: String,
    pub guest_email: String,
    pub date: String,
    pub time: String,
    pub guests: i32,
    pub table_number: String,
    #[serde(default)]
    pub special_requests: Option<String>,
}

/// Validated payload handed to the record store. Always created as pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReservation {
    pub user_id: EntityId,
    pub guest_name: String,
    pub guest_phone: String,
    pub guest_email: String,
    pub date: NaiveDate,
    pub time: SlotTime,
    pub guests: i32,
    pub table_number: String,
    pub special_requests: Option<String>,
}

/// Raw partial update as received from a caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationUpdate {
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
    pub guest_email: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub guests: Option<i32>,
    pub table_number: Option<String>,
    pub special_requests: Option<String>,
}

/// Typed partial update. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationPatch {
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
    pub guest_email: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<SlotTime>,
    pub guests: Option<i32>,
    pub table_number: Option<String>,
    pub special_requests: Option<String>,
}

impl ReservationPatch {
    pub fn is_empty(&self) -> bool {
        self.guest_name.is_none()
            && self.guest_phone.is_none()
            && self.guest_email.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.guests.is_none()
            && self.table_number.is_none()
            && self.special_requests.is_none()
    }

    /// Whether applying this patch changes the slot tuple of `current`.
    pub fn moves_slot(&self, current: &Reservation) -> bool {
        self.table_number
            .as_ref()
            .is_some_and(|n| *n != current.table_number)
            || self.date.is_some_and(|d| d != current.date)
            || self.time.is_some_and(|t| t != current.time)
    }

    /// Produce the reservation as it looks after the patch. Does not touch
    /// `updated_at`.
    pub fn apply_to(&self, current: &Reservation) -> Reservation {
        let mut next = current.clone();
        if let Some(v) = &self.guest_name {
            next.guest_name = v.clone();
        }
        if let Some(v) = &self.guest_phone {
            next.guest_phone = v.clone();
        }
        if let Some(v) = &self.guest_email {
            next.guest_email = v.clone();
        }
        if let Some(v) = self.date {
            next.date = v;
        }
        if let Some(v) = self.time {
            next.time = v;
        }
        if let Some(v) = self.guests {
            next.guests = v;
        }
        if let Some(v) = &self.table_number {
            next.table_number = v.clone();
        }
        if let Some(v) = &self.special_requests {
            next.special_requests = Some(v.clone());
        }
        next
    }
}

// ============================================================================
// USER
// ============================================================================

/// User profile. Credentials live outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: EntityId,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub photo: Option<String>,
    pub role: UserRole,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub photo: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none() && self.photo.is_none()
    }
}
