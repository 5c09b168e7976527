//! Tablebook Core - Entity Types
//!
//! Pure data structures shared by the storage and engine crates.
//! This crate performs no I/O.

mod config;
mod entities;
mod enums;
mod error;
mod filter;
mod identity;
mod month;
mod report;
mod slot;

pub use config::{CacheTtlPolicy, EngineConfig, ReportPolicy};
pub use entities::{
    NewReservation, NewTable, NewUser, Reservation, ReservationPatch, ReservationRequest,
    ReservationUpdate, Table, User, UserPatch,
};
pub use enums::{ReservationStatus, TableLocation, UserRole};
pub use error::{
    CacheError, ConfigError, ConflictError, EngineError, EngineResult, FieldErrors, StorageError,
    ValidationError,
};
pub use filter::{ReservationFilter, TableAvailabilityFilter};
pub use identity::{new_entity_id, EntityId, Timestamp};
pub use month::{MonthWindow, YearMonth};
pub use report::{MonthCounts, MonthDetail, MonthSummary, PeakSlot, PopularTable};
pub use slot::{parse_date, SlotTime};
