//! Tablebook Engine
//!
//! Availability checking, booking, table and account services, monthly
//! reporting, and the wiring that puts them in front of one record store and
//! one advisory cache.
//!
//! Every store-backed operation takes a `CancellationToken`. Reads stop as
//! soon as it fires; writes honour it only before they reach the store. Token
//! operations touch the cache alone and take none.

pub mod accounts;
pub mod availability;
pub mod booking;
pub mod cancel;
pub mod stats;
pub mod tables;
pub mod telemetry;
pub mod validation;

mod state;

pub use accounts::AccountService;
pub use availability::AvailabilityChecker;
pub use booking::BookingService;
pub use state::Engine;
pub use stats::StatsAggregator;
pub use tables::TableService;
pub use telemetry::{init_tracing, TelemetryConfig};

pub use tablebook_storage::{CacheRead, Freshness, ReadSource, TokenStatus};
pub use tokio_util::sync::CancellationToken;
