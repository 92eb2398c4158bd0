//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`, one sub-module per table.
//! Conditional updates return `bool` (row changed or not) so callers can
//! tell a real transition from a no-op.

mod appointment;
mod ecg_record;
mod notification;
mod people;

pub use appointment::*;
pub use ecg_record::*;
pub use notification::*;
pub use people::*;
