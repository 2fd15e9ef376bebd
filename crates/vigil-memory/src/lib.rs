//! # Vigil Memory
//!
//! SQLite persistence for the proactive scheduler: check-in logs, goal
//! reminder marks, per-user quiet mode and last chat activity.

pub mod checkin;

pub use checkin::SqliteCheckInStore;
