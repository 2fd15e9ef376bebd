//! Collaborator contracts consumed by the proactive scheduler.

pub mod activity;
pub mod checkin;
pub mod collector;
pub mod delivery;
pub mod oracle;

pub use activity::ActivityTracker;
pub use checkin::CheckInRepository;
pub use collector::Collector;
pub use delivery::{EscalationProvider, Messenger};
pub use oracle::GatingOracle;
