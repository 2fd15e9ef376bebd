//! # Vigil Scheduler
//!
//! Serialized query lane plus the proactive check-in scheduler that decides
//! when the assistant should reach out on its own.
//!
//! ## Architecture
//! ```text
//! TaskQueue (one lane, FIFO)          ProactiveScheduler (tokio interval)
//!   ├── enqueue(task)                   ├── gates: busy → quiet hours →
//!   ├── acquire_lock() → QueryLock      │   cooldown → quiet mode → chatting
//!   └── is_processing()  ◄──────────────┤
//!                                       ├── collectors → fingerprint → reminders
//!                                       ├── GatingOracle → Messenger
//!                                       └── EscalationProvider (detached)
//! ```

pub mod activity;
pub mod collectors;
pub mod fingerprint;
pub mod proactive;
pub mod queue;
pub mod quiet_hours;
pub mod reminders;

pub use activity::SessionActivity;
pub use collectors::{HttpCollector, collectors_from_config};
pub use proactive::{
    CheckOutcome, Collaborators, ProactiveScheduler, SchedulerStatus, TickOutcome,
};
pub use queue::{QueryLock, TaskQueue};
pub use quiet_hours::QuietHours;
