//! # Vigil Core
//! Configuration, error types, shared data model and the collaborator traits
//! the proactive scheduler is wired against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::VigilConfig;
pub use error::{Result, VigilError};
