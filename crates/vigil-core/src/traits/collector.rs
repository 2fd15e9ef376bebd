//! Data source trait.

use async_trait::async_trait;

use crate::error::Result;

/// A single "what's new" data source (calendar, goals, mail, ...).
///
/// Implementations should return an error rather than panic; the scheduler
/// isolates each call and treats an error as a per-collector failure.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Key under which this collector's payload is stored.
    fn name(&self) -> &str;

    async fn collect(&self) -> Result<serde_json::Value>;
}
