//! Live chat activity lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

#[async_trait]
pub trait ActivityTracker: Send + Sync {
    /// When the user last interacted in `chat_id`, if ever.
    async fn last_activity(&self, chat_id: &str) -> Result<Option<DateTime<Utc>>>;
}
