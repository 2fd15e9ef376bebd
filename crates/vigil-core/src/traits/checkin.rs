//! Check-in log persistence contract.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::CheckInLog;

#[async_trait]
pub trait CheckInRepository: Send + Sync {
    /// Timestamp of the most recent non-skip log row.
    async fn get_last_sent_time(&self) -> Result<Option<DateTime<Utc>>>;

    /// Whether the user switched on do-not-disturb.
    async fn is_quiet_mode(&self, user_id: &str) -> Result<bool>;

    /// Most recent rows first.
    async fn get_recent_logs(&self, limit: usize) -> Result<Vec<CheckInLog>>;

    /// Goal ids reminded within the last `window_minutes`.
    async fn get_recently_reminded_goal_ids(&self, window_minutes: u64) -> Result<HashSet<String>>;

    async fn save_log(&self, entry: &CheckInLog) -> Result<()>;

    async fn mark_goals_reminded(&self, ids: &[String]) -> Result<()>;
}
