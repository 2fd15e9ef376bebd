//! In-process chat activity tracker.
//!
//! Embedders that run the chat loop in the same process call
//! [`SessionActivity::record`] on every incoming message; the proactive
//! scheduler reads it to avoid interrupting a live conversation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vigil_core::error::Result;
use vigil_core::traits::ActivityTracker;

#[derive(Default)]
pub struct SessionActivity {
    last_seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SessionActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `chat_id` as active right now.
    pub fn record(&self, chat_id: &str) {
        self.record_at(chat_id, Utc::now());
    }

    pub fn record_at(&self, chat_id: &str, at: DateTime<Utc>) {
        let mut seen = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.insert(chat_id.to_string(), at);
    }

    pub fn get(&self, chat_id: &str) -> Option<DateTime<Utc>> {
        let seen = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.get(chat_id).copied()
    }
}

#[async_trait]
impl ActivityTracker for SessionActivity {
    async fn last_activity(&self, chat_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.get(chat_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_read() {
        let activity = SessionActivity::new();
        assert!(activity.last_activity("42").await.unwrap().is_none());

        let t = Utc::now() - chrono::Duration::minutes(3);
        activity.record_at("42", t);
        assert_eq!(activity.last_activity("42").await.unwrap(), Some(t));
        assert!(activity.last_activity("7").await.unwrap().is_none());

        activity.record("42");
        assert!(activity.get("42").unwrap() > t);
    }
}
