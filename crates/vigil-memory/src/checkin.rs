//! SQLite check-in store — logs, goal reminder marks, quiet mode, chat activity.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use vigil_core::config::MAX_WINDOW_MINUTES;
use vigil_core::error::{Result, VigilError};
use vigil_core::traits::{ActivityTracker, CheckInRepository};
use vigil_core::types::{CheckInLog, GatingResult};

fn storage_err(e: rusqlite::Error) -> VigilError {
    VigilError::Storage(e.to_string())
}

/// Fixed-width UTC timestamps so string comparison matches time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `minutes` before now, clamped so oversized windows cannot overflow.
fn minutes_ago(minutes: u64) -> DateTime<Utc> {
    let minutes = minutes.min(MAX_WINDOW_MINUTES) as i64;
    Utc::now() - chrono::Duration::minutes(minutes)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

pub struct SqliteCheckInStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckInStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        tracing::debug!("🗄️ Check-in store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                "
            -- One row per completed check
            CREATE TABLE IF NOT EXISTS checkin_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                data_hash TEXT NOT NULL,
                sources TEXT NOT NULL DEFAULT '[]',   -- JSON array of collector names
                gating_result TEXT NOT NULL,          -- 'text', 'call', 'skip'
                skip_reason TEXT,
                urgency INTEGER,
                message_sent TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checkin_logs_created ON checkin_logs(created_at);

            -- Last reminder per goal id
            CREATE TABLE IF NOT EXISTS goal_reminders (
                goal_id TEXT PRIMARY KEY,
                reminded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_settings (
                user_id TEXT PRIMARY KEY,
                quiet_mode INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_activity (
                chat_id TEXT PRIMARY KEY,
                last_active_at TEXT NOT NULL
            );
            ",
            )
            .map_err(storage_err)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Switch do-not-disturb on or off for `user_id`.
    pub fn set_quiet_mode(&self, user_id: &str, on: bool) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO user_settings (user_id, quiet_mode, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET quiet_mode = excluded.quiet_mode,
                                                    updated_at = excluded.updated_at",
                params![user_id, on as i64, ts(Utc::now())],
            )
            .map_err(storage_err)?;
        tracing::info!(
            "{} Quiet mode {} for {user_id}",
            if on { "🔕" } else { "🔔" },
            if on { "on" } else { "off" }
        );
        Ok(())
    }

    /// Note that the user was active in `chat_id` right now.
    pub fn record_activity(&self, chat_id: &str) -> Result<()> {
        self.record_activity_at(chat_id, Utc::now())
    }

    pub fn record_activity_at(&self, chat_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO chat_activity (chat_id, last_active_at) VALUES (?1, ?2)",
                params![chat_id, ts(at)],
            )
            .map_err(storage_err)?;
        Ok(())
    }

    /// Mark goals as reminded at a given instant.
    pub fn mark_goals_reminded_at(&self, ids: &[String], at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(storage_err)?;
        for id in ids {
            tx.execute(
                "INSERT OR REPLACE INTO goal_reminders (goal_id, reminded_at) VALUES (?1, ?2)",
                params![id, ts(at)],
            )
            .map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)
    }

    /// Goal ids reminded at or after `since`.
    pub fn reminded_since(&self, since: DateTime<Utc>) -> Result<HashSet<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT goal_id FROM goal_reminders WHERE reminded_at >= ?1")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![ts(since)], |row| row.get::<_, String>(0))
            .map_err(storage_err)?;
        rows.collect::<std::result::Result<HashSet<_>, _>>()
            .map_err(storage_err)
    }

    /// Drop reminder marks older than `older_than_minutes`. Returns rows removed.
    pub fn prune_reminders(&self, older_than_minutes: u64) -> Result<usize> {
        let cutoff = minutes_ago(older_than_minutes);
        let removed = self
            .conn()
            .execute(
                "DELETE FROM goal_reminders WHERE reminded_at < ?1",
                params![ts(cutoff)],
            )
            .map_err(storage_err)?;
        if removed > 0 {
            tracing::debug!("🧹 Pruned {removed} expired reminder marks");
        }
        Ok(removed)
    }

    fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<CheckInLog> {
        let sources: String = row.get(3)?;
        let result: String = row.get(4)?;
        let urgency: Option<i64> = row.get(6)?;
        let created_at: String = row.get(8)?;
        Ok(CheckInLog {
            id: Some(row.get(0)?),
            user_id: row.get(1)?,
            data_hash: row.get(2)?,
            sources: serde_json::from_str(&sources).unwrap_or_default(),
            gating_result: GatingResult::from_str_lossy(&result),
            skip_reason: row.get(5)?,
            urgency: urgency.map(|u| u.clamp(0, u8::MAX as i64) as u8),
            message_sent: row.get(7)?,
            created_at: parse_ts(&created_at),
        })
    }
}

#[async_trait]
impl CheckInRepository for SqliteCheckInStore {
    async fn get_last_sent_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let last: Option<String> = conn
            .query_row(
                "SELECT created_at FROM checkin_logs WHERE gating_result != 'skip'
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(last.as_deref().map(parse_ts))
    }

    async fn is_quiet_mode(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn();
        let flag: Option<i64> = conn
            .query_row(
                "SELECT quiet_mode FROM user_settings WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(flag.unwrap_or(0) != 0)
    }

    async fn get_recent_logs(&self, limit: usize) -> Result<Vec<CheckInLog>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, data_hash, sources, gating_result, skip_reason,
                        urgency, message_sent, created_at
                 FROM checkin_logs ORDER BY created_at DESC, id DESC LIMIT ?1",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_log)
            .map_err(storage_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)
    }

    async fn get_recently_reminded_goal_ids(&self, window_minutes: u64) -> Result<HashSet<String>> {
        let since = minutes_ago(window_minutes);
        self.reminded_since(since)
    }

    async fn save_log(&self, entry: &CheckInLog) -> Result<()> {
        let sources = serde_json::to_string(&entry.sources)?;
        self.conn()
            .execute(
                "INSERT INTO checkin_logs
                    (user_id, data_hash, sources, gating_result, skip_reason, urgency, message_sent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.user_id,
                    entry.data_hash,
                    sources,
                    entry.gating_result.as_str(),
                    entry.skip_reason,
                    entry.urgency.map(i64::from),
                    entry.message_sent,
                    ts(entry.created_at),
                ],
            )
            .map_err(storage_err)?;
        Ok(())
    }

    async fn mark_goals_reminded(&self, ids: &[String]) -> Result<()> {
        self.mark_goals_reminded_at(ids, Utc::now())
    }
}

#[async_trait]
impl ActivityTracker for SqliteCheckInStore {
    async fn last_activity(&self, chat_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let last: Option<String> = conn
            .query_row(
                "SELECT last_active_at FROM chat_activity WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        Ok(last.as_deref().map(parse_ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    fn sent(result: GatingResult, created_at: DateTime<Utc>) -> CheckInLog {
        CheckInLog {
            id: None,
            user_id: "user-1".into(),
            data_hash: format!("hash-{}", created_at.timestamp()),
            sources: vec!["goals".into(), "calendar".into()],
            gating_result: result,
            skip_reason: None,
            urgency: Some(6),
            message_sent: Some("Heads up".into()),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_save_and_read_back_newest_first() {
        let store = SqliteCheckInStore::open_in_memory().unwrap();
        store.save_log(&sent(GatingResult::Text, at(9, 0))).await.unwrap();
        store
            .save_log(&CheckInLog::skip("user-1", "h2", vec![], "Data unchanged", None, at(9, 30)))
            .await
            .unwrap();
        store.save_log(&sent(GatingResult::Call, at(10, 0))).await.unwrap();

        let logs = store.get_recent_logs(2).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].gating_result, GatingResult::Call);
        assert_eq!(logs[0].sources, vec!["goals".to_string(), "calendar".to_string()]);
        assert_eq!(logs[0].urgency, Some(6));
        assert_eq!(logs[0].created_at, at(10, 0));
        assert!(logs[0].id.is_some());
        assert_eq!(logs[1].skip_reason.as_deref(), Some("Data unchanged"));
        assert_eq!(logs[1].urgency, None);
    }

    #[tokio::test]
    async fn test_last_sent_ignores_skips() {
        let store = SqliteCheckInStore::open_in_memory().unwrap();
        assert!(store.get_last_sent_time().await.unwrap().is_none());

        store.save_log(&sent(GatingResult::Text, at(8, 15))).await.unwrap();
        store
            .save_log(&CheckInLog::skip("user-1", "h", vec![], "Not urgent", Some(2), at(11, 0)))
            .await
            .unwrap();
        assert_eq!(store.get_last_sent_time().await.unwrap(), Some(at(8, 15)));
    }

    #[tokio::test]
    async fn test_quiet_mode_toggle() {
        let store = SqliteCheckInStore::open_in_memory().unwrap();
        assert!(!store.is_quiet_mode("user-1").await.unwrap());
        store.set_quiet_mode("user-1", true).unwrap();
        assert!(store.is_quiet_mode("user-1").await.unwrap());
        assert!(!store.is_quiet_mode("user-2").await.unwrap());
        store.set_quiet_mode("user-1", false).unwrap();
        assert!(!store.is_quiet_mode("user-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reminder_window_and_prune() {
        let store = SqliteCheckInStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .mark_goals_reminded_at(&["old".into()], now - chrono::Duration::hours(30))
            .unwrap();
        store.mark_goals_reminded(&["1".into(), "2".into()]).await.unwrap();

        let recent = store.get_recently_reminded_goal_ids(1440).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.contains("1") && recent.contains("2"));

        let wide = store.get_recently_reminded_goal_ids(3 * 1440).await.unwrap();
        assert!(wide.contains("old"));

        assert_eq!(store.prune_reminders(1440).unwrap(), 1);
        assert_eq!(store.get_recently_reminded_goal_ids(3 * 1440).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_huge_window_is_clamped() {
        let store = SqliteCheckInStore::open_in_memory().unwrap();
        store.mark_goals_reminded(&["3".into()]).await.unwrap();
        let ids = store.get_recently_reminded_goal_ids(u64::MAX).await.unwrap();
        assert!(ids.contains("3"));
        assert_eq!(store.prune_reminders(u64::MAX).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remark_refreshes_timestamp() {
        let store = SqliteCheckInStore::open_in_memory().unwrap();
        store
            .mark_goals_reminded_at(&["7".into()], Utc::now() - chrono::Duration::days(3))
            .unwrap();
        assert!(store.get_recently_reminded_goal_ids(60).await.unwrap().is_empty());
        store.mark_goals_reminded(&["7".into()]).await.unwrap();
        assert!(store.get_recently_reminded_goal_ids(60).await.unwrap().contains("7"));
    }

    #[tokio::test]
    async fn test_chat_activity() {
        let store = SqliteCheckInStore::open_in_memory().unwrap();
        assert!(store.last_activity("chat-1").await.unwrap().is_none());
        store.record_activity_at("chat-1", at(12, 0)).unwrap();
        store.record_activity_at("chat-1", at(12, 5)).unwrap();
        assert_eq!(store.last_activity("chat-1").await.unwrap(), Some(at(12, 5)));
    }

    #[tokio::test]
    async fn test_open_on_disk_persists() {
        let dir = std::env::temp_dir().join("vigil-test-checkin-store");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("vigil.db");

        {
            let store = SqliteCheckInStore::open(&path).unwrap();
            store.save_log(&sent(GatingResult::Text, at(7, 0))).await.unwrap();
        }
        let store = SqliteCheckInStore::open(&path).unwrap();
        assert_eq!(store.get_recent_logs(10).await.unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
