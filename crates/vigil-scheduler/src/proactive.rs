//! Proactive check-in scheduler — decides on its own when to contact the user.
//!
//! ```text
//! timer (every check_interval_minutes)
//!   └── tick
//!        ├── 1. queue busy?      → defer, re-tick after defer_minutes
//!        ├── 2. quiet hours?     → skip
//!        ├── 3. cooldown?        → skip
//!        ├── 4. quiet mode?      → skip
//!        ├── 5. chatting now?    → skip
//!        └── perform_check (holds the query lock)
//!             ├── collectors (parallel, failures isolated)
//!             ├── empty?         → stop, no log
//!             ├── unchanged?     → log skip "Data unchanged"
//!             ├── drop reminded goals; empty? → stop, no log
//!             ├── gating oracle  → skip | text | call
//!             ├── send + log + mark goals reminded
//!             └── release lock, then fire the escalation call detached
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vigil_core::config::ProactiveConfig;
use vigil_core::error::Result;
use vigil_core::traits::{
    ActivityTracker, CheckInRepository, Collector, EscalationProvider, GatingOracle, Messenger,
};
use vigil_core::types::{CheckInLog, GatingAction, GatingDecision, GatingRequest, GatingResult};

use crate::fingerprint::{fingerprint, is_empty_data};
use crate::queue::TaskQueue;
use crate::quiet_hours::{QuietHours, parse_timezone};
use crate::reminders::{approaching_goal_ids, filter_reminded};

/// How many previous log rows the oracle sees.
const RECENT_LOG_CONTEXT: usize = 3;

/// Skip reason written when collector output matches the previous check.
pub const SKIP_UNCHANGED: &str = "Data unchanged";

/// Everything the scheduler talks to.
pub struct Collaborators {
    pub queue: TaskQueue,
    pub collectors: Vec<Arc<dyn Collector>>,
    pub repository: Arc<dyn CheckInRepository>,
    pub oracle: Arc<dyn GatingOracle>,
    pub messenger: Arc<dyn Messenger>,
    /// Phone-call provider; `None` disables escalation regardless of config.
    pub escalation: Option<Arc<dyn EscalationProvider>>,
    pub activity: Arc<dyn ActivityTracker>,
}

/// What a single tick ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    ShuttingDown,
    AlreadyChecking,
    /// Queue was busy; a re-check is scheduled.
    Deferred,
    QuietHours,
    Cooldown,
    QuietMode,
    ActiveChat,
    Checked(CheckOutcome),
    /// Something failed; already logged.
    Failed(String),
}

/// Result of a check that got past the gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Collectors had nothing at all.
    NoData,
    /// Same fingerprint as the last log row.
    Unchanged,
    /// Everything left was already reminded recently.
    AllReminded,
    Skipped { reason: String },
    Sent { result: GatingResult, urgency: u8 },
}

/// Snapshot for status output.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub checking: bool,
    pub shutting_down: bool,
    pub recheck_pending: bool,
    pub queue_processing: bool,
}

/// A call to place once the query lock is released.
struct EscalationPlan {
    destination: String,
    message: String,
    language: String,
}

struct SchedulerInner {
    config: ProactiveConfig,
    quiet_hours: QuietHours,
    timezone: Tz,
    deps: Collaborators,
    shutting_down: AtomicBool,
    checking: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    deferred: Mutex<Option<JoinHandle<()>>>,
}

/// Resets the re-entrancy flag on every exit path.
struct CheckingGuard<'a>(&'a AtomicBool);

impl Drop for CheckingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The proactive scheduler. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ProactiveScheduler {
    inner: Arc<SchedulerInner>,
}

impl ProactiveScheduler {
    pub fn new(config: ProactiveConfig, deps: Collaborators) -> Result<Self> {
        config.check_windows()?;
        let quiet_hours = QuietHours::from_config(&config.quiet_hours)?;
        let timezone = parse_timezone(&config.timezone)?;
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                config,
                quiet_hours,
                timezone,
                deps,
                shutting_down: AtomicBool::new(false),
                checking: AtomicBool::new(false),
                timer: Mutex::new(None),
                deferred: Mutex::new(None),
            }),
        })
    }

    /// Start the periodic timer. No-op when disabled, stopped or already running.
    pub fn start(&self) {
        let config = &self.inner.config;
        if !config.enabled {
            tracing::info!("⏸️ Proactive check-ins disabled");
            return;
        }
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            tracing::warn!("⚠️ Proactive scheduler already stopped — not restarting");
            return;
        }

        let mut timer = self.inner.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let period = Duration::from_secs(config.check_interval_minutes.max(1) * 60);
        tracing::info!(
            "⏰ Proactive scheduler started (check every {}m)",
            config.check_interval_minutes
        );

        let scheduler = self.clone();
        *timer = Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if scheduler.inner.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                let s = scheduler.clone();
                tokio::spawn(async move {
                    s.tick().await;
                });
            }
        }));
    }

    /// Stop the timer. An in-flight check finishes; pending re-checks bail out.
    pub fn stop(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let handle = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::info!("🛑 Proactive scheduler stopped");
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let running = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        let recheck_pending = self
            .inner
            .deferred
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        SchedulerStatus {
            enabled: self.inner.config.enabled,
            running,
            checking: self.inner.checking.load(Ordering::SeqCst),
            shutting_down: self.inner.shutting_down.load(Ordering::SeqCst),
            recheck_pending,
            queue_processing: self.inner.deps.queue.is_processing(),
        }
    }

    /// One timer-driven evaluation cycle.
    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Utc::now()).await
    }

    pub(crate) async fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let inner = &self.inner;
        if inner.shutting_down.load(Ordering::SeqCst) {
            return TickOutcome::ShuttingDown;
        }
        if inner.checking.load(Ordering::SeqCst) {
            tracing::debug!("⏭️ Check already in progress — tick ignored");
            return TickOutcome::AlreadyChecking;
        }

        match self.evaluate_gates(now).await {
            Ok(Some(gated)) => return gated,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("⚠️ Proactive gate evaluation failed: {e}");
                return TickOutcome::Failed(e.to_string());
            }
        }

        self.run_guarded(now).await
    }

    /// Run a check right away, skipping the gates. Used for manual triggers.
    pub async fn check_now(&self) -> TickOutcome {
        self.run_guarded(Utc::now()).await
    }

    async fn run_guarded(&self, now: DateTime<Utc>) -> TickOutcome {
        let inner = &self.inner;
        if inner
            .checking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return TickOutcome::AlreadyChecking;
        }
        let _guard = CheckingGuard(&inner.checking);

        match self.perform_check(now).await {
            Ok(outcome) => TickOutcome::Checked(outcome),
            Err(e) => {
                tracing::error!("❌ Proactive check failed: {e}");
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    /// Gates 1–5, in order. `Some` means the tick stops here.
    async fn evaluate_gates(&self, now: DateTime<Utc>) -> Result<Option<TickOutcome>> {
        let inner = &self.inner;
        let config = &inner.config;
        let deps = &inner.deps;

        if deps.queue.is_processing() {
            tracing::debug!("⏳ Queue busy — deferring check by {}m", config.defer_minutes);
            self.schedule_recheck();
            return Ok(Some(TickOutcome::Deferred));
        }

        if inner.quiet_hours.is_quiet_at(now, inner.timezone) {
            tracing::debug!("💤 Quiet hours — skipping check");
            return Ok(Some(TickOutcome::QuietHours));
        }

        if let Some(last_sent) = deps.repository.get_last_sent_time().await?
            && now.signed_duration_since(last_sent)
                < chrono::Duration::minutes(config.cooldown_minutes as i64)
        {
            tracing::debug!("🧊 Cooldown active (last sent {last_sent}) — skipping check");
            return Ok(Some(TickOutcome::Cooldown));
        }

        if deps.repository.is_quiet_mode(&config.target_user_id).await? {
            tracing::debug!("🔕 Quiet mode on — skipping check");
            return Ok(Some(TickOutcome::QuietMode));
        }

        if let Some(last_active) = deps.activity.last_activity(&config.target_chat_id).await?
            && now.signed_duration_since(last_active)
                < chrono::Duration::minutes(config.defer_minutes as i64)
        {
            tracing::debug!("💬 User is chatting — skipping check");
            return Ok(Some(TickOutcome::ActiveChat));
        }

        Ok(None)
    }

    /// Schedule a single re-check after `defer_minutes`.
    fn schedule_recheck(&self) {
        let mut deferred = self.inner.deferred.lock().unwrap_or_else(|e| e.into_inner());
        if deferred.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let delay = Duration::from_secs(self.inner.config.defer_minutes * 60);
        let scheduler = self.clone();
        *deferred = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Free the slot so this re-check may defer again.
            scheduler
                .inner
                .deferred
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if scheduler.inner.shutting_down.load(Ordering::SeqCst) {
                tracing::debug!("🛑 Deferred check dropped — shutting down");
                return;
            }
            scheduler.tick().await;
        }));
    }

    /// The lock-held part of a check. The lock is released before any
    /// escalation call goes out.
    async fn perform_check(&self, now: DateTime<Utc>) -> Result<CheckOutcome> {
        let mut lock = self.inner.deps.queue.acquire_lock().await;
        let result = self.check_locked(now).await;
        lock.release();

        let (outcome, escalation) = result?;
        if let Some(plan) = escalation {
            self.spawn_escalation(plan);
        }
        Ok(outcome)
    }

    async fn check_locked(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(CheckOutcome, Option<EscalationPlan>)> {
        let config = &self.inner.config;
        let deps = &self.inner.deps;
        let repo = &deps.repository;

        let (data, sources) = self.collect_all().await;
        if is_empty_data(&data) {
            tracing::debug!("🫙 Collectors returned nothing new");
            return Ok((CheckOutcome::NoData, None));
        }

        let data_hash = fingerprint(&data);
        let last = repo.get_recent_logs(1).await?;
        if last.first().is_some_and(|l| l.data_hash == data_hash) {
            tracing::debug!("♻️ Data unchanged since last check");
            let entry = CheckInLog::skip(
                &config.target_user_id,
                &data_hash,
                sources,
                SKIP_UNCHANGED,
                None,
                now,
            );
            repo.save_log(&entry).await?;
            return Ok((CheckOutcome::Unchanged, None));
        }

        let reminded = repo
            .get_recently_reminded_goal_ids(config.reminder_cooldown_minutes)
            .await?;
        let filtered = filter_reminded(&data, &reminded);
        if is_empty_data(&filtered) {
            tracing::debug!(
                "🔁 Everything left was reminded in the last {}m",
                config.reminder_cooldown_minutes
            );
            return Ok((CheckOutcome::AllReminded, None));
        }

        let can_call = self.escalation_threshold().is_some();
        let request = GatingRequest {
            data: filtered,
            recent_logs: repo.get_recent_logs(RECENT_LOG_CONTEXT).await?,
            language: config.language.clone(),
            timezone: config.timezone.clone(),
            can_call,
        };

        // Rows the scheduler writes on its own carry no urgency.
        let (decision, decided) = match deps.oracle.decide(&request).await {
            Ok(d) => (d, true),
            Err(e) => {
                tracing::warn!("⚠️ Gating oracle failed: {e}");
                (GatingDecision::skip(format!("Gating failed: {e}")), false)
            }
        };
        let urgency = decision.urgency.clamp(1, 10);

        let message = match decision.action {
            GatingAction::Skip => None,
            GatingAction::Text | GatingAction::Call => {
                decision.message.clone().filter(|m| !m.trim().is_empty())
            }
        };
        let Some(message) = message else {
            let (reason, logged_urgency) = match decision.action {
                GatingAction::Skip => (
                    decision
                        .reason
                        .clone()
                        .unwrap_or_else(|| "No reason given".into()),
                    decided.then_some(urgency),
                ),
                _ => ("Empty message".to_string(), None),
            };
            tracing::info!("🤫 Check-in skipped: {reason}");
            let entry = CheckInLog::skip(
                &config.target_user_id,
                &data_hash,
                sources,
                &reason,
                logged_urgency,
                now,
            );
            repo.save_log(&entry).await?;
            return Ok((CheckOutcome::Skipped { reason }, None));
        };

        let message_id = deps
            .messenger
            .send_message(&config.target_chat_id, &message)
            .await?;

        let escalate = should_escalate(decision.action, urgency, self.escalation_threshold());
        let result = if escalate {
            GatingResult::Call
        } else {
            GatingResult::Text
        };
        tracing::info!(
            "📣 Check-in sent (msg {}, urgency {}, {})",
            message_id,
            urgency,
            result
        );

        let entry = CheckInLog {
            id: None,
            user_id: config.target_user_id.clone(),
            data_hash,
            sources,
            gating_result: result,
            skip_reason: None,
            urgency: Some(urgency),
            message_sent: Some(message.clone()),
            created_at: now,
        };
        repo.save_log(&entry).await?;

        let goal_ids = approaching_goal_ids(&request.data);
        if !goal_ids.is_empty()
            && let Err(e) = repo.mark_goals_reminded(&goal_ids).await
        {
            tracing::warn!("⚠️ Failed to mark goals reminded: {e}");
        }

        let plan = match config.active_escalation() {
            Some(esc) if escalate => Some(EscalationPlan {
                destination: esc.destination.clone(),
                message,
                language: config.language.clone(),
            }),
            _ => None,
        };
        Ok((CheckOutcome::Sent { result, urgency }, plan))
    }

    /// Escalation threshold when a call could actually be placed.
    fn escalation_threshold(&self) -> Option<u8> {
        self.inner.deps.escalation.as_ref()?;
        self.inner
            .config
            .active_escalation()
            .map(|e| e.urgency_threshold)
    }

    /// Run every collector concurrently. Failures are logged and left out.
    async fn collect_all(&self) -> (Value, Vec<String>) {
        let calls = self.inner.deps.collectors.iter().map(|collector| {
            let collector = collector.clone();
            async move {
                let name = collector.name().to_string();
                let outcome = tokio::spawn(async move { collector.collect().await }).await;
                (name, outcome)
            }
        });

        let mut data = Map::new();
        let mut sources = Vec::new();
        for (name, outcome) in join_all(calls).await {
            match outcome {
                Ok(Ok(value)) => {
                    data.insert(name.clone(), value);
                    sources.push(name);
                }
                Ok(Err(e)) => tracing::warn!("⚠️ Collector '{}' failed: {e}", name),
                Err(e) => tracing::warn!("⚠️ Collector '{}' aborted: {e}", name),
            }
        }
        (Value::Object(data), sources)
    }

    /// Fire the call outside the critical section. Outcome is only logged.
    fn spawn_escalation(&self, plan: EscalationPlan) {
        let Some(provider) = self.inner.deps.escalation.clone() else {
            return;
        };
        tokio::spawn(async move {
            match provider
                .make_call(&plan.destination, &plan.message, &plan.language)
                .await
            {
                Ok(outcome) => tracing::info!(
                    "📞 Escalation call placed: {} ({})",
                    outcome.call_id,
                    outcome.status
                ),
                Err(e) => tracing::warn!("⚠️ Escalation call failed: {e}"),
            }
        });
    }
}

/// Escalate iff a channel exists and the oracle asked for a call, or sent a
/// text at or above the threshold.
pub fn should_escalate(action: GatingAction, urgency: u8, threshold: Option<u8>) -> bool {
    let Some(threshold) = threshold else {
        return false;
    };
    match action {
        GatingAction::Call => true,
        GatingAction::Text => urgency >= threshold,
        GatingAction::Skip => false,
    }
}
