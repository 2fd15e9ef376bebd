//! Vigil configuration system.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, VigilError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub proactive: ProactiveConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub telephony: TelephonyConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub collectors: Vec<CollectorConfig>,
}

impl VigilConfig {
    /// Load config from the default path (~/.vigil/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VigilError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VigilError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| VigilError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Vigil home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vigil")
    }

    /// Sanity checks that can be done without touching the network.
    pub fn validate(&self) -> Result<()> {
        let p = &self.proactive;
        p.check_windows()?;
        p.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| VigilError::Config(format!("Unknown timezone '{}'", p.timezone)))?;
        if !p.enabled {
            return Ok(());
        }
        if p.check_interval_minutes == 0 {
            return Err(VigilError::Config(
                "proactive.check_interval_minutes must be > 0".into(),
            ));
        }
        if p.target_chat_id.trim().is_empty() {
            return Err(VigilError::Config("proactive.target_chat_id is required".into()));
        }
        if p.target_user_id.trim().is_empty() {
            return Err(VigilError::Config("proactive.target_user_id is required".into()));
        }
        parse_hhmm(&p.quiet_hours.start)?;
        parse_hhmm(&p.quiet_hours.end)?;
        if let Some(esc) = &p.escalation
            && esc.enabled
        {
            if esc.destination.trim().is_empty() {
                return Err(VigilError::Config(
                    "proactive.escalation.destination is required when escalation is enabled"
                        .into(),
                ));
            }
            if !(1..=10).contains(&esc.urgency_threshold) {
                return Err(VigilError::Config(
                    "proactive.escalation.urgency_threshold must be 1-10".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Parse a 24h `HH:MM` string into minutes since midnight.
pub fn parse_hhmm(s: &str) -> Result<u16> {
    let bad = || VigilError::Config(format!("Invalid time '{s}', expected HH:MM"));
    let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
    let h: u16 = h.parse().map_err(|_| bad())?;
    let m: u16 = m.parse().map_err(|_| bad())?;
    if h > 23 || m > 59 {
        return Err(bad());
    }
    Ok(h * 60 + m)
}

/// Proactive check-in scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u64,
    /// Minimum gap after a sent (non-skip) check-in.
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: u64,
    /// How long a reminded goal stays suppressed.
    #[serde(default = "default_reminder_cooldown")]
    pub reminder_cooldown_minutes: u64,
    /// Retry delay when the queue is busy; also the "actively chatting" window.
    #[serde(default = "default_defer")]
    pub defer_minutes: u64,
    #[serde(default)]
    pub quiet_hours: QuietHoursConfig,
    #[serde(default)]
    pub target_chat_id: String,
    #[serde(default)]
    pub target_user_id: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// IANA timezone name, e.g. "Europe/Berlin".
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub escalation: Option<EscalationConfig>,
}

fn default_check_interval() -> u64 { 30 }
fn default_cooldown() -> u64 { 120 }
fn default_reminder_cooldown() -> u64 { 1440 }
fn default_defer() -> u64 { 5 }
fn default_language() -> String { "en".into() }
fn default_timezone() -> String { "UTC".into() }

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval_minutes: default_check_interval(),
            cooldown_minutes: default_cooldown(),
            reminder_cooldown_minutes: default_reminder_cooldown(),
            defer_minutes: default_defer(),
            quiet_hours: QuietHoursConfig::default(),
            target_chat_id: String::new(),
            target_user_id: String::new(),
            language: default_language(),
            timezone: default_timezone(),
            escalation: None,
        }
    }
}

/// Upper bound for every minute-valued setting (one year).
pub const MAX_WINDOW_MINUTES: u64 = 525_600;

impl ProactiveConfig {
    /// Reject minute settings too large to turn into durations.
    pub fn check_windows(&self) -> Result<()> {
        let windows = [
            ("check_interval_minutes", self.check_interval_minutes),
            ("cooldown_minutes", self.cooldown_minutes),
            ("reminder_cooldown_minutes", self.reminder_cooldown_minutes),
            ("defer_minutes", self.defer_minutes),
        ];
        for (name, minutes) in windows {
            if minutes > MAX_WINDOW_MINUTES {
                return Err(VigilError::Config(format!(
                    "proactive.{name} must be at most {MAX_WINDOW_MINUTES}"
                )));
            }
        }
        Ok(())
    }

    /// The escalation config, if it is switched on and has somewhere to call.
    pub fn active_escalation(&self) -> Option<&EscalationConfig> {
        self.escalation
            .as_ref()
            .filter(|e| e.enabled && !e.destination.trim().is_empty())
    }
}

/// Quiet window, `HH:MM` 24h. Start inclusive, end exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHoursConfig {
    #[serde(default = "default_quiet_start")]
    pub start: String,
    #[serde(default = "default_quiet_end")]
    pub end: String,
}

fn default_quiet_start() -> String { "22:00".into() }
fn default_quiet_end() -> String { "08:00".into() }

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            start: default_quiet_start(),
            end: default_quiet_end(),
        }
    }
}

/// Phone-call escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Text decisions at or above this urgency also ring the phone.
    #[serde(default = "default_urgency_threshold")]
    pub urgency_threshold: u8,
    /// Phone number in E.164 form.
    #[serde(default)]
    pub destination: String,
}

fn default_urgency_threshold() -> u8 { 8 }

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            urgency_threshold: default_urgency_threshold(),
            destination: String::new(),
        }
    }
}

/// Telegram bot used to deliver proactive messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

/// Twilio-compatible telephony account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    /// Caller id the call is placed from.
    #[serde(default)]
    pub from_number: String,
    #[serde(default = "default_telephony_url")]
    pub base_url: String,
}

fn default_telephony_url() -> String { "https://api.twilio.com/2010-04-01".into() }

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            base_url: default_telephony_url(),
        }
    }
}

impl TelephonyConfig {
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.from_number.is_empty()
    }
}

/// LLM endpoint used as the gating oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (".../v1").
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String { "https://api.openai.com/v1".into() }
fn default_llm_model() -> String { "gpt-4o-mini".into() }
fn default_llm_temperature() -> f32 { 0.3 }
fn default_llm_timeout() -> u64 { 60 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Where the check-in database lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.vigil/vigil.db".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

/// An HTTP JSON data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_collector_timeout")]
    pub timeout_secs: u64,
}

fn default_collector_timeout() -> u64 { 20 }
