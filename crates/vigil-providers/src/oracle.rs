//! LLM gating oracle over any OpenAI-compatible chat completions API.
//!
//! The model gets the filtered collector data, the last few check-in log rows,
//! the user's language, timezone and local time, and whether a phone call is
//! possible. It must answer with a single JSON object:
//!
//! ```json
//! {"action": "skip" | "text" | "call", "urgency": 1-10, "reason": "...", "message": "..."}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{Value, json};
use vigil_core::config::LlmConfig;
use vigil_core::error::{Result, VigilError};
use vigil_core::traits::GatingOracle;
use vigil_core::types::{GatingAction, GatingDecision, GatingRequest};

const SYSTEM_PROMPT: &str = "You are the proactive side of a personal assistant. \
You are shown fresh data about the user's day (calendar, goals, messages, notes) \
and decide whether it is worth interrupting them right now.\n\
Rules:\n\
- Prefer \"skip\" unless something is time-sensitive or clearly useful.\n\
- Do not repeat what recent check-ins already said.\n\
- \"text\" sends a short chat message. \"call\" phones the user and is only for \
things that cannot wait; never choose it when calls are unavailable.\n\
- urgency is an integer from 1 (trivial) to 10 (emergency).\n\
- Write the message in the user's language, in a friendly tone, at most three sentences.\n\
Reply with one JSON object only: \
{\"action\": \"skip|text|call\", \"urgency\": 1-10, \"reason\": \"why\", \"message\": \"text for the user\"}";

pub struct LlmGatingOracle {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl LlmGatingOracle {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            client: reqwest::Client::new(),
        }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }
}

/// User prompt for one decision.
pub fn build_user_prompt(request: &GatingRequest, now: DateTime<Utc>) -> String {
    let local_time = match request.timezone.parse::<Tz>() {
        Ok(tz) => now.with_timezone(&tz).format("%A %Y-%m-%d %H:%M").to_string(),
        Err(_) => now.format("%A %Y-%m-%d %H:%M UTC").to_string(),
    };

    let history = if request.recent_logs.is_empty() {
        "(no previous check-ins)".to_string()
    } else {
        request
            .recent_logs
            .iter()
            .map(|log| {
                let detail = log
                    .message_sent
                    .as_deref()
                    .or(log.skip_reason.as_deref())
                    .unwrap_or("");
                format!(
                    "- {} [{}] {}",
                    log.created_at.format("%Y-%m-%d %H:%M"),
                    log.gating_result,
                    detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let data = serde_json::to_string_pretty(&request.data).unwrap_or_else(|_| "{}".into());

    format!(
        "Local time: {local_time} ({tz})\n\
         Language: {lang}\n\
         Phone calls available: {calls}\n\n\
         Recent check-ins (newest first):\n{history}\n\n\
         New data:\n{data}",
        tz = request.timezone,
        lang = request.language,
        calls = if request.can_call { "yes" } else { "no" },
    )
}

/// Pull the first JSON object out of a model reply (tolerates code fences and prose).
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn parse_urgency(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(1.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(1.0),
        _ => 1.0,
    };
    raw.round().clamp(1.0, 10.0) as u8
}

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Parse a model reply into a decision. Unknown actions become skip.
pub fn parse_decision(content: &str) -> Result<GatingDecision> {
    let raw = extract_json_object(content)
        .ok_or_else(|| VigilError::Provider("Oracle reply contained no JSON object".into()))?;
    let v: Value = serde_json::from_str(raw)
        .map_err(|e| VigilError::Provider(format!("Oracle reply is not valid JSON: {e}")))?;

    let action_str = v["action"].as_str().unwrap_or("").trim().to_ascii_lowercase();
    let urgency = parse_urgency(&v["urgency"]);
    let reason = non_empty(&v["reason"]);
    let message = non_empty(&v["message"]);

    let action = match action_str.as_str() {
        "skip" => GatingAction::Skip,
        "text" => GatingAction::Text,
        "call" => GatingAction::Call,
        other => {
            tracing::warn!("⚠️ Oracle returned unknown action '{other}' — treating as skip");
            return Ok(GatingDecision {
                action: GatingAction::Skip,
                urgency,
                reason: Some(format!("Unknown action '{other}'")),
                message: None,
            });
        }
    };

    Ok(GatingDecision {
        action,
        urgency,
        reason,
        message,
    })
}

#[async_trait]
impl GatingOracle for LlmGatingOracle {
    async fn decide(&self, request: &GatingRequest) -> Result<GatingDecision> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_user_prompt(request, Utc::now()) },
            ],
        });

        let url = format!("{}/chat/completions", self.endpoint);
        let req = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .json(&body);
        let resp = self
            .apply_auth(req)
            .send()
            .await
            .map_err(|e| VigilError::Http(format!("Oracle connection failed ({url}): {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(VigilError::Provider(format!("Oracle API error {status}: {text}")));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| VigilError::Http(e.to_string()))?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| VigilError::Provider("No choices in response".into()))?;

        let decision = parse_decision(content)?;
        tracing::debug!(
            "🧠 Oracle decided {:?} (urgency {})",
            decision.action,
            decision.urgency
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vigil_core::types::{CheckInLog, GatingResult};

    #[test]
    fn test_parse_plain_json() {
        let d = parse_decision(
            r#"{"action":"text","urgency":6,"reason":"meeting soon","message":"Standup in 15 min"}"#,
        )
        .unwrap();
        assert_eq!(d.action, GatingAction::Text);
        assert_eq!(d.urgency, 6);
        assert_eq!(d.message.as_deref(), Some("Standup in 15 min"));
    }

    #[test]
    fn test_parse_fenced_reply_with_prose() {
        let reply = "Sure!\n```json\n{\"action\": \"CALL\", \"urgency\": \"9\", \"message\": \"Your flight boards now\"}\n```";
        let d = parse_decision(reply).unwrap();
        assert_eq!(d.action, GatingAction::Call);
        assert_eq!(d.urgency, 9);
    }

    #[test]
    fn test_urgency_clamped() {
        assert_eq!(parse_decision(r#"{"action":"skip","urgency":42}"#).unwrap().urgency, 10);
        assert_eq!(parse_decision(r#"{"action":"skip","urgency":-3}"#).unwrap().urgency, 1);
        assert_eq!(parse_decision(r#"{"action":"skip"}"#).unwrap().urgency, 1);
    }

    #[test]
    fn test_unknown_action_becomes_skip() {
        let d = parse_decision(r#"{"action":"email","urgency":5,"message":"hi"}"#).unwrap();
        assert_eq!(d.action, GatingAction::Skip);
        assert_eq!(d.message, None);
        assert!(d.reason.unwrap().contains("email"));
    }

    #[test]
    fn test_no_json_is_error() {
        assert!(parse_decision("I think you should text them.").is_err());
        assert!(parse_decision("{not json}").is_err());
    }

    #[test]
    fn test_blank_message_dropped() {
        let d = parse_decision(r#"{"action":"text","urgency":3,"message":"  "}"#).unwrap();
        assert_eq!(d.message, None);
    }

    #[test]
    fn test_prompt_includes_context() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let request = GatingRequest {
            data: json!({"goals": {"approaching": [{"id": 1, "title": "Tax return"}]}}),
            recent_logs: vec![CheckInLog::skip("u", "h", vec![], "Nothing new", Some(2), now)],
            language: "de".into(),
            timezone: "Europe/Berlin".into(),
            can_call: false,
        };
        let prompt = build_user_prompt(&request, now);
        assert!(prompt.contains("13:00"));
        assert!(prompt.contains("Language: de"));
        assert!(prompt.contains("Phone calls available: no"));
        assert!(prompt.contains("Tax return"));
        assert!(prompt.contains(&format!("[{}] Nothing new", GatingResult::Skip)));
    }
}
