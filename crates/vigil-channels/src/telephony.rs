//! Twilio voice escalation — reads the check-in aloud over a phone call.
//!
//! Uses the REST `Calls.json` endpoint with inline TwiML, so no public
//! webhook is needed.

use async_trait::async_trait;
use serde::Deserialize;
use vigil_core::config::TelephonyConfig;
use vigil_core::error::{Result, VigilError};
use vigil_core::traits::EscalationProvider;
use vigil_core::types::CallOutcome;

pub struct TwilioCaller {
    config: TelephonyConfig,
    client: reqwest::Client,
}

impl TwilioCaller {
    pub fn new(config: TelephonyConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Calls.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

/// Map a short language code to a Twilio `<Say>` locale.
pub fn voice_locale(language: &str) -> &'static str {
    let lang = language.trim().to_ascii_lowercase();
    match lang.split(['-', '_']).next().unwrap_or("") {
        "de" => "de-DE",
        "fr" => "fr-FR",
        "es" => "es-ES",
        "it" => "it-IT",
        "pt" => "pt-BR",
        "nl" => "nl-NL",
        "ja" => "ja-JP",
        "ko" => "ko-KR",
        "zh" => "zh-CN",
        "ru" => "ru-RU",
        "pl" => "pl-PL",
        "sv" => "sv-SE",
        "vi" => "vi-VN",
        _ => "en-US",
    }
}

/// Escape text for an XML element body.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// TwiML that speaks `message` once.
pub fn build_twiml(message: &str, language: &str) -> String {
    format!(
        "<Response><Say language=\"{}\">{}</Say></Response>",
        voice_locale(language),
        xml_escape(message)
    )
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl EscalationProvider for TwilioCaller {
    async fn make_call(
        &self,
        phone_number: &str,
        message: &str,
        language: &str,
    ) -> Result<CallOutcome> {
        if !self.config.is_configured() {
            return Err(VigilError::Channel("Telephony account not configured".into()));
        }

        let twiml = build_twiml(message, language);
        let form = [
            ("To", phone_number),
            ("From", self.config.from_number.as_str()),
            ("Twiml", twiml.as_str()),
        ];

        let resp = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| VigilError::Channel(format!("Call request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(VigilError::Channel(format!(
                "Telephony API error {status}: {text}"
            )));
        }

        let call: CallResponse = resp
            .json()
            .await
            .map_err(|e| VigilError::Channel(format!("Invalid call response: {e}")))?;

        tracing::info!("☎️ Calling {phone_number} (sid {})", call.sid);
        Ok(CallOutcome {
            call_id: call.sid,
            status: call.status.unwrap_or_else(|| "queued".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twiml_escapes_message() {
        let twiml = build_twiml("Tom & Jerry <3 \"now\"", "en");
        assert_eq!(
            twiml,
            "<Response><Say language=\"en-US\">Tom &amp; Jerry &lt;3 &quot;now&quot;</Say></Response>"
        );
    }

    #[test]
    fn test_voice_locale() {
        assert_eq!(voice_locale("de"), "de-DE");
        assert_eq!(voice_locale("pt-PT"), "pt-BR");
        assert_eq!(voice_locale("JA"), "ja-JP");
        assert_eq!(voice_locale("tlh"), "en-US");
        assert_eq!(voice_locale(""), "en-US");
    }

    #[test]
    fn test_calls_url() {
        let caller = TwilioCaller::new(TelephonyConfig {
            account_sid: "AC123".into(),
            base_url: "https://api.twilio.com/2010-04-01/".into(),
            ..TelephonyConfig::default()
        });
        assert_eq!(
            caller.calls_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_account_fails_fast() {
        let caller = TwilioCaller::new(TelephonyConfig::default());
        let err = caller.make_call("+15550100", "hi", "en").await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_call_response_parse() {
        let call: CallResponse =
            serde_json::from_str(r#"{"sid":"CA42","status":"queued","to":"+1"}"#).unwrap();
        assert_eq!(call.sid, "CA42");
        assert_eq!(call.status.as_deref(), Some("queued"));
    }
}
