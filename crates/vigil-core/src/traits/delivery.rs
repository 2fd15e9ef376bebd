//! Outbound delivery: chat messages and phone calls.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::CallOutcome;

/// Chat transport used for proactive messages.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` to `target_id`, returning the transport's message id.
    async fn send_message(&self, target_id: &str, text: &str) -> Result<String>;
}

/// Higher-intrusion channel (telephony).
#[async_trait]
pub trait EscalationProvider: Send + Sync {
    async fn make_call(&self, phone_number: &str, message: &str, language: &str)
    -> Result<CallOutcome>;
}
