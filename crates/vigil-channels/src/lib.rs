//! # Vigil Channels
//!
//! Delivery adapters used by the proactive scheduler.
//! - `telegram` — chat messages through the Bot API ([`Messenger`](vigil_core::traits::Messenger))
//! - `telephony` — escalation phone calls through Twilio ([`EscalationProvider`](vigil_core::traits::EscalationProvider))

pub mod telegram;
pub mod telephony;

pub use telegram::TelegramMessenger;
pub use telephony::TwilioCaller;
