//! External judgment call: should we bother the user right now?

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{GatingDecision, GatingRequest};

#[async_trait]
pub trait GatingOracle: Send + Sync {
    async fn decide(&self, request: &GatingRequest) -> Result<GatingDecision>;
}
