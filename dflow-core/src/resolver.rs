//! Intent recognition contract used by the flow dispatcher.

use crate::error::Result;
use crate::types::Intent;
use async_trait::async_trait;

/// Recognizes the intent of a free-text utterance. Failures are reported as
/// [`DflowError::Resolution`](crate::DflowError::Resolution).
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn identify(&self, session_id: &str, text: &str) -> Result<Intent>;
}
