//! Messaging platform abstraction.
//!
//! [`MessagePlatform`] is chosen once at configuration time; callers never branch on the platform
//! per event. Implementations live in their own crates (e.g. dflow-line).

use crate::error::Result;
use crate::types::{Event, OutboundMessage};
use async_trait::async_trait;

/// Inbound verification/decoding and outbound delivery for one messaging platform.
#[async_trait]
pub trait MessagePlatform: Send + Sync {
    /// Short platform tag, e.g. `line`.
    fn name(&self) -> &str;
    /// HTTP header carrying the request signature.
    fn signature_header(&self) -> &str;
    /// Checks `signature` against the raw request body.
    fn validate_signature(&self, signature: &str, raw_body: &[u8]) -> bool;
    /// Decodes the platform events of one webhook delivery.
    fn extract_events(&self, raw_body: &[u8]) -> Result<Vec<Event>>;
    /// Pushes messages to a user without a reply context.
    async fn send(&self, user_id: &str, messages: &[OutboundMessage]) -> Result<()>;
    /// Replies to an inbound event identified by its reply token.
    async fn reply(&self, reply_token: &str, messages: &[OutboundMessage]) -> Result<()>;
}

/// Supported platform tags, parsed from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Line,
}

impl PlatformKind {
    pub const DEFAULT: PlatformKind = PlatformKind::Line;

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" => Ok(PlatformKind::Line),
            _ => Err(crate::error::DflowError::UnsupportedPlatform(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Line => "line",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platform_kind() {
        assert_eq!(PlatformKind::parse("line").unwrap(), PlatformKind::Line);
        assert_eq!(PlatformKind::parse(" LINE ").unwrap(), PlatformKind::Line);
        assert!(PlatformKind::parse("facebook").is_err());
        assert_eq!(PlatformKind::DEFAULT.as_str(), "line");
    }
}
