//! LINE channel credentials and API endpoint.

use std::fmt;

pub const DEFAULT_API_BASE_URL: &str = "https://api.line.me";

/// Credentials of one LINE Messaging API channel.
#[derive(Clone)]
pub struct LineConfig {
    pub channel_id: String,
    /// Key of the webhook signature HMAC.
    pub channel_secret: String,
    /// Bearer token for push and reply calls.
    pub channel_access_token: String,
    pub api_base_url: String,
}

impl LineConfig {
    pub fn new(
        channel_id: impl Into<String>,
        channel_secret: impl Into<String>,
        channel_access_token: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            channel_secret: channel_secret.into(),
            channel_access_token: channel_access_token.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Points push and reply at another host (a mock server in tests).
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

// Secrets stay out of logs.
impl fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineConfig")
            .field("channel_id", &self.channel_id)
            .field("channel_secret", &"***")
            .field("channel_access_token", &"***")
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}
