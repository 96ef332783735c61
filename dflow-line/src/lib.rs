//! # dflow-line
//!
//! LINE Messaging API platform: webhook signature validation, event decoding into
//! [`dflow_core::Event`], and push/reply delivery via [`LinePlatform`].

mod adapters;
mod config;
mod line_adapter;

pub use adapters::{LineEvent, LineEventWrapper, LineOutbound, WebhookBody};
pub use config::{LineConfig, DEFAULT_API_BASE_URL};
pub use line_adapter::{LinePlatform, SIGNATURE_HEADER};
