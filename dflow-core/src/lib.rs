//! # dflow-core
//!
//! Core types and traits for the conversation middleware: [`ConversationState`], [`Event`],
//! [`MessagePlatform`], [`IntentResolver`], the error taxonomy and tracing initialization.
//! Transport-agnostic; used by flow-engine, dflow-line and dflow-server.

pub mod error;
pub mod logger;
pub mod platform;
pub mod resolver;
pub mod types;

pub use error::{DflowError, ErrorKind, ParameterError, Result};
pub use logger::init_tracing;
pub use platform::{MessagePlatform, PlatformKind};
pub use resolver::IntentResolver;
pub use types::{
    is_blank, ConversationState, Event, EventType, Intent, OutboundMessage, PreviousCycle,
    TEXT_SUBTYPE, UNRECOGNIZED_ACTION,
};
