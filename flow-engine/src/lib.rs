//! # Flow engine
//!
//! Skills, the five conversation flows, the dispatcher that picks one per event, and the
//! ingestion loop that runs a webhook delivery through them and commits or clears sessions.

pub mod dispatcher;
pub mod flow;
pub mod ingest;
pub mod skill;

pub use dispatcher::{route, select_fallback, Dispatch, FlowDispatcher, FlowOutcome, Route};
pub use flow::{Flow, FlowKind, FlowRun, FlowSettings, DEFAULT_RETRY_PROMPT};
pub use ingest::{DeliveryReport, EventProcessor};
pub use skill::{DeclarativeSkill, ParameterSpec, ParserKind, Skill, SkillRegistry};
