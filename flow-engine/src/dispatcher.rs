//! Flow selection.
//!
//! [`route`] and [`select_fallback`] are pure: given the prior state, the event and (when one was
//! needed) the resolved intent they always pick the same variant. [`FlowDispatcher`] drives them,
//! calls the resolver only when the route requires it, and runs the chosen [`Flow`], cascading
//! ChangeParameter's `no_fit` into NoWay.

use crate::flow::{Flow, FlowKind, FlowRun, FlowSettings};
use dflow_core::{
    ConversationState, DflowError, ErrorKind, Event, Intent, IntentResolver, MessagePlatform,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Terminal result of one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    /// A flow ran; commit this state.
    Completed(ConversationState),
    /// The event was not handled; keep whatever state was there.
    Dropped,
    /// The turn failed; clear the session.
    Failed(ErrorKind),
}

/// Outcome plus the variants that ran, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub outcome: FlowOutcome,
    pub flows: Vec<FlowKind>,
}

impl Dispatch {
    fn dropped() -> Self {
        Self {
            outcome: FlowOutcome::Dropped,
            flows: Vec::new(),
        }
    }

    fn failed(kind: ErrorKind, flows: Vec<FlowKind>) -> Self {
        Self {
            outcome: FlowOutcome::Failed(kind),
            flows,
        }
    }
}

/// First dispatch decision, made before any resolver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Unsupported event for the current conversation state.
    Drop,
    /// No conversation yet: resolve `text` and start one.
    Start { text: String },
    /// A parameter is being confirmed: the event answers it.
    Reply,
    /// Conversation idle and the user typed `text`: resolve it before choosing.
    Resolve { text: String },
    /// Conversation idle, no text to resolve: choose between ChangeParameter and NoWay directly.
    Fallback,
}

/// Picks the route for `event` given the user's prior state.
pub fn route(prior: Option<&ConversationState>, event: &Event) -> Route {
    match prior {
        None => match event.user_text() {
            Some(text) if FlowKind::StartConversation.supports(event) => Route::Start {
                text: text.to_string(),
            },
            _ => Route::Drop,
        },
        Some(state) if state.is_confirming() => {
            if FlowKind::Reply.supports(event) {
                Route::Reply
            } else {
                Route::Drop
            }
        }
        Some(_) => match event.user_text() {
            Some(text) => Route::Resolve {
                text: text.to_string(),
            },
            None => Route::Fallback,
        },
    }
}

/// Chooses the variant for an idle conversation once the utterance is resolved
/// (`resolved = None` when there was no text to resolve).
pub fn select_fallback(state: &ConversationState, resolved: Option<&Intent>) -> FlowKind {
    if let Some(intent) = resolved {
        if !intent.is_unrecognized() {
            return FlowKind::ChangeIntent;
        }
    }
    if !state.previous.confirmed.is_empty() && !state.intent.is_unrecognized() {
        FlowKind::ChangeParameter
    } else {
        FlowKind::NoWay
    }
}

/// Selects and runs the flow for each event.
pub struct FlowDispatcher {
    platform: Arc<dyn MessagePlatform>,
    resolver: Arc<dyn IntentResolver>,
    settings: Arc<FlowSettings>,
}

impl FlowDispatcher {
    pub fn new(
        platform: Arc<dyn MessagePlatform>,
        resolver: Arc<dyn IntentResolver>,
        settings: Arc<FlowSettings>,
    ) -> Self {
        Self {
            platform,
            resolver,
            settings,
        }
    }

    pub fn settings(&self) -> &Arc<FlowSettings> {
        &self.settings
    }

    /// Handles one event against the user's prior state.
    #[instrument(skip(self, event, prior), fields(user_id = ?event.user_id, event = %event.describe()))]
    pub async fn dispatch(&self, event: &Event, prior: Option<ConversationState>) -> Dispatch {
        let session_id = event.user_id.clone().unwrap_or_default();
        let route = route(prior.as_ref(), event);
        debug!(route = ?route, "Route selected");

        match (route, prior) {
            (Route::Drop, _) => {
                info!("Unsupported event for this conversation, skipping");
                Dispatch::dropped()
            }
            (Route::Start { text }, _) => {
                let intent = match self.resolver.identify(&session_id, &text).await {
                    Ok(intent) => intent,
                    Err(e) => return Self::resolution_failed(e),
                };
                info!(action = %intent.action, "Intent identified, starting conversation");
                self.run_chain(FlowKind::StartConversation, event, ConversationState::new(intent))
                    .await
            }
            (Route::Reply, Some(state)) => self.run_chain(FlowKind::Reply, event, state).await,
            (Route::Resolve { text }, Some(mut state)) => {
                let intent = match self.resolver.identify(&session_id, &text).await {
                    Ok(intent) => intent,
                    Err(e) => return Self::resolution_failed(e),
                };
                let kind = select_fallback(&state, Some(&intent));
                info!(action = %intent.action, flow = %kind, "Intent identified");
                if kind == FlowKind::ChangeIntent {
                    state.intent = intent;
                }
                self.run_chain(kind, event, state).await
            }
            (Route::Fallback, Some(state)) => {
                let kind = select_fallback(&state, None);
                self.run_chain(kind, event, state).await
            }
            (route, None) => {
                // Only Start and Drop are produced without prior state.
                warn!(route = ?route, "Route requires prior state");
                Dispatch::failed(ErrorKind::FlowExecution, Vec::new())
            }
        }
    }

    fn resolution_failed(e: DflowError) -> Dispatch {
        error!(error = %e, "Failed to identify intent");
        Dispatch::failed(e.kind(), Vec::new())
    }

    /// Runs `kind`; a ChangeParameter `no_fit` falls through to NoWay on the same state.
    async fn run_chain(&self, kind: FlowKind, event: &Event, state: ConversationState) -> Dispatch {
        let mut flows = vec![kind];
        let run = match self.run_flow(kind, event, state).await {
            Ok(FlowRun::NoFit(state)) if kind == FlowKind::ChangeParameter => {
                info!("No parameter fits, turning to no way flow");
                flows.push(FlowKind::NoWay);
                self.run_flow(FlowKind::NoWay, event, state).await
            }
            other => other,
        };

        let outcome = match run {
            Ok(FlowRun::Finished(state)) => FlowOutcome::Completed(state),
            Ok(FlowRun::Dropped(_)) | Ok(FlowRun::NoFit(_)) => FlowOutcome::Dropped,
            Err(e) if e.is_drop() => {
                info!(error = %e, "Flow dropped the event");
                FlowOutcome::Dropped
            }
            Err(e) => {
                error!(error = %e, flows = ?flows, "Flow failed");
                FlowOutcome::Failed(e.kind())
            }
        };
        Dispatch { outcome, flows }
    }

    async fn run_flow(
        &self,
        kind: FlowKind,
        event: &Event,
        state: ConversationState,
    ) -> dflow_core::Result<FlowRun> {
        Flow::new(
            kind,
            Arc::clone(&self.platform),
            event.clone(),
            state,
            Arc::clone(&self.settings),
        )
        .run()
        .await
    }
}
