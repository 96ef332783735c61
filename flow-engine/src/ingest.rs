//! Event ingestion: one webhook delivery in, one turn per event.
//!
//! The signature is checked against the raw body, the events are decoded by the platform and
//! processed concurrently. Each turn holds its user's lane in the [`SessionStore`] from lookup to
//! commit, so events of one user never interleave while different users run in parallel.

use crate::dispatcher::{Dispatch, FlowDispatcher, FlowOutcome};
use dflow_core::{DflowError, Event, MessagePlatform, Result};
use futures::future::join_all;
use session_store::SessionStore;
use std::sync::Arc;
use tracing::{info, instrument, warn, Instrument};
use uuid::Uuid;

/// Counts of how the events of one delivery ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub events: usize,
    pub completed: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl DeliveryReport {
    fn record(&mut self, outcome: &FlowOutcome) {
        self.events += 1;
        match outcome {
            FlowOutcome::Completed(_) => self.completed += 1,
            FlowOutcome::Dropped => self.dropped += 1,
            FlowOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Runs deliveries through the dispatcher and commits or clears sessions.
pub struct EventProcessor {
    platform: Arc<dyn MessagePlatform>,
    dispatcher: Arc<FlowDispatcher>,
    store: Arc<SessionStore>,
}

impl EventProcessor {
    pub fn new(
        platform: Arc<dyn MessagePlatform>,
        dispatcher: Arc<FlowDispatcher>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            platform,
            dispatcher,
            store,
        }
    }

    pub fn platform(&self) -> &Arc<dyn MessagePlatform> {
        &self.platform
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Verifies and processes one webhook delivery.
    ///
    /// Fails with [`DflowError::InvalidSignature`] before touching any session when the signature
    /// is missing or wrong, and with a decoding error when the body is malformed.
    pub async fn process_delivery(
        &self,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<DeliveryReport> {
        let delivery_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "delivery",
            delivery_id = %delivery_id,
            platform = %self.platform.name()
        );
        async {
            let valid = signature
                .map(|s| self.platform.validate_signature(s, raw_body))
                .unwrap_or(false);
            if !valid {
                warn!(has_signature = signature.is_some(), "Signature validation failed");
                return Err(DflowError::InvalidSignature);
            }

            let events = self.platform.extract_events(raw_body)?;
            info!(events = events.len(), "Delivery accepted");

            let dispatches = join_all(events.iter().map(|event| self.process_event(event))).await;

            let mut report = DeliveryReport::default();
            for dispatch in &dispatches {
                report.record(&dispatch.outcome);
            }
            info!(
                completed = report.completed,
                dropped = report.dropped,
                failed = report.failed,
                "End of webhook process"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Runs one turn: lane, lookup, dispatch, then commit on success or clear on failure.
    #[instrument(skip(self, event), fields(user_id = ?event.user_id, event = %event.describe()))]
    pub async fn process_event(&self, event: &Event) -> Dispatch {
        let Some(user_id) = event.user_id.as_deref() else {
            info!("Event has no user id, skipping");
            return Dispatch {
                outcome: FlowOutcome::Dropped,
                flows: Vec::new(),
            };
        };

        let _turn = self.store.lock(user_id).await;
        let prior = self.store.get(user_id);
        let dispatch = self.dispatcher.dispatch(event, prior).await;

        match &dispatch.outcome {
            FlowOutcome::Completed(state) => {
                self.store.commit(user_id, state.clone());
                info!(
                    flows = ?dispatch.flows,
                    action = %state.intent.action,
                    confirming = ?state.confirming,
                    "Session updated"
                );
            }
            FlowOutcome::Dropped => {}
            FlowOutcome::Failed(kind) => {
                self.store.clear(user_id);
                warn!(flows = ?dispatch.flows, kind = ?kind, "Failed to process event, session cleared");
            }
        }
        dispatch
    }
}
