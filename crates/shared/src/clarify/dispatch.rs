use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{EngineApi, MeetingDispatchRequest};
use crate::models::{DialogueKind, RunIdentifiers};
use crate::repos::Store;

use super::dedup::{request_fingerprint, DedupDecision, DedupGuard};
use super::error::ClarifyError;

/// Direct (non-clarified) question dispatch, gated by the dedup guard so a
/// double-submitted form or a racing client cannot start the same meeting
/// twice.
#[derive(Clone)]
pub struct MeetingDispatcher {
    store: Store,
    engine: Arc<dyn EngineApi>,
    guard: DedupGuard,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub run: RunIdentifiers,
    pub recommendations: HashMap<String, String>,
}

impl MeetingDispatcher {
    pub fn new(store: Store, engine: Arc<dyn EngineApi>, guard: DedupGuard) -> Self {
        Self {
            store,
            engine,
            guard,
        }
    }

    pub async fn dispatch(
        &self,
        user_id: Uuid,
        task: &str,
        personas: &[String],
        turns: u32,
        dialogue_kind: DialogueKind,
        user_profile: &str,
    ) -> Result<DispatchOutcome, ClarifyError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(ClarifyError::validation("task must not be empty"));
        }
        if personas.is_empty() {
            return Err(ClarifyError::validation(
                "at least one persona must be selected",
            ));
        }
        if turns == 0 {
            return Err(ClarifyError::validation("turns must be at least 1"));
        }

        let fingerprint = request_fingerprint(task, personas, dialogue_kind);
        if let DedupDecision::Duplicate { retry_after_ms } = self.guard.check(&fingerprint) {
            warn!(user_id = %user_id, "duplicate dispatch suppressed");
            return Err(ClarifyError::Duplicate { retry_after_ms });
        }

        let outcome = self
            .engine
            .dispatch_meeting(MeetingDispatchRequest {
                task: task.to_string(),
                personas: personas.to_vec(),
                turns,
                dialogue_kind,
                user_profile: user_profile.to_string(),
            })
            .await?;

        let local_run_id = self
            .store
            .create_run(
                user_id,
                &outcome.run_id,
                task,
                turns,
                personas,
                &outcome.recommendations,
                Utc::now(),
            )
            .await?;

        info!(
            user_id = %user_id,
            engine_run_id = %outcome.run_id,
            "meeting dispatched"
        );

        Ok(DispatchOutcome {
            run: RunIdentifiers {
                local: local_run_id,
                engine: outcome.run_id,
            },
            recommendations: outcome.recommendations,
        })
    }
}
