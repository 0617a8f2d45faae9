use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{
    EngineApi, EngineTurn, EvaluateTranscriptRequest, InitialQuestionRequest,
    MeetingDispatchRequest,
};
use crate::models::{DialogueKind, RunIdentifiers, Speaker, TranscriptTurn};
use crate::repos::{ClarificationSessionRecord, SessionState, Store};

use super::error::ClarifyError;

/// Hard safety cap: once a dialogue holds this many user turns it is forced
/// ready no matter what the engine thinks, so no dialogue runs unbounded.
pub const MAX_USER_TURNS: usize = 5;

const ENRICHED_TASK_SEPARATOR: &str = "---";

/// The guided pre-meeting clarification state machine:
/// init → iterate* → ready → complete.
#[derive(Clone)]
pub struct PreMeetingOrchestrator {
    store: Store,
    engine: Arc<dyn EngineApi>,
}

#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub session_id: Uuid,
    pub counter_question: String,
    pub is_ready: bool,
}

#[derive(Debug, Clone)]
pub struct IterateOutcome {
    pub counter_question: Option<String>,
    pub is_ready: bool,
}

#[derive(Debug, Clone)]
pub struct CompleteOutcome {
    pub run: RunIdentifiers,
    pub recommendations: HashMap<String, String>,
}

impl PreMeetingOrchestrator {
    pub fn new(store: Store, engine: Arc<dyn EngineApi>) -> Self {
        Self { store, engine }
    }

    /// Opens a dialogue. The engine is always asked for one counter-question
    /// here, even if its own judgment would skip it, so the dialogue has
    /// diagnostic value from the first exchange; `is_ready` is always false.
    pub async fn init(
        &self,
        user_id: Uuid,
        question: &str,
        personas: &[String],
        dialogue_kind: DialogueKind,
        user_profile: &str,
    ) -> Result<InitOutcome, ClarifyError> {
        let question = non_empty(question, "question")?;
        validate_personas(personas)?;

        let counter_question = self
            .engine
            .initial_question(InitialQuestionRequest {
                question: question.to_string(),
                personas: personas.to_vec(),
                dialogue_kind,
                user_profile: user_profile.to_string(),
            })
            .await?;
        if counter_question.trim().is_empty() {
            return Err(ClarifyError::Upstream(
                "engine returned an empty counter-question".to_string(),
            ));
        }

        let now = Utc::now();
        let transcript = vec![
            TranscriptTurn::user(question, now),
            TranscriptTurn::assistant(counter_question.clone(), now),
        ];
        let session_id = self
            .store
            .create_clarification_session(
                user_id,
                question,
                personas,
                dialogue_kind,
                &transcript,
                SessionState::AwaitingUserAnswer,
                now,
            )
            .await?;

        info!(user_id = %user_id, session_id = %session_id, "clarification dialogue opened");

        Ok(InitOutcome {
            session_id,
            counter_question,
            is_ready: false,
        })
    }

    /// Appends the user's answer, asks the engine whether the question is now
    /// answerable, and applies the user-turn safety cap. The session is only
    /// mutated after the engine call succeeded, so a failed iterate can be
    /// retried without corrupting the transcript.
    pub async fn iterate(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        answer: &str,
    ) -> Result<IterateOutcome, ClarifyError> {
        let answer = non_empty(answer, "answer")?;
        let session = self.load_owned_session(user_id, session_id).await?;

        if !matches!(session.state, SessionState::AwaitingUserAnswer) {
            return Err(ClarifyError::validation(
                "session is not awaiting an answer",
            ));
        }

        let now = Utc::now();
        let mut transcript = session.transcript.clone();
        transcript.push(TranscriptTurn::user(answer, now));

        let evaluation = self
            .engine
            .evaluate_transcript(EvaluateTranscriptRequest {
                question: session.question.clone(),
                personas: session.personas.clone(),
                dialogue_kind: session.dialogue_kind,
                transcript: EngineTurn::from_transcript(&transcript),
            })
            .await?;

        let user_turns = count_user_turns(&transcript);
        let forced = user_turns >= MAX_USER_TURNS;
        let is_ready = forced || evaluation.is_ready;
        let counter_question = if is_ready {
            None
        } else {
            evaluation.counter_question
        };

        if forced && !evaluation.is_ready {
            warn!(
                session_id = %session_id,
                user_turns, "dialogue hit the user-turn cap; forcing readiness"
            );
        }

        if let Some(counter_question) = &counter_question {
            transcript.push(TranscriptTurn::assistant(counter_question.clone(), now));
        }

        let next_state = if is_ready {
            SessionState::Ready
        } else {
            SessionState::AwaitingUserAnswer
        };
        let updated = self
            .store
            .update_clarification_session(session_id, session.version, &transcript, next_state, now)
            .await?;
        if !updated {
            return Err(ClarifyError::StaleSession);
        }

        Ok(IterateOutcome {
            counter_question,
            is_ready,
        })
    }

    /// Dispatches the enriched task and persists the resulting run. The
    /// session is deleted only after the run row is durable; any earlier
    /// failure leaves the dialogue intact so complete() can be retried
    /// without re-asking the user anything.
    pub async fn complete(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        user_profile: &str,
    ) -> Result<CompleteOutcome, ClarifyError> {
        let session = self.load_owned_session(user_id, session_id).await?;

        if !matches!(session.state, SessionState::Ready) {
            return Err(ClarifyError::validation(
                "session is not ready for completion",
            ));
        }

        let enriched_task = render_enriched_task(&session.question, &session.transcript);
        let outcome = self
            .engine
            .dispatch_meeting(MeetingDispatchRequest {
                task: enriched_task.clone(),
                personas: session.personas.clone(),
                turns: 1,
                dialogue_kind: session.dialogue_kind,
                user_profile: user_profile.to_string(),
            })
            .await?;

        let now = Utc::now();
        let local_run_id = self
            .store
            .create_run(
                user_id,
                &outcome.run_id,
                &enriched_task,
                1,
                &session.personas,
                &outcome.recommendations,
                now,
            )
            .await?;

        if !self.store.delete_clarification_session(session_id).await? {
            // Someone else removed it between the run insert and now; the
            // durable artifact exists either way.
            warn!(session_id = %session_id, "completed session was already deleted");
        }

        info!(
            user_id = %user_id,
            session_id = %session_id,
            engine_run_id = %outcome.run_id,
            "clarification dialogue completed"
        );

        Ok(CompleteOutcome {
            run: RunIdentifiers {
                local: local_run_id,
                engine: outcome.run_id,
            },
            recommendations: outcome.recommendations,
        })
    }

    async fn load_owned_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<ClarificationSessionRecord, ClarifyError> {
        let session = self
            .store
            .get_clarification_session(session_id)
            .await?
            .ok_or(ClarifyError::NotFound)?;

        if session.user_id != user_id {
            return Err(ClarifyError::NotOwner);
        }

        Ok(session)
    }
}

/// The engine-bound task string: the original question verbatim, a separator
/// line, then the dialogue rendered one line per turn.
pub fn render_enriched_task(question: &str, transcript: &[TranscriptTurn]) -> String {
    let mut rendered = String::with_capacity(question.len() + transcript.len() * 48);
    rendered.push_str(question);
    rendered.push_str("\n\n");
    rendered.push_str(ENRICHED_TASK_SEPARATOR);
    for turn in transcript {
        rendered.push('\n');
        rendered.push_str(match turn.speaker {
            Speaker::User => "User: ",
            Speaker::Assistant => "AI: ",
        });
        rendered.push_str(&turn.text);
    }
    rendered
}

fn count_user_turns(transcript: &[TranscriptTurn]) -> usize {
    transcript
        .iter()
        .filter(|turn| matches!(turn.speaker, Speaker::User))
        .count()
}

fn non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str, ClarifyError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClarifyError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}

fn validate_personas(personas: &[String]) -> Result<(), ClarifyError> {
    if personas.is_empty() {
        return Err(ClarifyError::validation(
            "at least one persona must be selected",
        ));
    }
    if personas.iter().any(|persona| persona.trim().is_empty()) {
        return Err(ClarifyError::validation("personas must not be blank"));
    }
    Ok(())
}
