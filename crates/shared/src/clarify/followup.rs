use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::engine::{
    ChatTranscriptRequest, ChatTurnRequest, EngineApi, FollowupEvaluationRequest,
    FollowupQuestionsRequest,
};
use crate::models::{ChatMessage, ClarificationPair, DialogueKind, EngineRunId};
use crate::repos::{RunRecord, Store};

use super::error::ClarifyError;

/// Lightweight per-message clarification used inside open-ended follow-up
/// chat. Holds no state of its own: the dialogue transcript lives in the
/// engine's per-(run, persona) memory and the accumulated counter-questions
/// live with the caller.
#[derive(Clone)]
pub struct ChatFollowupController {
    store: Store,
    engine: Arc<dyn EngineApi>,
}

impl ChatFollowupController {
    pub fn new(store: Store, engine: Arc<dyn EngineApi>) -> Self {
        Self { store, engine }
    }

    /// Asks the engine whether the question warrants counter-questions before
    /// answering. Fails open: any engine failure reads as "answer directly",
    /// so a flaky evaluation dependency never blocks the primary message.
    pub async fn evaluate(
        &self,
        user_id: Uuid,
        question: &str,
        persona: &str,
        run_id: &EngineRunId,
        dialogue_kind: DialogueKind,
    ) -> Result<bool, ClarifyError> {
        let question = non_empty(question, "question")?;
        let run = self.load_owned_run(user_id, run_id).await?;
        validate_persona(&run, persona)?;

        let chat_history = match self
            .engine
            .fetch_chat_transcript(ChatTranscriptRequest {
                run_id: run_id.clone(),
                persona: persona.to_string(),
            })
            .await
        {
            Ok(history) => history,
            Err(err) => {
                warn!(engine_run_id = %run_id, "followup transcript fetch failed, answering directly: {err}");
                return Ok(false);
            }
        };

        match self
            .engine
            .evaluate_followup(FollowupEvaluationRequest {
                question: question.to_string(),
                persona: persona.to_string(),
                dialogue_kind,
                chat_history,
                recommendation: run.recommendations.get(persona).cloned(),
            })
            .await
        {
            Ok(needs_clarification) => Ok(needs_clarification),
            Err(err) => {
                warn!(engine_run_id = %run_id, "followup evaluation failed, answering directly: {err}");
                Ok(false)
            }
        }
    }

    /// Generates clarifying questions for the pending message. Previously
    /// returned questions are passed through so the engine does not repeat
    /// itself.
    pub async fn counter_questions(
        &self,
        user_id: Uuid,
        question: &str,
        persona: &str,
        run_id: &EngineRunId,
        dialogue_kind: DialogueKind,
        previous_counter_questions: &[String],
    ) -> Result<Vec<String>, ClarifyError> {
        let question = non_empty(question, "question")?;
        let run = self.load_owned_run(user_id, run_id).await?;
        validate_persona(&run, persona)?;

        let chat_history = self
            .engine
            .fetch_chat_transcript(ChatTranscriptRequest {
                run_id: run_id.clone(),
                persona: persona.to_string(),
            })
            .await?;

        let questions = self
            .engine
            .counter_questions(FollowupQuestionsRequest {
                question: question.to_string(),
                persona: persona.to_string(),
                dialogue_kind,
                chat_history,
                recommendation: run.recommendations.get(persona).cloned(),
                previous_counter_questions: previous_counter_questions.to_vec(),
            })
            .await?;

        Ok(questions)
    }

    /// Forwards the message, optionally enriched with answered clarification
    /// pairs, to the engine's chat endpoint. The engine appends to its own
    /// durable transcript; nothing is duplicated locally. Whether every
    /// returned counter-question was answered is the caller's problem.
    pub async fn chat(
        &self,
        user_id: Uuid,
        run_id: &EngineRunId,
        persona: &str,
        message: &str,
        clarifications: Vec<ClarificationPair>,
    ) -> Result<String, ClarifyError> {
        let message = non_empty(message, "message")?;
        let run = self.load_owned_run(user_id, run_id).await?;
        validate_persona(&run, persona)?;

        let response = self
            .engine
            .chat_turn(ChatTurnRequest {
                run_id: run_id.clone(),
                persona: persona.to_string(),
                message: message.to_string(),
                clarifications,
            })
            .await?;

        Ok(response)
    }

    pub async fn history(
        &self,
        user_id: Uuid,
        run_id: &EngineRunId,
        persona: &str,
    ) -> Result<Vec<ChatMessage>, ClarifyError> {
        let run = self.load_owned_run(user_id, run_id).await?;
        validate_persona(&run, persona)?;

        let history = self
            .engine
            .fetch_chat_transcript(ChatTranscriptRequest {
                run_id: run_id.clone(),
                persona: persona.to_string(),
            })
            .await?;

        Ok(history)
    }

    async fn load_owned_run(
        &self,
        user_id: Uuid,
        run_id: &EngineRunId,
    ) -> Result<RunRecord, ClarifyError> {
        let run = self
            .store
            .get_run_by_engine_id(run_id)
            .await?
            .ok_or(ClarifyError::NotFound)?;

        if run.user_id != user_id {
            return Err(ClarifyError::NotOwner);
        }

        Ok(run)
    }
}

fn validate_persona(run: &RunRecord, persona: &str) -> Result<(), ClarifyError> {
    if !run.personas.iter().any(|candidate| candidate == persona) {
        return Err(ClarifyError::Validation(format!(
            "persona {persona} was not part of this run"
        )));
    }
    Ok(())
}

fn non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str, ClarifyError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClarifyError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}
