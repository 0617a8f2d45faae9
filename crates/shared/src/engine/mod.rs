use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    ChatMessage, ClarificationPair, DialogueKind, EngineRunId, Speaker, TranscriptTurn,
};

mod http;

pub use http::{EngineClientConfig, EngineConfigError, HttpEngineClient};

pub type EngineFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// One role+text pair of a clarification dialogue as the engine sees it. The
/// engine contract carries no timestamps or other metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineTurn {
    pub role: String,
    pub text: String,
}

impl EngineTurn {
    pub fn from_transcript(transcript: &[TranscriptTurn]) -> Vec<Self> {
        transcript
            .iter()
            .map(|turn| Self {
                role: match turn.speaker {
                    Speaker::User => "user".to_string(),
                    Speaker::Assistant => "assistant".to_string(),
                },
                text: turn.text.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct InitialQuestionRequest {
    pub question: String,
    pub personas: Vec<String>,
    pub dialogue_kind: DialogueKind,
    pub user_profile: String,
}

#[derive(Debug, Clone)]
pub struct EvaluateTranscriptRequest {
    pub question: String,
    pub personas: Vec<String>,
    pub dialogue_kind: DialogueKind,
    pub transcript: Vec<EngineTurn>,
}

#[derive(Debug, Clone)]
pub struct TranscriptEvaluation {
    pub is_ready: bool,
    pub counter_question: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MeetingDispatchRequest {
    pub task: String,
    pub personas: Vec<String>,
    pub turns: u32,
    pub dialogue_kind: DialogueKind,
    pub user_profile: String,
}

#[derive(Debug, Clone)]
pub struct MeetingDispatchOutcome {
    pub run_id: EngineRunId,
    pub recommendations: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub run_id: EngineRunId,
    pub persona: String,
    pub message: String,
    pub clarifications: Vec<ClarificationPair>,
}

#[derive(Debug, Clone)]
pub struct ChatTranscriptRequest {
    pub run_id: EngineRunId,
    pub persona: String,
}

#[derive(Debug, Clone)]
pub struct FollowupEvaluationRequest {
    pub question: String,
    pub persona: String,
    pub dialogue_kind: DialogueKind,
    pub chat_history: Vec<ChatMessage>,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FollowupQuestionsRequest {
    pub question: String,
    pub persona: String,
    pub dialogue_kind: DialogueKind,
    pub chat_history: Vec<ChatMessage>,
    pub recommendation: Option<String>,
    pub previous_counter_questions: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine request timed out")]
    Timeout,
    #[error("engine unreachable: {0}")]
    Transport(String),
    #[error("engine returned status {status}")]
    Status { status: u16, message: Option<String> },
    #[error("engine response invalid: {0}")]
    InvalidResponse(String),
}

impl EngineError {
    /// Message surfaced to the caller. Passes the engine's own error text
    /// through when it sent one, otherwise a generic description.
    pub fn surface_message(&self) -> String {
        match self {
            Self::Status {
                message: Some(message),
                ..
            } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Synchronous adapter to the external recommendation/reasoning service.
/// One method per consumed engine operation; stubbed in tests.
pub trait EngineApi: Send + Sync {
    fn initial_question<'a>(
        &'a self,
        request: InitialQuestionRequest,
    ) -> EngineFuture<'a, String>;

    fn evaluate_transcript<'a>(
        &'a self,
        request: EvaluateTranscriptRequest,
    ) -> EngineFuture<'a, TranscriptEvaluation>;

    fn dispatch_meeting<'a>(
        &'a self,
        request: MeetingDispatchRequest,
    ) -> EngineFuture<'a, MeetingDispatchOutcome>;

    fn chat_turn<'a>(&'a self, request: ChatTurnRequest) -> EngineFuture<'a, String>;

    fn fetch_chat_transcript<'a>(
        &'a self,
        request: ChatTranscriptRequest,
    ) -> EngineFuture<'a, Vec<ChatMessage>>;

    fn evaluate_followup<'a>(
        &'a self,
        request: FollowupEvaluationRequest,
    ) -> EngineFuture<'a, bool>;

    fn counter_questions<'a>(
        &'a self,
        request: FollowupQuestionsRequest,
    ) -> EngineFuture<'a, Vec<String>>;
}
