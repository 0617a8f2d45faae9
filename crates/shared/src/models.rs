use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context label the engine uses to frame its answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueKind {
    Board,
    Email,
    Chat,
}

impl DialogueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::Email => "email",
            Self::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One turn of a clarification dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptTurn {
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            timestamp,
        }
    }

    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            timestamp,
        }
    }
}

/// Run identifier issued by this service. Used for history listing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalRunId(pub Uuid);

impl std::fmt::Display for LocalRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Run identifier issued by the recommendation engine. The engine keys its
/// per-persona chat memory on this id, so it is the only id that can resume
/// a follow-up chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineRunId(pub String);

impl EngineRunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EngineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Both namespaces of one run. Call sites pick the one they need instead of
/// guessing which string they were handed.
#[derive(Debug, Clone)]
pub struct RunIdentifiers {
    pub local: LocalRunId,
    pub engine: EngineRunId,
}

/// One message of an engine-held chat thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: ChatSender,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatSender {
    User,
    Agent,
}

/// An answered counter-question attached to a follow-up chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationPair {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitPreMeetingRequest {
    pub question: String,
    pub personas: Vec<String>,
    pub dialogue_kind: DialogueKind,
    #[serde(default)]
    pub user_profile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitPreMeetingResponse {
    pub session_id: Uuid,
    pub counter_question: String,
    pub is_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IteratePreMeetingRequest {
    pub session_id: Uuid,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IteratePreMeetingResponse {
    pub counter_question: Option<String>,
    pub is_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletePreMeetingRequest {
    pub session_id: Uuid,
    #[serde(default)]
    pub user_profile: Option<String>,
}

/// Shared by complete() and the direct dispatch path. `run_id` is the
/// engine-issued id; follow-up chat must be keyed on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingResponse {
    pub run_id: EngineRunId,
    pub recommendations: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchMeetingRequest {
    pub task: String,
    pub personas: Vec<String>,
    #[serde(default = "default_turns")]
    pub turns: u32,
    pub dialogue_kind: DialogueKind,
    #[serde(default)]
    pub user_profile: Option<String>,
}

fn default_turns() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub run_id: EngineRunId,
    pub persona: String,
    pub message: String,
    #[serde(default)]
    pub clarifications: Option<Vec<ClarificationPair>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateFollowupRequest {
    pub question: String,
    pub persona: String,
    pub run_id: EngineRunId,
    pub dialogue_kind: DialogueKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateFollowupResponse {
    pub needs_counter_questions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterQuestionsRequest {
    pub question: String,
    pub persona: String,
    pub run_id: EngineRunId,
    pub dialogue_kind: DialogueKind,
    #[serde(default)]
    pub previous_counter_questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterQuestionsResponse {
    pub counter_questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: LocalRunId,
    pub engine_run_id: EngineRunId,
    pub task: String,
    pub turns: u32,
    pub personas: Vec<String>,
    pub recommendations: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRunsResponse {
    pub items: Vec<RunSummary>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMemoryRequest {
    pub persona: String,
    pub content: String,
    #[serde(default)]
    pub run_id: Option<LocalRunId>,
    #[serde(default)]
    pub chat_transcript: Option<Vec<ChatMessage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMemoryResponse {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: Uuid,
    pub persona: String,
    pub content: String,
    pub run_id: Option<LocalRunId>,
    pub chat_transcript: Option<Vec<ChatMessage>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMemoriesResponse {
    pub items: Vec<MemoryItem>,
}
