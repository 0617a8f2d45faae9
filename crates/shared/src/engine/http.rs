use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{ChatMessage, ClarificationPair, EngineRunId};

use super::{
    ChatTranscriptRequest, ChatTurnRequest, EngineApi, EngineError, EngineFuture, EngineTurn,
    EvaluateTranscriptRequest, FollowupEvaluationRequest, FollowupQuestionsRequest,
    InitialQuestionRequest, MeetingDispatchOutcome, MeetingDispatchRequest, TranscriptEvaluation,
};

const PATH_INITIAL_QUESTION: &str = "/premeeting/counter-question";
const PATH_EVALUATE_TRANSCRIPT: &str = "/premeeting/evaluate";
const PATH_DISPATCH_MEETING: &str = "/meeting";
const PATH_CHAT: &str = "/chat";
const PATH_CHAT_TRANSCRIPT: &str = "/get_chat";
const PATH_EVALUATE_FOLLOWUP: &str = "/chat/evaluate";
const PATH_COUNTER_QUESTIONS: &str = "/chat/counter-questions";

const DEFAULT_EVALUATE_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_QUESTION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CHAT_TIMEOUT_MS: u64 = 120_000;
// Dispatch walks every requested persona's corpus; it is by far the slowest
// operation the engine exposes.
const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone)]
pub struct EngineClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub evaluate_timeout_ms: u64,
    pub question_timeout_ms: u64,
    pub chat_timeout_ms: u64,
    pub dispatch_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {key}: {value}")]
    ParseInt { key: String, value: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to build engine http client: {0}")]
    HttpClient(String),
}

impl EngineClientConfig {
    pub fn from_env() -> Result<Self, EngineConfigError> {
        let base_url = require_non_empty_env("ENGINE_BASE_URL")?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(EngineConfigError::InvalidConfiguration(
                "ENGINE_BASE_URL must start with http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            api_key: optional_trimmed_env("ENGINE_API_KEY"),
            evaluate_timeout_ms: parse_u64_env(
                "ENGINE_EVALUATE_TIMEOUT_MS",
                DEFAULT_EVALUATE_TIMEOUT_MS,
            )?,
            question_timeout_ms: parse_u64_env(
                "ENGINE_QUESTION_TIMEOUT_MS",
                DEFAULT_QUESTION_TIMEOUT_MS,
            )?,
            chat_timeout_ms: parse_u64_env("ENGINE_CHAT_TIMEOUT_MS", DEFAULT_CHAT_TIMEOUT_MS)?,
            dispatch_timeout_ms: parse_u64_env(
                "ENGINE_DISPATCH_TIMEOUT_MS",
                DEFAULT_DISPATCH_TIMEOUT_MS,
            )?,
        })
    }
}

#[derive(Clone)]
pub struct HttpEngineClient {
    client: reqwest::Client,
    config: EngineClientConfig,
}

impl HttpEngineClient {
    pub fn new(config: EngineClientConfig) -> Result<Self, EngineConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.dispatch_timeout_ms))
            .build()
            .map_err(|err| EngineConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post_json<Req, Res>(
        &self,
        path: &str,
        payload: &Req,
        timeout_ms: u64,
    ) -> Result<Res, EngineError>
    where
        Req: Serialize,
        Res: serde::de::DeserializeOwned,
    {
        let mut request = self
            .client
            .post(self.url(path))
            .timeout(Duration::from_millis(timeout_ms))
            .json(payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        decode_response(request.send().await).await
    }

    async fn get_json<Res>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        timeout_ms: u64,
    ) -> Result<Res, EngineError>
    where
        Res: serde::de::DeserializeOwned,
    {
        let mut request = self
            .client
            .get(self.url(path))
            .timeout(Duration::from_millis(timeout_ms))
            .query(query);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        decode_response(request.send().await).await
    }
}

impl EngineApi for HttpEngineClient {
    fn initial_question<'a>(
        &'a self,
        request: InitialQuestionRequest,
    ) -> EngineFuture<'a, String> {
        Box::pin(async move {
            let payload = InitialQuestionPayload {
                question: request.question,
                agents: request.personas,
                dialogue_kind: request.dialogue_kind.as_str(),
                user_profile: request.user_profile,
            };
            let response: CounterQuestionEnvelope = self
                .post_json(
                    PATH_INITIAL_QUESTION,
                    &payload,
                    self.config.question_timeout_ms,
                )
                .await?;
            Ok(response.counter_question)
        })
    }

    fn evaluate_transcript<'a>(
        &'a self,
        request: EvaluateTranscriptRequest,
    ) -> EngineFuture<'a, TranscriptEvaluation> {
        Box::pin(async move {
            let payload = EvaluateTranscriptPayload {
                question: request.question,
                agents: request.personas,
                dialogue_kind: request.dialogue_kind.as_str(),
                transcript: request.transcript,
            };
            let response: EvaluationEnvelope = self
                .post_json(
                    PATH_EVALUATE_TRANSCRIPT,
                    &payload,
                    self.config.evaluate_timeout_ms,
                )
                .await?;
            Ok(TranscriptEvaluation {
                is_ready: response.is_ready,
                counter_question: response.counter_question,
            })
        })
    }

    fn dispatch_meeting<'a>(
        &'a self,
        request: MeetingDispatchRequest,
    ) -> EngineFuture<'a, MeetingDispatchOutcome> {
        Box::pin(async move {
            let payload = DispatchPayload {
                task: request.task,
                agents: request.personas,
                turns: request.turns,
                dialogue_kind: request.dialogue_kind.as_str(),
                user_profile: request.user_profile,
            };
            let response: DispatchEnvelope = self
                .post_json(
                    PATH_DISPATCH_MEETING,
                    &payload,
                    self.config.dispatch_timeout_ms,
                )
                .await?;
            if response.run_id.trim().is_empty() {
                return Err(EngineError::InvalidResponse(
                    "dispatch response carried an empty run id".to_string(),
                ));
            }
            Ok(MeetingDispatchOutcome {
                run_id: EngineRunId(response.run_id),
                recommendations: response.recommendations,
            })
        })
    }

    fn chat_turn<'a>(&'a self, request: ChatTurnRequest) -> EngineFuture<'a, String> {
        Box::pin(async move {
            let payload = ChatPayload {
                run_id: request.run_id.0,
                agent: request.persona,
                message: request.message,
                clarifications: request.clarifications,
            };
            let response: ChatEnvelope = self
                .post_json(PATH_CHAT, &payload, self.config.chat_timeout_ms)
                .await?;
            Ok(response.response)
        })
    }

    fn fetch_chat_transcript<'a>(
        &'a self,
        request: ChatTranscriptRequest,
    ) -> EngineFuture<'a, Vec<ChatMessage>> {
        Box::pin(async move {
            let response: ChatTranscriptEnvelope = self
                .get_json(
                    PATH_CHAT_TRANSCRIPT,
                    &[
                        ("run_id", request.run_id.as_str()),
                        ("agent", request.persona.as_str()),
                    ],
                    self.config.evaluate_timeout_ms,
                )
                .await?;
            Ok(response.history)
        })
    }

    fn evaluate_followup<'a>(
        &'a self,
        request: FollowupEvaluationRequest,
    ) -> EngineFuture<'a, bool> {
        Box::pin(async move {
            let payload = FollowupEvaluationPayload {
                question: request.question,
                agent: request.persona,
                dialogue_kind: request.dialogue_kind.as_str(),
                chat_history: request.chat_history,
                recommendation: request.recommendation,
            };
            let response: FollowupEvaluationEnvelope = self
                .post_json(
                    PATH_EVALUATE_FOLLOWUP,
                    &payload,
                    self.config.evaluate_timeout_ms,
                )
                .await?;
            Ok(response.needs_clarification)
        })
    }

    fn counter_questions<'a>(
        &'a self,
        request: FollowupQuestionsRequest,
    ) -> EngineFuture<'a, Vec<String>> {
        Box::pin(async move {
            let payload = FollowupQuestionsPayload {
                question: request.question,
                agent: request.persona,
                dialogue_kind: request.dialogue_kind.as_str(),
                chat_history: request.chat_history,
                recommendation: request.recommendation,
                previous_counter_questions: request.previous_counter_questions,
            };
            let response: CounterQuestionsEnvelope = self
                .post_json(
                    PATH_COUNTER_QUESTIONS,
                    &payload,
                    self.config.question_timeout_ms,
                )
                .await?;
            Ok(response.counter_questions)
        })
    }
}

async fn decode_response<Res>(
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<Res, EngineError>
where
    Res: serde::de::DeserializeOwned,
{
    let response = result.map_err(|err| {
        if err.is_timeout() {
            EngineError::Timeout
        } else {
            EngineError::Transport(err.to_string())
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|_| EngineError::InvalidResponse("response body read failed".to_string()))?;

    if !status.is_success() {
        return Err(EngineError::Status {
            status: status.as_u16(),
            message: parse_engine_error_message(&body),
        });
    }

    serde_json::from_str(&body)
        .map_err(|err| EngineError::InvalidResponse(format!("response json invalid: {err}")))
}

fn parse_engine_error_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: Option<Value>,
    }

    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok()?;
    match envelope.error? {
        Value::String(message) => Some(message),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        _ => None,
    }
}

#[derive(Serialize)]
struct InitialQuestionPayload {
    question: String,
    agents: Vec<String>,
    dialogue_kind: &'static str,
    user_profile: String,
}

#[derive(Serialize)]
struct EvaluateTranscriptPayload {
    question: String,
    agents: Vec<String>,
    dialogue_kind: &'static str,
    transcript: Vec<EngineTurn>,
}

#[derive(Serialize)]
struct DispatchPayload {
    task: String,
    agents: Vec<String>,
    turns: u32,
    dialogue_kind: &'static str,
    user_profile: String,
}

#[derive(Serialize)]
struct ChatPayload {
    run_id: String,
    agent: String,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    clarifications: Vec<ClarificationPair>,
}

#[derive(Serialize)]
struct FollowupEvaluationPayload {
    question: String,
    agent: String,
    dialogue_kind: &'static str,
    chat_history: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommendation: Option<String>,
}

#[derive(Serialize)]
struct FollowupQuestionsPayload {
    question: String,
    agent: String,
    dialogue_kind: &'static str,
    chat_history: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommendation: Option<String>,
    previous_counter_questions: Vec<String>,
}

#[derive(Deserialize)]
struct CounterQuestionEnvelope {
    counter_question: String,
}

#[derive(Deserialize)]
struct EvaluationEnvelope {
    is_ready: bool,
    #[serde(default)]
    counter_question: Option<String>,
}

#[derive(Deserialize)]
struct DispatchEnvelope {
    run_id: String,
    recommendations: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ChatEnvelope {
    response: String,
}

#[derive(Deserialize)]
struct ChatTranscriptEnvelope {
    history: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct FollowupEvaluationEnvelope {
    needs_clarification: bool,
}

#[derive(Deserialize)]
struct CounterQuestionsEnvelope {
    counter_questions: Vec<String>,
}

fn require_non_empty_env(key: &str) -> Result<String, EngineConfigError> {
    let value = env::var(key).map_err(|_| EngineConfigError::MissingVar(key.to_string()))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineConfigError::MissingVar(key.to_string()));
    }
    Ok(trimmed.to_string())
}

fn parse_u64_env(key: &str, default: u64) -> Result<u64, EngineConfigError> {
    match optional_trimmed_env(key) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| EngineConfigError::ParseInt {
                key: key.to_string(),
                value,
            }),
        None => Ok(default),
    }
}

fn optional_trimmed_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
