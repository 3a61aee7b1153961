use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::sse::{data_payload, SseLineBuffer};
use super::streaming::http_error;
use super::transport::{StreamRequest, Transport};
use super::{AiError, CancelToken, ChatMessage, Role, StreamDelta, StreamState};
use crate::config::AIConfig;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<&'a Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// One piece of a streamed Gemini reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiChunk {
    pub text: String,
}

fn parse_chunk(line: &str) -> Option<GeminiChunk> {
    let payload = data_payload(line)?.trim();
    match serde_json::from_str::<GenerateChunk>(payload) {
        Ok(chunk) => {
            let text: String = chunk
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().map(|p| p.text).collect())
                .unwrap_or_default();
            Some(GeminiChunk { text })
        }
        Err(e) => {
            log::debug!("Skipping undecodable Gemini line ({}): {}", e, payload);
            None
        }
    }
}

/// Stateful chat session: prior turns are replayed on every request and each
/// completed exchange is appended to the history.
#[derive(Debug, Clone)]
pub struct GeminiChat {
    api_key: String,
    model: String,
    base_url: String,
    system_instruction: Option<String>,
    history: Vec<Content>,
}

impl GeminiChat {
    /// `prior` maps `assistant` to Gemini's `model` role; system turns are
    /// folded into the system instruction.
    pub fn new(config: &AIConfig, prior: &[ChatMessage]) -> Self {
        let mut system = Vec::new();
        let mut history = Vec::new();
        for msg in prior {
            match msg.role {
                Role::System => system.push(msg.content.as_str()),
                Role::User => history.push(Content::text("user", &msg.content)),
                Role::Assistant => history.push(Content::text("model", &msg.content)),
            }
        }

        Self {
            api_key: config.api_key.clone(),
            model: config.effective_model().to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            system_instruction: (!system.is_empty()).then(|| system.join("\n\n")),
            history,
        }
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    fn build_request(&self, pending: &Content) -> Result<StreamRequest, AiError> {
        let body = GenerateRequest {
            contents: self.history.iter().chain(std::iter::once(pending)).collect(),
            system_instruction: self.system_instruction.as_ref().map(|text| SystemInstruction {
                parts: vec![Part { text: text.clone() }],
            }),
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| AiError::Transport(format!("Failed to encode request: {}", e)))?;

        Ok(StreamRequest {
            url: format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, self.model
            ),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("x-goog-api-key".to_string(), self.api_key.clone()),
            ],
            body,
        })
    }

    /// Send `message` as the next user turn, calling `on_chunk` for every chunk.
    /// Returns the full reply text.
    pub async fn send_message_stream<F>(
        &mut self,
        transport: &dyn Transport,
        message: &str,
        on_chunk: &mut F,
        cancel: &CancelToken,
    ) -> Result<String, AiError>
    where
        F: FnMut(GeminiChunk),
    {
        self.send_observed(transport, message, on_chunk, &mut |_| {}, cancel)
            .await
    }

    async fn send_observed<F, S>(
        &mut self,
        transport: &dyn Transport,
        message: &str,
        on_chunk: &mut F,
        on_state: &mut S,
        cancel: &CancelToken,
    ) -> Result<String, AiError>
    where
        F: FnMut(GeminiChunk),
        S: FnMut(StreamState),
    {
        let pending = Content::text("user", message);
        let request = self.build_request(&pending)?;

        if cancel.is_cancelled() {
            return Err(AiError::Cancelled);
        }

        log::info!(
            "Streaming Gemini turn ({} prior) with {}",
            self.history.len(),
            self.model
        );

        on_state(StreamState::Requesting);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AiError::Cancelled),
            response = transport.post(request) => response?,
        };

        if !response.is_success() {
            let err = http_error(response).await;
            log::warn!("Gemini rejected request: {}", err);
            return Err(err);
        }
        on_state(StreamState::Streaming);

        let mut body = response.body;
        let mut lines = SseLineBuffer::new();
        let mut reply = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Gemini stream stopped by user");
                    return Err(AiError::Cancelled);
                }
                next = body.next() => next,
            };

            let chunk = match next {
                Some(chunk) => chunk?,
                None => break,
            };

            for line in lines.push(&chunk) {
                if cancel.is_cancelled() {
                    return Err(AiError::Cancelled);
                }
                if let Some(chunk) = parse_chunk(&line) {
                    reply.push_str(&chunk.text);
                    on_chunk(chunk);
                }
            }
        }

        if let Some(chunk) = lines.finish().as_deref().and_then(parse_chunk) {
            reply.push_str(&chunk.text);
            on_chunk(chunk);
        }

        self.history.push(pending);
        self.history.push(Content::text("model", &reply));
        Ok(reply)
    }
}

/// Gemini side of the aggregator: seed a session with everything but the
/// newest turn, then stream that turn. Gemini has no reasoning channel.
pub async fn stream_chat<F>(
    transport: &dyn Transport,
    history: &[ChatMessage],
    config: &AIConfig,
    on_delta: &mut F,
    cancel: &CancelToken,
) -> Result<usize, AiError>
where
    F: FnMut(StreamDelta),
{
    stream_chat_observed(transport, history, config, on_delta, &mut |_| {}, cancel).await
}

/// [`stream_chat`] with `Requesting`/`Streaming` reported to `on_state`.
pub async fn stream_chat_observed<F, S>(
    transport: &dyn Transport,
    history: &[ChatMessage],
    config: &AIConfig,
    on_delta: &mut F,
    on_state: &mut S,
    cancel: &CancelToken,
) -> Result<usize, AiError>
where
    F: FnMut(StreamDelta),
    S: FnMut(StreamState),
{
    config.validate()?;
    let (latest, prior) = history.split_last().ok_or_else(|| {
        AiError::Configuration("Conversation has no message to send.".to_string())
    })?;

    let mut chat = GeminiChat::new(config, prior);
    let mut emitted = 0usize;
    chat.send_observed(
        transport,
        &latest.content,
        &mut |chunk: GeminiChunk| {
            if !chunk.text.is_empty() {
                emitted += 1;
                on_delta(StreamDelta::content(chunk.text));
            }
        },
        on_state,
        cancel,
    )
    .await?;

    Ok(emitted)
}
