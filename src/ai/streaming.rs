use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::sse::{parse_event, SseEvent, SseLineBuffer};
use super::transport::{StreamRequest, StreamResponse, Transport};
use super::{AiError, CancelToken, ChatMessage, StreamDelta, StreamState};
use crate::config::AIConfig;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    enable_search: bool,
    incremental_output: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Build the POST for an OpenAI-compatible endpoint. Only `content` is replayed;
/// reasoning kept on earlier assistant turns never goes back to the provider.
pub fn build_request(
    history: &[ChatMessage],
    config: &AIConfig,
) -> Result<StreamRequest, AiError> {
    let base_url = config.base_url().ok_or_else(|| {
        AiError::Configuration("Base URL is required for Custom/Bailian.".to_string())
    })?;

    let body = ChatCompletionRequest {
        model: config.effective_model(),
        messages: history
            .iter()
            .map(|msg| WireMessage {
                role: msg.role.as_str(),
                content: &msg.content,
            })
            .collect(),
        stream: true,
        enable_search: true,
        incremental_output: true,
    };
    let body = serde_json::to_value(&body)
        .map_err(|e| AiError::Transport(format!("Failed to encode request: {}", e)))?;

    Ok(StreamRequest {
        url: completions_url(base_url),
        headers: vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {}", config.api_key)),
            ("Accept".to_string(), "text/event-stream".to_string()),
        ],
        body,
    })
}

/// Turn a non-2xx response into [`AiError::Http`], preferring the provider's
/// own `error.message` over the reason phrase.
pub async fn http_error(response: StreamResponse) -> AiError {
    let status = response.status;
    let reason = response.reason.clone();
    let body = response.text().await;

    let provider_message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|env| env.error)
        .and_then(|err| err.message)
        .filter(|m| !m.is_empty());

    let message = provider_message
        .or(reason)
        .unwrap_or_else(|| body.trim().to_string());

    AiError::Http { status, message }
}

/// Stream a chat completion from a Bailian or custom OpenAI-compatible
/// endpoint, handing each decoded delta to `on_delta` in arrival order.
/// Returns how many deltas were emitted.
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

/// [`stream_chat`] that also reports `Requesting` just before the POST and
/// `Streaming` once the provider accepts it, before the first body byte.
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
    let request = build_request(history, config)?;

    if cancel.is_cancelled() {
        return Err(AiError::Cancelled);
    }

    log::info!(
        "Streaming {} turn(s) to {} ({})",
        history.len(),
        request.url,
        config.effective_model()
    );

    on_state(StreamState::Requesting);
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AiError::Cancelled),
        response = transport.post(request) => response?,
    };

    if !response.is_success() {
        let err = http_error(response).await;
        log::warn!("Provider rejected request: {}", err);
        return Err(err);
    }
    on_state(StreamState::Streaming);

    let mut body = response.body;
    let mut lines = SseLineBuffer::new();
    let mut emitted = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Stream stopped by user after {} delta(s)", emitted);
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
            match parse_event(&line) {
                SseEvent::Done => {
                    log::debug!("Stream finished with [DONE] after {} delta(s)", emitted);
                    return Ok(emitted);
                }
                SseEvent::Delta(delta) => {
                    emitted += 1;
                    on_delta(delta);
                }
                SseEvent::Skip => {}
            }
        }
    }

    if let Some(line) = lines.finish() {
        if let SseEvent::Delta(delta) = parse_event(&line) {
            emitted += 1;
            on_delta(delta);
        }
    }

    log::debug!("Stream body ended after {} delta(s)", emitted);
    Ok(emitted)
}
