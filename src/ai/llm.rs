use serde::{Deserialize, Serialize};

use super::transport::Transport;
use super::{gemini, streaming, AiError, CancelToken, ChatMessage, StreamDelta};
use crate::config::{AIConfig, ServiceProvider};

/// Lifecycle of one stream invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Aborted,
    Failed,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Aborted | StreamState::Failed
        )
    }

    /// Terminal state reached by a finished invocation.
    pub fn settled(result: &Result<StreamOutcome, AiError>) -> Self {
        match result {
            Ok(_) => StreamState::Completed,
            Err(AiError::Cancelled) => StreamState::Aborted,
            Err(_) => StreamState::Failed,
        }
    }
}

/// A stream that ran to completion. Stops and failures come back as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    pub deltas: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider: ServiceProvider,
    pub name: String,
    pub reasoning_channel: bool,
    pub models: Vec<String>,
}

pub fn available_providers() -> Vec<ProviderInfo> {
    ServiceProvider::all()
        .into_iter()
        .map(|provider| {
            let models: &[&str] = match provider {
                ServiceProvider::Bailian => &["qwen3-max", "qwen-plus", "qwen-max", "deepseek-r1"],
                ServiceProvider::Gemini => &["gemini-2.5-flash", "gemini-2.5-pro"],
                ServiceProvider::Custom => &[],
            };
            ProviderInfo {
                provider,
                name: provider.display_name().to_string(),
                reasoning_channel: provider.uses_sse(),
                models: models.iter().map(|m| m.to_string()).collect(),
            }
        })
        .collect()
}

/// Stream the reply to the newest turn of `history`, delivering deltas to
/// `on_delta` as soon as each one decodes.
///
/// Configuration is checked before anything touches the network. A stop through
/// `cancel` surfaces as [`AiError::Cancelled`]; deltas already delivered stay
/// delivered. There is no retry.
pub async fn start_stream<F>(
    transport: &dyn Transport,
    history: &[ChatMessage],
    config: &AIConfig,
    on_delta: F,
    cancel: &CancelToken,
) -> Result<StreamOutcome, AiError>
where
    F: FnMut(StreamDelta),
{
    start_stream_observed(transport, history, config, on_delta, |_| {}, cancel).await
}

/// [`start_stream`] that also reports lifecycle transitions to `on_state`:
/// `Requesting` right before the request goes out and `Streaming` once the
/// provider answers with a success status. Terminal states are left to the
/// caller, see [`StreamState::settled`].
pub async fn start_stream_observed<F, S>(
    transport: &dyn Transport,
    history: &[ChatMessage],
    config: &AIConfig,
    mut on_delta: F,
    mut on_state: S,
    cancel: &CancelToken,
) -> Result<StreamOutcome, AiError>
where
    F: FnMut(StreamDelta),
    S: FnMut(StreamState),
{
    config.validate()?;

    let deltas = match config.provider {
        ServiceProvider::Gemini => {
            gemini::stream_chat_observed(
                transport,
                history,
                config,
                &mut on_delta,
                &mut on_state,
                cancel,
            )
            .await?
        }
        ServiceProvider::Bailian | ServiceProvider::Custom => {
            streaming::stream_chat_observed(
                transport,
                history,
                config,
                &mut on_delta,
                &mut on_state,
                cancel,
            )
            .await?
        }
    };

    Ok(StreamOutcome { deltas })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::transport::testing::ScriptedTransport;

    fn sse_config() -> AIConfig {
        AIConfig {
            provider: ServiceProvider::Bailian,
            api_key: "sk-test".to_string(),
            model_name: "qwen3-max".to_string(),
            base_url: Some("https://dashscope.example.com/compatible-mode/v1".to_string()),
        }
    }

    #[tokio::test]
    async fn end_to_end_reasoning_then_answer() {
        let transport = ScriptedTransport::ok([
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"step1\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Answer: yes\"}}]}\n\ndata: [DONE]\n\n",
        ]);
        let mut deltas = Vec::new();
        let result = start_stream(
            &transport,
            &[ChatMessage::user("Analyze X")],
            &sse_config(),
            |d| deltas.push(d),
            &CancelToken::new(),
        )
        .await;

        assert_eq!(result, Ok(StreamOutcome { deltas: 2 }));
        assert_eq!(StreamState::settled(&result), StreamState::Completed);
        assert_eq!(
            deltas,
            vec![
                StreamDelta::reasoning("step1"),
                StreamDelta::content("Answer: yes")
            ]
        );
    }

    #[tokio::test]
    async fn dispatches_gemini_by_tag() {
        let transport = ScriptedTransport::ok([
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hi\"}]}}]}\n\n",
        ]);
        let config = AIConfig {
            provider: ServiceProvider::Gemini,
            api_key: "g".to_string(),
            model_name: String::new(),
            base_url: None,
        };
        let mut deltas = Vec::new();
        start_stream(
            &transport,
            &[ChatMessage::user("x")],
            &config,
            |d| deltas.push(d),
            &CancelToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(deltas, vec![StreamDelta::content("hi")]);
        assert!(transport
            .last_request()
            .url
            .contains("gemini-2.5-flash:streamGenerateContent"));
    }

    #[tokio::test]
    async fn missing_base_url_is_rejected_before_network() {
        let transport = ScriptedTransport::ok(["data: [DONE]\n"]);
        let mut config = sse_config();
        config.base_url = None;
        let result = start_stream(
            &transport,
            &[ChatMessage::user("x")],
            &config,
            |_| {},
            &CancelToken::new(),
        )
        .await;
        assert!(matches!(result, Err(AiError::Configuration(_))));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn settled_states() {
        let transport = ScriptedTransport::status(401, [r#"{"error":{"message":"bad key"}}"#]);
        let result = start_stream(
            &transport,
            &[ChatMessage::user("x")],
            &sse_config(),
            |_| {},
            &CancelToken::new(),
        )
        .await;
        assert_eq!(StreamState::settled(&result), StreamState::Failed);
        assert_eq!(
            StreamState::settled(&Err(AiError::Cancelled)),
            StreamState::Aborted
        );
        assert!(StreamState::Aborted.is_terminal());
        assert!(!StreamState::Streaming.is_terminal());
    }

    #[tokio::test]
    async fn streaming_is_observed_before_any_delta() {
        let transport = ScriptedTransport::ok(["data: [DONE]\n"]);
        let mut states = Vec::new();
        let result = start_stream_observed(
            &transport,
            &[ChatMessage::user("x")],
            &sse_config(),
            |_| {},
            |s| states.push(s),
            &CancelToken::new(),
        )
        .await;

        assert_eq!(result, Ok(StreamOutcome { deltas: 0 }));
        assert_eq!(states, vec![StreamState::Requesting, StreamState::Streaming]);
        assert_eq!(StreamState::settled(&result), StreamState::Completed);
    }

    #[tokio::test]
    async fn gemini_reports_the_same_states() {
        let transport = ScriptedTransport::ok([""]);
        let config = AIConfig {
            provider: ServiceProvider::Gemini,
            api_key: "g".to_string(),
            model_name: String::new(),
            base_url: None,
        };
        let mut states = Vec::new();
        start_stream_observed(
            &transport,
            &[ChatMessage::user("x")],
            &config,
            |_| {},
            |s| states.push(s),
            &CancelToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(states, vec![StreamState::Requesting, StreamState::Streaming]);
    }

    #[test]
    fn lists_every_provider() {
        let providers = available_providers();
        assert_eq!(providers.len(), 3);
        assert!(providers
            .iter()
            .any(|p| p.provider == ServiceProvider::Gemini && !p.reasoning_channel));
    }
}
