use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;

use super::AiError;

pub type ByteStream = BoxStream<'static, Result<Bytes, AiError>>;

/// A JSON POST whose response body is consumed incrementally.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl StreamRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct StreamResponse {
    pub status: u16,
    /// Canonical reason phrase for `status`, if one exists.
    pub reason: Option<String>,
    pub body: ByteStream,
}

impl StreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the whole body, used for error payloads.
    pub async fn text(mut self) -> String {
        let mut raw = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(bytes) => raw.extend_from_slice(&bytes),
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }
}

/// Seam between the aggregators and the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: StreamRequest) -> Result<StreamResponse, AiError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: StreamRequest) -> Result<StreamResponse, AiError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .json(&request.body)
            .send()
            .await
            .map_err(|e| AiError::Transport(format!("Stream request failed: {}", e)))?;

        let status = response.status();
        log::debug!("{} -> {}", request.url, status);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| AiError::Transport(format!("Stream error: {}", e))))
            .boxed();

        Ok(StreamResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            body,
        })
    }
}
