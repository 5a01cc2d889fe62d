use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::PartialCallback;
use crate::connector::adapter::ChatClient;
use crate::domain::{Completion, DomainError, GenerationParams, StreamAccumulator, Turn};

pub const DEFAULT_API_VERSION: &str = "2024-02-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
const ENV_API_KEY: &str = "AZURE_OPENAI_API_KEY";
const ENV_DEPLOYMENT_ID: &str = "AZURE_OPENAI_DEPLOYMENT_ID";
const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";

/// Connection settings for an Azure OpenAI chat deployment.
///
/// Construction validates everything up front so a broken setup fails at
/// startup with a [`DomainError::Configuration`], not on the first message.
#[derive(Clone)]
pub struct AzureOpenAiConfig {
    endpoint: Url,
    api_key: String,
    deployment_id: String,
    api_version: String,
}

impl AzureOpenAiConfig {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        deployment_id: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let endpoint = Url::parse(endpoint.trim()).map_err(|e| {
            DomainError::configuration(format!("invalid Azure OpenAI endpoint '{endpoint}': {e}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(DomainError::configuration(format!(
                "Azure OpenAI endpoint must be http(s), got '{}'",
                endpoint.scheme()
            )));
        }

        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(DomainError::configuration("Azure OpenAI API key is empty"));
        }

        let deployment_id = deployment_id.into();
        if deployment_id.trim().is_empty() {
            return Err(DomainError::configuration(
                "Azure OpenAI deployment id is empty",
            ));
        }

        Ok(Self {
            endpoint,
            api_key,
            deployment_id,
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Reads the configuration from the environment:
    ///
    /// | Variable                     | Required | Default      |
    /// |------------------------------|----------|--------------|
    /// | `AZURE_OPENAI_ENDPOINT`      | yes      |              |
    /// | `AZURE_OPENAI_API_KEY`       | yes      |              |
    /// | `AZURE_OPENAI_DEPLOYMENT_ID` | yes      |              |
    /// | `AZURE_OPENAI_API_VERSION`   | no       | `2024-02-01` |
    pub fn from_env() -> Result<Self, DomainError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DomainError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DomainError::configuration(format!("{key} is not set")))
        };

        let config = Self::new(
            &required(ENV_ENDPOINT)?,
            required(ENV_API_KEY)?,
            required(ENV_DEPLOYMENT_ID)?,
        )?;

        Ok(match lookup(ENV_API_VERSION).filter(|v| !v.trim().is_empty()) {
            Some(version) => config.with_api_version(version),
            None => config,
        })
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub fn chat_completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.deployment_id,
            self.api_version
        )
    }
}

// The API key never appears in logs.
impl fmt::Debug for AzureOpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureOpenAiConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("deployment_id", &self.deployment_id)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl<'a> ApiRequest<'a> {
    fn new(turns: &'a [Turn], params: &GenerationParams, stream: bool) -> Self {
        Self {
            messages: turns
                .iter()
                .map(|t| ApiMessage {
                    role: t.role().as_str(),
                    content: t.content(),
                })
                .collect(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stream,
        }
    }
}

/// Minimal subset of the chat-completions response we care about.
#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: Option<ApiChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

enum SseLine {
    Chunk(StreamChunk),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => SseLine::Chunk(chunk),
        Err(e) => {
            debug!("AzureOpenAiClient: skipping unparseable stream line: {e}");
            SseLine::Skip
        }
    }
}

/// HTTP client for Azure OpenAI chat completions.
///
/// Implements [`ChatClient`] so [`super::LlmChatService`] stays decoupled from
/// transport and serialization details. Supports both one-shot and
/// server-sent-event streaming requests.
pub struct AzureOpenAiClient {
    client: reqwest::Client,
    config: AzureOpenAiConfig,
    url: String,
}

impl AzureOpenAiClient {
    pub fn new(config: AzureOpenAiConfig) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("failed to build HTTP client: {e}"))
            })?;
        let url = config.chat_completions_url();
        Ok(Self {
            client,
            config,
            url,
        })
    }

    pub fn from_env() -> Result<Self, DomainError> {
        Self::new(AzureOpenAiConfig::from_env()?)
    }

    async fn post(&self, request: &ApiRequest<'_>) -> Result<reqwest::Response, DomainError> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| DomainError::transport(format!("AzureOpenAiClient: request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("AzureOpenAiClient: API returned {status}: {body}");
        Err(status_error(status))
    }
}

/// Credentials and deployment problems need an operator; everything else
/// may succeed on a later attempt.
fn status_error(status: StatusCode) -> DomainError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            DomainError::configuration(format!("AzureOpenAiClient: API returned {status}"))
        }
        _ => DomainError::transport(format!("AzureOpenAiClient: API returned {status}")),
    }
}

#[async_trait]
impl ChatClient for AzureOpenAiClient {
    async fn complete(
        &self,
        turns: &[Turn],
        params: &GenerationParams,
    ) -> Result<Completion, DomainError> {
        let request = ApiRequest::new(turns, params, false);
        let response = self.post(&request).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            DomainError::transport(format!("AzureOpenAiClient: failed to parse response: {e}"))
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::empty_response("no choices returned"))?;
        let text = choice
            .message
            .and_then(|m| m.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DomainError::empty_response("no response generated"))?;

        Ok(Completion::new(text, choice.finish_reason))
    }

    async fn complete_streaming(
        &self,
        turns: &[Turn],
        params: &GenerationParams,
        on_partial: PartialCallback<'_>,
    ) -> Result<Completion, DomainError> {
        let request = ApiRequest::new(turns, params, true);
        let response = self.post(&request).await?;

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut acc = StreamAccumulator::new();

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                DomainError::transport(format!("AzureOpenAiClient: stream interrupted: {e}"))
            })?;
            pending.extend_from_slice(&chunk);

            // Events are newline-delimited; keep any trailing partial line.
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    SseLine::Done => break 'read,
                    SseLine::Skip => {}
                    SseLine::Chunk(chunk) => {
                        for choice in chunk.choices {
                            if let Some(reason) = choice.finish_reason {
                                acc.set_finish_reason(reason);
                            }
                            let delta = choice.delta.and_then(|d| d.content).unwrap_or_default();
                            if let Some(text) = acc.push(&delta) {
                                on_partial(text);
                            }
                        }
                    }
                }
            }
        }

        debug!(
            "AzureOpenAiClient: stream finished after {} deltas",
            acc.delta_count()
        );

        if acc.text().trim().is_empty() {
            return Err(DomainError::empty_response("stream produced no content"));
        }
        Ok(acc.finish())
    }

    fn model_name(&self) -> &str {
        self.config.deployment_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn builds_deployment_url() {
        let config = AzureOpenAiConfig::new("https://tufti.openai.azure.com/", "key", "gpt-4o")
            .unwrap()
            .with_api_version("2024-06-01");

        assert_eq!(
            config.chat_completions_url(),
            "https://tufti.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn from_lookup_reports_missing_variable() {
        let err = AzureOpenAiConfig::from_lookup(lookup(&[
            (ENV_ENDPOINT, "https://tufti.openai.azure.com"),
            (ENV_DEPLOYMENT_ID, "gpt-4o"),
        ]))
        .unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains(ENV_API_KEY));
    }

    #[test]
    fn from_lookup_defaults_api_version() {
        let config = AzureOpenAiConfig::from_lookup(lookup(&[
            (ENV_ENDPOINT, "https://tufti.openai.azure.com"),
            (ENV_API_KEY, "secret"),
            (ENV_DEPLOYMENT_ID, "gpt-4o"),
        ]))
        .unwrap();

        assert!(config
            .chat_completions_url()
            .ends_with(&format!("api-version={DEFAULT_API_VERSION}")));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = AzureOpenAiConfig::new("ftp://tufti.example", "key", "gpt-4o").unwrap_err();
        assert!(err.is_configuration());

        let err = AzureOpenAiConfig::new("not a url", "key", "gpt-4o").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config =
            AzureOpenAiConfig::new("https://tufti.openai.azure.com", "super-secret", "gpt-4o")
                .unwrap();
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn request_carries_generation_params() {
        let turns = vec![Turn::system("persona"), Turn::user("hi")];
        let request = ApiRequest::new(&turns, &GenerationParams::default(), false);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 1500);
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn parses_sse_lines() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        match parse_sse_line(line) {
            SseLine::Chunk(chunk) => {
                let delta = chunk.choices[0].delta.as_ref().unwrap();
                assert_eq!(delta.content.as_deref(), Some("Hello"));
            }
            _ => panic!("expected a chunk"),
        }

        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(parse_sse_line(""), SseLine::Skip));
    }

    #[test]
    fn azure_prompt_filter_chunk_has_no_choices() {
        let line = r#"data: {"choices":[],"prompt_filter_results":[]}"#;
        match parse_sse_line(line) {
            SseLine::Chunk(chunk) => assert!(chunk.choices.is_empty()),
            _ => panic!("expected a chunk"),
        }
    }

    #[test]
    fn auth_and_missing_deployment_are_configuration_errors() {
        assert!(status_error(StatusCode::UNAUTHORIZED).is_configuration());
        assert!(status_error(StatusCode::NOT_FOUND).is_configuration());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(status_error(StatusCode::BAD_GATEWAY).is_retryable());
    }
}
