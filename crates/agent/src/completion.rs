use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use drillbot_core::{ChatMessage, CompletionConfig};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion backend returned status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("completion response decode failed: {0}")]
    Decode(String),
}

/// One generated reply, before the engine rules on it. `finish_reason` is
/// kept verbatim because an empty reply means different things depending on
/// whether the backend stopped or ran out of output budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionReply {
    pub text: String,
    pub finish_reason: Option<String>,
}

impl CompletionReply {
    /// True when the whole output budget went to internal tokens and no
    /// visible text came out: HTTP success, whitespace-only text, and a
    /// length-truncated finish reason.
    pub fn exhausted_budget(&self) -> bool {
        self.text.trim().is_empty() && self.finish_reason.as_deref() == Some("length")
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<CompletionReply, CompletionError>;
}

/// Chat-completions client for OpenAI-compatible backends. The API key only
/// surfaces inside the Authorization header at call time.
pub struct OpenAiCompletionClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    temperature: f32,
    max_output_tokens: u32,
    request_timeout: Duration,
}

impl OpenAiCompletionClient {
    pub fn new(config: &CompletionConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<CompletionReply, CompletionError> {
        let payload = ChatCompletionRequest {
            model,
            messages,
            temperature: self.temperature,
            max_completion_tokens: self.max_output_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .timeout(self.request_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|error| CompletionError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CompletionError::Transport(error.to_string()))?;

        if !status.is_success() {
            // Backends wrap the reason in an error envelope; fall back to the
            // raw body when they don't.
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| body.trim().to_owned());
            return Err(CompletionError::Status { status: status.as_u16(), detail });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|error| CompletionError::Decode(error.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::Decode("response carried no choices".to_owned()))?;

        Ok(CompletionReply {
            text: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use drillbot_core::{ChatMessage, CompletionConfig};

    use super::{CompletionClient, CompletionError, CompletionReply, OpenAiCompletionClient};

    fn client_for(server: &MockServer) -> OpenAiCompletionClient {
        OpenAiCompletionClient::new(&CompletionConfig {
            api_key: SecretString::from("test-key"),
            base_url: server.uri(),
            temperature: 0.9,
            max_output_tokens: 800,
            request_timeout_secs: 5,
        })
    }

    fn coach_messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("drill sergeant"), ChatMessage::user("I keep skipping the gym")]
    }

    #[tokio::test]
    async fn sends_bearer_auth_and_the_chat_completion_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "coach-enhanced",
                "messages": [
                    {"role": "system", "content": "drill sergeant"},
                    {"role": "user", "content": "I keep skipping the gym"},
                ],
                "temperature": 0.9,
                "max_completion_tokens": 800,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "No excuses. Go today."},
                    "finish_reason": "stop",
                }],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .complete("coach-enhanced", &coach_messages())
            .await
            .expect("completion succeeds");

        assert_eq!(reply.text, "No excuses. Go today.");
        assert_eq!(reply.finish_reason.as_deref(), Some("stop"));
        assert!(!reply.exhausted_budget());
    }

    #[tokio::test]
    async fn error_envelope_detail_lands_in_the_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached", "type": "requests"},
            })))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .complete("coach-basic", &coach_messages())
            .await
            .expect_err("status error");

        assert_eq!(
            error,
            CompletionError::Status { status: 429, detail: "Rate limit reached".to_owned() }
        );
    }

    #[tokio::test]
    async fn non_json_failure_body_is_reported_raw() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .complete("coach-basic", &coach_messages())
            .await
            .expect_err("status error");

        assert_eq!(
            error,
            CompletionError::Status { status: 502, detail: "bad gateway".to_owned() }
        );
    }

    #[tokio::test]
    async fn success_without_choices_is_a_decode_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .complete("coach-basic", &coach_messages())
            .await
            .expect_err("decode failure");

        assert!(matches!(error, CompletionError::Decode(_)));
    }

    #[tokio::test]
    async fn null_content_with_length_reason_reads_as_spent_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": null},
                    "finish_reason": "length",
                }],
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .complete("coach-enhanced", &coach_messages())
            .await
            .expect("http success");

        assert_eq!(reply.text, "");
        assert!(reply.exhausted_budget());
    }

    #[test]
    fn visible_text_is_never_spent_budget() {
        let reply = CompletionReply {
            text: "Do it now.".to_owned(),
            finish_reason: Some("length".to_owned()),
        };
        assert!(!reply.exhausted_budget());

        let stopped_blank =
            CompletionReply { text: "  ".to_owned(), finish_reason: Some("stop".to_owned()) };
        assert!(!stopped_blank.exhausted_budget());
    }
}
