use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::keyboards::OutgoingMessage;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("bot api request failed: {0}")]
    Http(String),
    #[error("bot api rejected the call ({code}): {description}")]
    Rejected { code: i64, description: String },
    #[error("bot api response decode failed: {0}")]
    Decode(String),
}

#[async_trait]
pub trait BotApi: Send + Sync {
    /// Sends a message and returns the new message id.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<i64, ApiError>;
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), ApiError>;
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>)
        -> Result<(), ApiError>;
    /// Shows the "typing..." indicator while a completion is in flight.
    async fn send_typing(&self, chat_id: i64) -> Result<(), ApiError>;
}

#[derive(Default)]
pub struct NoopBotApi;

#[async_trait]
impl BotApi for NoopBotApi {
    async fn send_message(&self, _message: &OutgoingMessage) -> Result<i64, ApiError> {
        Ok(0)
    }

    async fn edit_message_text(
        &self,
        _chat_id: i64,
        _message_id: i64,
        _text: &str,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn answer_callback(
        &self,
        _callback_id: &str,
        _text: Option<&str>,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn send_typing(&self, _chat_id: i64) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Bot API client over HTTPS. The token never appears in logs; it only
/// surfaces inside the request URL at call time.
pub struct HttpBotApi {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl HttpBotApi {
    pub fn new(token: SecretString) -> Self {
        Self::with_base_url(token, TELEGRAM_API_BASE)
    }

    pub fn with_base_url(token: SecretString, base_url: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into(), token }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token.expose_secret())
    }

    async fn call<R>(&self, method: &str, payload: &impl Serialize) -> Result<R, ApiError>
    where
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|error| ApiError::Http(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| ApiError::Http(error.to_string()))?;

        // Telegram reports failures in the body envelope, usually alongside
        // a non-2xx status. Decode the envelope before trusting the status.
        let envelope: ApiEnvelope<R> = serde_json::from_str(&body)
            .map_err(|error| ApiError::Decode(format!("status {status}: {error}")))?;

        if !envelope.ok {
            return Err(ApiError::Rejected {
                code: envelope.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                description: envelope
                    .description
                    .unwrap_or_else(|| "no description".to_owned()),
            });
        }

        envelope
            .result
            .ok_or_else(|| ApiError::Decode(format!("{method} returned ok without a result")))
    }
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "R: DeserializeOwned"))]
pub(crate) struct ApiEnvelope<R> {
    pub(crate) ok: bool,
    #[serde(default)]
    pub(crate) result: Option<R>,
    #[serde(default)]
    pub(crate) error_code: Option<i64>,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Serialize)]
struct SendChatAction<'a> {
    chat_id: i64,
    action: &'a str,
}

#[async_trait]
impl BotApi for HttpBotApi {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<i64, ApiError> {
        let sent: SentMessage = self.call("sendMessage", message).await?;
        Ok(sent.message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .call("editMessageText", &EditMessageText { chat_id, message_id, text })
            .await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), ApiError> {
        let _: bool = self
            .call("answerCallbackQuery", &AnswerCallbackQuery { callback_query_id: callback_id, text })
            .await?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), ApiError> {
        let _: bool =
            self.call("sendChatAction", &SendChatAction { chat_id, action: "typing" }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ApiError, BotApi, HttpBotApi};
    use crate::keyboards::{tier_chooser_keyboard, OutgoingMessage};

    fn api_for(server: &MockServer) -> HttpBotApi {
        HttpBotApi::with_base_url(SecretString::from("test-token"), server.uri())
    }

    #[tokio::test]
    async fn send_message_posts_payload_and_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_partial_json(json!({"chat_id": 42, "text": "Pick a model:"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 99}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server);
        let message = OutgoingMessage::text(42, "Pick a model:")
            .keyboard(tier_chooser_keyboard("tok", drillbot_core::Mode::Basic));
        let message_id = api.send_message(&message).await.expect("send should succeed");

        assert_eq!(message_id, 99);
    }

    #[tokio::test]
    async fn rejected_calls_surface_code_and_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let api = api_for(&server);
        let error = api
            .send_message(&OutgoingMessage::text(1, "hello"))
            .await
            .expect_err("send should fail");

        assert_eq!(
            error,
            ApiError::Rejected {
                code: 400,
                description: "Bad Request: chat not found".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn typing_indicator_uses_send_chat_action() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendChatAction"))
            .and(body_partial_json(json!({"chat_id": 7, "action": "typing"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server);
        api.send_typing(7).await.expect("typing should succeed");
    }

    #[tokio::test]
    async fn callback_answers_carry_optional_toast_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/answerCallbackQuery"))
            .and(body_partial_json(json!({
                "callback_query_id": "cb-9",
                "text": "That prompt already ran."
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server);
        api.answer_callback("cb-9", Some("That prompt already ran."))
            .await
            .expect("answer should succeed");
    }

    #[tokio::test]
    async fn non_json_body_maps_to_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/answerCallbackQuery"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let api = api_for(&server);
        let error =
            api.answer_callback("cb-1", None).await.expect_err("answer should fail");

        assert!(matches!(error, ApiError::Decode(_)));
    }
}
