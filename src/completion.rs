//! Chat completion collaborator
//!
//! Messages go in, the assistant's reply text comes out. The HTTP client
//! speaks the OpenAI-compatible `POST {base}/chat/completions` endpoint.

use crate::conversation::{ChatMessage, Role};
use crate::error::{ChatQuotaError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Produces the assistant reply to a conversation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Returns the reply to the last message of `messages`
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible completion client
///
/// # Examples
///
/// ```no_run
/// use chatquota::completion::{ChatCompletion, HttpChatCompletion};
/// use chatquota::conversation::ChatMessage;
/// use std::time::Duration;
///
/// # async fn example() -> chatquota::Result<()> {
/// let client = HttpChatCompletion::new(
///     "http://localhost:11434/v1",
///     "llama3.2:latest",
///     Duration::from_secs(60),
///     None,
/// )?;
/// let reply = client.complete(&[ChatMessage::user("Hello!")]).await?;
/// println!("{}", reply);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpChatCompletion {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
}

impl HttpChatCompletion {
    /// Creates a client for the server at `api_base` using `model`
    ///
    /// # Errors
    ///
    /// Returns `ChatQuotaError::Config` if `api_base` is not an absolute
    /// http(s) URL.
    pub fn new(
        api_base: &str,
        model: impl Into<String>,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self> {
        let mut endpoint = Url::parse(api_base)
            .map_err(|e| ChatQuotaError::Config(format!("Invalid chat api_base: {}", e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ChatQuotaError::Config(format!(
                "Chat api_base must be an http(s) URL: {}",
                api_base
            ))
            .into());
        }
        endpoint
            .path_segments_mut()
            .map_err(|_| {
                ChatQuotaError::Config(format!("Chat api_base cannot be a base: {}", api_base))
            })?
            .pop_if_empty()
            .extend(["chat", "completions"]);

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint,
            model: model.into(),
            api_key,
        })
    }

    /// Model name sent with every request
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatCompletion for HttpChatCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };

        tracing::debug!(model = %self.model, messages = messages.len(), "Requesting completion");
        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ChatQuotaError::Completion(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Completion request failed");
            return Err(ChatQuotaError::Completion(format!(
                "completion server returned {}: {}",
                status, body
            ))
            .into());
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatQuotaError::Completion(format!("invalid response: {}", e)))?;

        let reply = parsed
            .choices
            .into_iter()
            .map(|c| c.message)
            .find(|m| m.role.as_deref().map_or(true, |r| Role::parse(r) == Some(Role::Assistant)))
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ChatQuotaError::Completion("response contained no reply".to_string()))?;

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, api_key: Option<&str>) -> HttpChatCompletion {
        HttpChatCompletion::new(
            &format!("{}/v1", server.uri()),
            "test-model",
            Duration::from_secs(5),
            api_key.map(str::to_string),
        )
        .expect("valid base url")
    }

    #[test]
    fn test_new_rejects_non_http_base() {
        let err = HttpChatCompletion::new("ftp://x", "m", Duration::from_secs(1), None)
            .unwrap_err();
        assert!(err.to_string().contains("http(s)"));
        assert!(HttpChatCompletion::new("not a url", "m", Duration::from_secs(1), None).is_err());
    }

    #[tokio::test]
    async fn test_complete_returns_assistant_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "messages": [
                    {"role": "user", "content": "Hi"},
                    {"role": "assistant", "content": "Hello"},
                    {"role": "user", "content": "Who are you?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cmpl-1",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "A helper."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server, Some("sk-test"))
            .complete(&[
                ChatMessage::user("Hi"),
                ChatMessage::assistant("Hello"),
                ChatMessage::user("Who are you?"),
            ])
            .await
            .expect("completion failed");
        assert_eq!(reply, "A helper.");
    }

    #[tokio::test]
    async fn test_complete_maps_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .complete(&[ChatMessage::user("Hi")])
            .await
            .unwrap_err();
        match err.downcast_ref::<ChatQuotaError>() {
            Some(ChatQuotaError::Completion(msg)) => assert!(msg.contains("503")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_rejects_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .complete(&[ChatMessage::user("Hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no reply"));
    }
}
