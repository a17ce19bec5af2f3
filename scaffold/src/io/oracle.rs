//! Oracle client: a stateless `complete(messages) -> text` call to a chat endpoint.
//!
//! The [`Oracle`] trait decouples the agent from the remote endpoint. Tests use
//! scripted oracles that return predetermined replies without any network access.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::io::config::OracleConfig;

/// Who a message is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged message of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Outcome of one oracle call. Empty or off-format text is still `Text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", content = "detail", rename_all = "snake_case")]
pub enum OracleReply {
    Text(String),
    /// The call failed for reasons outside the prompt; a retry may succeed.
    TransientFailure(String),
}

/// Abstraction over chat backends.
pub trait Oracle {
    /// Send `messages` and wait for a complete reply. Never fails; see [`OracleReply`].
    fn complete(&self, messages: &[Message]) -> OracleReply;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Oracle backed by an OpenAI-compatible `chat/completions` endpoint.
pub struct HttpOracle {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl HttpOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        if config.api_key.is_none() {
            warn!(endpoint = %config.endpoint, "no API key configured; sending unauthenticated requests");
        }
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl Oracle for HttpOracle {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    fn complete(&self, messages: &[Message]) -> OracleReply {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: false,
        };
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match builder.send() {
            Ok(response) => response,
            Err(err) => {
                warn!(err = %err, "oracle request failed");
                return OracleReply::TransientFailure(format!("request failed: {err}"));
            }
        };
        let status = response.status();
        let body = match response.text() {
            Ok(body) => body,
            Err(err) => {
                warn!(err = %err, "failed to read oracle response body");
                return OracleReply::TransientFailure(format!("read body: {err}"));
            }
        };
        if !status.is_success() {
            if status.as_u16() == 429 || status.is_server_error() {
                warn!(status = status.as_u16(), "oracle endpoint unavailable");
            } else {
                error!(status = status.as_u16(), body = %truncate(&body, 500), "oracle rejected request");
            }
            return OracleReply::TransientFailure(format!("http status {}", status.as_u16()));
        }

        match parse_reply(&body) {
            Ok(text) => {
                debug!(bytes = text.len(), "oracle reply received");
                OracleReply::Text(text)
            }
            Err(err) => {
                warn!(err = %err, "malformed oracle response");
                OracleReply::TransientFailure(format!("malformed response: {err}"))
            }
        }
    }
}

/// Pull the first choice's text out of a chat completion body.
///
/// A well-formed body without content yields empty text rather than an error.
fn parse_reply(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body).context("parse chat response")?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default())
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_roles_lowercase() {
        let messages = vec![Message::system("be terse"), Message::user("hi")];
        let request = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.0,
            stream: false,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["model"], "m");
    }

    #[test]
    fn parse_reply_reads_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"print(1)"}}]}"#;
        assert_eq!(parse_reply(body).expect("parse"), "print(1)");
    }

    #[test]
    fn parse_reply_tolerates_missing_content() {
        assert_eq!(parse_reply(r#"{"choices":[]}"#).expect("parse"), "");
        let null_content = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert_eq!(parse_reply(null_content).expect("parse"), "");
    }

    #[test]
    fn parse_reply_rejects_non_json() {
        assert!(parse_reply("<html>bad gateway</html>").is_err());
    }

    #[test]
    fn unreachable_endpoint_is_transient() {
        let oracle = HttpOracle::new(&OracleConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            request_timeout_secs: 2,
            ..OracleConfig::default()
        })
        .expect("client");
        let reply = oracle.complete(&[Message::user("hello")]);
        assert!(matches!(reply, OracleReply::TransientFailure(_)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
