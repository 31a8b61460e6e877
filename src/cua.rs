use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::computer::Environment;
use crate::items::ConversationItem;

#[derive(Clone)]
pub struct CuaConfig {
    pub api_base: String,             // e.g. "https://api.openai.com/v1"
    pub api_key: String,              // env OPENAI_API_KEY
    pub organization: Option<String>, // env OPENAI_ORG
    pub timeout: Duration,
}

impl Default for CuaConfig {
    fn default() -> Self {
        Self {
            api_base: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            organization: env::var("OPENAI_ORG").ok().filter(|s| !s.trim().is_empty()),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("OPENAI_API_KEY missing")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OpenAI error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to parse OpenAI response JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Truncation {
    #[default]
    Auto,
    Disabled,
}

/// Tool declaration sent with every request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Tool {
    #[serde(rename = "function")]
    Function {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        parameters: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
    },
    #[serde(rename = "computer-preview")]
    Computer {
        display_width: u32,
        display_height: u32,
        environment: Environment,
    },
}

impl Tool {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self::Function {
            name: name.into(),
            description: Some(description.into()),
            parameters,
            strict: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<ConversationItem>,
    pub tools: Vec<Tool>,
    pub truncation: Truncation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

/// Response body. `output` stays optional here; its absence is a protocol
/// error the agent reports.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsesResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub output: Option<Vec<ConversationItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Sends one request to the model and returns its response.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn create_response(&self, request: &ResponsesRequest) -> Result<ResponsesResponse, TransportError>;
}

/// Responses API client over HTTP.
#[derive(Clone)]
pub struct CuaClient {
    http: Client,
    cfg: CuaConfig,
}

impl CuaClient {
    pub fn new(cfg: CuaConfig) -> Result<Self, TransportError> {
        if cfg.api_key.is_empty() {
            return Err(TransportError::MissingApiKey);
        }
        let http = Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self { http, cfg })
    }
}

#[async_trait]
impl ModelTransport for CuaClient {
    async fn create_response(&self, request: &ResponsesRequest) -> Result<ResponsesResponse, TransportError> {
        let url = format!("{}/responses", self.cfg.api_base.trim_end_matches('/'));
        let mut req = self.http.post(url).bearer_auth(&self.cfg.api_key).json(request);
        if let Some(org) = &self.cfg.organization {
            req = req.header("OpenAI-Organization", org);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status { status, body: text });
        }
        debug!(bytes = text.len(), "responses api reply");
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn computer_tool_declaration_shape() {
        let tool = Tool::Computer { display_width: 1024, display_height: 768, environment: Environment::Browser };
        assert_eq!(
            serde_json::to_value(tool).unwrap(),
            json!({"type": "computer-preview", "display_width": 1024, "display_height": 768, "environment": "browser"})
        );
    }

    #[test]
    fn request_omits_absent_continuation() {
        let req = ResponsesRequest {
            model: "computer-use-preview".into(),
            input: vec![ConversationItem::user_text("hi")],
            tools: vec![],
            truncation: Truncation::Auto,
            previous_response_id: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["truncation"], "auto");
        assert!(v.get("previous_response_id").is_none());
    }

    #[test]
    fn response_without_output_parses() {
        let resp: ResponsesResponse =
            serde_json::from_value(json!({"id": "resp_1", "error": {"message": "boom"}})).unwrap();
        assert_eq!(resp.id.as_deref(), Some("resp_1"));
        assert!(resp.output.is_none());
    }

    #[test]
    fn client_requires_api_key() {
        let cfg = CuaConfig { api_key: String::new(), ..CuaConfig::default() };
        assert!(matches!(CuaClient::new(cfg), Err(TransportError::MissingApiKey)));
    }
}
