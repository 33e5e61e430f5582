//! Typed client for the backend API: health, tool catalog, intent
//! interpretation and tool execution.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::debug;

use crate::config::{BackendConfig, Config};
use crate::endpoint::{fetch_json, HttpCheck, ProbeClient};
use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct BackendTool {
    /// Database id; numeric or string depending on the backend build
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default)]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl BackendTool {
    pub fn is_mcp(&self) -> bool {
        self.kind.as_deref() == Some("mcp")
    }

    /// Identifier accepted by `/execute`: `tool_id`, else the stringified `id`.
    pub fn execute_id(&self) -> Option<String> {
        self.tool_id.clone().or_else(|| match &self.id {
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BackendToolsResponse {
    #[serde(default)]
    pub tools: Vec<BackendTool>,
}

impl BackendToolsResponse {
    pub fn mcp_tools(&self) -> impl Iterator<Item = &BackendTool> {
        self.tools.iter().filter(|tool| tool.is_mcp())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ToolCall {
    pub tool_id: String,
    #[serde(default)]
    pub parameters: JsonMap<String, JsonValue>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IntentResponse {
    /// `tool_call`, `direct_response`, ...
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub confirm_text: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl IntentResponse {
    /// What the backend said back: `confirm_text` first, then `content`.
    pub fn reply(&self) -> Option<&str> {
        self.confirm_text.as_deref().or(self.content.as_deref())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub data: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecuteResponse {
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty()) || self.success == Some(false)
    }
}

/// Reply to a confirmation of a pending `tool_call` intent.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ConfirmResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identity attached to intent/execute calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub session_id: String,
    pub user_id: i64,
}

pub struct BackendClient<'a> {
    client: &'a ProbeClient,
    base: String,
    timeout: Duration,
    paths: BackendConfig,
    token: Option<String>,
}

impl<'a> BackendClient<'a> {
    pub fn new(client: &'a ProbeClient, cfg: &Config) -> Self {
        Self {
            client,
            base: cfg.backend_base().to_string(),
            timeout: cfg.backend_timeout(),
            paths: cfg.backend.clone(),
            token: cfg.backend.access_token.clone(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        crate::config::join_url(&self.base, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Form-encoded login; the returned token is attached to later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let url = self.url(&self.paths.token_path);
        let request = self
            .client
            .http()
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .timeout(self.timeout);
        let token: TokenResponse = fetch_json(request, &url).await?;
        debug!(
            username,
            token_type = token.token_type.as_deref().unwrap_or("bearer"),
            "backend login succeeded"
        );
        self.token = Some(token.access_token);
        Ok(())
    }

    pub fn health_check(&self) -> HttpCheck {
        HttpCheck::get(self.url(&self.paths.health_path)).timeout(self.timeout)
    }

    pub fn public_tools_check(&self) -> HttpCheck {
        HttpCheck::get(self.url(&self.paths.tools_public_path)).timeout(self.timeout)
    }

    /// Anonymous request to the authenticated listing; healthy means 401.
    pub fn protected_tools_check(&self) -> HttpCheck {
        HttpCheck::get(self.url(&self.paths.tools_path))
            .expect(401)
            .timeout(self.timeout)
    }

    pub async fn public_tools(&self) -> Result<BackendToolsResponse> {
        let url = self.url(&self.paths.tools_public_path);
        let request = self.client.http().get(&url).timeout(self.timeout);
        let tools: BackendToolsResponse = fetch_json(request, &url).await?;
        debug!(count = tools.tools.len(), "backend tools listed");
        Ok(tools)
    }

    pub async fn interpret(&self, query: &str, caller: &Caller) -> Result<IntentResponse> {
        let url = self.url(&self.paths.intent_path);
        let request = self
            .client
            .http()
            .post(&url)
            .json(&json!({
                "query": query,
                "session_id": caller.session_id,
                "user_id": caller.user_id,
            }))
            .timeout(self.timeout);
        let intent: IntentResponse = fetch_json(self.authorize(request), &url).await?;
        debug!(
            kind = intent.kind.as_deref().unwrap_or("unknown"),
            tool_calls = intent.tool_calls.len(),
            "intent interpreted"
        );
        Ok(intent)
    }

    /// Answer the confirmation prompt of the intent held by `session_id`.
    pub async fn confirm(&self, session_id: &str, user_input: &str) -> Result<ConfirmResponse> {
        let url = self.url(&self.paths.confirm_path);
        let request = self
            .client
            .http()
            .post(&url)
            .json(&json!({ "session_id": session_id, "user_input": user_input }))
            .timeout(self.timeout);
        let reply: ConfirmResponse = fetch_json(self.authorize(request), &url).await?;
        debug!(session_id, success = reply.success, "intent confirmation answered");
        Ok(reply)
    }

    pub async fn execute(
        &self,
        tool_id: &str,
        parameters: &JsonMap<String, JsonValue>,
        caller: &Caller,
    ) -> Result<ExecuteResponse> {
        let url = self.url(&self.paths.execute_path);
        let request = self
            .client
            .http()
            .post(&url)
            .json(&json!({
                "tool_id": tool_id,
                "params": parameters,
                "session_id": caller.session_id,
                "user_id": caller.user_id,
            }))
            .timeout(self.timeout);
        fetch_json(self.authorize(request), &url).await
    }
}
