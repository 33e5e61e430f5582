//! Typed client for the router service's `/v1/*` API.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, error};

use crate::config::{AuthScheme, Config};
use crate::endpoint::{fetch_json, render_body, HttpCheck, ProbeClient};
use crate::error::Result;
use crate::port::{ConnectionTable, PortState};
use crate::status;

pub const LIST_SERVERS_PATH: &str = "/v1/list-servers";
pub const LIST_TOOLS_PATH: &str = "/v1/list-tools";
pub const CALL_TOOL_PATH: &str = "/v1/call-tool";

/// Schema-described capability exposed by a router backend server.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<JsonValue>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ToolList {
    #[serde(default)]
    pub tools: Vec<ToolInfo>,
}

/// `{"data": {"tools": [...]}}`; some router builds answer with a bare
/// `{"tools": [...]}`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ListToolsResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<ToolList>,
    #[serde(default)]
    pub tools: Option<Vec<ToolInfo>>,
}

impl ListToolsResponse {
    pub fn into_tools(self) -> Vec<ToolInfo> {
        self.data
            .map(|list| list.tools)
            .or(self.tools)
            .unwrap_or_default()
    }
}

/// Servers known to the router. The payload is either a map keyed by server
/// name or a list, optionally wrapped in a `data` envelope.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ServerList {
    pub names: Vec<String>,
    pub raw: JsonValue,
}

impl ServerList {
    pub fn from_value(raw: JsonValue) -> Self {
        let payload = match raw.get("data") {
            Some(data) if !data.is_null() => data,
            _ => &raw,
        };
        let names = match payload {
            JsonValue::Object(map) => map.keys().cloned().collect(),
            JsonValue::Array(_) => Vec::<ServerEntry>::deserialize(payload)
                .unwrap_or_default()
                .into_iter()
                .filter_map(ServerEntry::into_name)
                .collect(),
            _ => Vec::new(),
        };
        Self { names, raw }
    }

    pub fn first(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }
}

/// One element of the list form: a bare name or a server record.
#[derive(Deserialize)]
#[serde(untagged)]
enum ServerEntry {
    Name(String),
    Record(ServerRecord),
    Other(JsonValue),
}

#[derive(Deserialize)]
struct ServerRecord {
    #[serde(default)]
    server_key: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    server: Option<String>,
}

impl ServerEntry {
    fn into_name(self) -> Option<String> {
        match self {
            ServerEntry::Name(name) => Some(name),
            ServerEntry::Record(record) => record.server_key.or(record.name).or(record.server),
            ServerEntry::Other(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CallToolResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<CallToolResult>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<JsonValue>,
    #[serde(default, rename = "isError")]
    pub is_error: Option<bool>,
}

impl CallToolResponse {
    pub fn is_error(&self) -> bool {
        self.code.is_some_and(|code| code != 0)
            || self
                .data
                .as_ref()
                .and_then(|d| d.is_error)
                .unwrap_or(false)
    }

    /// Concatenated `text` items of the tool result.
    pub fn text(&self) -> String {
        self.data
            .iter()
            .flat_map(|d| d.content.iter())
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct RouterClient<'a> {
    client: &'a ProbeClient,
    base: String,
    timeout: Duration,
    auth: AuthScheme,
    token: Option<String>,
}

impl<'a> RouterClient<'a> {
    pub fn new(client: &'a ProbeClient, cfg: &Config) -> Self {
        Self {
            client,
            base: cfg.router_base().to_string(),
            timeout: cfg.router_timeout(),
            auth: cfg.router.auth,
            token: cfg.router.auth_token.clone(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        crate::config::join_url(&self.base, path)
    }

    /// Bearer value for requests addressed to `server`.
    pub fn bearer(&self, server: &str) -> Option<String> {
        match self.auth {
            AuthScheme::ServerName => Some(server.to_string()),
            AuthScheme::Token => self.token.clone(),
            AuthScheme::None => None,
        }
    }

    fn authorize(&self, request: RequestBuilder, server: &str) -> RequestBuilder {
        match self.bearer(server) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub fn list_servers_check(&self) -> HttpCheck {
        HttpCheck::get(self.url(LIST_SERVERS_PATH)).timeout(self.timeout)
    }

    pub async fn list_servers(&self) -> Result<ServerList> {
        let url = self.url(LIST_SERVERS_PATH);
        let request = self.client.http().get(&url).timeout(self.timeout);
        let raw: JsonValue = fetch_json(request, &url).await?;
        let servers = ServerList::from_value(raw);
        debug!(count = servers.names.len(), "router servers listed");
        Ok(servers)
    }

    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolInfo>> {
        let url = self.url(LIST_TOOLS_PATH);
        let request = self
            .client
            .http()
            .post(&url)
            .json(&json!({ "server": server }))
            .timeout(self.timeout);
        let response: ListToolsResponse = fetch_json(self.authorize(request, server), &url).await?;
        let tools = response.into_tools();
        debug!(server, count = tools.len(), "router tools listed");
        Ok(tools)
    }

    pub async fn call_tool(
        &self,
        server: &str,
        name: &str,
        arguments: &JsonValue,
    ) -> Result<CallToolResponse> {
        let url = self.url(CALL_TOOL_PATH);
        let request = self
            .client
            .http()
            .post(&url)
            .json(&json!({ "server": server, "name": name, "arguments": arguments }))
            .timeout(self.timeout);
        fetch_json(self.authorize(request, server), &url).await
    }
}

/// Outcome of the router-only check.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RouterReport {
    pub api: PortState,
    pub proxy: PortState,
    pub servers: Vec<String>,
    pub tools: Vec<ToolInfo>,
    pub api_ok: bool,
    pub proxy_ok: Option<bool>,
    pub smoke_ok: Option<bool>,
}

impl RouterReport {
    pub fn success(&self) -> bool {
        self.api_ok
    }
}

/// Port probes, server and tool listing, proxy liveness and the optional
/// `call-tool` smoke call.
pub async fn check_router(
    client: &ProbeClient,
    cfg: &Config,
    connections: &ConnectionTable,
) -> RouterReport {
    let router = RouterClient::new(client, cfg);
    let mut report = RouterReport {
        api: cfg
            .router_port()
            .map(|port| connections.state(port))
            .unwrap_or_else(|| PortState::Unknown("no port in router URL".into())),
        proxy: cfg
            .proxy_port()
            .map(|port| connections.state(port))
            .unwrap_or_else(|| PortState::Unknown("no port in proxy URL".into())),
        ..RouterReport::default()
    };

    status::print_status(
        &format!("API server ({}) is {}", cfg.router_base(), report.api),
        status::outcome(report.api.is_listening()),
    );
    status::print_status(
        &format!("Proxy server ({}) is {}", cfg.router.proxy_url, report.proxy),
        status::outcome(report.proxy.is_listening()),
    );
    if !report.api.is_listening() && !report.proxy.is_listening() {
        status::error("No router service is running. Start one with: mcprouter api");
        return report;
    }

    if report.api.is_listening() {
        status::info("Listing servers...");
        match router.list_servers().await {
            Ok(servers) => {
                println!("{}", render_body(&servers.raw.to_string()));
                report.api_ok = true;
                if let Some(first) = servers.first() {
                    status::info(&format!("Listing tools for {first:?}..."));
                    match router.list_tools(first).await {
                        Ok(tools) => {
                            for tool in &tools {
                                println!(
                                    "  - {}: {}",
                                    tool.name,
                                    tool.description.as_deref().unwrap_or("")
                                );
                            }
                            report.tools = tools;
                        }
                        Err(err) => {
                            error!(server = first, error = %err, "listing tools failed");
                            status::error(&format!("list-tools failed: {err}"));
                            report.api_ok = false;
                        }
                    }
                } else {
                    status::warning("router reports no servers");
                }
                report.servers = servers.names;
            }
            Err(err) => {
                error!(error = %err, "listing servers failed");
                status::error(&format!("list-servers failed: {err}"));
            }
        }
    }

    if report.proxy.is_listening() {
        let check = HttpCheck::get(cfg.router.proxy_url.clone()).timeout(cfg.router_timeout());
        let result = client.probe("proxy", &check).await;
        status::print_status(
            &format!("Proxy root: {}", result.detail.as_deref().unwrap_or("")),
            status::outcome(result.ok),
        );
        report.proxy_ok = Some(result.ok);
    }

    if let (Some(call), true) = (&cfg.router.smoke_call, report.api.is_listening()) {
        status::info(&format!("Calling {}/{}...", call.server, call.name));
        let ok = match router.call_tool(&call.server, &call.name, &call.arguments).await {
            Ok(response) if !response.is_error() => {
                println!("{}", response.text());
                true
            }
            Ok(response) => {
                let text = response.text();
                let message = response.message.unwrap_or(text);
                status::error(&format!("call-tool reported an error: {message}"));
                false
            }
            Err(err) => {
                status::error(&format!("call-tool failed: {err}"));
                false
            }
        };
        report.smoke_ok = Some(ok);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ROUTER_URL_ENV;
    use httpmock::prelude::*;

    fn config_for(server: &MockServer, auth: Option<&str>) -> Config {
        let base = server.base_url();
        Config::load_with(|key| match key {
            ROUTER_URL_ENV => Some(base.clone()),
            crate::config::ROUTER_AUTH_ENV => auth.map(str::to_string),
            _ => None,
        })
        .expect("config")
    }

    fn probe_client() -> ProbeClient {
        ProbeClient::new(Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn list_tools_uses_server_name_bearer() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(LIST_TOOLS_PATH)
                    .header("authorization", "Bearer time")
                    .json_body(json!({"server": "time"}));
                then.status(200).json_body(json!({
                    "data": {"tools": [{
                        "name": "current_time",
                        "description": "Get the current time",
                        "inputSchema": {"type": "object"}
                    }]}
                }));
            })
            .await;

        let cfg = config_for(&server, None);
        let client = probe_client();
        let tools = RouterClient::new(&client, &cfg)
            .list_tools("time")
            .await
            .expect("tools");
        mock.assert_async().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "current_time");
        assert_eq!(tools[0].input_schema, Some(json!({"type": "object"})));
    }

    #[tokio::test]
    async fn list_tools_with_token_scheme() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(LIST_TOOLS_PATH)
                    .header("authorization", "Bearer secret");
                then.status(200).json_body(json!({"tools": [{"name": "fetch"}]}));
            })
            .await;

        let cfg = config_for(&server, Some("token:secret"));
        let client = probe_client();
        let tools = RouterClient::new(&client, &cfg)
            .list_tools("fetch")
            .await
            .expect("tools");
        mock.assert_async().await;
        assert_eq!(tools[0].name, "fetch");
        assert_eq!(tools[0].description, None);
    }

    #[tokio::test]
    async fn list_tools_status_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(LIST_TOOLS_PATH);
                then.status(401).body("unauthorized");
            })
            .await;

        let cfg = config_for(&server, None);
        let client = probe_client();
        let err = RouterClient::new(&client, &cfg)
            .list_tools("time")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn call_tool_posts_arguments() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(CALL_TOOL_PATH).json_body(json!({
                    "server": "time",
                    "name": "current_time",
                    "arguments": {"timezone": "UTC"}
                }));
                then.status(200).json_body(json!({
                    "code": 0,
                    "data": {"content": [{"type": "text", "text": "12:00"}], "isError": false}
                }));
            })
            .await;

        let cfg = config_for(&server, None);
        let client = probe_client();
        let response = RouterClient::new(&client, &cfg)
            .call_tool("time", "current_time", &json!({"timezone": "UTC"}))
            .await
            .expect("call");
        mock.assert_async().await;
        assert!(!response.is_error());
        assert_eq!(response.text(), "12:00");
    }

    #[tokio::test]
    async fn list_servers_reads_map_keys() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LIST_SERVERS_PATH);
                then.status(200)
                    .json_body(json!({"data": {"time": {}, "fetch": {}}}));
            })
            .await;

        let cfg = config_for(&server, None);
        let client = probe_client();
        let servers = RouterClient::new(&client, &cfg)
            .list_servers()
            .await
            .expect("servers");
        assert_eq!(servers.names.len(), 2);
        assert!(servers.names.contains(&"time".to_string()));
    }

    #[test]
    fn server_list_accepts_arrays() {
        let list = ServerList::from_value(json!([{"server_key": "time"}, "fetch", 3]));
        assert_eq!(list.names, vec!["time", "fetch"]);
        assert_eq!(list.first(), Some("time"));
    }

    #[test]
    fn server_list_records_prefer_server_key() {
        let list = ServerList::from_value(json!({"data": [
            {"name": "Fetch", "server_key": "fetch"},
            {"server": "time"},
            {"description": "unnamed"},
            null
        ]}));
        assert_eq!(list.names, vec!["fetch", "time"]);
    }

    #[test]
    fn call_tool_error_flags() {
        let response: CallToolResponse =
            serde_json::from_value(json!({"code": -1, "message": "no such server"}))
                .expect("decode");
        assert!(response.is_error());
        let response: CallToolResponse =
            serde_json::from_value(json!({"data": {"content": [], "isError": true}}))
                .expect("decode");
        assert!(response.is_error());
    }

    #[test]
    fn bearer_follows_auth_scheme() {
        let client = probe_client();
        let mut cfg = Config::default();
        assert_eq!(RouterClient::new(&client, &cfg).bearer("time").as_deref(), Some("time"));
        cfg.router.auth = AuthScheme::None;
        assert_eq!(RouterClient::new(&client, &cfg).bearer("time"), None);
    }

    #[tokio::test]
    async fn router_check_stops_when_nothing_listens() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(200);
            })
            .await;

        let cfg = config_for(&server, None);
        let client = probe_client();
        let report = check_router(&client, &cfg, &ConnectionTable::from_output("")).await;
        assert_eq!(any.hits_async().await, 0);
        assert_eq!(report.api, PortState::NotListening);
        assert!(!report.success());
    }

    #[tokio::test]
    async fn router_check_walks_servers_tools_proxy_and_smoke_call() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LIST_SERVERS_PATH);
                then.status(200).json_body(json!({"data": [{"server_key": "time"}]}));
            })
            .await;
        let tools = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(LIST_TOOLS_PATH)
                    .header("authorization", "Bearer time");
                then.status(200)
                    .json_body(json!({"data": {"tools": [{"name": "current_time"}]}}));
            })
            .await;
        let proxy = server
            .mock_async(|when, then| {
                when.method(GET).path("/proxy");
                then.status(200).body("ok");
            })
            .await;
        let call = server
            .mock_async(|when, then| {
                when.method(POST).path(CALL_TOOL_PATH);
                then.status(200)
                    .json_body(json!({
                        "code": 0,
                        "data": {"content": [{"type": "text", "text": "noon"}]}
                    }));
            })
            .await;

        let mut cfg = config_for(&server, None);
        cfg.router.proxy_url = server.url("/proxy");
        cfg.router.smoke_call = Some(crate::config::SmokeCall {
            server: "time".into(),
            name: "current_time".into(),
            arguments: json!({}),
        });
        let connections = ConnectionTable::from_output(format!(
            "tcp 0 0 127.0.0.1:{} 0.0.0.0:* LISTEN",
            server.port()
        ));
        let client = probe_client();
        let report = check_router(&client, &cfg, &connections).await;

        tools.assert_async().await;
        proxy.assert_async().await;
        call.assert_async().await;
        assert_eq!(report.servers, vec!["time"]);
        assert_eq!(report.tools.len(), 1);
        assert_eq!(report.proxy_ok, Some(true));
        assert_eq!(report.smoke_ok, Some(true));
        assert!(report.success());
    }

    #[tokio::test]
    async fn smoke_call_error_code_fails_the_smoke_call() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LIST_SERVERS_PATH);
                then.status(200).json_body(json!({"data": []}));
            })
            .await;
        let call = server
            .mock_async(|when, then| {
                when.method(POST).path(CALL_TOOL_PATH);
                then.status(200)
                    .json_body(json!({"code": 1, "message": "unknown tool"}));
            })
            .await;

        let mut cfg = config_for(&server, None);
        cfg.router.smoke_call = Some(crate::config::SmokeCall {
            server: "time".into(),
            name: "missing".into(),
            arguments: json!({}),
        });
        let connections = ConnectionTable::from_output(format!(
            "tcp 0 0 127.0.0.1:{} 0.0.0.0:* LISTEN",
            server.port()
        ));
        let client = probe_client();
        let report = check_router(&client, &cfg, &connections).await;

        call.assert_async().await;
        assert!(report.api_ok);
        assert_eq!(report.smoke_ok, Some(false));
    }
}
