//! Backend tool-endpoint contract: health, authenticated and public listings.

use serde::Serialize;

use crate::backend::{BackendClient, BackendToolsResponse};
use crate::config::Config;
use crate::endpoint::{HttpCheck, ProbeClient, ProbeResult};
use crate::status;

/// Summary of the decoded public catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub count: usize,
    pub first: Option<String>,
    pub mcp: usize,
}

impl CatalogSummary {
    pub fn of(tools: &BackendToolsResponse) -> Self {
        Self {
            count: tools.tools.len(),
            first: tools
                .tools
                .first()
                .and_then(|t| t.name.clone().or_else(|| t.execute_id())),
            mcp: tools.mcp_tools().count(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContractReport {
    pub health: ProbeResult,
    /// Anonymous request to the authenticated listing; informational.
    pub protected: ProbeResult,
    pub public: ProbeResult,
    pub catalog: Option<CatalogSummary>,
}

impl ContractReport {
    pub fn success(&self) -> bool {
        self.health.ok && self.public.ok
    }
}

async fn run_check(client: &ProbeClient, name: &str, check: &HttpCheck) -> ProbeResult {
    let result = client.probe(name, check).await;
    let detail = result.detail.as_deref().unwrap_or("");
    status::print_status(
        &format!("{name} ({} {}): {detail}", check.method, check.url),
        status::outcome(result.ok),
    );
    result
}

pub async fn check_contract(client: &ProbeClient, cfg: &Config) -> ContractReport {
    let backend = BackendClient::new(client, cfg);

    status::info("Testing backend tool endpoints...");
    let health = run_check(client, "health", &backend.health_check()).await;
    let protected_check = backend.protected_tools_check();
    let protected = run_check(client, "tools (unauthenticated)", &protected_check).await;
    if !protected.ok {
        status::warning("authenticated tool listing did not answer 401 without credentials");
    }
    let public = run_check(client, "tools (public)", &backend.public_tools_check()).await;

    let catalog = if public.ok {
        match public
            .body
            .as_deref()
            .map(serde_json::from_str::<BackendToolsResponse>)
        {
            Some(Ok(tools)) => {
                let summary = CatalogSummary::of(&tools);
                println!("Tool count: {}", summary.count);
                if let Some(first) = &summary.first {
                    println!("First tool: {first}");
                }
                println!("MCP tools:  {}", summary.mcp);
                Some(summary)
            }
            Some(Err(err)) => {
                status::warning(&format!("public tool listing is not a tool catalog: {err}"));
                None
            }
            None => None,
        }
    } else {
        None
    };

    ContractReport {
        health,
        protected,
        public,
        catalog,
    }
}

pub fn print_summary(report: &ContractReport) {
    println!();
    status::banner("Contract results", 50);
    println!("{}", status::pass_fail_line("health", report.health.ok));
    println!("{}", status::pass_fail_line("tools requires auth", report.protected.ok));
    println!("{}", status::pass_fail_line("tools public", report.public.ok));
    if report.success() {
        status::success("backend tool endpoints behave as expected");
    } else {
        status::error("backend tool endpoints are not healthy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BACKEND_URL_ENV;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn config_for(server: &MockServer) -> Config {
        let base = server.base_url();
        Config::load_with(|key| (key == BACKEND_URL_ENV).then(|| base.clone())).expect("config")
    }

    #[tokio::test]
    async fn unauthorized_listing_is_reported_as_pass() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).json_body(json!({"status": "healthy"}));
            })
            .await;
        let protected = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/tools");
                then.status(401).json_body(json!({"detail": "Not authenticated"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/tools/public");
                then.status(200).json_body(json!({"tools": [
                    {"id": 1, "name": "Current Time", "type": "mcp"},
                    {"id": 2, "name": "Chat", "type": "http"}
                ]}));
            })
            .await;

        let cfg = config_for(&server);
        let client = ProbeClient::new(Duration::from_secs(5)).expect("client");
        let report = check_contract(&client, &cfg).await;

        protected.assert_async().await;
        assert!(report.protected.ok);
        assert!(report.success());
        assert_eq!(
            report.catalog,
            Some(CatalogSummary {
                count: 2,
                first: Some("Current Time".into()),
                mcp: 1,
            })
        );
    }

    #[tokio::test]
    async fn open_listing_is_informational_only() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/tools");
                then.status(200).json_body(json!({"tools": []}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/tools/public");
                then.status(200).json_body(json!({"tools": []}));
            })
            .await;

        let cfg = config_for(&server);
        let client = ProbeClient::new(Duration::from_secs(5)).expect("client");
        let report = check_contract(&client, &cfg).await;
        assert!(!report.protected.ok);
        assert!(report.success());
        assert_eq!(report.catalog.map(|c| c.count), Some(0));
    }

    #[tokio::test]
    async fn failing_public_listing_fails_contract() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/tools/public");
                then.status(500).body("internal error");
            })
            .await;

        let cfg = config_for(&server);
        let client = ProbeClient::new(Duration::from_secs(5)).expect("client");
        let report = check_contract(&client, &cfg).await;
        assert!(report.health.ok);
        assert!(!report.public.ok);
        assert!(report.catalog.is_none());
        assert!(!report.success());
    }

    #[test]
    fn catalog_summary_falls_back_to_tool_id() {
        let tools: BackendToolsResponse =
            serde_json::from_value(json!({"tools": [{"tool_id": "fetch", "type": "mcp"}]}))
                .expect("decode");
        let summary = CatalogSummary::of(&tools);
        assert_eq!(summary.first.as_deref(), Some("fetch"));
        assert_eq!(summary.mcp, 1);
    }
}
