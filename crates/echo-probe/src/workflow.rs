//! Intent → tool-call → execution walkthrough against the live services.
//!
//! Steps run strictly in order. `services-checked` passes when at least one
//! of the router and backend listens; when it fails every later step is
//! skipped. Past that, each step is gated on the ports it needs. A skipped
//! step is never attempted, and a failing step does not stop independent
//! later steps.

use std::fmt;

use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};

use crate::backend::{BackendClient, Caller, IntentResponse, ToolCall};
use crate::config::Config;
use crate::endpoint::{render_body, ProbeClient};
use crate::port::{ConnectionTable, PortState};
use crate::router::{RouterClient, ToolInfo};
use crate::status;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    ServicesChecked,
    ToolsListed,
    IntentProcessed,
    /// Only run when `workflow.confirm_input` is configured
    IntentConfirmed,
    ToolsExecuted,
}

impl StepName {
    pub fn as_str(self) -> &'static str {
        match self {
            StepName::ServicesChecked => "services-checked",
            StepName::ToolsListed => "tools-listed",
            StepName::IntentProcessed => "intent-processed",
            StepName::IntentConfirmed => "intent-confirmed",
            StepName::ToolsExecuted => "tools-executed",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "kebab-case")]
pub enum StepOutcome {
    Passed(JsonValue),
    Failed(String),
    Skipped(String),
}

impl StepOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, StepOutcome::Passed(_))
    }

    pub fn was_run(&self) -> bool {
        !matches!(self, StepOutcome::Skipped(_))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct WorkflowStep {
    pub name: StepName,
    pub input: JsonValue,
    pub outcome: StepOutcome,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct WorkflowReport {
    pub steps: Vec<WorkflowStep>,
    pub selected_tool: Option<ToolInfo>,
}

impl WorkflowReport {
    pub fn step(&self, name: StepName) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn passed(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.passed()).count()
    }

    pub fn total(&self) -> usize {
        self.steps.len()
    }

    pub fn success(&self) -> bool {
        !self.steps.is_empty() && self.passed() == self.total()
    }

    fn record(&mut self, name: StepName, input: JsonValue, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Passed(_) => status::success(&format!("✓ {name}")),
            StepOutcome::Failed(reason) => {
                error!(step = %name, input = %input, error = %reason, "workflow step failed");
                status::error(&format!("✗ {name}: {reason}"));
            }
            StepOutcome::Skipped(reason) => {
                status::warning(&format!("- {name} skipped: {reason}"))
            }
        }
        self.steps.push(WorkflowStep {
            name,
            input,
            outcome,
        });
    }
}

pub struct Workflow<'a> {
    cfg: &'a Config,
    router: RouterClient<'a>,
    backend: BackendClient<'a>,
    caller: Caller,
}

impl<'a> Workflow<'a> {
    pub fn new(cfg: &'a Config, client: &'a ProbeClient) -> Self {
        let session_id = cfg
            .workflow
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            cfg,
            router: RouterClient::new(client, cfg),
            backend: BackendClient::new(client, cfg),
            caller: Caller {
                session_id,
                user_id: cfg.workflow.user_id,
            },
        }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub async fn run(&mut self, connections: &ConnectionTable) -> WorkflowReport {
        let cfg: &'a Config = self.cfg;
        let mut report = WorkflowReport::default();
        let router_state = port_state(connections, cfg.router_port());
        let backend_state = port_state(connections, cfg.backend_port());
        let router_up = router_state.is_listening();
        let backend_up = backend_state.is_listening();

        status::info("Checking services...");
        let services_ok = router_up || backend_up;
        let input = json!({
            "router_port": cfg.router_port(),
            "backend_port": cfg.backend_port(),
        });
        let outcome = if services_ok {
            StepOutcome::Passed(json!({
                "router": router_state.label(),
                "backend": backend_state.label(),
            }))
        } else {
            StepOutcome::Failed(format!(
                "no service is running: router is {router_state}, backend is {backend_state}"
            ))
        };
        report.record(StepName::ServicesChecked, input, outcome);

        let gate = |up: bool, service: &str| -> Option<String> {
            if !services_ok {
                Some("services-checked did not pass".into())
            } else if !up {
                Some(format!("{service} port is not listening"))
            } else {
                None
            }
        };

        let server = cfg.workflow.server.as_str();
        let input = json!({ "server": server });
        let outcome = match gate(router_up, "router") {
            Some(reason) => StepOutcome::Skipped(reason),
            None => {
                let (outcome, selected) = self.list_tools(server).await;
                report.selected_tool = selected;
                outcome
            }
        };
        report.record(StepName::ToolsListed, input, outcome);

        let input = json!({
            "query": cfg.workflow.query,
            "session_id": self.caller.session_id,
            "user_id": self.caller.user_id,
        });
        let mut intent: Option<IntentResponse> = None;
        let outcome = match gate(backend_up, "backend") {
            Some(reason) => StepOutcome::Skipped(reason),
            None => match self.interpret(&cfg.workflow.query).await {
                Ok(response) => {
                    let value = serde_json::to_value(&response).unwrap_or(JsonValue::Null);
                    intent = Some(response);
                    StepOutcome::Passed(value)
                }
                Err(reason) => StepOutcome::Failed(reason),
            },
        };
        report.record(StepName::IntentProcessed, input, outcome);

        if let Some(reply) = cfg.workflow.confirm_input.as_deref() {
            let session_id = intent
                .as_ref()
                .and_then(|i| i.session_id.clone())
                .unwrap_or_else(|| self.caller.session_id.clone());
            let input = json!({ "session_id": session_id, "user_input": reply });
            let outcome = match (gate(backend_up, "backend"), &intent) {
                (Some(reason), _) => StepOutcome::Skipped(reason),
                (None, None) => StepOutcome::Skipped("intent step produced no result".into()),
                (None, Some(i)) if i.kind.as_deref() != Some("tool_call") => {
                    StepOutcome::Skipped("intent is not a pending tool call".into())
                }
                (None, Some(_)) => self.confirm(&session_id, reply).await,
            };
            report.record(StepName::IntentConfirmed, input, outcome);
        }

        let tool_calls = intent
            .as_ref()
            .map(|i| i.tool_calls.clone())
            .unwrap_or_default();
        let input = json!({ "tool_calls": tool_calls });
        let skip_reason = if let Some(reason) = gate(router_up && backend_up, "router or backend")
        {
            Some(reason)
        } else if intent.is_none() {
            Some("intent step produced no result".to_string())
        } else if tool_calls.is_empty() {
            Some("intent produced no tool calls".to_string())
        } else {
            None
        };
        let outcome = match skip_reason {
            Some(reason) => StepOutcome::Skipped(reason),
            None => self.execute_all(&tool_calls).await,
        };
        report.record(StepName::ToolsExecuted, input, outcome);

        report
    }

    async fn list_tools(&self, server: &str) -> (StepOutcome, Option<ToolInfo>) {
        status::info(&format!("Listing tools for server {server:?}..."));
        match self.router.list_tools(server).await {
            Ok(tools) => {
                print_json("Available tools", &tools);
                match tools.first() {
                    Some(tool) => {
                        info!(server, tool = %tool.name, count = tools.len(), "tool selected");
                        let outcome = StepOutcome::Passed(json!({
                            "count": tools.len(),
                            "selected": tool.name,
                        }));
                        (outcome, Some(tool.clone()))
                    }
                    None => (
                        StepOutcome::Failed(format!("server {server:?} exposes no tools")),
                        None,
                    ),
                }
            }
            Err(err) => (StepOutcome::Failed(err.to_string()), None),
        }
    }

    /// Log in first when credentials are configured and no token is held.
    async fn interpret(&mut self, query: &str) -> Result<IntentResponse, String> {
        let cfg: &'a Config = self.cfg;
        if !self.backend.has_token() {
            if let Some((username, password)) = cfg.backend_login() {
                status::info(&format!("Logging in as {username}..."));
                self.backend
                    .login(username, password)
                    .await
                    .map_err(|err| format!("login failed: {err}"))?;
            }
        }

        status::info(&format!("Interpreting intent: {query}"));
        let response = self
            .backend
            .interpret(query, &self.caller)
            .await
            .map_err(|err| err.to_string())?;
        print_json("Intent result", &response);
        if let Some(reply) = response.reply() {
            status::info(&format!("Reply: {reply}"));
        }
        Ok(response)
    }

    async fn confirm(&self, session_id: &str, reply: &str) -> StepOutcome {
        status::info(&format!("Confirming session {session_id} with {reply:?}"));
        match self.backend.confirm(session_id, reply).await {
            Ok(response) => {
                print_json("Confirmation result", &response);
                if response.success {
                    StepOutcome::Passed(serde_json::to_value(&response).unwrap_or(JsonValue::Null))
                } else {
                    StepOutcome::Failed(
                        response
                            .error
                            .unwrap_or_else(|| "confirmation was not accepted".into()),
                    )
                }
            }
            Err(err) => StepOutcome::Failed(err.to_string()),
        }
    }

    async fn execute_all(&self, calls: &[ToolCall]) -> StepOutcome {
        let mut results = Vec::with_capacity(calls.len());
        let mut failures = Vec::new();
        for call in calls {
            status::info(&format!("Executing tool {}", call.tool_id));
            match self
                .backend
                .execute(&call.tool_id, &call.parameters, &self.caller)
                .await
            {
                Ok(response) => {
                    print_json("Execution result", &response);
                    if response.is_error() {
                        let reason = response
                            .error
                            .clone()
                            .unwrap_or_else(|| "reported failure".into());
                        failures.push(format!("{}: {reason}", call.tool_id));
                    }
                    results.push(json!({
                        "tool_id": call.tool_id,
                        "response": response,
                    }));
                }
                Err(err) => failures.push(format!("{}: {err}", call.tool_id)),
            }
        }
        if failures.is_empty() {
            StepOutcome::Passed(JsonValue::Array(results))
        } else {
            StepOutcome::Failed(failures.join("; "))
        }
    }
}

fn port_state(connections: &ConnectionTable, port: Option<u16>) -> PortState {
    match port {
        Some(port) => connections.state(port),
        None => PortState::Unknown("no port in configured URL".into()),
    }
}

fn print_json<T: Serialize>(label: &str, value: &T) {
    let text = serde_json::to_string(value).unwrap_or_default();
    println!("{label}:\n{}", render_body(&text));
}

pub fn print_summary(report: &WorkflowReport) {
    println!();
    status::banner("Workflow results", 60);
    for step in &report.steps {
        match &step.outcome {
            StepOutcome::Skipped(_) => {
                println!("{} {}", "- SKIP".bright_yellow(), step.name)
            }
            outcome => {
                println!("{}", status::pass_fail_line(step.name.as_str(), outcome.passed()))
            }
        }
    }
    println!(
        "\nOverall: {}/{} steps passed",
        report.passed(),
        report.total()
    );
    if report.success() {
        status::success("Workflow completed");
    } else {
        status::warning("Workflow incomplete; check the failed or skipped steps above");
    }
}
