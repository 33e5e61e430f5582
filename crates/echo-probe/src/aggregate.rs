//! Service status aggregation: port table + endpoint table → one verdict.

use std::fmt;

use crate::backend::BackendClient;
use crate::config::Config;
use crate::endpoint::{HttpCheck, ProbeClient, ProbeKind, ProbeResult, ServiceEndpoint};
use crate::port::ConnectionTable;
use crate::router::RouterClient;
use crate::status::{self, Severity};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OverallStatus {
    FullyOperational,
    /// Every port listens but at least one endpoint is unhealthy.
    Degraded,
    NotStarted,
}

impl OverallStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            OverallStatus::FullyOperational => 0,
            OverallStatus::Degraded | OverallStatus::NotStarted => 1,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            OverallStatus::FullyOperational => Severity::Success,
            OverallStatus::Degraded => Severity::Warning,
            OverallStatus::NotStarted => Severity::Error,
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverallStatus::FullyOperational => "all services are fully operational",
            OverallStatus::Degraded => "services started but some endpoints are unavailable",
            OverallStatus::NotStarted => "some services are not started",
        })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: usize,
    pub total: usize,
}

impl Tally {
    pub fn of(results: &[ProbeResult]) -> Self {
        Self {
            passed: results.iter().filter(|r| r.ok).count(),
            total: results.len(),
        }
    }

    pub fn all_passed(self) -> bool {
        self.passed == self.total
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.passed, self.total)
    }
}

/// Three-way verdict; port availability dominates endpoint health.
pub fn classify(ports: Tally, endpoints: Tally) -> OverallStatus {
    if !ports.all_passed() {
        OverallStatus::NotStarted
    } else if endpoints.all_passed() {
        OverallStatus::FullyOperational
    } else {
        OverallStatus::Degraded
    }
}

/// The fixed probe tables for one run.
#[derive(Clone, Debug, Default)]
pub struct ServiceTable {
    pub ports: Vec<ServiceEndpoint>,
    pub endpoints: Vec<ServiceEndpoint>,
}

impl ServiceTable {
    /// Router API, router proxy and backend, as configured.
    pub fn from_config(cfg: &Config, client: &ProbeClient) -> Self {
        let mut ports = Vec::new();
        for (name, port) in [
            ("MCPRouter API Server", cfg.router_port()),
            ("MCPRouter Proxy Server", cfg.proxy_port()),
            ("Backend Server", cfg.backend_port()),
        ] {
            if let Some(port) = port {
                ports.push(ServiceEndpoint::port(name, port));
            }
        }

        let router = RouterClient::new(client, cfg);
        let backend = BackendClient::new(client, cfg);
        let endpoints = vec![
            ServiceEndpoint::http("MCPRouter API - List Servers", router.list_servers_check()),
            ServiceEndpoint::http(
                "MCPRouter Proxy",
                HttpCheck::get(cfg.router.proxy_url.clone()).timeout(cfg.router_timeout()),
            ),
            ServiceEndpoint::http("Backend Health Check", backend.health_check()),
            ServiceEndpoint::http("Backend Tools API", backend.public_tools_check()),
        ];
        Self { ports, endpoints }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StatusReport {
    pub ports: Vec<ProbeResult>,
    pub endpoints: Vec<ProbeResult>,
}

impl StatusReport {
    pub fn port_tally(&self) -> Tally {
        Tally::of(&self.ports)
    }

    pub fn endpoint_tally(&self) -> Tally {
        Tally::of(&self.endpoints)
    }

    pub fn overall(&self) -> OverallStatus {
        classify(self.port_tally(), self.endpoint_tally())
    }
}

/// Probe one entry of either table.
pub async fn probe_entry(
    client: &ProbeClient,
    connections: &ConnectionTable,
    entry: &ServiceEndpoint,
) -> ProbeResult {
    match &entry.kind {
        ProbeKind::Port(port) => ProbeResult::from_port(&entry.name, &connections.state(*port)),
        ProbeKind::Http(check) => client.probe(&entry.name, check).await,
    }
}

/// Run every probe in order, printing a status line per probe.
pub async fn check_services(
    client: &ProbeClient,
    connections: &ConnectionTable,
    table: &ServiceTable,
) -> StatusReport {
    let mut report = StatusReport::default();

    status::info("Checking port status...");
    for entry in &table.ports {
        let result = probe_entry(client, connections, entry).await;
        let detail = result.detail.as_deref().unwrap_or("");
        let line = if result.ok {
            format!("✓ {} ({}) is running", entry.name, entry.target())
        } else {
            format!("✗ {} ({}) is {}", entry.name, entry.target(), detail)
        };
        status::print_status(&line, status::outcome(result.ok));
        report.ports.push(result);
    }
    println!();

    status::info("Testing API endpoints...");
    for entry in &table.endpoints {
        let result = probe_entry(client, connections, entry).await;
        let detail = result.detail.as_deref().unwrap_or("");
        let line = match (result.ok, result.status) {
            (true, _) => format!("✓ {} is responding ({detail})", entry.name),
            (false, Some(_)) => format!("✗ {} failed ({detail})", entry.name),
            (false, None) => format!("✗ {} is not responding: {detail}", entry.name),
        };
        status::print_status(&line, status::outcome(result.ok));
        report.endpoints.push(result);
    }
    report
}

/// Print the tally block and the overall verdict.
pub fn print_summary(report: &StatusReport) {
    println!();
    status::banner("Status summary", 50);
    println!("Ports: {} services running", report.port_tally());
    println!("API:   {} endpoints healthy", report.endpoint_tally());
    let overall = report.overall();
    status::print_status(&overall.to_string(), overall.severity());
}

/// Shell commands that start whatever is missing.
pub fn remediation_hints(cfg: &Config) -> Vec<String> {
    let backend_port = cfg.backend_port().unwrap_or(8000);
    vec![
        format!("MCPRouter API:   mcprouter api    (expected at {})", cfg.router_base()),
        format!("MCPRouter proxy: mcprouter proxy  (expected at {})", cfg.router.proxy_url),
        format!(
            "Backend:         cd backend && \
             python -m uvicorn app.main:app --host 0.0.0.0 --port {backend_port}"
        ),
    ]
}
