//! Health and contract probes for the router service and backend API.
//!
//! The building blocks are the connection-table port probe ([`port`]), the
//! single-shot HTTP probe ([`endpoint`]) and the colored status printer
//! ([`status`]). On top of them sit the status aggregator, the router
//! check, the intent workflow and the backend tool-endpoint contract check.

pub mod aggregate;
pub mod backend;
mod config;
pub mod contract;
pub mod endpoint;
mod error;
pub mod port;
pub mod router;
pub mod status;
pub mod workflow;

pub use config::{
    config_schema_json, load_config, parse_config, url_port, AuthScheme, BackendConfig, Config,
    PortsConfig, RouterConfig, SmokeCall, WorkflowConfig, BACKEND_PASSWORD_ENV,
    BACKEND_TIMEOUT_ENV, BACKEND_URL_ENV, BACKEND_USERNAME_ENV, CONFIG_PATH_ENV, ENV_KEYS,
    ROUTER_AUTH_ENV, ROUTER_PROXY_ENV, ROUTER_TIMEOUT_ENV, ROUTER_URL_ENV,
};
pub use endpoint::{HttpCheck, ProbeClient, ProbeResult, ServiceEndpoint};
pub use error::{Error, Result};
pub use port::{ConnectionTable, PortState};

#[cfg(test)]
mod test_support;
