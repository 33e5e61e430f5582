//! Single-shot HTTP probes.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{excerpt, Error, Result};
use crate::port::PortState;

const DETAIL_CHARS: usize = 200;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One HTTP request and the status that counts as healthy.
#[derive(Clone, Debug)]
pub struct HttpCheck {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<JsonValue>,
    pub expect_status: u16,
    pub timeout: Option<Duration>,
}

impl HttpCheck {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            expect_status: 200,
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>, body: JsonValue) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn expect(mut self, status: u16) -> Self {
        self.expect_status = status;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Debug)]
pub enum ProbeKind {
    Port(u16),
    Http(HttpCheck),
}

#[derive(Clone, Debug)]
pub struct ServiceEndpoint {
    pub name: String,
    pub kind: ProbeKind,
}

impl ServiceEndpoint {
    pub fn port(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            kind: ProbeKind::Port(port),
        }
    }

    pub fn http(name: impl Into<String>, check: HttpCheck) -> Self {
        Self {
            name: name.into(),
            kind: ProbeKind::Http(check),
        }
    }

    /// Human label of the probed target (`port 8000`, `GET http://...`).
    pub fn target(&self) -> String {
        match &self.kind {
            ProbeKind::Port(port) => format!("port {port}"),
            ProbeKind::Http(check) => format!("{} {}", check.method, check.url),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProbeResult {
    pub name: String,
    pub ok: bool,
    pub status: Option<u16>,
    pub detail: Option<String>,
    /// Raw response body, kept for human inspection
    pub body: Option<String>,
}

impl ProbeResult {
    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            status: None,
            detail: Some(detail.into()),
            body: None,
        }
    }

    pub fn from_port(name: impl Into<String>, state: &PortState) -> Self {
        Self {
            name: name.into(),
            ok: state.is_listening(),
            status: None,
            detail: Some(state.to_string()),
            body: None,
        }
    }

    pub fn json(&self) -> Option<JsonValue> {
        self.body
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok())
    }
}

/// Process-scoped HTTP client shared by every probe in a run.
///
/// Built once at startup and dropped when the command finishes.
#[derive(Debug)]
pub struct ProbeClient {
    http: Client,
}

impl ProbeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| Error::Transport {
                url: String::from("<client>"),
                source,
            })?;
        debug!(?timeout, "http client ready");
        Ok(Self { http })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Issue exactly one request. Every fault becomes `ok = false`.
    pub async fn probe(&self, name: &str, check: &HttpCheck) -> ProbeResult {
        let mut request = match check.method {
            Method::Get => self.http.get(&check.url),
            Method::Post => self.http.post(&check.url),
        };
        for (key, value) in &check.headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(key), Ok(value)) => request = request.header(key, value),
                _ => return ProbeResult::failed(name, format!("invalid header {key:?}")),
            }
        }
        if let Some(body) = &check.body {
            request = request.json(body);
        }
        if let Some(timeout) = check.timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let detail = error_chain(&err);
                warn!(probe = name, url = %check.url, error = %detail, "probe failed");
                return ProbeResult::failed(name, detail);
            }
        };
        let status = response.status().as_u16();
        // The call only completes once the whole body has arrived.
        let body = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                let detail = error_chain(&err);
                warn!(
                    probe = name,
                    url = %check.url,
                    status,
                    error = %detail,
                    "response body read failed"
                );
                return ProbeResult {
                    name: name.to_string(),
                    ok: false,
                    status: Some(status),
                    detail: Some(detail),
                    body: None,
                };
            }
        };
        let ok = status == check.expect_status;
        let detail = if ok {
            format!("HTTP {status}")
        } else {
            let snippet = excerpt(&body, DETAIL_CHARS);
            if snippet.is_empty() {
                format!("HTTP {status} (expected {})", check.expect_status)
            } else {
                format!("HTTP {status} (expected {}): {snippet}", check.expect_status)
            }
        };
        debug!(probe = name, status, ok, "probe finished");
        ProbeResult {
            name: name.to_string(),
            ok,
            status: Some(status),
            detail: Some(detail),
            body: Some(body),
        }
    }
}

impl Drop for ProbeClient {
    fn drop(&mut self) {
        debug!("http client released");
    }
}

/// Flatten an error and its sources into one line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// Send `request`, require a 2xx status and decode the JSON body into `T`.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: &str,
) -> Result<T> {
    let response = request.send().await.map_err(|source| Error::Transport {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    let text = response.text().await.map_err(|source| Error::Transport {
        url: url.to_string(),
        source,
    })?;
    if !status.is_success() {
        return Err(Error::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: excerpt(&text, DETAIL_CHARS),
        });
    }
    serde_json::from_str(&text).map_err(|source| Error::Decode {
        url: url.to_string(),
        source,
    })
}

/// Pretty-print JSON bodies; anything else is returned as-is.
pub fn render_body(text: &str) -> String {
    match serde_json::from_str::<JsonValue>(text) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string()),
        Err(_) => text.to_string(),
    }
}
