use thiserror::Error;

/// Errors surfaced by the typed router/backend clients and config loading.
///
/// Probes never return these; they fold every fault into a
/// [`crate::ProbeResult`] instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Clip a response body for inclusion in error text and status lines.
pub(crate) fn excerpt(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(max_chars).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_keeps_short_bodies() {
        assert_eq!(excerpt("  ok \n", 10), "ok");
    }

    #[test]
    fn excerpt_clips_on_char_boundaries() {
        assert_eq!(excerpt("状态检查失败", 2), "状态...");
    }

    #[test]
    fn status_is_exposed_for_status_errors() {
        let err = Error::Status {
            url: "http://x/health".into(),
            status: 503,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("HTTP 503"));
    }
}
