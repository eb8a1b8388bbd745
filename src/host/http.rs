use std::sync::mpsc;
use std::time::Duration;

use thiserror::Error;

use crate::msg::Msg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    #[cfg(test)]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("GET {url} failed: {reason}")]
    Failed { url: String, reason: String },
}

/// Cross-origin GET capability. Completion is reported back to the event
/// loop, never through the caller's stack.
pub trait HttpClient {
    fn get(&self, request: RequestId, url: &str);
}

/// Blocking `ureq` requests on worker threads, answered with
/// [`Msg::HttpResponse`].
#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
    tx: mpsc::Sender<Msg>,
}

impl UreqClient {
    pub fn new(timeout: Duration, tx: mpsc::Sender<Msg>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        let agent: ureq::Agent = config.into();
        Self { agent, tx }
    }
}

impl HttpClient for UreqClient {
    fn get(&self, request: RequestId, url: &str) {
        let agent = self.agent.clone();
        let tx = self.tx.clone();
        let url = url.to_string();

        std::thread::spawn(move || {
            tracing::debug!(%request, %url, "fetching");
            let result = fetch(&agent, &url);
            if tx.send(Msg::HttpResponse { request, result }).is_err() {
                tracing::warn!(%request, "event loop gone; dropping response");
            }
        });
    }
}

fn fetch(agent: &ureq::Agent, url: &str) -> Result<HttpResponse, TransportError> {
    let mut response = agent.get(url).call().map_err(|err| match err {
        ureq::Error::StatusCode(status) => TransportError::Status {
            url: url.to_string(),
            status,
        },
        other => TransportError::Failed {
            url: url.to_string(),
            reason: other.to_string(),
        },
    })?;

    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|err| TransportError::Failed {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

    Ok(HttpResponse { status, body })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_name_the_url() {
        let err = TransportError::Status {
            url: "https://cdn/x".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "GET https://cdn/x returned HTTP 404");
    }

    #[test]
    fn unreachable_host_reports_failure_on_channel() {
        let (tx, rx) = mpsc::channel();
        let client = UreqClient::new(Duration::from_secs(2), tx);
        client.get(RequestId(7), "http://127.0.0.1:9/plot.json");

        match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            Msg::HttpResponse { request, result } => {
                assert_eq!(request, RequestId(7));
                assert!(result.is_err());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
