//! Network collaborator
//!
//! [`DefaultWebRequest`] performs blocking `reqwest` GETs on a worker
//! thread. Only `http` and `https` URLs are fetched.

use reqwest::blocking::Client;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::Worker;

/// Ordered `(name, value)` header pairs.
pub type HeaderList = Vec<(String, String)>;

pub type ResponseCallback = Box<dyn FnOnce(ServerResponse) + Send + 'static>;

/// Outcome of a request at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Ok,
    InvalidUrl,
    ConnectionFailed,
    Timeout,
    Failure,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidUrl => "invalid_url",
            Self::ConnectionFailed => "connection_failed",
            Self::Timeout => "timeout",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    pub status: RequestStatus,
    /// HTTP status code, 0 when no response was received.
    pub response_status: u16,
    pub response_headers: HeaderList,
    pub response_text: String,
}

impl ServerResponse {
    /// A response for a request that never reached the server.
    pub fn failed(status: RequestStatus) -> Self {
        Self {
            status,
            response_status: 0,
            response_headers: Vec::new(),
            response_text: String::new(),
        }
    }
}

/// Network access used by script through `_webRequest`.
pub trait WebRequest: Send + Sync {
    /// Fetch `url`; `callback` runs exactly once.
    fn get(&self, url: &str, headers: &[(String, String)], callback: ResponseCallback);
}

struct ClientSettings {
    timeout: Duration,
    user_agent: String,
    client: OnceLock<Option<Client>>,
}

impl ClientSettings {
    // Built on first use, on the worker thread.
    fn client(&self) -> Option<&Client> {
        self.client
            .get_or_init(|| {
                match Client::builder()
                    .timeout(self.timeout)
                    .user_agent(self.user_agent.as_str())
                    .build()
                {
                    Ok(client) => Some(client),
                    Err(e) => {
                        warn!(error = %e, "failed to build HTTP client");
                        None
                    }
                }
            })
            .as_ref()
    }
}

pub struct DefaultWebRequest {
    settings: Arc<ClientSettings>,
    worker: Worker,
}

impl DefaultWebRequest {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            settings: Arc::new(ClientSettings {
                timeout,
                user_agent: user_agent.into(),
                client: OnceLock::new(),
            }),
            worker: Worker::spawn("sieve-web-request"),
        }
    }
}

impl WebRequest for DefaultWebRequest {
    fn get(&self, url: &str, headers: &[(String, String)], callback: ResponseCallback) {
        let url = match validate_url(url) {
            Some(url) => url,
            None => {
                debug!(url, "rejected request URL");
                self.worker
                    .submit(move || callback(ServerResponse::failed(RequestStatus::InvalidUrl)));
                return;
            }
        };

        let settings = self.settings.clone();
        let headers = headers.to_vec();
        self.worker.submit(move || {
            let response = match settings.client() {
                Some(client) => fetch(client, url, &headers),
                None => ServerResponse::failed(RequestStatus::Failure),
            };
            callback(response);
        });
    }
}

fn validate_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

fn fetch(client: &Client, url: Url, headers: &[(String, String)]) -> ServerResponse {
    let mut request = client.get(url.clone());
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let response = match request.send() {
        Ok(response) => response,
        Err(e) => {
            let status = if e.is_timeout() {
                RequestStatus::Timeout
            } else if e.is_connect() {
                RequestStatus::ConnectionFailed
            } else {
                RequestStatus::Failure
            };
            debug!(%url, error = %e, status = status.as_str(), "request failed");
            return ServerResponse::failed(status);
        }
    };

    let response_status = response.status().as_u16();
    let response_headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    match response.text() {
        Ok(response_text) => ServerResponse {
            status: RequestStatus::Ok,
            response_status,
            response_headers,
            response_text,
        },
        Err(e) => {
            debug!(%url, error = %e, "failed to read response body");
            ServerResponse {
                status: if e.is_timeout() {
                    RequestStatus::Timeout
                } else {
                    RequestStatus::Failure
                },
                response_status,
                response_headers,
                response_text: String::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_validate_url_accepts_http_only() {
        assert!(validate_url("https://easylist.to/easylist/easylist.txt").is_some());
        assert!(validate_url("http://localhost:8080/").is_some());
        assert!(validate_url("file:///etc/passwd").is_none());
        assert!(validate_url("not a url").is_none());
    }

    #[test]
    fn test_invalid_url_is_reported_through_callback() {
        let web = DefaultWebRequest::new(Duration::from_secs(1), "sieve-test");
        let (tx, rx) = bounded(1);
        web.get(
            "ftp://example.com/list.txt",
            &[],
            Box::new(move |response| tx.send(response).unwrap()),
        );
        let response = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(response.status, RequestStatus::InvalidUrl);
        assert_eq!(response.response_status, 0);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(RequestStatus::Ok.as_str(), "ok");
        assert_eq!(RequestStatus::ConnectionFailed.as_str(), "connection_failed");
    }
}
