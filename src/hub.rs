//! Hub client: location reporting, zone events and zone fetching.
//!
//! The HTTP implementation posts webhook-style JSON bodies and fails over
//! across every configured endpoint URL in order. Individual call failures
//! are returned to the caller, which logs and swallows them; the next
//! natural trigger retries.

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::json;
use std::time::Duration;

use crate::error::{Result, TrackingError};
use crate::types::{LocationUpdate, Zone};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Calendar-style hub version ("2022.2.0").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HubVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl HubVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse "YYYY.M.P", ignoring any suffix after the third component.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts
            .next()
            .map(|p| {
                p.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
            })
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);
        Some(Self { major, minor, patch })
    }
}

/// Remote hub collaborator. Calls are fire-and-forget per invocation; the
/// client handles endpoint failover, not application-level retries.
#[async_trait]
pub trait HubClient: Send + Sync {
    async fn update_location(&self, update: &LocationUpdate) -> Result<()>;
    async fn fire_event(&self, event_type: &str, data: serde_json::Value) -> Result<()>;
    async fn get_zones(&self) -> Result<Vec<Zone>>;

    /// Whether the hub is at least the given version. Gated features fall
    /// back to their pre-gate behavior when this returns false.
    fn version_at_least(&self, major: u32, minor: u32, patch: u32) -> bool;
}

/// HTTP hub client with ordered endpoint failover.
pub struct HttpHubClient {
    client: reqwest::Client,
    endpoints: Vec<String>,
    token: Option<String>,
    version: Option<HubVersion>,
}

impl HttpHubClient {
    /// `endpoints` are tried in order on every call; the first reachable one
    /// wins. `version` is the hub version string reported at registration.
    pub fn new(
        endpoints: Vec<String>,
        token: Option<String>,
        version: Option<&str>,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(TrackingError::Config(
                "at least one hub endpoint is required".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| TrackingError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoints,
            token,
            version: version.and_then(HubVersion::parse),
        })
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let mut last_error = String::new();
        for endpoint in &self.endpoints {
            let mut request = self.client.post(endpoint).json(body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("[Hub] Request delivered via {}", endpoint);
                    return Ok(response);
                }
                Ok(response) => {
                    last_error = format!("HTTP {} from {}", response.status(), endpoint);
                    warn!("[Hub] {}", last_error);
                }
                Err(e) => {
                    last_error = format!("{} unreachable: {}", endpoint, e);
                    warn!("[Hub] {}", last_error);
                }
            }
        }
        Err(TrackingError::Network(last_error))
    }
}

#[async_trait]
impl HubClient for HttpHubClient {
    async fn update_location(&self, update: &LocationUpdate) -> Result<()> {
        let body = json!({ "type": "update_location", "data": update });
        self.post(&body).await.map(|_| ())
    }

    async fn fire_event(&self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let body = json!({
            "type": "fire_event",
            "data": { "event_type": event_type, "event_data": data },
        });
        self.post(&body).await.map(|_| ())
    }

    async fn get_zones(&self) -> Result<Vec<Zone>> {
        let body = json!({ "type": "get_zones" });
        let response = self.post(&body).await?;
        response
            .json::<Vec<Zone>>()
            .await
            .map_err(|e| TrackingError::Network(format!("bad zone response: {}", e)))
    }

    fn version_at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        match self.version {
            Some(version) => version >= HubVersion::new(major, minor, patch),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_version_parse() {
        assert_eq!(HubVersion::parse("2022.2.0"), Some(HubVersion::new(2022, 2, 0)));
        assert_eq!(HubVersion::parse("2023.12.4b1"), Some(HubVersion::new(2023, 12, 4)));
        assert_eq!(HubVersion::parse("2022.2"), Some(HubVersion::new(2022, 2, 0)));
        assert_eq!(HubVersion::parse("garbage"), None);
    }

    #[test]
    fn test_version_ordering() {
        assert!(HubVersion::new(2022, 2, 0) >= HubVersion::new(2022, 2, 0));
        assert!(HubVersion::new(2022, 10, 0) > HubVersion::new(2022, 2, 5));
        assert!(HubVersion::new(2021, 12, 9) < HubVersion::new(2022, 2, 0));
    }

    #[test]
    fn test_client_requires_endpoint() {
        assert!(HttpHubClient::new(Vec::new(), None, None).is_err());
    }

    #[test]
    fn test_missing_version_gates_features_off() {
        let client = HttpHubClient::new(
            vec!["http://hub.local:8123/api/webhook/abc".to_string()],
            None,
            None,
        )
        .unwrap();
        assert!(!client.version_at_least(2022, 2, 0));
    }

    /// Accept one connection and answer it with an empty JSON body.
    async fn serve_one_ok(listener: TcpListener) {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 2048];
        let _ = stream.read(&mut buf).await;
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}",
            )
            .await
            .expect("write response");
    }

    #[tokio::test]
    async fn test_failover_delivers_via_second_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_one_ok(listener));

        // Port 1 refuses the connection, so the second URL must be tried.
        let client = HttpHubClient::new(
            vec![
                "http://127.0.0.1:1/api/webhook/abc".to_string(),
                format!("http://{}/api/webhook/abc", addr),
            ],
            None,
            Some("2023.1.0"),
        )
        .unwrap();

        let update = LocationUpdate::named_zone("home");
        client.update_location(&update).await.unwrap();
        server.await.expect("second endpoint served the request");
    }

    #[tokio::test]
    async fn test_all_endpoints_down_is_a_network_error() {
        let client = HttpHubClient::new(
            vec![
                "http://127.0.0.1:1/api/webhook/abc".to_string(),
                "http://127.0.0.1:1/api/webhook/def".to_string(),
            ],
            None,
            None,
        )
        .unwrap();

        let err = client
            .update_location(&LocationUpdate::named_zone("home"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Network(_)));
    }
}
