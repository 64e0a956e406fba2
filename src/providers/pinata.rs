// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Pinata pinning-service client.
//!
//! Uploads JSON blobs to the pin endpoint, retrieves them by CID through the
//! gateway, and manages pins. Server errors (5xx) and transport failures are
//! retried with exponential backoff up to a bounded attempt count; client
//! errors (4xx) are never retried. The authentication probe is a single
//! attempt so health checks fail fast.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::PinataSettings;

#[derive(Debug, thiserror::Error)]
pub enum PinningError {
    #[error("pinning credentials not configured (JWT or API key/secret required)")]
    NotConfigured,

    #[error("invalid content identifier: {0}")]
    InvalidCid(String),

    #[error("content not found: {0}")]
    ContentNotFound(String),

    #[error("pinning request rejected: {0}")]
    RequestFailed(String),

    #[error("pinning service unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("pinning service returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// A successfully pinned object.
#[derive(Debug, Clone)]
pub struct PinnedObject {
    pub cid: String,
    pub url: String,
    pub size_bytes: u64,
}

/// Metadata attached to a pin.
#[derive(Debug, Clone, Serialize)]
pub struct PinMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyvalues: Option<Value>,
}

/// Non-secret client summary for health checks and the decryption guide.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PinningServiceInfo {
    pub service: String,
    pub api_base_url: String,
    pub gateway_url: String,
    pub authentication: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

enum AuthScheme {
    Jwt(String),
    KeyPair { key: String, secret: String },
}

pub struct PinataClient {
    settings: PinataSettings,
    auth: AuthScheme,
    http: Client,
}

impl PinataClient {
    pub fn from_settings(settings: PinataSettings) -> Result<Self, PinningError> {
        let auth = match (&settings.jwt, &settings.api_key, &settings.secret_key) {
            (Some(jwt), _, _) => AuthScheme::Jwt(jwt.clone()),
            (None, Some(key), Some(secret)) => AuthScheme::KeyPair {
                key: key.clone(),
                secret: secret.clone(),
            },
            _ => return Err(PinningError::NotConfigured),
        };

        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| PinningError::RequestFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            settings,
            auth,
            http,
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            AuthScheme::Jwt(token) => request.bearer_auth(token),
            AuthScheme::KeyPair { key, secret } => request
                .header("pinata_api_key", key)
                .header("pinata_secret_api_key", secret),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.settings.api_base_url.trim_end_matches('/'))
    }

    /// Gateway URL for a CID.
    pub fn gateway_url(&self, cid: &str) -> String {
        format!(
            "{}/ipfs/{cid}",
            self.settings.gateway_url.trim_end_matches('/')
        )
    }

    /// Pin a JSON document, requesting a CIDv1 identifier.
    pub async fn upload_json(
        &self,
        content: &Value,
        metadata: &PinMetadata,
    ) -> Result<PinnedObject, PinningError> {
        let body = serde_json::json!({
            "pinataContent": content,
            "pinataMetadata": metadata,
            "pinataOptions": { "cidVersion": 1 },
        });
        let url = self.api_url("/pinning/pinJSONToIPFS");

        let response = self
            .send_with_retry(|| self.authed(self.http.post(&url)).json(&body))
            .await?;
        let response = Self::require_success(response, "pin JSON").await?;

        let result: Value = response
            .json()
            .await
            .map_err(|e| PinningError::InvalidResponse(format!("pin response not JSON: {e}")))?;
        let cid = result
            .get("IpfsHash")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PinningError::InvalidResponse("pin response missing IpfsHash".to_string())
            })?
            .to_string();
        let size_bytes = result.get("PinSize").and_then(Value::as_u64).unwrap_or(0);

        info!(cid = %cid, size_bytes, "pinned JSON to IPFS");
        Ok(PinnedObject {
            url: self.gateway_url(&cid),
            cid,
            size_bytes,
        })
    }

    /// Fetch raw bytes by CID through the gateway.
    pub async fn fetch_by_cid(&self, cid: &str) -> Result<Vec<u8>, PinningError> {
        validate_cid(cid)?;
        let url = self.gateway_url(cid);

        let response = self.send_with_retry(|| self.http.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PinningError::ContentNotFound(cid.to_string()));
        }
        let response = Self::require_success(response, "fetch content").await?;

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| PinningError::InvalidResponse(format!("read content body: {e}")))
    }

    /// Pin an already-uploaded CID. Idempotent: pinning a CID that is
    /// already pinned reports success.
    pub async fn pin(&self, cid: &str) -> Result<bool, PinningError> {
        validate_cid(cid)?;
        let body = serde_json::json!({ "hashToPin": cid });
        let url = self.api_url("/pinning/pinByHash");

        let response = self
            .send_with_retry(|| self.authed(self.http.post(&url)).json(&body))
            .await?;
        if response.status().is_success() {
            return Ok(true);
        }

        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        if detail.to_ascii_lowercase().contains("already pinned") {
            return Ok(true);
        }
        Err(PinningError::RequestFailed(format!(
            "pin {cid} returned {status}: {detail}"
        )))
    }

    /// Remove a pin.
    pub async fn unpin(&self, cid: &str) -> Result<(), PinningError> {
        validate_cid(cid)?;
        let url = self.api_url(&format!("/pinning/unpin/{cid}"));

        let response = self
            .send_with_retry(|| self.authed(self.http.delete(&url)))
            .await?;
        Self::require_success(response, "unpin").await?;
        info!(cid = %cid, "unpinned CID");
        Ok(())
    }

    /// Credential probe. Single attempt: health checks must fail fast.
    pub async fn test_authentication(&self) -> bool {
        let url = self.api_url("/data/testAuthentication");
        match self.authed(self.http.get(&url)).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "pinning authentication probe rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "pinning authentication probe failed");
                false
            }
        }
    }

    pub fn service_info(&self) -> PinningServiceInfo {
        PinningServiceInfo {
            service: "Pinata IPFS".to_string(),
            api_base_url: self.settings.api_base_url.clone(),
            gateway_url: self.settings.gateway_url.clone(),
            authentication: match self.auth {
                AuthScheme::Jwt(_) => "JWT".to_string(),
                AuthScheme::KeyPair { .. } => "API key".to_string(),
            },
            max_retries: self.settings.max_retries,
            timeout_secs: self.settings.timeout.as_secs(),
        }
    }

    /// Send a request, retrying 5xx responses and transport errors with
    /// exponential backoff. Any response below 500 is returned to the caller
    /// as-is: 4xx means the request itself is wrong and retrying cannot help.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response, PinningError>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.settings.max_retries + 1;
        let mut last_reason = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(self.settings.retry_delay, attempt - 1)).await;
            }

            match build().send().await {
                Ok(response) if response.status().is_server_error() => {
                    last_reason = format!("server returned {}", response.status());
                    warn!(
                        attempt = attempt + 1,
                        attempts,
                        status = %response.status(),
                        "pinning request failed, will retry"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_reason = e.to_string();
                    warn!(
                        attempt = attempt + 1,
                        attempts,
                        error = %e,
                        "pinning request failed, will retry"
                    );
                }
            }
        }

        Err(PinningError::Unavailable {
            attempts,
            reason: last_reason,
        })
    }

    async fn require_success(response: Response, context: &str) -> Result<Response, PinningError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(PinningError::RequestFailed(format!(
            "{context} returned {status}: {detail}"
        )))
    }
}

/// Exponential backoff: `base * 2^attempt`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Shallow CID shape check: CIDv0 (`Qm`, 46 base58 chars) or CIDv1
/// (multibase prefix, lowercase base32). Catches path-injection and obvious
/// garbage before any network round-trip.
pub fn validate_cid(cid: &str) -> Result<(), PinningError> {
    let looks_v0 = cid.len() == 46
        && cid.starts_with("Qm")
        && cid.chars().all(|c| c.is_ascii_alphanumeric());
    let looks_v1 = cid.len() >= 46
        && cid.starts_with('b')
        && cid
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());

    if looks_v0 || looks_v1 {
        Ok(())
    } else {
        Err(PinningError::InvalidCid(cid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{any, get, post};
    use axum::{Json, Router};

    const CID_V1: &str = "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy";

    fn client_for(base_url: &str, gateway_url: &str, max_retries: u32) -> PinataClient {
        PinataClient::from_settings(PinataSettings {
            jwt: Some("test-jwt".to_string()),
            api_key: None,
            secret_key: None,
            api_base_url: base_url.to_string(),
            gateway_url: gateway_url.to_string(),
            max_retries,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn missing_credentials_is_not_configured() {
        let result = PinataClient::from_settings(PinataSettings {
            jwt: None,
            api_key: Some("key-without-secret".to_string()),
            secret_key: None,
            api_base_url: "http://localhost".to_string(),
            gateway_url: "http://localhost".to_string(),
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(PinningError::NotConfigured)));
    }

    #[test]
    fn cid_validation() {
        assert!(validate_cid(CID_V1).is_ok());
        assert!(validate_cid("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").is_ok());
        assert!(validate_cid("").is_err());
        assert!(validate_cid("../../../etc/passwd").is_err());
        assert!(validate_cid("Qmshort").is_err());
    }

    #[test]
    fn backoff_is_exponential() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn upload_json_parses_pin_response() {
        let router = Router::new().route(
            "/pinning/pinJSONToIPFS",
            post(|| async {
                Json(serde_json::json!({
                    "IpfsHash": CID_V1,
                    "PinSize": 123,
                    "Timestamp": "2024-01-01T00:00:00Z",
                }))
            }),
        );
        let base = spawn(router).await;
        let client = client_for(&base, &base, 0);

        let pinned = client
            .upload_json(
                &serde_json::json!({"hello": "world"}),
                &PinMetadata {
                    name: "test".to_string(),
                    keyvalues: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(pinned.cid, CID_V1);
        assert_eq!(pinned.size_bytes, 123);
        assert!(pinned.url.ends_with(&format!("/ipfs/{CID_V1}")));
    }

    #[tokio::test]
    async fn permanently_failing_backend_makes_bounded_attempts() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new()
            .route(
                "/pinning/pinJSONToIPFS",
                any(|State(hits): State<Arc<AtomicU32>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }),
            )
            .with_state(hits.clone());
        let base = spawn(router).await;
        let client = client_for(&base, &base, 3);

        let err = client
            .upload_json(
                &serde_json::json!({}),
                &PinMetadata {
                    name: "test".to_string(),
                    keyvalues: None,
                },
            )
            .await
            .unwrap_err();

        // 1 initial attempt + 3 retries.
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert!(matches!(err, PinningError::Unavailable { attempts: 4, .. }));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new()
            .route(
                "/pinning/pinJSONToIPFS",
                any(|State(hits): State<Arc<AtomicU32>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::BAD_REQUEST
                }),
            )
            .with_state(hits.clone());
        let base = spawn(router).await;
        let client = client_for(&base, &base, 3);

        let err = client
            .upload_json(
                &serde_json::json!({}),
                &PinMetadata {
                    name: "test".to_string(),
                    keyvalues: None,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(matches!(err, PinningError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn transient_failure_recovers() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new()
            .route(
                "/ipfs/{cid}",
                get(|State(hits): State<Arc<AtomicU32>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StatusCode::SERVICE_UNAVAILABLE)
                    } else {
                        Ok("stored bytes")
                    }
                }),
            )
            .with_state(hits.clone());
        let base = spawn(router).await;
        let client = client_for(&base, &base, 3);

        let bytes = client.fetch_by_cid(CID_V1).await.unwrap();
        assert_eq!(bytes, b"stored bytes");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_missing_cid_is_content_not_found() {
        let router =
            Router::new().route("/ipfs/{cid}", get(|| async { StatusCode::NOT_FOUND }));
        let base = spawn(router).await;
        let client = client_for(&base, &base, 1);

        let err = client.fetch_by_cid(CID_V1).await.unwrap_err();
        assert!(matches!(err, PinningError::ContentNotFound(_)));
    }

    #[tokio::test]
    async fn fetch_rejects_malformed_cid_without_network() {
        // Unroutable base URL: if validation let the call through, the test
        // would fail on the network error instead of InvalidCid.
        let client = client_for("http://127.0.0.1:1", "http://127.0.0.1:1", 0);
        let err = client.fetch_by_cid("not a cid").await.unwrap_err();
        assert!(matches!(err, PinningError::InvalidCid(_)));
    }

    #[tokio::test]
    async fn pin_is_idempotent_on_duplicate() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new()
            .route(
                "/pinning/pinByHash",
                post(|State(hits): State<Arc<AtomicU32>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::OK, "pinned").into_response()
                    } else {
                        (StatusCode::BAD_REQUEST, "hash already pinned").into_response()
                    }
                }),
            )
            .with_state(hits.clone());
        let base = spawn(router).await;
        let client = client_for(&base, &base, 0);

        assert!(client.pin(CID_V1).await.unwrap());
        assert!(client.pin(CID_V1).await.unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auth_probe_does_not_retry() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new()
            .route(
                "/data/testAuthentication",
                get(|State(hits): State<Arc<AtomicU32>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }),
            )
            .with_state(hits.clone());
        let base = spawn(router).await;
        let client = client_for(&base, &base, 3);

        assert!(!client.test_authentication().await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
