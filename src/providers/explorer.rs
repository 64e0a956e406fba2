// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Thin client for an Etherscan-compatible block explorer API.
//!
//! Simple request/response mapping over the `proxy` module endpoints, with a
//! short-lived cache in front (see [`crate::cache::ChainCache`]) and bounded
//! retries. Used to verify that a proof's content identifier was anchored in
//! a transaction's calldata.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::cache::ChainCache;
use crate::config::ExplorerSettings;

/// Retries beyond the first attempt. The explorer is a read-only side
/// channel, so the policy is fixed rather than configurable.
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("invalid transaction hash format: {0}")]
    InvalidTxHash(String),

    #[error("transaction not found: {0}")]
    TxNotFound(String),

    #[error("explorer API error: {0}")]
    Api(String),

    #[error("explorer unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("explorer returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Result of checking a proof-anchoring transaction.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TxVerification {
    pub tx_hash: String,
    pub exists: bool,
    /// Whether the receipt reports success (`status == 0x1`).
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<String>,
    /// Present only when an expected CID was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid_matches: Option<bool>,
}

pub struct ExplorerClient {
    settings: ExplorerSettings,
    http: Client,
    cache: ChainCache,
}

impl ExplorerClient {
    pub fn from_settings(settings: ExplorerSettings) -> Result<Self, ExplorerError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ExplorerError::Api(format!("failed to build HTTP client: {e}")))?;
        let cache = ChainCache::new(settings.cache_capacity, settings.cache_ttl);
        Ok(Self {
            settings,
            http,
            cache,
        })
    }

    /// Transaction details by hash.
    pub async fn transaction(&self, tx_hash: &str) -> Result<Value, ExplorerError> {
        validate_tx_hash(tx_hash)?;
        let result = self
            .request(&[
                ("module", "proxy"),
                ("action", "eth_getTransactionByHash"),
                ("txhash", tx_hash),
            ])
            .await?;
        if result.is_null() {
            return Err(ExplorerError::TxNotFound(tx_hash.to_string()));
        }
        Ok(result)
    }

    /// Transaction receipt by hash.
    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Value, ExplorerError> {
        validate_tx_hash(tx_hash)?;
        let result = self
            .request(&[
                ("module", "proxy"),
                ("action", "eth_getTransactionReceipt"),
                ("txhash", tx_hash),
            ])
            .await?;
        if result.is_null() {
            return Err(ExplorerError::TxNotFound(tx_hash.to_string()));
        }
        Ok(result)
    }

    /// Block details by number (full transactions omitted).
    pub async fn block_by_number(&self, number: u64) -> Result<Value, ExplorerError> {
        let tag = format!("0x{number:x}");
        self.request(&[
            ("module", "proxy"),
            ("action", "eth_getBlockByNumber"),
            ("tag", &tag),
            ("boolean", "false"),
        ])
        .await
    }

    pub async fn latest_block_number(&self) -> Result<u64, ExplorerError> {
        let result = self
            .request(&[("module", "proxy"), ("action", "eth_blockNumber")])
            .await?;
        parse_hex_quantity(&result)
    }

    /// Current gas price in wei.
    pub async fn gas_price(&self) -> Result<u64, ExplorerError> {
        let result = self
            .request(&[("module", "proxy"), ("action", "eth_gasPrice")])
            .await?;
        parse_hex_quantity(&result)
    }

    /// Check that a transaction exists and succeeded, and optionally that its
    /// calldata embeds the expected content identifier.
    pub async fn verify_transaction(
        &self,
        tx_hash: &str,
        expected_cid: Option<&str>,
    ) -> Result<TxVerification, ExplorerError> {
        let transaction = match self.transaction(tx_hash).await {
            Ok(tx) => tx,
            Err(ExplorerError::TxNotFound(_)) => {
                return Ok(TxVerification {
                    tx_hash: tx_hash.to_string(),
                    exists: false,
                    succeeded: false,
                    block_number: None,
                    cid_matches: expected_cid.map(|_| false),
                });
            }
            Err(e) => return Err(e),
        };

        let receipt = self.transaction_receipt(tx_hash).await?;
        let succeeded = receipt
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s == "0x1")
            .unwrap_or(false);

        let cid_matches = expected_cid.map(|cid| {
            transaction
                .get("input")
                .and_then(Value::as_str)
                .map(|input| calldata_embeds_cid(input, cid))
                .unwrap_or(false)
        });

        Ok(TxVerification {
            tx_hash: tx_hash.to_string(),
            exists: true,
            succeeded,
            block_number: transaction
                .get("blockNumber")
                .and_then(Value::as_str)
                .map(str::to_string),
            cid_matches,
        })
    }

    /// Human-facing explorer link for a transaction.
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!(
            "{}/tx/{tx_hash}",
            self.settings.explorer_url.trim_end_matches('/')
        )
    }

    /// Human-facing explorer link for a block.
    pub fn block_url(&self, number: u64) -> String {
        format!(
            "{}/block/{number}",
            self.settings.explorer_url.trim_end_matches('/')
        )
    }

    /// Issue an explorer API call, serving repeated reads from the cache.
    async fn request(&self, params: &[(&str, &str)]) -> Result<Value, ExplorerError> {
        let cache_key = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!(key = %cache_key, "explorer cache hit");
            return Ok(cached);
        }

        let attempts = MAX_RETRIES + 1;
        let mut last_reason = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAY.saturating_mul(2u32.saturating_pow(attempt - 1)))
                    .await;
            }

            let mut request = self.http.get(&self.settings.api_url).query(params);
            if let Some(api_key) = &self.settings.api_key {
                request = request.query(&[("apikey", api_key.as_str())]);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_reason = e.to_string();
                    warn!(attempt = attempt + 1, attempts, error = %e, "explorer request failed");
                    continue;
                }
            };

            if response.status().is_server_error() {
                last_reason = format!("server returned {}", response.status());
                warn!(attempt = attempt + 1, attempts, status = %response.status(), "explorer request failed");
                continue;
            }
            if !response.status().is_success() {
                return Err(ExplorerError::Api(format!(
                    "explorer returned {}",
                    response.status()
                )));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| ExplorerError::InvalidResponse(e.to_string()))?;

            // Non-proxy modules report an explicit status; "0" with a rate
            // limit message is retryable, anything else is a caller error.
            if let Some(status) = body.get("status").and_then(Value::as_str) {
                if status != "1" {
                    let message = body
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    if message.to_ascii_lowercase().contains("rate limit") {
                        last_reason = message.to_string();
                        warn!(attempt = attempt + 1, attempts, "explorer rate limit hit");
                        continue;
                    }
                    return Err(ExplorerError::Api(message.to_string()));
                }
            }

            let result = body.get("result").cloned().unwrap_or(Value::Null);
            if !result.is_null() {
                self.cache.put(&cache_key, result.clone());
            }
            return Ok(result);
        }

        Err(ExplorerError::Unavailable {
            attempts,
            reason: last_reason,
        })
    }
}

fn validate_tx_hash(tx_hash: &str) -> Result<(), ExplorerError> {
    let hex = tx_hash.strip_prefix("0x");
    match hex {
        Some(rest) if rest.len() == 64 && rest.chars().all(|c| c.is_ascii_hexdigit()) => Ok(()),
        _ => Err(ExplorerError::InvalidTxHash(tx_hash.to_string())),
    }
}

fn parse_hex_quantity(value: &Value) -> Result<u64, ExplorerError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ExplorerError::InvalidResponse("expected hex quantity".to_string()))?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|_| ExplorerError::InvalidResponse(format!("bad hex quantity: {raw}")))
}

/// Case-insensitive search for a CID embedded in transaction calldata,
/// either as raw text or hex-encoded.
fn calldata_embeds_cid(input: &str, cid: &str) -> bool {
    let input_lower = input.to_ascii_lowercase();
    let cid_lower = cid.to_ascii_lowercase();
    if input_lower.contains(&cid_lower) {
        return true;
    }
    let cid_hex = hex::encode(cid_lower.as_bytes());
    input_lower.contains(&cid_hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    const TX: &str = "0x3a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f9";

    fn settings_for(api_url: &str) -> ExplorerSettings {
        ExplorerSettings {
            api_url: api_url.to_string(),
            api_key: None,
            explorer_url: "https://explorer.example".to_string(),
            timeout: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(60),
            cache_capacity: 16,
        }
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    #[test]
    fn tx_hash_validation() {
        assert!(validate_tx_hash(TX).is_ok());
        assert!(validate_tx_hash("0x123").is_err());
        assert!(validate_tx_hash("deadbeef").is_err());
        assert!(validate_tx_hash("").is_err());
    }

    #[test]
    fn hex_quantity_parsing() {
        assert_eq!(parse_hex_quantity(&serde_json::json!("0x10")).unwrap(), 16);
        assert!(parse_hex_quantity(&serde_json::json!("zz")).is_err());
        assert!(parse_hex_quantity(&serde_json::json!(12)).is_err());
    }

    #[test]
    fn calldata_cid_matching() {
        let cid = "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy";
        assert!(calldata_embeds_cid(&format!("0xabcdef{cid}00"), cid));
        assert!(calldata_embeds_cid(
            &format!("0x{}", hex::encode(cid.as_bytes())),
            cid
        ));
        assert!(!calldata_embeds_cid("0xabcdef", cid));
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = Router::new()
            .route(
                "/api",
                get(
                    |State(hits): State<Arc<AtomicU32>>,
                     Query(_params): Query<HashMap<String, String>>| async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Json(serde_json::json!({"jsonrpc": "2.0", "result": "0x10"}))
                    },
                ),
            )
            .with_state(hits.clone());
        let base = spawn(router).await;
        let client = ExplorerClient::from_settings(settings_for(&base)).unwrap();

        assert_eq!(client.latest_block_number().await.unwrap(), 16);
        assert_eq!(client.latest_block_number().await.unwrap(), 16);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_transaction_is_not_found() {
        let router = Router::new().route(
            "/api",
            get(|| async { Json(serde_json::json!({"jsonrpc": "2.0", "result": null})) }),
        );
        let base = spawn(router).await;
        let client = ExplorerClient::from_settings(settings_for(&base)).unwrap();

        let err = client.transaction(TX).await.unwrap_err();
        assert!(matches!(err, ExplorerError::TxNotFound(_)));
    }

    #[tokio::test]
    async fn verify_transaction_reports_cid_match() {
        let cid = "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy";
        let input = format!("0x{}", hex::encode(cid.as_bytes()));
        let router = Router::new().route(
            "/api",
            get(
                move |Query(params): Query<HashMap<String, String>>| async move {
                    let result = match params.get("action").map(String::as_str) {
                        Some("eth_getTransactionByHash") => serde_json::json!({
                            "hash": TX,
                            "blockNumber": "0x10",
                            "input": input,
                        }),
                        Some("eth_getTransactionReceipt") => serde_json::json!({
                            "status": "0x1",
                        }),
                        _ => serde_json::Value::Null,
                    };
                    Json(serde_json::json!({"jsonrpc": "2.0", "result": result}))
                },
            ),
        );
        let base = spawn(router).await;
        let client = ExplorerClient::from_settings(settings_for(&base)).unwrap();

        let verification = client.verify_transaction(TX, Some(cid)).await.unwrap();
        assert!(verification.exists);
        assert!(verification.succeeded);
        assert_eq!(verification.cid_matches, Some(true));
        assert_eq!(verification.block_number.as_deref(), Some("0x10"));
    }

    #[tokio::test]
    async fn missing_transaction_verification_is_negative_not_error() {
        let router = Router::new().route(
            "/api",
            get(|| async { Json(serde_json::json!({"jsonrpc": "2.0", "result": null})) }),
        );
        let base = spawn(router).await;
        let client = ExplorerClient::from_settings(settings_for(&base)).unwrap();

        let verification = client.verify_transaction(TX, Some("bafy")).await.unwrap();
        assert!(!verification.exists);
        assert!(!verification.succeeded);
        assert_eq!(verification.cid_matches, Some(false));
    }

    #[test]
    fn link_building() {
        let client = ExplorerClient::from_settings(settings_for("http://localhost/api")).unwrap();
        assert_eq!(
            client.tx_url(TX),
            format!("https://explorer.example/tx/{TX}")
        );
        assert_eq!(client.block_url(7), "https://explorer.example/block/7");
    }
}
