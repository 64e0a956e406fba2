// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup and handed
//! to the services by reference. Nothing re-reads the environment afterwards.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `ADMIN_API_TOKEN` | Bearer token for privileged routes | unset (privileged routes disabled) |
//! | `PINATA_JWT` | Pinata JWT bearer token | — |
//! | `PINATA_API_KEY` / `PINATA_SECRET_KEY` | Pinata key/secret pair (JWT alternative) | — |
//! | `PINATA_GATEWAY_URL` | IPFS gateway base URL | `https://gateway.pinata.cloud` |
//! | `PINATA_MAX_RETRIES` | Retries beyond the first attempt | `3` |
//! | `PINATA_RETRY_DELAY_MS` | Base backoff delay | `1000` |
//! | `PINATA_TIMEOUT_SECS` | Per-request timeout | `30` |
//! | `AES_ENCRYPTION_KEY` | Static base64 AES-256 key | unset |
//! | `LOCAL_MASTER_KEY` | Base64 master key wrapping local data keys | unset |
//! | `KMS_ENABLED` | Use the remote KMS tier | `false` |
//! | `KMS_ENDPOINT` | Remote KMS base URL | — |
//! | `KMS_KEY_ID` | Remote KMS key identifier | — |
//! | `KMS_API_TOKEN` | Remote KMS bearer token | — |
//! | `KMS_REGION` | Region label (introspection only) | `us-east-1` |
//! | `EXPLORER_API_URL` | Etherscan-compatible explorer endpoint | `https://api.bscscan.com/api` |
//! | `EXPLORER_API_KEY` | Explorer API key | unset |
//! | `EXPLORER_URL` | Explorer web UI base (link building) | `https://bscscan.com` |
//! | `CHAIN_CACHE_TTL_SECS` | TTL for cached explorer reads | `15` |
//! | `CHAIN_CACHE_CAPACITY` | Max cached explorer reads | `256` |

use std::time::Duration;

/// Pinning provider (Pinata) settings.
#[derive(Debug, Clone)]
pub struct PinataSettings {
    /// JWT bearer token, preferred over the key/secret pair.
    pub jwt: Option<String>,
    /// Legacy API key, used together with `secret_key`.
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    /// Pinning API base URL.
    pub api_base_url: String,
    /// Gateway base URL for content retrieval.
    pub gateway_url: String,
    /// Retries beyond the first attempt for retryable failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl PinataSettings {
    pub fn is_configured(&self) -> bool {
        self.jwt.is_some() || (self.api_key.is_some() && self.secret_key.is_some())
    }
}

/// Key management settings for the three resolution tiers.
#[derive(Debug, Clone)]
pub struct KeySettings {
    /// Whether the remote KMS tier is consulted at all.
    pub kms_enabled: bool,
    pub kms_endpoint: Option<String>,
    pub kms_key_id: Option<String>,
    pub kms_api_token: Option<String>,
    /// Region label, surfaced in key info only.
    pub kms_region: String,
    /// Static base64-encoded AES-256 key (second resolution tier).
    pub static_key_b64: Option<String>,
    /// Base64-encoded master key wrapping locally generated data keys.
    pub local_master_key_b64: Option<String>,
    /// Timeout for remote KMS calls.
    pub timeout: Duration,
}

/// Blockchain explorer settings.
#[derive(Debug, Clone)]
pub struct ExplorerSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Web UI base for building human-facing links.
    pub explorer_url: String,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

/// Top-level application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Bearer token gating decrypt and key-rotation routes. When unset the
    /// privileged routes refuse every request.
    pub admin_api_token: Option<String>,
    pub pinata: PinataSettings,
    pub keys: KeySettings,
    pub explorer: ExplorerSettings,
}

const DEFAULT_PINATA_API_URL: &str = "https://api.pinata.cloud";
const DEFAULT_PINATA_GATEWAY_URL: &str = "https://gateway.pinata.cloud";
const DEFAULT_EXPLORER_API_URL: &str = "https://api.bscscan.com/api";
const DEFAULT_EXPLORER_URL: &str = "https://bscscan.com";

impl Settings {
    /// Load settings from the environment.
    pub fn from_env() -> Self {
        Self {
            host: env_or_default("HOST", "0.0.0.0"),
            port: env_parsed("PORT", 8080),
            admin_api_token: env_optional("ADMIN_API_TOKEN"),
            pinata: PinataSettings {
                jwt: env_optional("PINATA_JWT"),
                api_key: env_optional("PINATA_API_KEY"),
                secret_key: env_optional("PINATA_SECRET_KEY"),
                api_base_url: env_or_default("PINATA_API_URL", DEFAULT_PINATA_API_URL),
                gateway_url: env_or_default("PINATA_GATEWAY_URL", DEFAULT_PINATA_GATEWAY_URL),
                max_retries: env_parsed("PINATA_MAX_RETRIES", 3),
                retry_delay: Duration::from_millis(env_parsed("PINATA_RETRY_DELAY_MS", 1000)),
                timeout: Duration::from_secs(env_parsed("PINATA_TIMEOUT_SECS", 30)),
            },
            keys: KeySettings {
                kms_enabled: env_parsed("KMS_ENABLED", false),
                kms_endpoint: env_optional("KMS_ENDPOINT"),
                kms_key_id: env_optional("KMS_KEY_ID"),
                kms_api_token: env_optional("KMS_API_TOKEN"),
                kms_region: env_or_default("KMS_REGION", "us-east-1"),
                static_key_b64: env_optional("AES_ENCRYPTION_KEY"),
                local_master_key_b64: env_optional("LOCAL_MASTER_KEY"),
                timeout: Duration::from_secs(env_parsed("KMS_TIMEOUT_SECS", 10)),
            },
            explorer: ExplorerSettings {
                api_url: env_or_default("EXPLORER_API_URL", DEFAULT_EXPLORER_API_URL),
                api_key: env_optional("EXPLORER_API_KEY"),
                explorer_url: env_or_default("EXPLORER_URL", DEFAULT_EXPLORER_URL),
                timeout: Duration::from_secs(env_parsed("EXPLORER_TIMEOUT_SECS", 30)),
                cache_ttl: Duration::from_secs(env_parsed("CHAIN_CACHE_TTL_SECS", 15)),
                cache_capacity: env_parsed("CHAIN_CACHE_CAPACITY", 256),
            },
        }
    }
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_optional(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinata_settings_require_some_credential() {
        let mut settings = Settings::from_env().pinata;
        settings.jwt = None;
        settings.api_key = None;
        settings.secret_key = None;
        assert!(!settings.is_configured());

        settings.jwt = Some("token".into());
        assert!(settings.is_configured());

        settings.jwt = None;
        settings.api_key = Some("key".into());
        assert!(!settings.is_configured());
        settings.secret_key = Some("secret".into());
        assert!(settings.is_configured());
    }
}
