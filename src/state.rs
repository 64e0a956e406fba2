// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Application state: every service is constructed once at startup and
//! injected into handlers by reference, so there is no hidden global state
//! and tests can substitute any piece.

use std::sync::Arc;

use crate::config::Settings;
use crate::crypto::{EnvelopeCrypto, KeyProvider};
use crate::proof::ProofService;
use crate::providers::explorer::{ExplorerClient, ExplorerError};
use crate::providers::pinata::{PinataClient, PinningError};
use crate::store::InMemoryProofStore;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Pinning(#[from] PinningError),

    #[error(transparent)]
    Explorer(#[from] ExplorerError),
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub keys: Arc<KeyProvider>,
    pub pinata: Arc<PinataClient>,
    pub explorer: Arc<ExplorerClient>,
    pub proofs: Arc<ProofService>,
}

impl AppState {
    /// Wire up the full service graph from settings.
    pub fn from_settings(settings: Settings) -> Result<Self, StartupError> {
        let keys = Arc::new(KeyProvider::new(settings.keys.clone()));
        let crypto = Arc::new(EnvelopeCrypto::new(keys.clone()));
        let pinata = Arc::new(PinataClient::from_settings(settings.pinata.clone())?);
        let explorer = Arc::new(ExplorerClient::from_settings(settings.explorer.clone())?);
        let store = Arc::new(InMemoryProofStore::new());
        let proofs = Arc::new(ProofService::new(pinata.clone(), crypto, store));

        Ok(Self {
            settings: Arc::new(settings),
            keys,
            pinata,
            explorer,
            proofs,
        })
    }

    /// Assemble state from pre-built services (used by tests to substitute
    /// implementations).
    pub fn new(
        settings: Settings,
        keys: Arc<KeyProvider>,
        pinata: Arc<PinataClient>,
        explorer: Arc<ExplorerClient>,
        proofs: Arc<ProofService>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            keys,
            pinata,
            explorer,
            proofs,
        }
    }
}
