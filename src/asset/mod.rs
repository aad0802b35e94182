//! Asset module - fungible asset ledgers and their registry
//!
//! This module provides:
//! - The `FungibleAsset` capability set the exchange depends on
//! - An in-memory `TokenLedger` implementation with open minting
//! - The `AssetRegistry` that owns one ledger per configured asset

pub mod interface;
pub mod ledger;

pub use interface::FungibleAsset;
pub use ledger::TokenLedger;

#[cfg(test)]
pub use interface::MockFungibleAsset;

use crate::config::Settings;
use crate::error::{ExchangeError, ExchangeResult};
use crate::events::ExchangeEvent;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Owns every asset ledger the service knows about
#[derive(Debug)]
pub struct AssetRegistry {
    /// Ledgers indexed by asset id
    assets: DashMap<String, Arc<dyn FungibleAsset>>,
    /// Event broadcast channel
    event_tx: broadcast::Sender<ExchangeEvent>,
    /// Shutdown signal for background samplers
    shutdown: Arc<RwLock<bool>>,
}

impl AssetRegistry {
    /// Create an empty registry
    pub fn new(event_tx: broadcast::Sender<ExchangeEvent>) -> Self {
        Self {
            assets: DashMap::new(),
            event_tx,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Create a registry with one ledger per configured asset
    pub async fn from_settings(
        settings: &Settings,
        event_tx: broadcast::Sender<ExchangeEvent>,
    ) -> ExchangeResult<Self> {
        let registry = Self::new(event_tx);

        for (id, asset_config) in &settings.assets {
            info!("Initializing asset {} ({})", id, asset_config.symbol);

            let ledger = TokenLedger::from_config(id, asset_config).await?;
            registry.register(Arc::new(ledger));
        }

        Ok(registry)
    }

    /// Register an asset ledger under its own id
    pub fn register(&self, asset: Arc<dyn FungibleAsset>) {
        let id = asset.id().to_string();
        self.assets.insert(id.clone(), asset);

        // Receiver may not be up yet during startup; that is fine
        let _ = self.event_tx.send(ExchangeEvent::AssetRegistered { asset: id });
    }

    /// Get the ledger for an asset
    pub fn get(&self, asset: &str) -> ExchangeResult<Arc<dyn FungibleAsset>> {
        self.assets
            .get(asset)
            .map(|a| a.clone())
            .ok_or(ExchangeError::AssetNotFound {
                asset: asset.to_string(),
            })
    }

    /// All registered asset ids
    pub fn asset_ids(&self) -> Vec<String> {
        self.assets.iter().map(|e| e.key().clone()).collect()
    }

    /// Subscribe to registry and exchange events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.event_tx.subscribe()
    }

    /// Periodically sample the exchange account's balance of every asset
    /// into the reserve gauge. Runs until `stop` is called.
    pub async fn start_reserve_sampler(&self, exchange_account: &str, interval_secs: u64) {
        let mut handles = Vec::new();

        for entry in self.assets.iter() {
            let asset = entry.value().clone();
            let account = exchange_account.to_string();
            let shutdown = self.shutdown.clone();

            let handle = tokio::spawn(async move {
                loop {
                    if *shutdown.read().await {
                        break;
                    }

                    match asset.balance_of(&account).await {
                        Ok(balance) => {
                            crate::metrics::record_reserve(asset.id(), balance);
                            debug!(asset = %asset.id(), balance, "sampled reserve");
                        }
                        Err(e) => {
                            warn!("Reserve sample failed for {}: {}", asset.id(), e);
                        }
                    }

                    tokio::time::sleep(tokio::time::Duration::from_secs(interval_secs)).await;
                }
            });

            handles.push(handle);
        }

        futures::future::join_all(handles).await;
    }

    /// Stop background samplers
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Asset registry stopped");
    }
}
