//! In-memory fungible asset ledger

use super::FungibleAsset;
use crate::config::AssetConfig;
use crate::error::{ExchangeError, ExchangeResult};

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// An in-memory token ledger with open minting
///
/// Balances and allowances are guarded by a single lock each; every
/// mutating call does its checks and its writes under the same write
/// guard, so a failed call never leaves a partial update behind.
pub struct TokenLedger {
    id: String,
    name: String,
    symbol: String,
    decimals: u8,
    /// account -> balance
    balances: RwLock<HashMap<String, u128>>,
    /// (owner, spender) -> allowance
    allowances: RwLock<HashMap<(String, String), u128>>,
    total_supply: RwLock<u128>,
}

impl TokenLedger {
    /// Create an empty ledger
    pub fn new(id: &str, name: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            balances: RwLock::new(HashMap::new()),
            allowances: RwLock::new(HashMap::new()),
            total_supply: RwLock::new(0),
        }
    }

    /// Create a ledger from configuration, crediting genesis balances
    pub async fn from_config(id: &str, config: &AssetConfig) -> ExchangeResult<Self> {
        let ledger = Self::new(id, &config.name, &config.symbol, config.decimals);

        for (account, amount) in &config.genesis_balances {
            ledger.mint(account, *amount).await?;
        }

        Ok(ledger)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

#[async_trait]
impl FungibleAsset for TokenLedger {
    fn id(&self) -> &str {
        &self.id
    }

    async fn balance_of(&self, account: &str) -> ExchangeResult<u128> {
        Ok(*self.balances.read().await.get(account).unwrap_or(&0))
    }

    async fn allowance(&self, owner: &str, spender: &str) -> ExchangeResult<u128> {
        Ok(*self
            .allowances
            .read()
            .await
            .get(&(owner.to_string(), spender.to_string()))
            .unwrap_or(&0))
    }

    async fn transfer(&self, from: &str, to: &str, amount: u128) -> ExchangeResult<()> {
        let mut balances = self.balances.write().await;

        let from_balance = *balances.get(from).unwrap_or(&0);
        if from_balance < amount {
            return Err(ExchangeError::InsufficientBalance {
                asset: self.id.clone(),
                account: from.to_string(),
                have: from_balance,
                need: amount,
            });
        }

        let to_balance = *balances.get(to).unwrap_or(&0);
        let new_to_balance = to_balance
            .checked_add(amount)
            .ok_or_else(|| ExchangeError::Overflow {
                asset: self.id.clone(),
            })?;

        balances.insert(from.to_string(), from_balance - amount);
        balances.insert(to.to_string(), new_to_balance);

        debug!(asset = %self.id, %from, %to, amount, "transfer");
        Ok(())
    }

    async fn transfer_from(
        &self,
        spender: &str,
        from: &str,
        to: &str,
        amount: u128,
    ) -> ExchangeResult<()> {
        // Hold the allowance lock across the balance move so the allowance
        // is only consumed if the transfer goes through
        let mut allowances = self.allowances.write().await;

        let key = (from.to_string(), spender.to_string());
        let allowed = *allowances.get(&key).unwrap_or(&0);
        if allowed < amount {
            return Err(ExchangeError::InsufficientAllowance {
                asset: self.id.clone(),
                have: allowed,
                need: amount,
            });
        }

        let mut balances = self.balances.write().await;

        let from_balance = *balances.get(from).unwrap_or(&0);
        if from_balance < amount {
            return Err(ExchangeError::InsufficientBalance {
                asset: self.id.clone(),
                account: from.to_string(),
                have: from_balance,
                need: amount,
            });
        }

        let to_balance = *balances.get(to).unwrap_or(&0);
        let new_to_balance = to_balance
            .checked_add(amount)
            .ok_or_else(|| ExchangeError::Overflow {
                asset: self.id.clone(),
            })?;

        balances.insert(from.to_string(), from_balance - amount);
        balances.insert(to.to_string(), new_to_balance);
        allowances.insert(key, allowed - amount);

        debug!(asset = %self.id, %spender, %from, %to, amount, "transfer_from");
        Ok(())
    }

    async fn approve(&self, owner: &str, spender: &str, amount: u128) -> ExchangeResult<()> {
        self.allowances
            .write()
            .await
            .insert((owner.to_string(), spender.to_string()), amount);

        debug!(asset = %self.id, %owner, %spender, amount, "approve");
        Ok(())
    }

    async fn mint(&self, account: &str, amount: u128) -> ExchangeResult<()> {
        let mut balances = self.balances.write().await;
        let mut supply = self.total_supply.write().await;

        let new_supply = supply
            .checked_add(amount)
            .ok_or_else(|| ExchangeError::Overflow {
                asset: self.id.clone(),
            })?;

        let balance = *balances.get(account).unwrap_or(&0);
        let new_balance = balance
            .checked_add(amount)
            .ok_or_else(|| ExchangeError::Overflow {
                asset: self.id.clone(),
            })?;

        balances.insert(account.to_string(), new_balance);
        *supply = new_supply;

        debug!(asset = %self.id, %account, amount, "mint");
        Ok(())
    }

    async fn total_supply(&self) -> ExchangeResult<u128> {
        Ok(*self.total_supply.read().await)
    }
}
