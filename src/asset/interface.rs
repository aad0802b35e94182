//! Fungible asset interface
//!
//! The capability set the exchange requires from an asset ledger. The
//! exchange core only calls the query and transfer methods; `mint` and
//! `approve` exist so the service can expose the full ledger surface of
//! the in-process implementation.

use crate::error::ExchangeResult;

use async_trait::async_trait;

/// A fungible asset ledger: per-account balances plus per-(owner, spender)
/// spending allowances. No operation may take a balance or allowance
/// below zero, and arithmetic is checked rather than wrapping.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FungibleAsset: Send + Sync {
    /// Asset identifier, unique within the registry
    fn id(&self) -> &str;

    /// Balance held by an account
    async fn balance_of(&self, account: &str) -> ExchangeResult<u128>;

    /// Remaining amount `spender` may move out of `owner`'s account
    async fn allowance(&self, owner: &str, spender: &str) -> ExchangeResult<u128>;

    /// Move `amount` from `from` to `to`
    async fn transfer(&self, from: &str, to: &str, amount: u128) -> ExchangeResult<()>;

    /// Move `amount` from `from` to `to` on behalf of `spender`,
    /// consuming `spender`'s allowance from `from`
    async fn transfer_from(
        &self,
        spender: &str,
        from: &str,
        to: &str,
        amount: u128,
    ) -> ExchangeResult<()>;

    /// Set (not increment) the allowance from `owner` to `spender`
    async fn approve(&self, owner: &str, spender: &str, amount: u128) -> ExchangeResult<()>;

    /// Credit `amount` new units to `account`
    async fn mint(&self, account: &str, amount: u128) -> ExchangeResult<()>;

    /// Total units in circulation
    async fn total_supply(&self) -> ExchangeResult<u128>;
}

impl std::fmt::Debug for dyn FungibleAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FungibleAsset").field("id", &self.id()).finish()
    }
}
