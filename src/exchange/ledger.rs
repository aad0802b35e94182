//! The exchange ledger: 1:1 swaps against a single anchor-asset reserve

use crate::asset::AssetRegistry;
use crate::error::{ExchangeError, ExchangeResult};
use crate::events::{Direction, ExchangeEvent};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};
use uuid::Uuid;

/// Record of one executed exchange operation
#[derive(Debug, Clone, Serialize)]
pub struct SwapReceipt {
    pub op_id: Uuid,
    pub direction: Direction,
    pub caller: String,
    pub asset: String,
    pub amount: u128,
    pub timestamp: DateTime<Utc>,
}

/// Reserve-backed 1:1 exchange against a fixed anchor asset
///
/// The exchange holds no balances of its own; it owns an account on every
/// asset ledger and all accounting lives there. Each operation is two
/// transfers executed under an operation lock, with the first transfer
/// compensated if the second one fails, so no caller ever loses funds on
/// a failed attempt.
#[derive(Debug)]
pub struct ExchangeLedger {
    /// Asset ledgers, including the anchor's
    registry: Arc<AssetRegistry>,
    /// Identity of the reserve asset; fixed for the lifetime of the exchange
    anchor: String,
    /// The exchange's own account id on every ledger
    account: String,
    /// Serializes operations so the two legs are never interleaved
    op_lock: Mutex<()>,
    /// Event broadcast channel
    event_tx: broadcast::Sender<ExchangeEvent>,
}

impl ExchangeLedger {
    /// Bind the exchange to its anchor asset
    pub fn new(
        registry: Arc<AssetRegistry>,
        anchor: &str,
        account: &str,
        event_tx: broadcast::Sender<ExchangeEvent>,
    ) -> ExchangeResult<Self> {
        // The anchor must resolve at bind time; it never changes afterwards
        registry.get(anchor)?;

        Ok(Self {
            registry,
            anchor: anchor.to_string(),
            account: account.to_string(),
            op_lock: Mutex::new(()),
            event_tx,
        })
    }

    /// Identity of the anchor asset
    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    /// The exchange's account id on the asset ledgers
    pub fn account(&self) -> &str {
        &self.account
    }

    /// The exchange's own balance of an asset
    pub async fn reserves(&self, asset: &str) -> ExchangeResult<u128> {
        self.registry.get(asset)?.balance_of(&self.account).await
    }

    /// Exchange `amount` of `asset` for `amount` of the anchor asset
    pub async fn swap(&self, caller: &str, asset: &str, amount: u128) -> ExchangeResult<SwapReceipt> {
        self.execute(Direction::Swap, caller, asset, amount).await
    }

    /// Exchange `amount` of the anchor asset for `amount` of `asset`
    pub async fn unswap(
        &self,
        caller: &str,
        asset: &str,
        amount: u128,
    ) -> ExchangeResult<SwapReceipt> {
        self.execute(Direction::Unswap, caller, asset, amount).await
    }

    async fn execute(
        &self,
        direction: Direction,
        caller: &str,
        asset: &str,
        amount: u128,
    ) -> ExchangeResult<SwapReceipt> {
        match self.try_execute(direction, caller, asset, amount).await {
            Ok(receipt) => {
                crate::metrics::record_op_executed(direction.as_str(), amount);

                let event = match direction {
                    Direction::Swap => ExchangeEvent::SwapExecuted {
                        op_id: receipt.op_id,
                        caller: receipt.caller.clone(),
                        asset: receipt.asset.clone(),
                        amount: receipt.amount,
                        timestamp: receipt.timestamp,
                    },
                    Direction::Unswap => ExchangeEvent::UnswapExecuted {
                        op_id: receipt.op_id,
                        caller: receipt.caller.clone(),
                        asset: receipt.asset.clone(),
                        amount: receipt.amount,
                        timestamp: receipt.timestamp,
                    },
                };
                let _ = self.event_tx.send(event);

                info!(
                    direction = direction.as_str(),
                    %caller, %asset, amount, op_id = %receipt.op_id, "operation executed"
                );
                Ok(receipt)
            }
            Err(e) => {
                crate::metrics::record_op_rejected(direction.as_str(), e.reason());
                let _ = self.event_tx.send(ExchangeEvent::OperationRejected {
                    direction,
                    caller: caller.to_string(),
                    asset: asset.to_string(),
                    amount,
                    reason: e.reason().to_string(),
                });
                Err(e)
            }
        }
    }

    /// Run the two transfer legs under the operation lock
    ///
    /// Leg 1 pulls the deposit asset from the caller into the exchange
    /// account via the caller's allowance. Leg 2 pays the caller out of the
    /// exchange's reserve of the payout asset. If leg 2 fails, leg 1 is
    /// reversed (balance and allowance) before the error is surfaced.
    async fn try_execute(
        &self,
        direction: Direction,
        caller: &str,
        asset: &str,
        amount: u128,
    ) -> ExchangeResult<SwapReceipt> {
        if amount == 0 {
            return Err(ExchangeError::ZeroAmount);
        }

        let (deposit_id, payout_id) = match direction {
            Direction::Swap => (asset, self.anchor.as_str()),
            Direction::Unswap => (self.anchor.as_str(), asset),
        };

        let deposit = self.registry.get(deposit_id)?;
        let payout = self.registry.get(payout_id)?;

        let _guard = self.op_lock.lock().await;

        // Leg 1: pull the deposit from the caller
        deposit
            .transfer_from(&self.account, caller, &self.account, amount)
            .await?;

        // Leg 2: pay out of the reserve
        if let Err(e) = payout.transfer(&self.account, caller, amount).await {
            self.compensate(deposit.as_ref(), caller, amount).await?;

            // A payout-side shortfall on the exchange's own account is a
            // reserve failure from the caller's point of view
            return Err(match e {
                ExchangeError::InsufficientBalance {
                    asset,
                    account,
                    have,
                    need,
                } if account == self.account => {
                    ExchangeError::InsufficientReserve { asset, have, need }
                }
                other => other,
            });
        }

        Ok(SwapReceipt {
            op_id: Uuid::new_v4(),
            direction,
            caller: caller.to_string(),
            asset: asset.to_string(),
            amount,
            timestamp: Utc::now(),
        })
    }

    /// Reverse a committed deposit leg: return the funds and restore the
    /// allowance `transfer_from` consumed
    async fn compensate(
        &self,
        deposit: &dyn crate::asset::FungibleAsset,
        caller: &str,
        amount: u128,
    ) -> ExchangeResult<()> {
        if let Err(e) = deposit.transfer(&self.account, caller, amount).await {
            error!(
                asset = deposit.id(),
                %caller, amount, %e, "compensation transfer failed, deposit stranded"
            );
            return Err(ExchangeError::Internal(format!(
                "failed to reverse deposit of {} {}: {}",
                amount,
                deposit.id(),
                e
            )));
        }

        let remaining = deposit.allowance(caller, &self.account).await?;
        let restored = remaining
            .checked_add(amount)
            .ok_or_else(|| ExchangeError::Overflow {
                asset: deposit.id().to_string(),
            })?;
        deposit.approve(caller, &self.account, restored).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{FungibleAsset, MockFungibleAsset, TokenLedger};

    const WRAPPER: &str = "wrapper";
    const ANCHOR: &str = "AVTC";

    async fn setup() -> (Arc<AssetRegistry>, ExchangeLedger) {
        let (event_tx, _) = broadcast::channel(64);
        let registry = Arc::new(AssetRegistry::new(event_tx.clone()));

        for (id, name) in [
            ("AVTA", "Avalanche test token A"),
            ("AVTB", "Avalanche test token B"),
            (ANCHOR, "Avalanche test token C"),
        ] {
            registry.register(Arc::new(TokenLedger::new(id, name, id, 18)));
        }

        let exchange = ExchangeLedger::new(registry.clone(), ANCHOR, WRAPPER, event_tx).unwrap();
        (registry, exchange)
    }

    async fn balance(registry: &AssetRegistry, asset: &str, account: &str) -> u128 {
        registry.get(asset).unwrap().balance_of(account).await.unwrap()
    }

    #[tokio::test]
    async fn test_anchor_must_exist_at_bind_time() {
        let (event_tx, _) = broadcast::channel(64);
        let registry = Arc::new(AssetRegistry::new(event_tx.clone()));

        let err = ExchangeLedger::new(registry, "MISSING", WRAPPER, event_tx).unwrap_err();
        assert!(matches!(err, ExchangeError::AssetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_swap_fails_without_approval() {
        let (registry, exchange) = setup().await;
        let token_a = registry.get("AVTA").unwrap();
        token_a.mint("alice", 30).await.unwrap();

        let err = exchange.swap("alice", "AVTA", 10).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientAllowance { .. }));
        assert_eq!(balance(&registry, "AVTA", "alice").await, 30);
        assert_eq!(balance(&registry, "AVTA", WRAPPER).await, 0);
    }

    #[tokio::test]
    async fn test_swap_fails_beyond_allowance() {
        let (registry, exchange) = setup().await;
        let token_a = registry.get("AVTA").unwrap();
        token_a.approve("alice", WRAPPER, 10).await.unwrap();
        token_a.mint("alice", 30).await.unwrap();

        let err = exchange.swap("alice", "AVTA", 20).await.unwrap_err();
        assert_eq!(
            err,
            ExchangeError::InsufficientAllowance {
                asset: "AVTA".to_string(),
                have: 10,
                need: 20,
            }
        );
        assert_eq!(balance(&registry, "AVTA", "alice").await, 30);
    }

    #[tokio::test]
    async fn test_swap_fails_beyond_balance() {
        let (registry, exchange) = setup().await;
        let token_a = registry.get("AVTA").unwrap();
        token_a.approve("alice", WRAPPER, 30).await.unwrap();
        token_a.mint("alice", 10).await.unwrap();

        let err = exchange.swap("alice", "AVTA", 20).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientBalance { .. }));
        assert_eq!(balance(&registry, "AVTA", "alice").await, 10);
        assert_eq!(balance(&registry, "AVTA", WRAPPER).await, 0);
    }

    #[tokio::test]
    async fn test_swap_insufficient_reserve_keeps_caller_balance() {
        let (registry, exchange) = setup().await;
        let token_a = registry.get("AVTA").unwrap();
        let token_c = registry.get(ANCHOR).unwrap();

        token_a.mint("alice", 50).await.unwrap();
        token_a.approve("alice", WRAPPER, 100).await.unwrap();

        // Reserve of 10 cannot cover a swap of 20
        token_c.mint("bob", 10).await.unwrap();
        token_c.transfer("bob", WRAPPER, 10).await.unwrap();

        let err = exchange.swap("alice", "AVTA", 20).await.unwrap_err();
        assert_eq!(
            err,
            ExchangeError::InsufficientReserve {
                asset: ANCHOR.to_string(),
                have: 10,
                need: 20,
            }
        );

        // The deposit leg was compensated: balances and allowance restored
        assert_eq!(balance(&registry, "AVTA", "alice").await, 50);
        assert_eq!(balance(&registry, "AVTA", WRAPPER).await, 0);
        assert_eq!(balance(&registry, ANCHOR, WRAPPER).await, 10);
        assert_eq!(token_a.allowance("alice", WRAPPER).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_swap_succeeds() {
        let (registry, exchange) = setup().await;
        let token_a = registry.get("AVTA").unwrap();
        let token_b = registry.get("AVTB").unwrap();
        let token_c = registry.get(ANCHOR).unwrap();

        token_a.mint("alice", 50).await.unwrap();
        token_a.approve("alice", WRAPPER, 100).await.unwrap();
        token_c.approve("alice", WRAPPER, 100).await.unwrap();

        token_c.mint("bob", 50).await.unwrap();
        token_c.transfer("bob", WRAPPER, 50).await.unwrap();
        token_b.mint("bob", 50).await.unwrap();
        token_b.transfer("bob", WRAPPER, 50).await.unwrap();

        let receipt = exchange.swap("alice", "AVTA", 20).await.unwrap();
        assert_eq!(receipt.direction, Direction::Swap);
        assert_eq!(receipt.amount, 20);

        assert_eq!(balance(&registry, "AVTA", "alice").await, 30);
        assert_eq!(balance(&registry, ANCHOR, "alice").await, 20);
        assert_eq!(balance(&registry, "AVTA", WRAPPER).await, 20);
        assert_eq!(balance(&registry, ANCHOR, WRAPPER).await, 30);

        // Alice spends 5 of her anchor balance on token B
        exchange.unswap("alice", "AVTB", 5).await.unwrap();
        assert_eq!(balance(&registry, "AVTB", "alice").await, 5);
        assert_eq!(balance(&registry, ANCHOR, "alice").await, 15);
        assert_eq!(balance(&registry, "AVTB", WRAPPER).await, 45);
        assert_eq!(balance(&registry, ANCHOR, WRAPPER).await, 35);
    }

    #[tokio::test]
    async fn test_unswap_succeeds() {
        let (registry, exchange) = setup().await;
        let token_a = registry.get("AVTA").unwrap();
        let token_c = registry.get(ANCHOR).unwrap();

        token_c.mint("alice", 50).await.unwrap();
        token_c.approve("alice", WRAPPER, 100).await.unwrap();

        token_a.mint("bob", 50).await.unwrap();
        token_a.transfer("bob", WRAPPER, 50).await.unwrap();

        exchange.unswap("alice", "AVTA", 20).await.unwrap();

        assert_eq!(balance(&registry, "AVTA", "alice").await, 20);
        assert_eq!(balance(&registry, ANCHOR, "alice").await, 30);
        assert_eq!(balance(&registry, "AVTA", WRAPPER).await, 30);
        assert_eq!(balance(&registry, ANCHOR, WRAPPER).await, 20);
    }

    #[tokio::test]
    async fn test_unswap_insufficient_reserve() {
        let (registry, exchange) = setup().await;
        let token_c = registry.get(ANCHOR).unwrap();

        token_c.mint("alice", 50).await.unwrap();
        token_c.approve("alice", WRAPPER, 100).await.unwrap();

        // The exchange holds no AVTA at all
        let err = exchange.unswap("alice", "AVTA", 20).await.unwrap_err();
        assert_eq!(
            err,
            ExchangeError::InsufficientReserve {
                asset: "AVTA".to_string(),
                have: 0,
                need: 20,
            }
        );
        assert_eq!(balance(&registry, ANCHOR, "alice").await, 50);
        assert_eq!(token_c.allowance("alice", WRAPPER).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_swap_then_unswap_restores_balances() {
        let (registry, exchange) = setup().await;
        let token_a = registry.get("AVTA").unwrap();
        let token_c = registry.get(ANCHOR).unwrap();

        token_a.mint("alice", 50).await.unwrap();
        token_a.approve("alice", WRAPPER, 100).await.unwrap();
        token_c.approve("alice", WRAPPER, 100).await.unwrap();

        token_c.mint("bob", 30).await.unwrap();
        token_c.transfer("bob", WRAPPER, 30).await.unwrap();

        exchange.swap("alice", "AVTA", 20).await.unwrap();
        exchange.unswap("alice", "AVTA", 20).await.unwrap();

        assert_eq!(balance(&registry, "AVTA", "alice").await, 50);
        assert_eq!(balance(&registry, ANCHOR, "alice").await, 0);
        assert_eq!(balance(&registry, "AVTA", WRAPPER).await, 0);
        assert_eq!(balance(&registry, ANCHOR, WRAPPER).await, 30);
    }

    #[tokio::test]
    async fn test_anchor_for_anchor_is_identity() {
        let (registry, exchange) = setup().await;
        let token_c = registry.get(ANCHOR).unwrap();

        token_c.mint("alice", 50).await.unwrap();
        token_c.approve("alice", WRAPPER, 100).await.unwrap();

        // The deposit leg itself funds the payout; net effect is zero
        exchange.swap("alice", ANCHOR, 20).await.unwrap();

        assert_eq!(balance(&registry, ANCHOR, "alice").await, 50);
        assert_eq!(balance(&registry, ANCHOR, WRAPPER).await, 0);
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let (registry, exchange) = setup().await;

        let err = exchange.swap("alice", "AVTA", 0).await.unwrap_err();
        assert_eq!(err, ExchangeError::ZeroAmount);
        assert_eq!(balance(&registry, "AVTA", "alice").await, 0);
    }

    #[tokio::test]
    async fn test_unknown_asset_rejected() {
        let (_registry, exchange) = setup().await;

        let err = exchange.swap("alice", "NOPE", 10).await.unwrap_err();
        assert!(matches!(err, ExchangeError::AssetNotFound { .. }));
    }

    #[tokio::test]
    async fn test_payout_failure_compensates_deposit_leg() {
        let (event_tx, _) = broadcast::channel(64);
        let registry = Arc::new(AssetRegistry::new(event_tx.clone()));

        let anchor = Arc::new(TokenLedger::new(ANCHOR, "Token C", ANCHOR, 18));
        registry.register(anchor.clone());

        // Payout ledger that accepts nothing: the transfer leg always
        // reports the exchange account short
        let mut flaky = MockFungibleAsset::new();
        flaky.expect_id().return_const("FLKY".to_string());
        flaky.expect_transfer().returning(|_, _, _| {
            Err(ExchangeError::InsufficientBalance {
                asset: "FLKY".to_string(),
                account: WRAPPER.to_string(),
                have: 0,
                need: 20,
            })
        });
        registry.register(Arc::new(flaky));

        let exchange = ExchangeLedger::new(registry.clone(), ANCHOR, WRAPPER, event_tx).unwrap();

        anchor.mint("alice", 50).await.unwrap();
        anchor.approve("alice", WRAPPER, 100).await.unwrap();

        let err = exchange.unswap("alice", "FLKY", 20).await.unwrap_err();
        assert_eq!(
            err,
            ExchangeError::InsufficientReserve {
                asset: "FLKY".to_string(),
                have: 0,
                need: 20,
            }
        );

        // The anchor deposit was pulled and then fully reversed
        assert_eq!(anchor.balance_of("alice").await.unwrap(), 50);
        assert_eq!(anchor.balance_of(WRAPPER).await.unwrap(), 0);
        assert_eq!(anchor.allowance("alice", WRAPPER).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_reserves_view() {
        let (registry, exchange) = setup().await;
        let token_c = registry.get(ANCHOR).unwrap();

        token_c.mint(WRAPPER, 42).await.unwrap();
        assert_eq!(exchange.reserves(ANCHOR).await.unwrap(), 42);
        assert_eq!(exchange.reserves("AVTA").await.unwrap(), 0);
    }
}
