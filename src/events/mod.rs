//! Exchange event types
//!
//! Every completed or rejected operation is broadcast as an event so the
//! log pipeline and metrics observe the same stream the API reports on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// Which direction an exchange operation moves value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Caller gives an asset, receives the anchor
    Swap,
    /// Caller gives the anchor, receives an asset
    Unswap,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Swap => "swap",
            Direction::Unswap => "unswap",
        }
    }
}

/// Events emitted by the exchange and the asset registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExchangeEvent {
    /// An asset ledger became available
    AssetRegistered { asset: String },

    /// A swap completed: `amount` of `asset` in, `amount` of anchor out
    SwapExecuted {
        op_id: Uuid,
        caller: String,
        asset: String,
        amount: u128,
        timestamp: DateTime<Utc>,
    },

    /// An unswap completed: `amount` of anchor in, `amount` of `asset` out
    UnswapExecuted {
        op_id: Uuid,
        caller: String,
        asset: String,
        amount: u128,
        timestamp: DateTime<Utc>,
    },

    /// An operation was rejected with no balance changes
    OperationRejected {
        direction: Direction,
        caller: String,
        asset: String,
        amount: u128,
        reason: String,
    },
}

impl ExchangeEvent {
    /// Get event name for metrics and logs
    pub fn name(&self) -> &'static str {
        match self {
            ExchangeEvent::AssetRegistered { .. } => "asset_registered",
            ExchangeEvent::SwapExecuted { .. } => "swap_executed",
            ExchangeEvent::UnswapExecuted { .. } => "unswap_executed",
            ExchangeEvent::OperationRejected { .. } => "operation_rejected",
        }
    }
}

/// Consume the event stream and write it to the log
pub async fn run_logger(mut event_rx: broadcast::Receiver<ExchangeEvent>) {
    loop {
        match event_rx.recv().await {
            Ok(event) => match &event {
                ExchangeEvent::OperationRejected {
                    direction,
                    caller,
                    asset,
                    amount,
                    reason,
                } => {
                    warn!(
                        direction = direction.as_str(),
                        %caller, %asset, amount, reason, "operation rejected"
                    );
                }
                _ => {
                    info!(event = event.name(), payload = ?event, "exchange event");
                }
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Event logger lagged, {} events dropped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
