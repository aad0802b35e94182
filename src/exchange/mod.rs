//! Exchange module - the anchor-reserve wrapper ledger
//!
//! The exchange:
//! 1. Accepts any registered asset and pays out the anchor asset 1:1 (`swap`)
//! 2. Accepts the anchor asset and pays out any registered asset 1:1 (`unswap`)
//! 3. Serializes operations and compensates the deposit leg when the
//!    payout leg cannot be completed

pub mod ledger;

pub use ledger::{ExchangeLedger, SwapReceipt};
