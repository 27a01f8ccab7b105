//! Refund selection on a single payment.

use crate::payment::{Payment, Transaction, TransactionState, TransactionType};
use crate::window::ExtractionWindow;

/// Whether `tx` is a pending or failed refund stamped inside `window`.
pub fn is_open_refund(tx: &Transaction, window: &ExtractionWindow) -> bool {
    tx.kind == TransactionType::Refund
        && matches!(
            tx.state,
            TransactionState::Initial | TransactionState::Failure
        )
        && tx.timestamp_utc().is_some_and(|ts| window.covers(ts))
}

/// First qualifying refund on `payment`, in transaction order.
///
/// Later qualifying refunds on the same payment are ignored, so a payment
/// contributes at most one report row.
pub fn find_refund<'a>(payment: &'a Payment, window: &ExtractionWindow) -> Option<&'a Transaction> {
    payment
        .transactions
        .iter()
        .find(|tx| is_open_refund(tx, window))
}
