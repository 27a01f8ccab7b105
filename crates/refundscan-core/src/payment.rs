//! Platform records the extractor reads, and the report rows it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A payment as returned by the platform's payments query.
///
/// Only the fields the extractor inspects are modelled; everything else in
/// the platform payload is ignored during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub last_modified_at: DateTime<Utc>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// A sub-transaction recorded on a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub state: TransactionState,
    /// ISO 8601 timestamp string, kept verbatim for the report.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Transaction {
    /// Parsed timestamp. `None` when absent or not valid RFC 3339.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Authorization,
    CancelAuthorization,
    Charge,
    Refund,
    Chargeback,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Initial,
    Pending,
    Success,
    Failure,
    #[serde(other)]
    Other,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "Initial",
            Self::Pending => "Pending",
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::Other => "",
        }
    }
}

/// The order that references a payment, resolved by the secondary lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub id: String,
    #[serde(default)]
    pub order_number: Option<String>,
}

/// One line of the refund report.
///
/// Order fields are empty strings when no order references the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub payment_id: String,
    pub transaction_id: String,
    pub transaction_timestamp: String,
    pub transaction_state: String,
    pub order_id: String,
    pub order_number: String,
}

impl ReportRow {
    /// Column names, in report order.
    pub const HEADER: [&'static str; 6] = [
        "paymentId",
        "transactionId",
        "transactionTimestamp",
        "transactionState",
        "orderId",
        "orderNumber",
    ];

    pub fn new(payment: &Payment, refund: &Transaction, order: Option<&OrderRef>) -> Self {
        Self {
            payment_id: payment.id.clone(),
            transaction_id: refund.id.clone(),
            transaction_timestamp: refund.timestamp.clone().unwrap_or_default(),
            transaction_state: refund.state.as_str().to_string(),
            order_id: order.map(|o| o.id.clone()).unwrap_or_default(),
            order_number: order
                .and_then(|o| o.order_number.clone())
                .unwrap_or_default(),
        }
    }

    /// Field values in [`HEADER`](Self::HEADER) order.
    pub fn fields(&self) -> [&str; 6] {
        [
            &self.payment_id,
            &self.transaction_id,
            &self.transaction_timestamp,
            &self.transaction_state,
            &self.order_id,
            &self.order_number,
        ]
    }
}
