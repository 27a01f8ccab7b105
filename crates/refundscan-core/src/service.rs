//! Collaborator seams of the extractor: the remote query service it reads
//! from and the sink it checkpoints the report into.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::payment::{OrderRef, Payment, ReportRow};

/// One payments page request.
///
/// Selects payments with `since <= lastModifiedAt <= until`, at most `limit`
/// of them, sorted by `lastModifiedAt` (ascending when `ascending` is set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentQuery {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub limit: u32,
    pub ascending: bool,
}

/// Read access to the commerce platform.
///
/// The extractor relies on the ascending sort being honoured; cursor
/// advancement assumes `lastModifiedAt` orders the results.
#[async_trait]
pub trait QueryService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn query_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, Self::Error>;

    /// Orders whose payment info references `payment_id`.
    async fn query_orders_by_payment(&self, payment_id: &str)
    -> Result<Vec<OrderRef>, Self::Error>;
}

/// Destination for report checkpoints.
///
/// Each call receives the complete row set accumulated so far and replaces
/// whatever the previous call stored.
pub trait ReportSink: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn persist(&self, rows: &[ReportRow]) -> Result<(), Self::Error>;
}
