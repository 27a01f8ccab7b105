//! Extraction engine: walks day windows, pages through payments with a
//! `lastModifiedAt` cursor, collects open refunds and checkpoints the report
//! after every day.
//!
//! The run is strictly sequential. At most one remote call or pacing pause is
//! outstanding at a time, days are processed in chronological order and pages
//! in cursor order.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::ExtractError;
use crate::matcher::find_refund;
use crate::pacing::{PaceEvent, Pacer};
use crate::payment::{Payment, ReportRow};
use crate::service::{PaymentQuery, QueryService, ReportSink};
use crate::window::{ExtractionWindow, day_windows};

/// Payments requested per page. A page of exactly this size means more may follow.
pub const PAGE_LIMIT: u32 = 100;

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub windows: usize,
    pub pages: usize,
    pub payments_inspected: usize,
    pub rows: usize,
}

/// Rows found in one day window, with the work it took.
#[derive(Debug, Default)]
pub struct WindowResult {
    pub rows: Vec<ReportRow>,
    pub pages: usize,
    pub payments_inspected: usize,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub rows: Vec<ReportRow>,
}

/// Drives one extraction run against a query service.
pub struct Extractor<S, P, K> {
    service: S,
    pacer: P,
    sink: K,
}

impl<S, P, K> Extractor<S, P, K>
where
    S: QueryService,
    P: Pacer,
    K: ReportSink,
{
    pub fn new(service: S, pacer: P, sink: K) -> Self {
        Self {
            service,
            pacer,
            sink,
        }
    }

    #[cfg(test)]
    fn service(&self) -> &S {
        &self.service
    }

    #[cfg(test)]
    fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Extract refunds for every day in `[start, end)`.
    ///
    /// The sink receives the full accumulated row set after each day. Any
    /// error aborts the run; the last persisted checkpoint is left untouched.
    pub async fn run(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RunOutcome, ExtractError> {
        let mut rows: Vec<ReportRow> = Vec::new();
        let mut summary = RunSummary::default();

        for window in day_windows(start, end) {
            let day = self.process_window(&window).await?;
            summary.windows += 1;
            summary.pages += day.pages;
            summary.payments_inspected += day.payments_inspected;
            rows.extend(day.rows);

            self.sink.persist(&rows).map_err(ExtractError::render)?;
            info!(day = %window.label(), rows = rows.len(), "checkpoint saved");

            if window.end < end {
                self.pacer.pause(PaceEvent::NextDay).await;
            }
        }

        summary.rows = rows.len();
        info!(
            days = summary.windows,
            total = summary.rows,
            "all days processed"
        );
        Ok(RunOutcome { summary, rows })
    }

    /// Page through every payment modified inside `window` and collect its refunds.
    ///
    /// The cursor starts at the window start and moves to the `lastModifiedAt`
    /// of the last payment on each page. Because the bound is inclusive, a
    /// payment on a page boundary is fetched again on the next page and can
    /// yield a duplicate row; no deduplication is done.
    pub async fn process_window(
        &self,
        window: &ExtractionWindow,
    ) -> Result<WindowResult, ExtractError> {
        info!(day = %window.label(), start = %window.start, end = %window.end, "processing day");

        let mut result = WindowResult::default();
        let mut cursor = window.start;

        loop {
            if result.pages > 0 {
                self.pacer.pause(PaceEvent::NextPage).await;
            }

            let query = PaymentQuery {
                since: cursor,
                until: window.end,
                limit: PAGE_LIMIT,
                ascending: true,
            };
            info!(cursor = %cursor, "fetching payments modified after cursor");
            let page = self
                .service
                .query_payments(&query)
                .await
                .map_err(ExtractError::remote)?;
            result.pages += 1;
            info!(count = page.len(), "retrieved payments");

            let Some(last_modified) = page.last().map(|p| p.last_modified_at) else {
                break;
            };

            for (i, payment) in page.iter().enumerate() {
                debug!(
                    n = i + 1,
                    of = page.len(),
                    payment_id = %payment.id,
                    "checking payment"
                );
                result.payments_inspected += 1;
                if let Some(row) = self.match_payment(payment, window).await? {
                    result.rows.push(row);
                }
            }

            let full = page.len() >= PAGE_LIMIT as usize;
            if full && last_modified <= cursor {
                return Err(ExtractError::CursorStalled {
                    day: window.label(),
                    cursor,
                    limit: PAGE_LIMIT,
                });
            }
            cursor = cursor.max(last_modified);

            if !full {
                break;
            }
        }

        Ok(result)
    }

    /// Build a report row for `payment` if it carries an open refund in `window`.
    ///
    /// A match costs one pacing pause and exactly one order lookup. The row is
    /// produced whether or not an order is found.
    pub async fn match_payment(
        &self,
        payment: &Payment,
        window: &ExtractionWindow,
    ) -> Result<Option<ReportRow>, ExtractError> {
        let Some(refund) = find_refund(payment, window) else {
            return Ok(None);
        };
        warn!(
            payment_id = %payment.id,
            transaction_id = %refund.id,
            state = refund.state.as_str(),
            "found refund transaction"
        );

        self.pacer.pause(PaceEvent::OrderLookup).await;

        let orders = self
            .service
            .query_orders_by_payment(&payment.id)
            .await
            .map_err(ExtractError::remote)?;
        let order = orders.first();
        match order {
            Some(o) => info!(
                order_id = %o.id,
                order_number = o.order_number.as_deref().unwrap_or(""),
                "matched to order"
            ),
            None => info!(payment_id = %payment.id, "no order found for this payment"),
        }

        Ok(Some(ReportRow::new(payment, refund, order)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{OrderRef, Transaction, TransactionState, TransactionType};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("fake service failure")]
    struct FakeError;

    /// In-memory platform: filters, sorts and truncates like the real query.
    #[derive(Default)]
    struct FakeService {
        payments: Vec<Payment>,
        orders: HashMap<String, Vec<OrderRef>>,
        payment_queries: Mutex<Vec<PaymentQuery>>,
        order_queries: Mutex<Vec<String>>,
        fail_payment_query: Option<usize>,
    }

    impl FakeService {
        fn with_payments(payments: Vec<Payment>) -> Self {
            Self {
                payments,
                ..Default::default()
            }
        }

        fn with_order(mut self, payment_id: &str, id: &str, number: &str) -> Self {
            self.orders
                .entry(payment_id.to_string())
                .or_default()
                .push(OrderRef {
                    id: id.into(),
                    order_number: Some(number.into()),
                });
            self
        }

        fn payment_queries(&self) -> Vec<PaymentQuery> {
            self.payment_queries.lock().unwrap().clone()
        }

        fn order_queries(&self) -> Vec<String> {
            self.order_queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryService for FakeService {
        type Error = FakeError;

        async fn query_payments(&self, query: &PaymentQuery) -> Result<Vec<Payment>, FakeError> {
            let mut calls = self.payment_queries.lock().unwrap();
            if self.fail_payment_query == Some(calls.len()) {
                return Err(FakeError);
            }
            calls.push(query.clone());

            let mut page: Vec<Payment> = self
                .payments
                .iter()
                .filter(|p| p.last_modified_at >= query.since && p.last_modified_at <= query.until)
                .cloned()
                .collect();
            page.sort_by_key(|p| p.last_modified_at);
            page.truncate(query.limit as usize);
            Ok(page)
        }

        async fn query_orders_by_payment(
            &self,
            payment_id: &str,
        ) -> Result<Vec<OrderRef>, FakeError> {
            self.order_queries.lock().unwrap().push(payment_id.to_string());
            Ok(self.orders.get(payment_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingPacer {
        events: Mutex<Vec<PaceEvent>>,
    }

    impl RecordingPacer {
        fn events(&self) -> Vec<PaceEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Pacer for RecordingPacer {
        async fn pause(&self, event: PaceEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[derive(Default)]
    struct MemorySink {
        snapshots: Mutex<Vec<Vec<ReportRow>>>,
        fail_after: Option<usize>,
    }

    impl MemorySink {
        fn snapshots(&self) -> Vec<Vec<ReportRow>> {
            self.snapshots.lock().unwrap().clone()
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct SinkError;

    impl ReportSink for MemorySink {
        type Error = SinkError;

        fn persist(&self, rows: &[ReportRow]) -> Result<(), SinkError> {
            let mut snapshots = self.snapshots.lock().unwrap();
            if self.fail_after == Some(snapshots.len()) {
                return Err(SinkError);
            }
            snapshots.push(rows.to_vec());
            Ok(())
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn day(start: &str) -> ExtractionWindow {
        let start = ts(start);
        ExtractionWindow::new(start, start + Duration::days(1)).unwrap()
    }

    fn plain_payment(id: &str, modified: DateTime<Utc>) -> Payment {
        Payment {
            id: id.into(),
            last_modified_at: modified,
            transactions: vec![Transaction {
                id: format!("{id}-charge"),
                kind: TransactionType::Charge,
                state: TransactionState::Success,
                timestamp: Some(modified.to_rfc3339()),
            }],
        }
    }

    fn refund_payment(
        id: &str,
        modified: &str,
        refund_at: &str,
        state: TransactionState,
    ) -> Payment {
        Payment {
            id: id.into(),
            last_modified_at: ts(modified),
            transactions: vec![Transaction {
                id: format!("{id}-refund"),
                kind: TransactionType::Refund,
                state,
                timestamp: Some(refund_at.into()),
            }],
        }
    }

    /// `n` payments one second apart starting at `start`.
    fn spread(n: usize, start: &str) -> Vec<Payment> {
        let start = ts(start);
        (0..n)
            .map(|i| plain_payment(&format!("p{i:04}"), start + Duration::seconds(i as i64)))
            .collect()
    }

    fn extractor(service: FakeService) -> Extractor<FakeService, RecordingPacer, MemorySink> {
        Extractor::new(service, RecordingPacer::default(), MemorySink::default())
    }

    #[tokio::test]
    async fn refund_with_matching_order() {
        let service = FakeService::with_payments(vec![refund_payment(
            "pay-1",
            "2025-05-22T10:01:00Z",
            "2025-05-22T10:00:00Z",
            TransactionState::Initial,
        )])
        .with_order("pay-1", "o1", "1001");
        let ex = extractor(service);

        let result = ex.process_window(&day("2025-05-22T00:00:00Z")).await.unwrap();

        assert_eq!(result.rows.len(), 1);
        assert_eq!(
            result.rows[0].fields(),
            ["pay-1", "pay-1-refund", "2025-05-22T10:00:00Z", "Initial", "o1", "1001"]
        );
        assert_eq!(ex.service().order_queries(), vec!["pay-1".to_string()]);
        assert_eq!(ex.pacer().events(), vec![PaceEvent::OrderLookup]);
    }

    #[tokio::test]
    async fn refund_without_order_still_reported() {
        let service = FakeService::with_payments(vec![refund_payment(
            "pay-1",
            "2025-05-22T10:01:00Z",
            "2025-05-22T10:00:00Z",
            TransactionState::Initial,
        )]);
        let ex = extractor(service);

        let result = ex.process_window(&day("2025-05-22T00:00:00Z")).await.unwrap();

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].order_id, "");
        assert_eq!(result.rows[0].order_number, "");
    }

    #[tokio::test]
    async fn successful_refund_produces_no_row_and_no_lookup() {
        let service = FakeService::with_payments(vec![refund_payment(
            "pay-1",
            "2025-05-22T10:01:00Z",
            "2025-05-22T10:00:00Z",
            TransactionState::Success,
        )])
        .with_order("pay-1", "o1", "1001");
        let ex = extractor(service);

        let result = ex.process_window(&day("2025-05-22T00:00:00Z")).await.unwrap();

        assert!(result.rows.is_empty());
        assert_eq!(result.payments_inspected, 1);
        assert!(ex.service().order_queries().is_empty());
        assert!(ex.pacer().events().is_empty());
    }

    #[tokio::test]
    async fn first_order_is_used_when_several_match() {
        let service = FakeService::with_payments(vec![refund_payment(
            "pay-1",
            "2025-05-22T10:01:00Z",
            "2025-05-22T10:00:00Z",
            TransactionState::Failure,
        )])
        .with_order("pay-1", "o1", "1001")
        .with_order("pay-1", "o2", "1002");
        let ex = extractor(service);

        let result = ex.process_window(&day("2025-05-22T00:00:00Z")).await.unwrap();

        assert_eq!(result.rows[0].order_id, "o1");
        assert_eq!(ex.service().order_queries().len(), 1);
    }

    #[tokio::test]
    async fn empty_window_makes_one_request() {
        let ex = extractor(FakeService::default());

        let result = ex.process_window(&day("2025-05-22T00:00:00Z")).await.unwrap();

        assert_eq!(result.pages, 1);
        assert!(result.rows.is_empty());
        assert!(ex.pacer().events().is_empty());
    }

    #[tokio::test]
    async fn two_full_pages_then_short_page_is_three_requests() {
        // Boundary payments are re-fetched: 100 + 99 + 1 covers all 200.
        let ex = extractor(FakeService::with_payments(spread(200, "2025-05-22T01:00:00Z")));

        let result = ex.process_window(&day("2025-05-22T00:00:00Z")).await.unwrap();

        assert_eq!(result.pages, 3);
        assert_eq!(ex.service().payment_queries().len(), 3);
        assert_eq!(result.payments_inspected, 100 + 100 + 2);
        assert_eq!(
            ex.pacer().events(),
            vec![PaceEvent::NextPage, PaceEvent::NextPage]
        );
    }

    #[tokio::test]
    async fn exactly_full_page_needs_a_confirming_request() {
        let ex = extractor(FakeService::with_payments(spread(100, "2025-05-22T01:00:00Z")));

        let result = ex.process_window(&day("2025-05-22T00:00:00Z")).await.unwrap();

        // Second page holds only the boundary payment again.
        assert_eq!(result.pages, 2);
        assert_eq!(result.payments_inspected, 101);
    }

    #[tokio::test]
    async fn cursor_advances_to_last_modified_of_page() {
        let ex = extractor(FakeService::with_payments(spread(150, "2025-05-22T01:00:00Z")));
        let window = day("2025-05-22T00:00:00Z");

        ex.process_window(&window).await.unwrap();

        let queries = ex.service().payment_queries();
        assert_eq!(queries[0].since, window.start);
        assert_eq!(queries[1].since, ts("2025-05-22T01:00:00Z") + Duration::seconds(99));
        for q in &queries {
            assert_eq!(q.until, window.end);
            assert_eq!(q.limit, PAGE_LIMIT);
            assert!(q.ascending);
        }
    }

    #[tokio::test]
    async fn refund_on_page_boundary_is_reported_twice() {
        let mut payments = spread(99, "2025-05-22T01:00:00Z");
        payments.push(refund_payment(
            "boundary",
            "2025-05-22T05:00:00Z",
            "2025-05-22T04:59:00Z",
            TransactionState::Initial,
        ));
        payments.push(plain_payment("after", ts("2025-05-22T06:00:00Z")));
        let ex = extractor(FakeService::with_payments(payments));

        let result = ex.process_window(&day("2025-05-22T00:00:00Z")).await.unwrap();

        assert_eq!(result.pages, 2);
        let ids: Vec<_> = result.rows.iter().map(|r| r.payment_id.as_str()).collect();
        assert_eq!(ids, vec!["boundary", "boundary"]);
    }

    #[tokio::test]
    async fn full_page_with_single_timestamp_is_reported_as_stalled() {
        let at = ts("2025-05-22T03:00:00Z");
        let payments = (0..100)
            .map(|i| plain_payment(&format!("p{i}"), at))
            .collect();
        let ex = extractor(FakeService::with_payments(payments));

        // First page advances the cursor to `at`, the second page cannot move it.
        let err = ex
            .process_window(&day("2025-05-22T00:00:00Z"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::CursorStalled { cursor, .. } if cursor == at));
        assert_eq!(ex.service().payment_queries().len(), 2);
    }

    #[tokio::test]
    async fn run_checkpoints_after_every_day() {
        let service = FakeService::with_payments(vec![
            refund_payment(
                "d1",
                "2025-05-22T10:01:00Z",
                "2025-05-22T10:00:00Z",
                TransactionState::Initial,
            ),
            refund_payment(
                "d3",
                "2025-05-24T08:01:00Z",
                "2025-05-24T08:00:00Z",
                TransactionState::Failure,
            ),
        ]);
        let ex = extractor(service);

        let outcome = ex
            .run(ts("2025-05-22T00:00:00Z"), ts("2025-05-25T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(outcome.summary.windows, 3);
        assert_eq!(outcome.summary.rows, 2);
        assert_eq!(outcome.summary.pages, 3);

        let snapshots = ex.sink().snapshots();
        let sizes: Vec<_> = snapshots.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 1, 2]);
        // Every checkpoint is a prefix of the final report.
        for snap in &snapshots {
            assert_eq!(snap.as_slice(), &outcome.rows[..snap.len()]);
        }

        assert_eq!(
            ex.pacer().events(),
            vec![
                PaceEvent::OrderLookup,
                PaceEvent::NextDay,
                PaceEvent::NextDay,
                PaceEvent::OrderLookup,
            ]
        );
    }

    #[tokio::test]
    async fn inverted_range_does_nothing() {
        let ex = extractor(FakeService::default());

        let outcome = ex
            .run(ts("2025-05-23T00:00:00Z"), ts("2025-05-22T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(outcome.summary, RunSummary::default());
        assert!(ex.service().payment_queries().is_empty());
        assert!(ex.sink().snapshots().is_empty());
    }

    #[tokio::test]
    async fn query_failure_aborts_and_keeps_last_checkpoint() {
        let mut service = FakeService::with_payments(vec![refund_payment(
            "d1",
            "2025-05-22T10:01:00Z",
            "2025-05-22T10:00:00Z",
            TransactionState::Initial,
        )]);
        // Day one takes a single request; day two's request fails.
        service.fail_payment_query = Some(1);
        let ex = extractor(service);

        let err = ex
            .run(ts("2025-05-22T00:00:00Z"), ts("2025-05-24T00:00:00Z"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::RemoteQuery(_)));
        assert_eq!(err.to_string(), "remote query failed");
        let snapshots = ex.sink().snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0][0].payment_id, "d1");
    }

    #[tokio::test]
    async fn sink_failure_is_a_render_error() {
        let sink = MemorySink {
            fail_after: Some(0),
            ..Default::default()
        };
        let ex = Extractor::new(FakeService::default(), RecordingPacer::default(), sink);

        let err = ex
            .run(ts("2025-05-22T00:00:00Z"), ts("2025-05-23T00:00:00Z"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Render(_)));
        assert_eq!(err.to_string(), "failed to render report");
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "disk full");
    }
}
