//! Core of the refund extractor: platform record types, day windows, refund
//! matching, request pacing and the extraction engine.

mod error;
pub mod extract;
pub mod matcher;
pub mod pacing;
pub mod payment;
pub mod service;
pub mod window;

pub use error::ExtractError;
pub use extract::{Extractor, PAGE_LIMIT, RunOutcome, RunSummary, WindowResult};
pub use matcher::find_refund;
pub use pacing::{FixedDelayPacer, PaceEvent, Pacer};
pub use payment::{OrderRef, Payment, ReportRow, Transaction, TransactionState, TransactionType};
pub use service::{PaymentQuery, QueryService, ReportSink};
pub use window::{DayWindows, ExtractionWindow, day_windows};
