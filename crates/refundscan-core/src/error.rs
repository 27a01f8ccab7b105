use chrono::{DateTime, Utc};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("remote query failed")]
    RemoteQuery(#[source] BoxError),

    #[error("failed to render report")]
    Render(#[source] BoxError),

    /// A full page ended on the cursor it was requested with, so the next
    /// request would return the same page again.
    #[error("cursor stalled at {cursor}: {limit} payments share one lastModifiedAt in day {day}")]
    CursorStalled {
        day: String,
        cursor: DateTime<Utc>,
        limit: u32,
    },
}

impl ExtractError {
    pub(crate) fn remote<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::RemoteQuery(Box::new(err))
    }

    pub(crate) fn render<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Render(Box::new(err))
    }
}
