//! CSV refund report.
//!
//! Every checkpoint renders the complete row set and replaces the report file
//! in one rename, so readers only ever see a whole snapshot.

use std::io::Write;
use std::path::{Path, PathBuf};

use refundscan_core::{ReportRow, ReportSink};
use tempfile::NamedTempFile;
use tracing::info;

use crate::StoreError;

/// Render `rows` as CSV with a header line.
///
/// The header is written bare; every data field is double-quoted and embedded
/// quotes are doubled. Output is a pure function of the rows.
pub fn render_csv(rows: &[ReportRow]) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    write_csv(rows, &mut buf)?;
    Ok(buf)
}

fn write_csv(rows: &[ReportRow], mut writer: impl Write) -> Result<(), StoreError> {
    writer.write_all(ReportRow::HEADER.join(",").as_bytes())?;
    writer.write_all(b"\n")?;

    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    for row in rows {
        csv.write_record(row.fields())?;
    }
    csv.flush()?;
    Ok(())
}

/// Report file at a fixed path, overwritten on every checkpoint.
#[derive(Debug, Clone)]
pub struct CsvReport {
    path: PathBuf,
}

impl CsvReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `rows` to a temp file beside the report, then rename it into place.
    pub fn write(&self, rows: &[ReportRow]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        write_csv(rows, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;

        info!(path = %self.path.display(), rows = rows.len(), "report saved");
        Ok(())
    }
}

impl ReportSink for CsvReport {
    type Error = StoreError;

    fn persist(&self, rows: &[ReportRow]) -> Result<(), StoreError> {
        self.write(rows)
    }
}
