//! Report storage: quoted-CSV rendering and atomic checkpoint files.

mod error;
pub use error::StoreError;

mod report;
pub use report::{CsvReport, render_csv};
