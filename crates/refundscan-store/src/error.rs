use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("csv error")]
    Csv(#[from] csv::Error),

    #[error("failed to replace {}", path.display())]
    Persist {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
