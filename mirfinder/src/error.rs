use polars::error::PolarsError;
use thiserror::Error;

/// Errors surfaced to the caller of the discovery engine.
///
/// Per-locus problems (unresolvable windows, rejected candidates, folds without a
/// hairpin) never show up here; they are logged and counted in the run summary.
#[derive(Debug, Error)]
pub enum MirnaError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no aligned reads left after filtering")]
    NoReads,

    #[error("missing column `{column}` in {table}")]
    MissingColumn { table: String, column: String },

    #[error("structure prediction failed: {0}")]
    Fold(String),

    #[error("classifier training failed: {0}")]
    Training(String),

    #[error("table error: {0}")]
    Table(#[from] PolarsError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MirnaError>;

impl MirnaError {
    pub(crate) fn missing_column(table: &str, column: &str) -> Self {
        MirnaError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}
