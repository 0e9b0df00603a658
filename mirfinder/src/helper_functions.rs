use std::env;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::error::{MirnaError, Result};

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

/// Resolve `path` against the project root unless it is already absolute.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root().join(path)
    }
}

pub fn read_csv(file_path: &Path) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()
}

/// Fail with a typed error unless every column is present.
pub fn require_columns(df: &DataFrame, table: &str, columns: &[&str]) -> Result<()> {
    let names = df.get_column_names();
    for &col in columns {
        if !names.iter().any(|c| c.as_str() == col) {
            return Err(MirnaError::missing_column(table, col));
        }
    }
    Ok(())
}

pub fn has_column(df: &DataFrame, column: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == column)
}

/// Upper-case a nucleotide string and read `U` as `T`.
pub fn normalize_nt(seq: &str) -> String {
    seq.trim()
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            'U' => 'T',
            other => other,
        })
        .collect()
}

/// 0-based offset of the first occurrence of `sub` in `seq`.
pub fn find_subseq(seq: &str, sub: &str) -> Option<usize> {
    if sub.is_empty() {
        return None;
    }
    seq.find(sub)
}

/// G+C fraction of a sequence, 0 for an empty one.
pub fn gc_fraction(seq: &str) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    let gc = seq
        .bytes()
        .filter(|b| matches!(b.to_ascii_uppercase(), b'G' | b'C' | b'S'))
        .count();
    gc as f64 / seq.len() as f64
}

pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
