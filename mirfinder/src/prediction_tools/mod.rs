pub mod rnafold;

use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::error::{MirnaError, Result};
use crate::helper_functions::{normalize_nt, read_csv, require_columns};

pub use rnafold::{Fold, RnaFold, StructurePredictor};

/// Folds looked up from a table instead of computed, e.g. a cached RNAfold run.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedFolds {
    folds: HashMap<String, Fold>,
}

impl PrecomputedFolds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, seq: &str, structure: &str, mfe: f64) {
        self.folds.insert(
            normalize_nt(seq),
            Fold {
                structure: structure.to_string(),
                mfe,
            },
        );
    }

    /// Table with `sequence`, `structure` and `mfe` columns.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let df = read_csv(path)?;
        require_columns(&df, "fold table", &["sequence", "structure", "mfe"])?;
        let seqs = df.column("sequence")?.str()?.clone();
        let structs = df.column("structure")?.str()?.clone();
        let mfes = df.column("mfe")?.cast(&DataType::Float64)?;
        let mfes = mfes.f64()?;

        let mut folds = Self::new();
        for i in 0..df.height() {
            if let (Some(seq), Some(st), Some(mfe)) = (seqs.get(i), structs.get(i), mfes.get(i)) {
                folds.insert(seq, st, mfe);
            }
        }
        info!("Loaded {} precomputed folds from {}", folds.folds.len(), path.display());
        Ok(folds)
    }

    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }
}

impl StructurePredictor for PrecomputedFolds {
    fn fold(&self, seq: &str) -> Result<Fold> {
        self.folds
            .get(&normalize_nt(seq))
            .cloned()
            .ok_or_else(|| MirnaError::Fold(format!("no precomputed fold for {seq}")))
    }
}
