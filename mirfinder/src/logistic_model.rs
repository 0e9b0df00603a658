//! logistic_model.rs – precursor classifier (class-balanced L2 logistic regression)
//!
//! Features are z-scored with statistics stored in the model, so a saved model scores new
//! candidates exactly as it scored its training rows.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use linfa::prelude::*;
use linfa_logistic::LogisticRegression;
use log::{info, warn};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{MirnaError, Result};
use crate::helper_functions::require_columns;
use crate::structure::features::{feature_names, FeatureVector};

/// Default L2 strength.
pub const DEFAULT_L2: f64 = 1.0;

/// Fitted model plus the feature-column order it expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecursorClassifier {
    columns: Vec<String>,
    betas: Vec<f64>,
    intercept: f64,
    means: Vec<f64>,
    stds: Vec<f64>,
}

// ───────── helpers ─────────
fn column_stats(df: &DataFrame, columns: &[String]) -> PolarsResult<(Vec<f64>, Vec<f64>)> {
    let mut means = Vec::with_capacity(columns.len());
    let mut stds = Vec::with_capacity(columns.len());
    for name in columns {
        let col = df.column(name)?.cast(&DataType::Float64)?;
        let col = col.f64()?;
        let mean = col.mean().unwrap_or(0.0);
        let std = col.var(1).unwrap_or(0.0).sqrt().max(1e-9);
        info!("{:<20} μ = {:>10.4},  σ = {:>10.4}", name, mean, std);
        means.push(mean);
        stds.push(std);
    }
    Ok((means, stds))
}

/// Rows of `df` as a matrix in `columns` order; nulls read as 0.
fn to_matrix(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    require_columns(df, "feature table", &names)?;
    let mut x = Array2::<f64>::zeros((df.height(), columns.len()));
    for (j, name) in columns.iter().enumerate() {
        let col = df.column(name)?.cast(&DataType::Float64)?;
        for (i, v) in col.f64()?.into_iter().enumerate() {
            x[[i, j]] = v.unwrap_or(0.0);
        }
    }
    Ok(x)
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Feature columns of `df` in classifier order, cast to `Float64`.
fn select_features(df: &DataFrame, table: &str) -> Result<DataFrame> {
    let columns = feature_names();
    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    require_columns(df, table, &names)?;
    let mut out = df.select(names)?;
    for name in &columns {
        let cast = out.column(name)?.cast(&DataType::Float64)?;
        out.with_column(cast)?;
    }
    Ok(out)
}

/// Stack labelled feature tables into one frame and y (1 = precursor).
pub fn training_matrix(positives: &DataFrame, negatives: &DataFrame) -> Result<(DataFrame, Array1<u8>)> {
    if positives.height() == 0 || negatives.height() == 0 {
        return Err(MirnaError::Training(format!(
            "need both classes, got {} positives and {} negatives",
            positives.height(),
            negatives.height()
        )));
    }
    let pos = select_features(positives, "positives")?;
    let neg = select_features(negatives, "negatives")?;
    let data = pos.vstack(&neg)?;
    let y: Array1<u8> = std::iter::repeat(1u8)
        .take(positives.height())
        .chain(std::iter::repeat(0u8).take(negatives.height()))
        .collect();
    Ok((data, y))
}

fn balanced_weights(y: &Array1<u8>) -> Array1<f32> {
    let pos = y.iter().filter(|&&v| v == 1).count() as f32;
    let w_neg = if pos == 0.0 || pos == y.len() as f32 { 1.0 } else { pos / (y.len() as f32 - pos) };
    y.iter().map(|&lab| if lab == 1 { 1.0 } else { w_neg }).collect()
}

fn fit_standardized(x: Array2<f64>, y: Array1<u8>, l2: f64) -> Result<(Vec<f64>, f64)> {
    let weights = balanced_weights(&y);
    let ds = Dataset::new(x, y).with_weights(weights);
    let model = LogisticRegression::default()
        .max_iterations(200)
        .gradient_tolerance(1e-6)
        .alpha(l2)
        .fit(&ds)
        .map_err(|e| MirnaError::Training(format!("{e}")))?;
    Ok((model.params().to_vec(), model.intercept()))
}

// ───────── public API ─────────
impl PrecursorClassifier {
    /// Fit on feature tables of known precursors and decoys.
    pub fn train(positives: &DataFrame, negatives: &DataFrame, l2: f64) -> Result<Self> {
        info!(
            "=== Training precursor classifier on {} positives / {} negatives ===",
            positives.height(),
            negatives.height()
        );
        let (data, y) = training_matrix(positives, negatives)?;
        let columns = feature_names();
        let (means, stds) = column_stats(&data, &columns)?;

        let mut x = to_matrix(&data, &columns)?;
        for (j, mut col) in x.axis_iter_mut(Axis(1)).enumerate() {
            col.mapv_inplace(|v| (v - means[j]) / stds[j]);
        }

        let (betas, intercept) = fit_standardized(x, y, l2)?;
        info!("================================================");
        Ok(Self {
            columns,
            betas,
            intercept,
            means,
            stds,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Probability that a row of raw features (in [`columns`](Self::columns) order) is a precursor.
    pub fn score_row(&self, row: &[f64]) -> f64 {
        let lin: f64 = row
            .iter()
            .zip(&self.betas)
            .zip(self.means.iter().zip(&self.stds))
            .map(|((v, beta), (mean, std))| (v - mean) / std * beta)
            .sum();
        sigmoid(lin + self.intercept)
    }

    pub fn score(&self, features: &FeatureVector) -> f64 {
        self.score_row(&features.to_vec())
    }

    pub fn score_table(&self, df: &DataFrame) -> Result<Vec<f64>> {
        let x = to_matrix(df, &self.columns)?;
        Ok(x.rows().into_iter().map(|r| self.score_row(&r.to_vec())).collect())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved classifier to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let model: PrecursorClassifier = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if model.columns != feature_names() {
            return Err(MirnaError::Config(format!(
                "classifier in {} was trained on a different feature layout",
                path.display()
            )));
        }
        info!("Loaded classifier from {}", path.display());
        Ok(model)
    }
}

/// Area under the ROC curve, ties counted half.
pub fn auroc(scores: &[f64], labels: &[u8]) -> Option<f64> {
    let pos: Vec<f64> = scores.iter().zip(labels).filter(|(_, &l)| l == 1).map(|(&s, _)| s).collect();
    let neg: Vec<f64> = scores.iter().zip(labels).filter(|(_, &l)| l == 0).map(|(&s, _)| s).collect();
    if pos.is_empty() || neg.is_empty() {
        return None;
    }
    let mut wins = 0.0;
    for p in &pos {
        for n in &neg {
            wins += match p.total_cmp(n) {
                std::cmp::Ordering::Greater => 1.0,
                std::cmp::Ordering::Equal => 0.5,
                std::cmp::Ordering::Less => 0.0,
            };
        }
    }
    Some(wins / (pos.len() * neg.len()) as f64)
}

/// K-fold AUROC of the classifier on a labelled training set.
pub fn cross_validate(
    positives: &DataFrame,
    negatives: &DataFrame,
    n_folds: usize,
    seed: u64,
    l2: f64,
) -> Result<Vec<f64>> {
    if n_folds < 2 {
        return Err(MirnaError::Config("cross-validation needs at least 2 folds".into()));
    }
    let (data, y) = training_matrix(positives, negatives)?;

    let mut order: Vec<usize> = (0..data.height()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut aucs = Vec::with_capacity(n_folds);
    for f in 0..n_folds {
        let test_idx: Vec<usize> = order.iter().enumerate().filter(|(i, _)| i % n_folds == f).map(|(_, &r)| r).collect();
        let train_idx: Vec<usize> = order.iter().enumerate().filter(|(i, _)| i % n_folds != f).map(|(_, &r)| r).collect();

        let take = |idx: &[usize]| -> Result<(DataFrame, DataFrame)> {
            let rows = IdxCa::from_vec(PlSmallStr::from("idx"), idx.iter().map(|&i| i as IdxSize).collect());
            let part = data.take(&rows)?;
            let labels = y.select(Axis(0), idx);
            let pos_mask: BooleanChunked = labels.iter().map(|&l| l == 1).collect();
            let neg_mask: BooleanChunked = labels.iter().map(|&l| l == 0).collect();
            Ok((part.filter(&pos_mask)?, part.filter(&neg_mask)?))
        };

        let (train_pos, train_neg) = take(&train_idx)?;
        let (test_pos, test_neg) = take(&test_idx)?;
        let model = match PrecursorClassifier::train(&train_pos, &train_neg, l2) {
            Ok(m) => m,
            Err(e) => {
                warn!("fold {f}: skipped ({e})");
                continue;
            }
        };

        let mut scores = model.score_table(&test_pos)?;
        scores.extend(model.score_table(&test_neg)?);
        let labels: Vec<u8> = std::iter::repeat(1u8)
            .take(test_pos.height())
            .chain(std::iter::repeat(0u8).take(test_neg.height()))
            .collect();
        match auroc(&scores, &labels) {
            Some(auc) => {
                info!("fold {f}: AUROC {auc:.3}");
                aucs.push(auc);
            }
            None => warn!("fold {f}: single-class test split, no AUROC"),
        }
    }
    Ok(aucs)
}

type Factory = Box<dyn Fn() -> Result<PrecursorClassifier> + Send + Sync>;

/// Caller-owned handle to the classifier used for scoring.
///
/// The model is built at most once: the first `get` runs the factory under an init lock
/// and every later call, from any thread, receives the same `Arc`.
pub struct ClassifierProvider {
    factory: Factory,
    model: OnceLock<Arc<PrecursorClassifier>>,
    init: Mutex<()>,
}

impl ClassifierProvider {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<PrecursorClassifier> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            model: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// A provider that already holds `model`.
    pub fn with_model(model: PrecursorClassifier) -> Self {
        let provider = Self::new(|| Err(MirnaError::Config("classifier already supplied".into())));
        let _ = provider.model.set(Arc::new(model));
        provider
    }

    pub fn is_initialized(&self) -> bool {
        self.model.get().is_some()
    }

    pub fn get(&self) -> Result<Arc<PrecursorClassifier>> {
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }
        let _guard = self.init.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }
        info!("getting default classifier");
        let model = Arc::new((self.factory)()?);
        let _ = self.model.set(Arc::clone(&model));
        Ok(model)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::structure::features::{feature_table, N_FEATURES, N_TRIPLETS};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn toy_vector(hairpin: bool, jitter: usize) -> FeatureVector {
        let j = jitter as f64;
        let (stem, mfe, loops, mism) = if hairpin { (22 + jitter % 3, -0.45 - 0.01 * j, 1, 1) } else { (6 + jitter % 4, -0.12 - 0.01 * j, 3, 6) };
        FeatureVector {
            length: 70 + jitter,
            mfe,
            loops,
            loop_length: if hairpin { 12 } else { 5 },
            loop_gc: 0.4,
            stem_length: stem,
            longest_stem: stem / 2,
            bulges: 2,
            longest_bulge: 2,
            bulges_symmetric: 1,
            bulges_asymmetric: 1,
            stem_mismatches: mism,
            mature_mismatches: mism / 2,
            triplets: [jitter as u32 % 2; N_TRIPLETS],
            structure: String::new(),
            raw_mfe: mfe * 70.0,
        }
    }

    pub(crate) fn toy_tables() -> (DataFrame, DataFrame) {
        let pos: Vec<FeatureVector> = (0..12).map(|i| toy_vector(true, i)).collect();
        let neg: Vec<FeatureVector> = (0..12).map(|i| toy_vector(false, i)).collect();
        (feature_table(&pos).unwrap(), feature_table(&neg).unwrap())
    }

    #[test]
    fn separates_toy_classes() {
        let (pos, neg) = toy_tables();
        let model = PrecursorClassifier::train(&pos, &neg, DEFAULT_L2).unwrap();
        assert_eq!(model.columns().len(), N_FEATURES);
        let hi = model.score(&toy_vector(true, 5));
        let lo = model.score(&toy_vector(false, 5));
        assert!(hi > 0.5 && lo < 0.5, "hi={hi} lo={lo}");
        let table = model.score_table(&pos).unwrap();
        assert!(table.iter().all(|&s| (0.0..=1.0).contains(&s)));
    }

    #[test]
    fn training_needs_both_classes() {
        let (pos, _) = toy_tables();
        let empty = pos.head(Some(0));
        assert!(matches!(
            PrecursorClassifier::train(&pos, &empty, DEFAULT_L2),
            Err(MirnaError::Training(_))
        ));
    }

    #[test]
    fn saved_models_score_identically() {
        let (pos, neg) = toy_tables();
        let model = PrecursorClassifier::train(&pos, &neg, DEFAULT_L2).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        model.save(file.path()).unwrap();
        let loaded = PrecursorClassifier::load(file.path()).unwrap();
        let v = toy_vector(true, 3);
        assert_eq!(model.score(&v), loaded.score(&v));
    }

    #[test]
    fn auroc_of_perfect_and_tied_rankings() {
        assert_eq!(auroc(&[0.9, 0.8, 0.1], &[1, 1, 0]), Some(1.0));
        assert_eq!(auroc(&[0.5, 0.5], &[1, 0]), Some(0.5));
        assert_eq!(auroc(&[0.5], &[1]), None);
    }

    #[test]
    fn cross_validation_reports_per_fold_auroc() {
        let (pos, neg) = toy_tables();
        let aucs = cross_validate(&pos, &neg, 3, 42, DEFAULT_L2).unwrap();
        assert!(!aucs.is_empty());
        assert!(aucs.iter().all(|a| (0.0..=1.0).contains(a)));
    }

    #[test]
    fn provider_builds_once_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = Arc::new(ClassifierProvider::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let (pos, neg) = toy_tables();
            PrecursorClassifier::train(&pos, &neg, DEFAULT_L2)
        }));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&provider);
                std::thread::spawn(move || p.get().unwrap())
            })
            .collect();
        let models: Vec<Arc<PrecursorClassifier>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(provider.is_initialized());
    }

    #[test]
    fn failed_factory_surfaces_configuration_error() {
        let provider = ClassifierProvider::new(|| Err(MirnaError::Config("no training data".into())));
        assert!(matches!(provider.get(), Err(MirnaError::Config(_))));
        assert!(!provider.is_initialized());
    }
}
