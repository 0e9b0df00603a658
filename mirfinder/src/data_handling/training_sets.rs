//! Labelled feature tables for the precursor classifier.
//!
//! Positives come from known precursors with their annotated mature. Negatives are decoy
//! hairpins cut from coding sequence.

use std::collections::HashSet;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bio::io::fasta;
use polars::prelude::*;
use rand::distributions::Distribution;
use rand::{rngs::StdRng, Rng, SeedableRng};
use statrs::distribution::Gamma;
use tracing::{debug, error, info};

use crate::config::DiscoveryConfig;
use crate::error::{MirnaError, Result};
use crate::helper_functions::{has_column, read_csv, require_columns, resolve_path};
use crate::logistic_model::{ClassifierProvider, PrecursorClassifier, DEFAULT_L2};
use crate::models::Dataset;
use crate::prediction_tools::StructurePredictor;
use crate::structure::features::{feature_names, feature_table, FeatureVector, StructureFeatureExtractor};

/// Shortest coding sequence or chunk worth folding.
const MIN_DECOY_LEN: usize = 50;
const PSEUDO_MATURE_LEN: usize = 22;

/// Reference feature tables shipped with the crate, one row per precursor or decoy.
const BUNDLED_POSITIVES: &str = include_str!("../../data/training_positives.csv");
const BUNDLED_NEGATIVES: &str = include_str!("../../data/training_negatives.csv");

/// Known precursors: `precursor` and `mature` columns, optional `star`.
///
/// miRBase-style `mature1_seq` / `mature2_seq` headers are accepted as mature / star.
pub struct KnownPrecursors {
    pub path: PathBuf,
}

impl Dataset for KnownPrecursors {
    fn load(&self) -> Result<DataFrame> {
        info!("Reading known precursors from {}", self.path.display());
        let mut df = match read_csv(&self.path) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to read known precursors CSV: {}", e);
                return Err(e.into());
            }
        };
        for (from, to) in [("mature1_seq", "mature"), ("mature2_seq", "star")] {
            if has_column(&df, from) && !has_column(&df, to) {
                df.rename(from, PlSmallStr::from(to))?;
            }
        }
        require_columns(&df, "known precursors", &["precursor", "mature"])?;
        Ok(df)
    }
}

/// Feature vectors of known precursors, mature located by substring search.
pub fn positive_features(df: &DataFrame, extractor: &StructureFeatureExtractor) -> Result<Vec<FeatureVector>> {
    require_columns(df, "known precursors", &["precursor", "mature"])?;
    let precursors = df.column("precursor")?.str()?;
    let matures = df.column("mature")?.str()?;

    let mut out = Vec::with_capacity(df.height());
    for (precursor, mature) in precursors.into_iter().zip(matures.into_iter()) {
        let Some(precursor) = precursor else { continue };
        match extractor.extract(precursor, mature) {
            Ok(f) => out.push(f),
            Err(e) => debug!("skipping known precursor: {e}"),
        }
    }
    info!("{} positive feature vectors", out.len());
    Ok(out)
}

/// Coding sequences sliced into decoy fragments.
pub struct CodingDecoys {
    pub path: PathBuf,
    /// Only the first `max_sequences` distinct coding sequences are used.
    pub max_sequences: usize,
    pub seed: u64,
}

impl CodingDecoys {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_sequences: 2000,
            seed: 42,
        }
    }

    fn coding_sequences(&self) -> Result<Vec<String>> {
        let reader = fasta::Reader::new(File::open(&self.path)?);
        let mut seen = HashSet::new();
        let mut seqs = Vec::new();
        for record in reader.records() {
            let record = record?;
            let seq = String::from_utf8_lossy(record.seq()).to_ascii_uppercase();
            if seq.len() > MIN_DECOY_LEN && seen.insert(seq.clone()) {
                seqs.push(seq);
            }
        }
        seqs.truncate(self.max_sequences);
        Ok(seqs)
    }

    /// Consecutive chunks with Gamma(9.5, scale 9) lengths, one length per sequence.
    pub fn fragments(&self) -> Result<Vec<String>> {
        let seqs = self.coding_sequences()?;
        let gamma = Gamma::new(9.5, 1.0 / 9.0).map_err(|e| MirnaError::Config(format!("decoy length distribution: {e}")))?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let fragments = split_into_chunks(&seqs, || gamma.sample(&mut rng) as usize);
        info!("{} decoy fragments from {} coding sequences", fragments.len(), seqs.len());
        Ok(fragments)
    }
}

fn split_into_chunks<F: FnMut() -> usize>(seqs: &[String], mut chunk_len: F) -> Vec<String> {
    let mut out = Vec::new();
    for seq in seqs {
        let size = chunk_len().max(1);
        for chunk in seq.as_bytes().chunks(size) {
            if chunk.len() > MIN_DECOY_LEN && !chunk.contains(&b'N') {
                out.push(String::from_utf8_lossy(chunk).into_owned());
            }
        }
    }
    out
}

/// Decoy fragments featurised with a 22 nt pseudo mature at offset 2..5, keeping only
/// plausible single-loop hairpins.
pub fn negative_features(fragments: &[String], extractor: &StructureFeatureExtractor, seed: u64) -> Vec<FeatureVector> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    for seq in fragments {
        let ms: usize = rng.gen_range(2..5);
        let mature = seq.get(ms..(ms + PSEUDO_MATURE_LEN).min(seq.len()));
        match extractor.extract(seq, mature) {
            Ok(f) if f.looks_like_hairpin() => out.push(f),
            Ok(_) => {}
            Err(e) => debug!("skipping decoy fragment: {e}"),
        }
    }
    info!("{} of {} decoys kept as negatives", out.len(), fragments.len());
    out
}

/// Which side of the training set a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingLabel {
    Positive,
    Negative,
}

/// Feature table for one class.
///
/// A table that already carries every feature column is used as is; otherwise it must hold
/// sequences (`precursor`, plus `mature` for positives) to featurise with `extractor`.
pub fn training_features(
    df: &DataFrame,
    label: TrainingLabel,
    extractor: &StructureFeatureExtractor,
    seed: u64,
) -> Result<DataFrame> {
    let names = feature_names();
    if names.iter().all(|n| has_column(df, n)) {
        return Ok(df.select(names.iter().map(String::as_str))?);
    }
    let vectors = match label {
        TrainingLabel::Positive => positive_features(df, extractor)?,
        TrainingLabel::Negative => {
            require_columns(df, "negative training table", &["precursor"])?;
            let fragments: Vec<String> = df
                .column("precursor")?
                .str()?
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect();
            negative_features(&fragments, extractor, seed)
        }
    };
    Ok(feature_table(&vectors)?)
}

/// Bundled reference feature table for one class.
pub fn bundled_training_table(label: TrainingLabel) -> Result<DataFrame> {
    let csv = match label {
        TrainingLabel::Positive => BUNDLED_POSITIVES,
        TrainingLabel::Negative => BUNDLED_NEGATIVES,
    };
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(csv.as_bytes()))
        .finish()?;
    debug!("bundled {:?} table: {} rows", label, df.height());
    Ok(df)
}

fn training_table(path: Option<&Path>, label: TrainingLabel) -> Result<DataFrame> {
    let Some(path) = path else {
        return bundled_training_table(label);
    };
    let resolved = resolve_path(path);
    if !resolved.exists() {
        return Err(MirnaError::Config(format!(
            "no classifier supplied and training table {} not found",
            resolved.display()
        )));
    }
    let df = read_csv(&resolved)?;
    let precomputed = feature_names().iter().all(|n| has_column(&df, n));
    match label {
        TrainingLabel::Positive if !precomputed => KnownPrecursors { path: resolved }.load(),
        _ => Ok(df),
    }
}

/// Train the default classifier from the configured training tables.
pub fn train_default_classifier(config: &DiscoveryConfig, predictor: &dyn StructurePredictor) -> Result<PrecursorClassifier> {
    let extractor = StructureFeatureExtractor::new(predictor, config.mature_seed);
    let positives = training_table(config.training_positives.as_deref(), TrainingLabel::Positive)?;
    let negatives = training_table(config.training_negatives.as_deref(), TrainingLabel::Negative)?;
    let positives = training_features(&positives, TrainingLabel::Positive, &extractor, config.mature_seed)?;
    let negatives = training_features(&negatives, TrainingLabel::Negative, &extractor, config.mature_seed)?;
    PrecursorClassifier::train(&positives, &negatives, DEFAULT_L2)
}

/// Provider whose factory trains from the configured tables on first use.
pub fn default_classifier_provider(config: &DiscoveryConfig, predictor: Arc<dyn StructurePredictor>) -> ClassifierProvider {
    let config = config.clone();
    ClassifierProvider::new(move || train_default_classifier(&config, predictor.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction_tools::PrecomputedFolds;
    use std::io::Write;

    #[test]
    fn chunks_drop_short_and_ambiguous_pieces() {
        let seqs = vec![format!("{}{}", "A".repeat(60), "C".repeat(45)), format!("{}{}", "G".repeat(60), "N".repeat(60))];
        let chunks = split_into_chunks(&seqs, || 60);
        assert_eq!(chunks, vec!["A".repeat(60), "G".repeat(60)]);
    }

    #[test]
    fn fragments_are_reproducible() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let cds = "ACGTTGCA".repeat(40);
        writeln!(file, ">tx1\n{cds}\n>tx2\n{cds}\n>tx3\nACGT").unwrap();
        let decoys = CodingDecoys::new(file.path().to_path_buf());
        let a = decoys.fragments().unwrap();
        let b = decoys.fragments().unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|f| f.len() > MIN_DECOY_LEN && cds.contains(f.as_str())));
    }

    #[test]
    fn decoys_must_look_like_hairpins() {
        let hairpin = format!("{}{}{}", "GGGGGGGGGGGGGGGGGGGG", "AAAAAAAAAA", "CCCCCCCCCCCCCCCCCCCC");
        let flat = "ACGT".repeat(13);
        let mut folds = PrecomputedFolds::new();
        folds.insert(&hairpin, &format!("{}{}{}", "(".repeat(20), ".".repeat(10), ")".repeat(20)), -40.0);
        folds.insert(&flat, &".".repeat(flat.len()), 0.0);
        let extractor = StructureFeatureExtractor::new(&folds, 1);
        let kept = negative_features(&[hairpin, flat, "TTTT".into()], &extractor, 3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].stem_length, 20);
    }

    #[test]
    fn precomputed_feature_tables_pass_through() {
        let mut folds = PrecomputedFolds::new();
        folds.insert("GGGGAAAACCCC", "((((....))))", -5.0);
        let extractor = StructureFeatureExtractor::new(&folds, 1);
        let table = feature_table(&[extractor.extract("GGGGAAAACCCC", Some("GGGG")).unwrap()]).unwrap();
        let out = training_features(&table, TrainingLabel::Negative, &extractor, 1).unwrap();
        assert_eq!(out.shape(), table.shape());

        let known = df!("precursor" => ["GGGGAAAACCCC", "TTTT"], "mature" => ["GGGG", "TT"]).unwrap();
        let out = training_features(&known, TrainingLabel::Positive, &extractor, 1).unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn missing_training_tables_are_configuration_errors() {
        let config = DiscoveryConfig {
            training_positives: Some(PathBuf::from("/nonexistent/positives.csv")),
            ..Default::default()
        };
        let folds: Arc<dyn StructurePredictor> = Arc::new(PrecomputedFolds::new());
        let provider = default_classifier_provider(&config, folds);
        assert!(matches!(provider.get(), Err(MirnaError::Config(_))));
    }

    #[test]
    fn bundled_tables_carry_every_feature() {
        for label in [TrainingLabel::Positive, TrainingLabel::Negative] {
            let df = bundled_training_table(label).unwrap();
            assert!(df.height() >= 100);
            assert!(feature_names().iter().all(|n| has_column(&df, n)));
        }
        let negatives = bundled_training_table(TrainingLabel::Negative).unwrap();
        let loops = negatives.column("loops").unwrap().cast(&DataType::Float64).unwrap();
        assert!(loops.f64().unwrap().into_iter().all(|v| v == Some(1.0)));
    }

    #[test]
    fn default_provider_trains_from_bundled_tables() {
        let folds: Arc<dyn StructurePredictor> = Arc::new(PrecomputedFolds::new());
        let provider = default_classifier_provider(&DiscoveryConfig::default(), folds);
        let model = provider.get().unwrap();
        assert!(provider.is_initialized());

        let pos = model.score_table(&bundled_training_table(TrainingLabel::Positive).unwrap()).unwrap();
        let neg = model.score_table(&bundled_training_table(TrainingLabel::Negative).unwrap()).unwrap();
        let hits = pos.iter().filter(|&&s| s > 0.5).count();
        let rejections = neg.iter().filter(|&&s| s < 0.5).count();
        assert!(hits * 10 >= pos.len() * 9);
        assert!(rejections * 10 >= neg.len() * 9);
    }
}
