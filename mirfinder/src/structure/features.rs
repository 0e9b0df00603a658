//! features.rs – structural feature vectors for candidate precursors

use polars::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::error::Result;
use crate::helper_functions::{find_subseq, gc_fraction, normalize_nt, round3};
use crate::prediction_tools::{Fold, StructurePredictor};
use crate::structure::bulge_graph::{BulgeGraph, HairpinLoop};

/// Structure classes of a 3-nt window once closing brackets read as opening ones.
pub const TRIPLET_CLASSES: [&str; 8] = ["(((", "((.", "(..", "(.(", ".((", ".(.", "..(", "..."];
pub const TRIPLET_NUCLEOTIDES: [char; 4] = ['A', 'G', 'T', 'C'];

pub const BASE_FEATURES: [&str; 13] = [
    "length",
    "mfe",
    "loops",
    "loop_length",
    "loop_gc",
    "stem_length",
    "longest_stem",
    "bulges",
    "longest_bulge",
    "bulges_symmetric",
    "bulges_asymmetric",
    "stem_mismatches",
    "mature_mismatches",
];

pub const N_TRIPLETS: usize = 32;
pub const N_FEATURES: usize = BASE_FEATURES.len() + N_TRIPLETS;

/// Length of the stand-in mature window used when the mature is unknown.
const PSEUDO_MATURE_LEN: usize = 22;

/// Column names in classifier order: base features then `A(((` … `C...`.
pub fn feature_names() -> Vec<String> {
    let mut names: Vec<String> = BASE_FEATURES.iter().map(|s| s.to_string()).collect();
    for nuc in TRIPLET_NUCLEOTIDES {
        for class in TRIPLET_CLASSES {
            names.push(format!("{nuc}{class}"));
        }
    }
    names
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub length: usize,
    /// MFE per nucleotide, rounded to 3 decimals.
    pub mfe: f64,
    pub loops: usize,
    pub loop_length: usize,
    pub loop_gc: f64,
    pub stem_length: usize,
    pub longest_stem: usize,
    pub bulges: usize,
    pub longest_bulge: usize,
    pub bulges_symmetric: usize,
    pub bulges_asymmetric: usize,
    pub stem_mismatches: usize,
    pub mature_mismatches: usize,
    pub triplets: [u32; N_TRIPLETS],
    /// Not a classifier input: the fold the features came from.
    pub structure: String,
    pub raw_mfe: f64,
}

impl FeatureVector {
    pub fn to_vec(&self) -> Vec<f64> {
        let mut v = vec![
            self.length as f64,
            self.mfe,
            self.loops as f64,
            self.loop_length as f64,
            self.loop_gc,
            self.stem_length as f64,
            self.longest_stem as f64,
            self.bulges as f64,
            self.longest_bulge as f64,
            self.bulges_symmetric as f64,
            self.bulges_asymmetric as f64,
            self.stem_mismatches as f64,
            self.mature_mismatches as f64,
        ];
        v.extend(self.triplets.iter().map(|&t| t as f64));
        v
    }

    /// Hard structural filter shared by candidate selection and decoy construction.
    pub fn looks_like_hairpin(&self) -> bool {
        self.loops == 1 && self.stem_length > 18 && self.mfe * self.length as f64 <= -15.0
    }
}

/// Tally `nucleotide + structure-triplet` tokens over codon-aligned windows, the
/// nucleotide being the middle base of the window.
pub fn get_triplets(seq: &str, structure: &str) -> [u32; N_TRIPLETS] {
    let seq = seq.as_bytes();
    let structure: Vec<u8> = structure
        .bytes()
        .map(|b| if b == b')' { b'(' } else { b })
        .collect();
    let mut counts = [0u32; N_TRIPLETS];
    let l = seq.len() - seq.len() % 3;
    for i in (0..l).step_by(3) {
        let Some(window) = structure.get(i..i + 3) else { break };
        let nuc = seq[i + 1].to_ascii_uppercase() as char;
        let Some(n) = TRIPLET_NUCLEOTIDES.iter().position(|&c| c == nuc) else { continue };
        let Some(t) = TRIPLET_CLASSES.iter().position(|c| c.as_bytes() == window) else { continue };
        counts[n * TRIPLET_CLASSES.len() + t] += 1;
    }
    counts
}

fn complement(b: u8) -> Option<u8> {
    match b {
        b'G' => Some(b'C'),
        b'C' => Some(b'G'),
        b'T' => Some(b'A'),
        b'A' => Some(b'T'),
        _ => None,
    }
}

/// Derive the feature vector of `seq` from an already computed fold.
///
/// `mature` locates the mature span by substring search; without it a 22 nt window is
/// drawn from an RNG seeded with `mature_seed`.
pub fn features_from_fold(seq: &str, fold: &Fold, mature: Option<&str>, mature_seed: u64) -> FeatureVector {
    let seq = normalize_nt(seq);
    let bytes = seq.as_bytes();
    let bg = match BulgeGraph::from_dot_bracket(&fold.structure) {
        Ok(bg) => bg,
        Err(e) => {
            debug!("treating malformed structure as unpaired: {e}");
            BulgeGraph::unpaired(fold.structure.len())
        }
    };

    let (loops, loop_length, loop_gc) = match bg.terminal_loop() {
        HairpinLoop::Found(h) => {
            let loop_seq = seq.get(h.start..h.start + h.length).unwrap_or("");
            (bg.hairpins().len(), h.length, gc_fraction(loop_seq))
        }
        HairpinLoop::NoLoop => (0, 0, 0.0),
    };

    let bulges = bg.interior_loops();
    let longest_bulge = bulges.iter().map(|&(a, b)| a.max(b)).max().unwrap_or(0);
    let bulges_symmetric = bulges.iter().filter(|(a, b)| a == b).count();

    let (mature_start, mature_end) = match mature.map(normalize_nt) {
        Some(m) => match find_subseq(&seq, &m) {
            Some(s) => (s, s + m.len()),
            None => (0, 0),
        },
        None => {
            let mut rng = StdRng::seed_from_u64(mature_seed);
            let upper = seq.len().saturating_sub(PSEUDO_MATURE_LEN - 1).max(2);
            let s = rng.gen_range(1..upper);
            (s, s + PSEUDO_MATURE_LEN)
        }
    };

    let mut stem_length = 0;
    let mut stem_mismatches = 0;
    let mut mature_mismatches = 0;
    for (i, j) in bg.stem_pairs() {
        stem_length += 1;
        let matched = match (bytes.get(i), bytes.get(j)) {
            (Some(&a), Some(&b)) => complement(a) == Some(b),
            _ => false,
        };
        if !matched {
            stem_mismatches += 1;
            let in_mature = (mature_start..mature_end).contains(&i) || (mature_start..mature_end).contains(&j);
            if in_mature {
                mature_mismatches += 1;
            }
        }
    }

    let length = seq.len();
    let mfe = if length == 0 { 0.0 } else { round3(fold.mfe / length as f64) };

    FeatureVector {
        length,
        mfe,
        loops,
        loop_length,
        loop_gc,
        stem_length,
        longest_stem: bg.longest_stem(),
        bulges: bulges.len(),
        longest_bulge,
        bulges_symmetric,
        bulges_asymmetric: bulges.len() - bulges_symmetric,
        stem_mismatches,
        mature_mismatches,
        triplets: get_triplets(&seq, &fold.structure),
        structure: fold.structure.clone(),
        raw_mfe: fold.mfe,
    }
}

/// Folds candidate precursors and turns them into feature vectors.
pub struct StructureFeatureExtractor<'a> {
    predictor: &'a dyn StructurePredictor,
    mature_seed: u64,
}

impl<'a> StructureFeatureExtractor<'a> {
    pub fn new(predictor: &'a dyn StructurePredictor, mature_seed: u64) -> Self {
        Self {
            predictor,
            mature_seed,
        }
    }

    pub fn extract(&self, seq: &str, mature: Option<&str>) -> Result<FeatureVector> {
        let fold = self.predictor.fold(&normalize_nt(seq))?;
        Ok(features_from_fold(seq, &fold, mature, self.mature_seed))
    }

    /// One result per input, in input order.
    pub fn extract_batch<'s, I>(&self, items: I) -> Vec<Result<FeatureVector>>
    where
        I: IntoIterator<Item = (&'s str, Option<&'s str>)>,
    {
        items
            .into_iter()
            .map(|(seq, mature)| self.extract(seq, mature))
            .collect()
    }
}

/// One `Float64` column per feature, in [`feature_names`] order.
pub fn feature_table(features: &[FeatureVector]) -> PolarsResult<DataFrame> {
    let rows: Vec<Vec<f64>> = features.iter().map(FeatureVector::to_vec).collect();
    let columns: Vec<Column> = feature_names()
        .into_iter()
        .enumerate()
        .map(|(j, name)| {
            let values: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            Column::new(PlSmallStr::from(name.as_str()), values)
        })
        .collect();
    DataFrame::new(columns)
}
