//! novel.rs – per-locus precursor selection and the discovery run
//!
//! Every paired or single cluster is one locus. A locus either yields exactly one
//! [`NovelMirnaRecord`] or is skipped with a logged reason; skips are counted in the
//! [`DiscoverySummary`] and never abort the run.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clustering::{build_read_clusters, cluster_map, pair_clusters, paired_loci, single_clusters};
use crate::config::DiscoveryConfig;
use crate::data_handling::genome::GenomeAccessor;
use crate::error::{MirnaError, Result};
use crate::logistic_model::{ClassifierProvider, PrecursorClassifier};
use crate::models::{AlignedRead, Cluster, MatureCheck, NovelMirnaRecord, PrecursorCandidate};
use crate::precursor::{generate_candidates, mature_and_star, CandidateWindows};
use crate::prediction_tools::StructurePredictor;
use crate::structure::features::{FeatureVector, StructureFeatureExtractor};
use crate::structure::star::{check_mature, estimate_star};

/// Single loop, long stem and a stable fold: `mfe * length < -15`.
pub fn passes_hard_filters(f: &FeatureVector) -> bool {
    f.loops == 1 && f.stem_length > 18 && f.mfe * (f.length as f64) < -15.0
}

/// The winning candidate of one locus.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: PrecursorCandidate,
    pub features: FeatureVector,
    pub score: f64,
}

/// How a locus ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LocusOutcome {
    Found(Box<ScoredCandidate>),
    /// No window resolved to sequence.
    NoCandidates,
    /// Every folded candidate failed the structural filters.
    Filtered,
    /// Survivors of the filters all scored below the cutoff.
    BelowCutoff,
}

/// Counts reported for every run, including empty ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverySummary {
    pub clusters: usize,
    pub paired_loci: usize,
    pub single_loci: usize,
    /// Loci skipped by the read cutoff.
    pub below_read_cutoff: usize,
    pub with_candidates: usize,
    pub filtered: usize,
    pub below_score_cutoff: usize,
    /// Records dropped by strict mode.
    pub failed_mature_check: usize,
    pub records: usize,
}

/// Everything a discovery run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub records: Vec<NovelMirnaRecord>,
    pub clusters: Vec<Cluster>,
    pub summary: DiscoverySummary,
}

/// Scores candidate precursors of one locus and keeps the most stable survivor.
pub struct NovelMirnaSelector<'a> {
    genome: &'a dyn GenomeAccessor,
    extractor: StructureFeatureExtractor<'a>,
    classifier: &'a PrecursorClassifier,
    windows: CandidateWindows,
    score_cutoff: f64,
}

impl<'a> NovelMirnaSelector<'a> {
    pub fn new(
        genome: &'a dyn GenomeAccessor,
        predictor: &'a dyn StructurePredictor,
        classifier: &'a PrecursorClassifier,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            genome,
            extractor: StructureFeatureExtractor::new(predictor, config.mature_seed),
            classifier,
            windows: config.windows(),
            score_cutoff: config.score_cutoff,
        }
    }

    pub fn with_windows(mut self, windows: CandidateWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn with_score_cutoff(mut self, score_cutoff: f64) -> Self {
        self.score_cutoff = score_cutoff;
        self
    }

    /// Best precursor for a mature cluster and its optional star partner.
    pub fn find_precursor(&self, mature: &Cluster, star: Option<&Cluster>) -> LocusOutcome {
        let candidates = generate_candidates(mature, star, self.genome, &self.windows);
        if candidates.is_empty() {
            return LocusOutcome::NoCandidates;
        }

        let features = self
            .extractor
            .extract_batch(candidates.iter().map(|c| (c.precursor.as_str(), Some(c.mature.as_str()))));

        let mut survivors: Vec<ScoredCandidate> = Vec::new();
        let mut passed_filters = 0usize;
        for (candidate, result) in candidates.into_iter().zip(features) {
            let features = match result {
                Ok(f) => f,
                Err(e) => {
                    debug!("{}: {e}", candidate.coords());
                    continue;
                }
            };
            if !passes_hard_filters(&features) {
                continue;
            }
            passed_filters += 1;
            let score = self.classifier.score(&features);
            if score >= self.score_cutoff {
                survivors.push(ScoredCandidate {
                    candidate,
                    features,
                    score,
                });
            }
        }

        if passed_filters == 0 {
            return LocusOutcome::Filtered;
        }
        // stable: equal MFE keeps window order
        survivors.sort_by(|a, b| a.features.mfe.total_cmp(&b.features.mfe));
        match survivors.into_iter().next() {
            Some(best) => LocusOutcome::Found(Box::new(best)),
            None => LocusOutcome::BelowCutoff,
        }
    }

    /// Output row for a selected candidate; single loci get a star estimated from the fold.
    pub fn to_record(&self, found: ScoredCandidate) -> NovelMirnaRecord {
        let ScoredCandidate {
            candidate,
            features,
            score,
        } = found;
        let mut mature_check = check_mature(&candidate.precursor, &candidate.mature, &features.structure);
        let star = match candidate.star.clone() {
            Some(star) => Some(star),
            None => {
                let star = estimate_star(&candidate.precursor, &candidate.mature, &features.structure);
                if star.is_none() {
                    mature_check = MatureCheck::Failed;
                }
                star
            }
        };
        NovelMirnaRecord {
            coords: candidate.coords(),
            seed: candidate.mature.get(2..8).unwrap_or_default().to_string(),
            precursor: candidate.precursor,
            mature: candidate.mature,
            star,
            score,
            mfe: features.mfe,
            mature_reads: candidate.mature_reads,
            star_reads: candidate.star_reads,
            mature_check,
            chrom: candidate.chrom,
            start: candidate.start,
            end: candidate.end,
            strand: candidate.strand,
        }
    }
}

/// One unit of per-locus work.
#[derive(Debug, Clone, Copy)]
enum Locus<'c> {
    Paired(&'c Cluster, &'c Cluster),
    Single(&'c Cluster),
}

impl Locus<'_> {
    fn parts(&self) -> (&Cluster, Option<&Cluster>) {
        match *self {
            Locus::Paired(a, b) => {
                let (mature, star) = mature_and_star(a, b);
                (mature, Some(star))
            }
            Locus::Single(c) => (c, None),
        }
    }
}

/// Paired loci in ascending id order, then single clusters in id order.
fn collect_loci<'c>(clusters: &'c [Cluster], by_id: &HashMap<u32, &'c Cluster>) -> Vec<Locus<'c>> {
    let mut out: Vec<Locus<'c>> = paired_loci(clusters)
        .into_iter()
        .filter_map(|(a, b)| Some(Locus::Paired(*by_id.get(&a)?, *by_id.get(&b)?)))
        .collect();
    out.extend(single_clusters(clusters).into_iter().map(Locus::Single));
    out
}

/// Run discovery with an already resolved classifier.
///
/// Reads are length-filtered, clustered and paired; every locus is then resolved in
/// parallel and the records come back in locus order.
pub fn discover(
    reads: &[AlignedRead],
    genome: &dyn GenomeAccessor,
    predictor: &dyn StructurePredictor,
    classifier: &PrecursorClassifier,
    config: &DiscoveryConfig,
) -> Result<Discovery> {
    let reads: Vec<AlignedRead> = reads
        .iter()
        .filter(|r| (config.min_read_length..=config.max_read_length).contains(&r.length))
        .cloned()
        .collect();
    if reads.is_empty() {
        return Err(MirnaError::NoReads);
    }

    let mut clusters = build_read_clusters(&reads, config.cluster_distance, config.min_cluster_size);
    pair_clusters(&mut clusters, config.pair_distance);
    let by_id = cluster_map(&clusters);
    let all_loci = collect_loci(&clusters, &by_id);

    let mut summary = DiscoverySummary {
        clusters: clusters.len(),
        ..Default::default()
    };
    let loci: Vec<Locus> = all_loci
        .into_iter()
        .filter(|l| {
            let keep = l.parts().0.reads >= config.read_cutoff;
            if !keep {
                summary.below_read_cutoff += 1;
            }
            keep
        })
        .collect();
    summary.paired_loci = loci.iter().filter(|l| matches!(l, Locus::Paired(..))).count();
    summary.single_loci = loci.len() - summary.paired_loci;
    info!(
        "{} paired clusters found, checking {} single clusters",
        summary.paired_loci, summary.single_loci
    );

    let selector = NovelMirnaSelector::new(genome, predictor, classifier, config);
    let run = || -> Vec<LocusOutcome> {
        loci.par_iter()
            .map(|locus| {
                let (mature, star) = locus.parts();
                selector.find_precursor(mature, star)
            })
            .collect()
    };
    let outcomes = match config.threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| MirnaError::Config(format!("thread pool: {e}")))?
            .install(run),
        None => run(),
    };

    let mut records = Vec::new();
    for (locus, outcome) in loci.iter().zip(outcomes) {
        let mature = locus.parts().0;
        match outcome {
            LocusOutcome::Found(found) => {
                summary.with_candidates += 1;
                let record = selector.to_record(*found);
                if config.strict && record.mature_check != MatureCheck::Ok {
                    summary.failed_mature_check += 1;
                    continue;
                }
                records.push(record);
            }
            LocusOutcome::NoCandidates => debug!("cluster {}: no precursor predicted", mature.cluster),
            LocusOutcome::Filtered => {
                summary.with_candidates += 1;
                summary.filtered += 1;
                debug!("cluster {}: no candidate passed the structure filters", mature.cluster);
            }
            LocusOutcome::BelowCutoff => {
                summary.with_candidates += 1;
                summary.below_score_cutoff += 1;
                debug!("cluster {}: no candidate scored {} or more", mature.cluster, config.score_cutoff);
            }
        }
    }
    summary.records = records.len();

    if records.is_empty() {
        warn!("no miRNAs found at score cutoff {}", config.score_cutoff);
    } else {
        info!("found {} novel miRNAs", records.len());
    }
    info!(
        "{} loci with candidates, {} filtered, {} below score cutoff",
        summary.with_candidates, summary.filtered, summary.below_score_cutoff
    );

    Ok(Discovery {
        records,
        clusters,
        summary,
    })
}

/// Discovery entry point: the classifier is resolved from `provider` once, before any
/// per-locus work starts.
pub fn find_mirnas(
    reads: &[AlignedRead],
    genome: &dyn GenomeAccessor,
    predictor: &dyn StructurePredictor,
    provider: &ClassifierProvider,
    config: &DiscoveryConfig,
) -> Result<Discovery> {
    config.validate()?;
    let classifier = provider.get()?;
    discover(reads, genome, predictor, &classifier, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::genome::FastaGenome;
    use crate::logistic_model::tests::toy_tables;
    use crate::logistic_model::DEFAULT_L2;
    use crate::models::Strand;
    use crate::prediction_tools::{Fold, PrecomputedFolds};
    use crate::structure::features::features_from_fold;

    /// Folds every sequence as one hairpin: `arm` pairs on each side around an unpaired middle.
    struct HairpinFolder {
        arm: usize,
        mfe_per_nt: f64,
    }

    impl StructurePredictor for HairpinFolder {
        fn fold(&self, seq: &str) -> Result<Fold> {
            let n = seq.len();
            if n < 2 * self.arm + 3 {
                return Ok(Fold {
                    structure: ".".repeat(n),
                    mfe: 0.0,
                });
            }
            let structure = format!("{}{}{}", "(".repeat(self.arm), ".".repeat(n - 2 * self.arm), ")".repeat(self.arm));
            Ok(Fold {
                structure,
                mfe: self.mfe_per_nt * n as f64,
            })
        }
    }

    fn classifier() -> PrecursorClassifier {
        let (pos, neg) = toy_tables();
        PrecursorClassifier::train(&pos, &neg, DEFAULT_L2).unwrap()
    }

    fn read(id: &str, start: i64, len: usize, reads: u64, genome: &str) -> AlignedRead {
        AlignedRead {
            read_id: id.into(),
            chrom: "chr1".into(),
            start,
            end: start + len as i64,
            strand: Strand::Plus,
            length: len,
            reads,
            seq: genome[start as usize..start as usize + len].to_string(),
        }
    }

    fn cluster(seq: &str, start: i64) -> Cluster {
        Cluster {
            cluster: 1,
            chrom: "chr1".into(),
            start,
            end: start + seq.len() as i64,
            strand: Strand::Plus,
            reads: 50,
            length: seq.len(),
            seq: seq.into(),
            pair: None,
            members: vec![],
        }
    }

    fn genome_seq() -> String {
        "ACGTTGCAAGCTAGCTAGGATCCGATCGATTGCA".repeat(12)
    }

    #[test]
    fn hard_filter_boundary_is_strict() {
        let folds = Fold {
            structure: format!("{}{}{}", "(".repeat(19), ".".repeat(10), ")".repeat(19)),
            mfe: -14.0,
        };
        let seq = "A".repeat(48);
        let f = features_from_fold(&seq, &folds, None, 1);
        // -14 / 48 rounds to -0.292, times 48 is -14.016
        assert!(!passes_hard_filters(&f));
        let f = features_from_fold(&seq, &Fold { mfe: -20.0, ..folds.clone() }, None, 1);
        assert!(passes_hard_filters(&f));
        let short = Fold {
            structure: format!("{}{}{}", "(".repeat(18), ".".repeat(12), ")".repeat(18)),
            mfe: -30.0,
        };
        assert!(!passes_hard_filters(&features_from_fold(&seq, &short, None, 1)));

        let hairpin = format!("{}{}{}", "(".repeat(10), ".".repeat(4), ")".repeat(10));
        let twin = Fold {
            structure: hairpin.repeat(2),
            mfe: -30.0,
        };
        let f = features_from_fold(&seq, &twin, None, 1);
        assert_eq!((f.loops, f.stem_length), (2, 20));
        assert!(f.mfe * (f.length as f64) < -15.0);
        assert!(!passes_hard_filters(&f));
    }

    /// Folds every sequence into two hairpins side by side.
    struct TwinHairpinFolder;

    impl StructurePredictor for TwinHairpinFolder {
        fn fold(&self, seq: &str) -> Result<Fold> {
            let half = |n: usize| {
                let arm = n.saturating_sub(4) / 2;
                format!("{}{}{}", "(".repeat(arm), ".".repeat(n - 2 * arm), ")".repeat(arm))
            };
            let n = seq.len();
            Ok(Fold {
                structure: format!("{}{}", half(n / 2), half(n - n / 2)),
                mfe: -0.5 * n as f64,
            })
        }
    }

    #[test]
    fn multi_loop_folds_never_become_records() {
        let genome_seq = genome_seq();
        let genome = FastaGenome::from_records([("chr1", genome_seq.as_str())]);
        let model = classifier();
        let config = DiscoveryConfig::default();
        let selector = NovelMirnaSelector::new(&genome, &TwinHairpinFolder, &model, &config).with_score_cutoff(0.0);
        let mature = cluster(&genome_seq[150..172], 150);
        assert_eq!(selector.find_precursor(&mature, None), LocusOutcome::Filtered);

        let reads = vec![
            read("a1", 150, 22, 60, &genome_seq),
            read("a2", 151, 21, 20, &genome_seq),
        ];
        let open = DiscoveryConfig {
            score_cutoff: 0.0,
            ..Default::default()
        };
        let run = discover(&reads, &genome, &TwinHairpinFolder, &model, &open).unwrap();
        assert!(run.records.is_empty());
        assert_eq!(run.summary.filtered, 1);
    }

    #[test]
    fn most_stable_candidate_wins() {
        let genome_seq = genome_seq();
        let genome = FastaGenome::from_records([("chr1", genome_seq.as_str())]);
        let folder = HairpinFolder { arm: 22, mfe_per_nt: -0.5 };
        let model = classifier();
        let config = DiscoveryConfig::default();
        let selector = NovelMirnaSelector::new(&genome, &folder, &model, &config).with_score_cutoff(0.0);
        let mature = cluster(&genome_seq[150..172], 150);
        let LocusOutcome::Found(best) = selector.find_precursor(&mature, None) else {
            panic!("expected a precursor");
        };
        // all candidates share mfe/nt; the first in window order is kept
        let first = generate_candidates(&mature, None, &genome, &config.windows())
            .into_iter()
            .find(|c| c.precursor.len() >= 2 * 22 + 3)
            .unwrap();
        assert_eq!(best.candidate.start, first.start);
        assert!(passes_hard_filters(&best.features));
        assert_eq!(best.features.loops, 1);
    }

    #[test]
    fn locus_outcomes_cover_every_skip() {
        let genome_seq = genome_seq();
        let genome = FastaGenome::from_records([("chr1", genome_seq.as_str())]);
        let model = classifier();
        let config = DiscoveryConfig::default();

        let flat = HairpinFolder { arm: 22, mfe_per_nt: -0.1 };
        let selector = NovelMirnaSelector::new(&genome, &flat, &model, &config);
        let mature = cluster(&genome_seq[150..172], 150);
        assert_eq!(selector.find_precursor(&mature, None), LocusOutcome::Filtered);

        let off_chrom = Cluster {
            chrom: "chrX".into(),
            ..mature.clone()
        };
        assert_eq!(selector.find_precursor(&off_chrom, None), LocusOutcome::NoCandidates);

        let good = HairpinFolder { arm: 22, mfe_per_nt: -0.5 };
        let strict = NovelMirnaSelector::new(&genome, &good, &model, &config).with_score_cutoff(1.1);
        assert_eq!(strict.find_precursor(&mature, None), LocusOutcome::BelowCutoff);

        let missing = PrecomputedFolds::new();
        let selector = NovelMirnaSelector::new(&genome, &missing, &model, &config);
        assert_eq!(selector.find_precursor(&mature, None), LocusOutcome::Filtered);
    }

    #[test]
    fn single_loci_get_an_estimated_star_and_seed() {
        let genome_seq = genome_seq();
        let genome = FastaGenome::from_records([("chr1", genome_seq.as_str())]);
        let folder = HairpinFolder { arm: 22, mfe_per_nt: -0.5 };
        let model = classifier();
        let config = DiscoveryConfig::default();
        let selector = NovelMirnaSelector::new(&genome, &folder, &model, &config).with_score_cutoff(0.0);
        let mature = cluster(&genome_seq[150..172], 150);
        let LocusOutcome::Found(best) = selector.find_precursor(&mature, None) else {
            panic!("expected a precursor");
        };
        let record = selector.to_record(*best);
        assert_eq!(record.seed, genome_seq[152..158]);
        assert_eq!(record.coords, format!("chr1:{}..{}:+", record.start, record.end));
        assert_eq!(record.star_reads, 0);
        assert_eq!(record.mfe, -0.5);
        assert!(record.star.is_some() || record.mature_check == MatureCheck::Failed);
    }

    #[test]
    fn empty_read_sets_are_an_input_error() {
        let genome = FastaGenome::from_records([("chr1", "ACGT")]);
        let folder = HairpinFolder { arm: 22, mfe_per_nt: -0.5 };
        let provider = ClassifierProvider::with_model(classifier());
        let too_long = vec![read("r1", 0, 4, 10, "ACGT")];
        let config = DiscoveryConfig::default();
        assert!(matches!(
            find_mirnas(&[], &genome, &folder, &provider, &config),
            Err(MirnaError::NoReads)
        ));
        assert!(matches!(
            find_mirnas(&too_long, &genome, &folder, &provider, &config),
            Err(MirnaError::NoReads)
        ));
    }

    #[test]
    fn runs_are_idempotent_and_report_counts() {
        let genome_seq = genome_seq();
        let genome = FastaGenome::from_records([("chr1", genome_seq.as_str())]);
        let folder = HairpinFolder { arm: 22, mfe_per_nt: -0.5 };
        let reads = vec![
            read("a1", 150, 22, 60, &genome_seq),
            read("a2", 151, 21, 20, &genome_seq),
            read("b1", 300, 22, 9, &genome_seq),
            read("b2", 301, 20, 3, &genome_seq),
        ];
        let config = DiscoveryConfig {
            score_cutoff: 0.0,
            threads: Some(2),
            ..Default::default()
        };
        let provider = ClassifierProvider::with_model(classifier());
        let first = find_mirnas(&reads, &genome, &folder, &provider, &config).unwrap();
        let second = find_mirnas(&reads, &genome, &folder, &provider, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.summary.clusters, 2);
        assert_eq!(first.summary.single_loci, 2);
        assert_eq!(first.summary.records, first.records.len());
        assert!(first.records.iter().all(|r| r.mfe * (r.precursor.len() as f64) < -15.0));

        let cut = DiscoveryConfig {
            read_cutoff: 50,
            ..config
        };
        let run = find_mirnas(&reads, &genome, &folder, &provider, &cut).unwrap();
        assert_eq!(run.summary.below_read_cutoff, 1);
        assert_eq!(run.summary.single_loci, 1);
    }
}
