//! Candidate hairpin windows around a mature read cluster.

use tracing::debug;

use crate::data_handling::genome::GenomeAccessor;
use crate::models::{Cluster, PrecursorCandidate};

/// Offsets and loop size used to extend a mature cluster into precursor windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateWindows {
    pub step: usize,
    /// First offset, inclusive.
    pub offset_start: usize,
    /// Offset bound, exclusive.
    pub offset_end: usize,
    /// Minimal terminal loop in bp.
    pub loop_span: i64,
}

impl Default for CandidateWindows {
    fn default() -> Self {
        Self {
            step: 5,
            offset_start: 1,
            offset_end: 45,
            loop_span: 15,
        }
    }
}

impl CandidateWindows {
    pub fn offsets(&self) -> impl Iterator<Item = i64> {
        (self.offset_start..self.offset_end)
            .step_by(self.step.max(1))
            .map(|i| i as i64)
    }

    /// `(start, end)` pairs, 5'-anchored then 3'-anchored for each offset.
    pub fn spans(&self, start: i64, end: i64, seq_len: usize) -> Vec<(i64, i64)> {
        let len = seq_len as i64;
        let mut spans = Vec::new();
        for i in self.offsets() {
            spans.push((start - i, start + 2 * len - 1 + self.loop_span + i));
            spans.push((start - (self.loop_span + len + i), end + i));
        }
        spans
    }
}

/// Order two paired clusters as (mature, star): the star is the less abundant one.
pub fn mature_and_star<'a>(a: &'a Cluster, b: &'a Cluster) -> (&'a Cluster, &'a Cluster) {
    if b.reads > a.reads {
        (b, a)
    } else {
        (a, b)
    }
}

/// Every window around `mature` that the genome can resolve, in offset order.
pub fn generate_candidates(
    mature: &Cluster,
    star: Option<&Cluster>,
    genome: &dyn GenomeAccessor,
    windows: &CandidateWindows,
) -> Vec<PrecursorCandidate> {
    let spans = windows.spans(mature.start, mature.end, mature.seq.len());
    let total = spans.len();
    let candidates: Vec<PrecursorCandidate> = spans
        .into_iter()
        .filter_map(|(start, end)| {
            let precursor = genome.sequence(&mature.chrom, start, end, mature.strand)?;
            Some(PrecursorCandidate {
                chrom: mature.chrom.clone(),
                start,
                end,
                strand: mature.strand,
                precursor,
                mature: mature.seq.clone(),
                star: star.map(|s| s.seq.clone()),
                mature_reads: mature.reads,
                star_reads: star.map_or(0, |s| s.reads),
            })
        })
        .collect();
    debug!(
        "cluster {}: {}/{} windows resolved",
        mature.cluster,
        candidates.len(),
        total
    );
    candidates
}
