//! Star estimation from a folded precursor and its mature sequence.

use tracing::debug;

use crate::helper_functions::{find_subseq, normalize_nt};
use crate::models::MatureCheck;
use crate::structure::bulge_graph::BulgeGraph;

/// Overhang of the 3' end of a Dicer product.
const OVERHANG: i64 = 2;

/// Slice `seq[a..b]` with out-of-range bounds clamped, empty when `a >= b`.
fn clamped(seq: &str, a: i64, b: i64) -> &str {
    let len = seq.len() as i64;
    let (a, b) = (a.clamp(0, len), b.clamp(0, len));
    if a >= b {
        ""
    } else {
        &seq[a as usize..b as usize]
    }
}

/// Pairs as 1-based positions, stems in 5' order and outermost first.
fn one_based_pairs(bg: &BulgeGraph) -> Vec<(i64, i64)> {
    bg.stem_pairs().map(|(i, j)| (i as i64 + 1, j as i64 + 1)).collect()
}

/// Guess the star strand of a hairpin from where the mature pairs.
///
/// The mature arm is decided by whether it starts before the last 5' paired base. Its paired
/// partners, trimmed at a wide gap near the end of the arm, give the star span, shifted by the
/// 2 nt overhang. `None` when the mature is not in the precursor, the structure has no stem,
/// or the mature does not pair at all.
pub fn estimate_star(precursor: &str, mature: &str, structure: &str) -> Option<String> {
    let seq = normalize_nt(precursor);
    let mature = normalize_nt(mature);
    let start = find_subseq(&seq, &mature)? as i64 + 1;
    let end = start + mature.len() as i64;

    let bg = BulgeGraph::from_dot_bracket(structure).ok()?;
    let pairs = one_based_pairs(&bg);
    let last_5p = pairs.iter().map(|&(i, _)| i).max()?;

    let star = if start < last_5p {
        let matidx: Vec<i64> = (start..end).filter(|p| pairs.iter().any(|&(i, _)| i == *p)).collect();
        let mut staridx: Vec<i64> = pairs.iter().filter(|(i, _)| matidx.contains(i)).map(|&(_, j)| j).collect();
        let gaps: Vec<i64> = staridx.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        for (g, &gap) in gaps.iter().enumerate() {
            if gap > 3 && g + 5 >= gaps.len() {
                staridx.truncate(g + 1);
            }
        }
        let (first, last) = (*staridx.first()?, *staridx.last()?);
        let offset = matidx.len() as i64 - staridx.len() as i64 + OVERHANG;
        debug!("5p mature, star {}..{}", last, first + offset);
        clamped(&seq, last, first + offset)
    } else {
        let matidx: Vec<i64> = (start..end).filter(|p| pairs.iter().any(|&(_, j)| j == *p)).collect();
        let staridx: Vec<i64> = pairs.iter().filter(|(_, j)| matidx.contains(j)).map(|&(i, _)| i).collect();
        let (first, last) = (*staridx.first()?, *staridx.last()?);
        let offset = matidx.len() as i64 - staridx.len() as i64 + OVERHANG;
        debug!("3p mature, star {}..{}", first + offset, last);
        clamped(&seq, first + offset, last)
    };

    if star.is_empty() {
        None
    } else {
        Some(star.to_string())
    }
}

/// `Ok` when the mature sits in the precursor and at least one of its bases is paired.
pub fn check_mature(precursor: &str, mature: &str, structure: &str) -> MatureCheck {
    let seq = normalize_nt(precursor);
    let Some(start) = find_subseq(&seq, &normalize_nt(mature)) else {
        return MatureCheck::Failed;
    };
    let Ok(bg) = BulgeGraph::from_dot_bracket(structure) else {
        return MatureCheck::Failed;
    };
    if (start..start + mature.trim().len()).any(|p| bg.partner(p).is_some()) {
        MatureCheck::Ok
    } else {
        MatureCheck::Failed
    }
}
