use std::collections::BTreeSet;

use tracing::info;

use crate::clustering::IntervalClusterIndex;
use crate::models::Cluster;

/// Mark clusters lying within `pair_distance` of each other as mature/star partners.
///
/// Cluster spans are re-clustered with the cluster id as key and a minimum group size of
/// two. Every member of a group points at its first co-member in scan order, so a two
/// cluster group yields a reciprocal pair while larger groups resolve first-match.
pub fn pair_clusters(clusters: &mut [Cluster], pair_distance: i64) {
    let mut index = IntervalClusterIndex::new(pair_distance, 2);
    for c in clusters.iter() {
        index.insert(&c.chrom, c.start, c.end, c.cluster);
    }

    let mut partner = std::collections::HashMap::new();
    for regions in index.all_regions().into_values() {
        for region in regions {
            for &id in &region.members {
                if let Some(&other) = region.members.iter().find(|&&m| m != id) {
                    partner.insert(id, other);
                }
            }
        }
    }

    for c in clusters.iter_mut() {
        c.pair = partner.get(&c.cluster).copied();
    }
    info!("{} clusters paired", partner.len());
}

/// Distinct unordered partner pairs, lower id first, in ascending order.
pub fn paired_loci(clusters: &[Cluster]) -> Vec<(u32, u32)> {
    let pairs: BTreeSet<(u32, u32)> = clusters
        .iter()
        .filter_map(|c| c.pair.map(|p| (c.cluster.min(p), c.cluster.max(p))))
        .collect();
    pairs.into_iter().collect()
}

pub fn single_clusters(clusters: &[Cluster]) -> Vec<&Cluster> {
    clusters.iter().filter(|c| c.pair.is_none()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Strand;

    fn cluster(id: u32, start: i64, end: i64) -> Cluster {
        Cluster {
            cluster: id,
            chrom: "chr1".to_string(),
            start,
            end,
            strand: Strand::Plus,
            reads: 10,
            length: 22,
            seq: "A".repeat(22),
            pair: None,
            members: vec![],
        }
    }

    #[test]
    fn clusters_28bp_apart_pair_up() {
        let mut clusters = vec![cluster(1, 100, 122), cluster(2, 150, 172)];
        pair_clusters(&mut clusters, 120);
        assert_eq!(clusters[0].pair, Some(2));
        assert_eq!(clusters[1].pair, Some(1));
        assert_eq!(paired_loci(&clusters), vec![(1, 2)]);
        assert!(single_clusters(&clusters).is_empty());
    }

    #[test]
    fn clusters_200bp_apart_stay_single() {
        let mut clusters = vec![cluster(1, 100, 122), cluster(2, 322, 344)];
        pair_clusters(&mut clusters, 120);
        assert!(clusters.iter().all(|c| c.pair.is_none()));
        assert!(paired_loci(&clusters).is_empty());
        assert_eq!(single_clusters(&clusters).len(), 2);
    }

    #[test]
    fn crowded_groups_resolve_first_match() {
        let mut clusters = vec![cluster(1, 100, 122), cluster(2, 150, 172), cluster(3, 200, 222)];
        pair_clusters(&mut clusters, 120);
        assert_eq!(clusters[0].pair, Some(2));
        assert_eq!(clusters[1].pair, Some(1));
        assert_eq!(clusters[2].pair, Some(1));
        assert_eq!(paired_loci(&clusters), vec![(1, 2), (1, 3)]);
    }
}
