pub mod cluster_tree;
pub mod pairing;

use std::collections::HashMap;

use tracing::{debug, info};

use crate::models::AlignedRead;
use crate::models::Cluster;

pub use cluster_tree::{ClusterRegion, IntervalClusterIndex};
pub use pairing::{pair_clusters, paired_loci, single_clusters};

/// Cluster aligned reads per chromosome and summarise every retained cluster.
///
/// Reads are sorted by (chromosome, start, end, read_id) before indexing, and cluster ids
/// are handed out from 1 in chromosome-then-start order, so numbering is reproducible.
pub fn build_read_clusters(
    reads: &[AlignedRead],
    cluster_distance: i64,
    min_size: usize,
) -> Vec<Cluster> {
    let mut order: Vec<usize> = (0..reads.len()).collect();
    order.sort_by(|&a, &b| {
        let (ra, rb) = (&reads[a], &reads[b]);
        (&ra.chrom, ra.start, ra.end, &ra.read_id).cmp(&(&rb.chrom, rb.start, rb.end, &rb.read_id))
    });
    // rank in sorted order doubles as the grouping key
    let mut index = IntervalClusterIndex::new(cluster_distance, min_size);
    for (rank, &i) in order.iter().enumerate() {
        let r = &reads[i];
        index.insert(&r.chrom, r.start, r.end, rank);
    }

    let mut clusters = Vec::new();
    let mut next_id = 1u32;
    for (chrom, regions) in index.all_regions() {
        debug!("{} read clusters on {}", regions.len(), chrom);
        for region in regions {
            let members: Vec<&AlignedRead> = region.members.iter().map(|&rank| &reads[order[rank]]).collect();
            clusters.push(summarise(next_id, &chrom, &region, &members));
            next_id += 1;
        }
    }
    info!("{} read clusters in {} unique reads", clusters.len(), reads.len());
    clusters
}

fn summarise(id: u32, chrom: &str, region: &ClusterRegion<usize>, members: &[&AlignedRead]) -> Cluster {
    // most abundant member; ties keep the earliest in scan order
    let mut top = members[0];
    for &m in &members[1..] {
        if m.reads > top.reads {
            top = m;
        }
    }
    Cluster {
        cluster: id,
        chrom: chrom.to_string(),
        start: region.start,
        end: region.end,
        strand: top.strand,
        reads: members.iter().map(|m| m.reads).sum(),
        length: members.iter().map(|m| m.length).max().unwrap_or(0),
        seq: top.seq.clone(),
        pair: None,
        members: members.iter().map(|m| m.read_id.clone()).collect(),
    }
}

/// Cluster lookup by id.
pub fn cluster_map(clusters: &[Cluster]) -> HashMap<u32, &Cluster> {
    clusters.iter().map(|c| (c.cluster, c)).collect()
}
