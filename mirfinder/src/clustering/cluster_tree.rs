//! cluster_tree.rs – per-chromosome 1-D interval clustering
//!
//! Intervals are sorted by start and swept once; an interval joins the open cluster when
//! the gap to the cluster's right edge is at most `cluster_distance`, so membership is
//! transitive through chains of close intervals. Clusters smaller than `min_size` are
//! dropped when the sweep closes them.

use std::collections::BTreeMap;

/// One retained cluster: its span and the keys of its members in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRegion<K> {
    pub start: i64,
    pub end: i64,
    pub members: Vec<K>,
}

#[derive(Debug, Clone)]
pub struct IntervalClusterIndex<K> {
    cluster_distance: i64,
    min_size: usize,
    intervals: BTreeMap<String, Vec<(i64, i64, K)>>,
}

impl<K: Clone + Ord> IntervalClusterIndex<K> {
    pub fn new(cluster_distance: i64, min_size: usize) -> Self {
        Self {
            cluster_distance,
            min_size,
            intervals: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, chrom: &str, start: i64, end: i64, key: K) {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.intervals
            .entry(chrom.to_string())
            .or_default()
            .push((start, end, key));
    }

    /// Chromosomes in lexical order.
    pub fn chromosomes(&self) -> impl Iterator<Item = &str> {
        self.intervals.keys().map(String::as_str)
    }

    /// Retained clusters of one chromosome, ordered by start.
    pub fn regions(&self, chrom: &str) -> Vec<ClusterRegion<K>> {
        match self.intervals.get(chrom) {
            Some(intervals) => self.sweep(intervals),
            None => Vec::new(),
        }
    }

    /// Retained clusters of every chromosome.
    pub fn all_regions(&self) -> BTreeMap<String, Vec<ClusterRegion<K>>> {
        self.intervals
            .iter()
            .map(|(chrom, intervals)| (chrom.clone(), self.sweep(intervals)))
            .collect()
    }

    fn sweep(&self, intervals: &[(i64, i64, K)]) -> Vec<ClusterRegion<K>> {
        let mut sorted: Vec<&(i64, i64, K)> = intervals.iter().collect();
        sorted.sort_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));

        let mut regions = Vec::new();
        let mut open: Option<ClusterRegion<K>> = None;

        for (start, end, key) in sorted {
            match open.as_mut() {
                Some(region) if *start - region.end <= self.cluster_distance => {
                    region.end = region.end.max(*end);
                    region.members.push(key.clone());
                }
                _ => {
                    if let Some(done) = open.take() {
                        self.keep(done, &mut regions);
                    }
                    open = Some(ClusterRegion {
                        start: *start,
                        end: *end,
                        members: vec![key.clone()],
                    });
                }
            }
        }
        if let Some(done) = open {
            self.keep(done, &mut regions);
        }
        regions
    }

    fn keep(&self, region: ClusterRegion<K>, regions: &mut Vec<ClusterRegion<K>>) {
        if region.members.len() >= self.min_size {
            regions.push(region);
        }
    }
}
