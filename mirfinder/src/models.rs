// src/models.rs

use std::fmt;
use std::str::FromStr;

use polars::frame::DataFrame;
use serde::{Deserialize, Serialize};

use crate::error::{MirnaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Plus => write!(f, "+"),
            Strand::Minus => write!(f, "-"),
        }
    }
}

impl FromStr for Strand {
    type Err = MirnaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_matches('"') {
            "+" | "1" | "+1" => Ok(Strand::Plus),
            "-" | "-1" => Ok(Strand::Minus),
            other => Err(MirnaError::Config(format!("unknown strand '{other}'"))),
        }
    }
}

/// One unique read aligned to the reference genome, with its collapsed abundance.
///
/// Coordinates are 0-based half-open.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRead {
    pub read_id: String,
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub strand: Strand,
    pub length: usize,
    pub reads: u64,
    pub seq: String,
}

/// A pile of co-located reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub cluster: u32,
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub strand: Strand,
    /// Summed read counts of all members.
    pub reads: u64,
    /// Longest member read.
    pub length: usize,
    /// Sequence of the most abundant member.
    pub seq: String,
    pub pair: Option<u32>,
    #[serde(skip)]
    pub members: Vec<String>,
}

/// A genomic window proposed as a hairpin precursor for one locus.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecursorCandidate {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub strand: Strand,
    pub precursor: String,
    pub mature: String,
    pub star: Option<String>,
    pub mature_reads: u64,
    pub star_reads: u64,
}

impl PrecursorCandidate {
    pub fn coords(&self) -> String {
        format!("{}:{}..{}:{}", self.chrom, self.start, self.end, self.strand)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatureCheck {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "failed")]
    Failed,
}

impl fmt::Display for MatureCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatureCheck::Ok => write!(f, "ok"),
            MatureCheck::Failed => write!(f, "failed"),
        }
    }
}

/// One discovered novel miRNA locus; the column order is the output table's.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NovelMirnaRecord {
    pub precursor: String,
    pub mature: String,
    pub star: Option<String>,
    pub seed: String,
    pub score: f64,
    pub mfe: f64,
    pub coords: String,
    pub mature_reads: u64,
    pub star_reads: u64,
    pub mature_check: MatureCheck,
    #[serde(skip)]
    pub chrom: String,
    #[serde(skip)]
    pub start: i64,
    #[serde(skip)]
    pub end: i64,
    #[serde(skip)]
    pub strand: Strand,
}

/// A tabular source that can be loaded into a DataFrame.
pub trait Dataset {
    fn load(&self) -> Result<DataFrame>;
}
