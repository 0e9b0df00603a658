use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use bio::alphabets::dna::revcomp;
use bio::io::fasta;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::Strand;

/// Resolves genomic coordinates (0-based, half-open) into nucleotide sequence.
pub trait GenomeAccessor: Send + Sync {
    /// `None` when the window falls outside the chromosome or the chromosome is unknown.
    fn sequence(&self, chrom: &str, start: i64, end: i64, strand: Strand) -> Option<String>;
}

/// Whole reference genome held in memory, one upper-cased sequence per FASTA record.
#[derive(Debug, Clone, Default)]
pub struct FastaGenome {
    chromosomes: HashMap<String, Vec<u8>>,
}

impl FastaGenome {
    pub fn from_path(path: &Path) -> Result<Self> {
        info!("Loading reference genome from {}", path.display());
        let reader = fasta::Reader::new(File::open(path)?);
        let mut chromosomes = HashMap::new();
        for record in reader.records() {
            let record = record?;
            debug!("{}: {} bp", record.id(), record.seq().len());
            chromosomes.insert(record.id().to_string(), record.seq().to_ascii_uppercase());
        }
        info!("Loaded {} reference sequences", chromosomes.len());
        Ok(Self { chromosomes })
    }

    pub fn from_records<I, N, S>(records: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        let chromosomes = records
            .into_iter()
            .map(|(name, seq)| (name.as_ref().to_string(), seq.as_ref().to_ascii_uppercase().into_bytes()))
            .collect();
        Self { chromosomes }
    }

    pub fn chrom_len(&self, chrom: &str) -> Option<usize> {
        self.chromosomes.get(chrom).map(Vec::len)
    }
}

impl GenomeAccessor for FastaGenome {
    fn sequence(&self, chrom: &str, start: i64, end: i64, strand: Strand) -> Option<String> {
        let seq = self.chromosomes.get(chrom)?;
        if start < 0 || end <= start || end as usize > seq.len() {
            return None;
        }
        let slice = &seq[start as usize..end as usize];
        let bytes = match strand {
            Strand::Plus => slice.to_vec(),
            Strand::Minus => revcomp(slice),
        };
        String::from_utf8(bytes).ok()
    }
}
