use std::path::PathBuf;

use polars::prelude::*;
use tracing::{error, info};

use crate::error::{MirnaError, Result};
use crate::helper_functions::{has_column, normalize_nt, read_csv, require_columns};
use crate::models::{AlignedRead, Dataset, Strand};

/// Collapsed, genome-aligned reads in CSV form.
///
/// Columns: `read_id`, `chrom` (or `name`), `start`, `end`, `strand`, `reads`, `seq`, and
/// optionally `length` (taken from `seq` when absent).
pub struct AlignedReadsTable {
    pub path: PathBuf,
}

impl Dataset for AlignedReadsTable {
    fn load(&self) -> Result<DataFrame> {
        info!("Reading aligned reads from {}", self.path.display());
        let mut df = match read_csv(&self.path) {
            Ok(df) => df,
            Err(e) => {
                error!("Failed to read aligned reads CSV: {}", e);
                return Err(e.into());
            }
        };
        if !has_column(&df, "chrom") && has_column(&df, "name") {
            df.rename("name", PlSmallStr::from("chrom"))?;
        }
        require_columns(&df, "aligned reads", &["read_id", "chrom", "start", "end", "strand", "reads", "seq"])?;
        Ok(df)
    }
}

fn str_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a StringChunked> {
    Ok(df.column(name)?.str()?)
}

fn i64_column(df: &DataFrame, name: &str) -> Result<Int64Chunked> {
    Ok(df.column(name)?.cast(&DataType::Int64)?.i64()?.clone())
}

/// Owned reads from a loaded table; rows with missing values are skipped.
pub fn reads_from_frame(df: &DataFrame) -> Result<Vec<AlignedRead>> {
    let strand_col = df.column("strand")?.cast(&DataType::String)?;
    let read_id_col = df.column("read_id")?.cast(&DataType::String)?;
    let ids = read_id_col.str()?;
    let chroms = str_column(df, "chrom")?;
    let strands = strand_col.str()?;
    let seqs = str_column(df, "seq")?;
    let starts = i64_column(df, "start")?;
    let ends = i64_column(df, "end")?;
    let counts = i64_column(df, "reads")?;
    let lengths = if has_column(df, "length") {
        Some(i64_column(df, "length")?)
    } else {
        None
    };

    let mut reads = Vec::with_capacity(df.height());
    let mut skipped = 0usize;
    for i in 0..df.height() {
        let row = (
            ids.get(i),
            chroms.get(i),
            starts.get(i),
            ends.get(i),
            strands.get(i),
            counts.get(i),
            seqs.get(i),
        );
        let (Some(id), Some(chrom), Some(start), Some(end), Some(strand), Some(count), Some(seq)) = row else {
            skipped += 1;
            continue;
        };
        let seq = normalize_nt(seq);
        let length = lengths
            .as_ref()
            .and_then(|l| l.get(i))
            .map_or(seq.len(), |l| l.max(0) as usize);
        reads.push(AlignedRead {
            read_id: id.to_string(),
            chrom: chrom.to_string(),
            start,
            end,
            strand: strand.parse::<Strand>()?,
            length,
            reads: count.max(0) as u64,
            seq,
        });
    }
    if skipped > 0 {
        info!("Skipped {} aligned reads with missing fields", skipped);
    }
    Ok(reads)
}

/// Keep reads with `min_len <= length <= max_len`; an empty result is an input error.
pub fn filter_by_length(reads: Vec<AlignedRead>, min_len: usize, max_len: usize) -> Result<Vec<AlignedRead>> {
    let before = reads.len();
    let kept: Vec<AlignedRead> = reads
        .into_iter()
        .filter(|r| (min_len..=max_len).contains(&r.length))
        .collect();
    info!("{} of {} reads within {}-{} nt", kept.len(), before, min_len, max_len);
    if kept.is_empty() {
        return Err(MirnaError::NoReads);
    }
    Ok(kept)
}
