use std::fs::File;
use std::path::Path;

use bio::io::fasta;
use polars::prelude::*;
use tracing::info;

use crate::data_handling::genome::GenomeAccessor;
use crate::error::Result;
use crate::helper_functions::find_subseq;
use crate::models::{Cluster, NovelMirnaRecord, Strand};
use crate::novel::DiscoverySummary;

/// `novel_mirna.csv`: one row per record in output column order.
pub fn write_records(path: &Path, records: &[NovelMirnaRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    info!("Wrote {} novel miRNAs to {}", records.len(), path.display());
    Ok(())
}

pub fn cluster_table(clusters: &[Cluster]) -> PolarsResult<DataFrame> {
    df!(
        "cluster" => clusters.iter().map(|c| c.cluster).collect::<Vec<_>>(),
        "chrom" => clusters.iter().map(|c| c.chrom.as_str()).collect::<Vec<_>>(),
        "start" => clusters.iter().map(|c| c.start).collect::<Vec<_>>(),
        "end" => clusters.iter().map(|c| c.end).collect::<Vec<_>>(),
        "strand" => clusters.iter().map(|c| c.strand.to_string()).collect::<Vec<_>>(),
        "reads" => clusters.iter().map(|c| c.reads).collect::<Vec<_>>(),
        "length" => clusters.iter().map(|c| c.length as u64).collect::<Vec<_>>(),
        "seq" => clusters.iter().map(|c| c.seq.as_str()).collect::<Vec<_>>(),
        "pair" => clusters.iter().map(|c| c.pair).collect::<Vec<_>>(),
    )
}

pub fn write_clusters(path: &Path, clusters: &[Cluster]) -> Result<()> {
    let mut df = cluster_table(clusters)?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    info!("Wrote {} clusters to {}", clusters.len(), path.display());
    Ok(())
}

pub fn write_summary(path: &Path, summary: &DiscoverySummary) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}

/// Genomic span of the mature inside a record's precursor, 5' padding included.
fn padded_span(record: &NovelMirnaRecord, pad5: i64, pad3: i64) -> Option<(i64, i64)> {
    let offset = find_subseq(&record.precursor, &record.mature)? as i64;
    let len = record.mature.len() as i64;
    Some(match record.strand {
        Strand::Plus => (record.start + offset - pad5, record.start + offset + len + pad3),
        Strand::Minus => (record.end - offset - len - pad3, record.end - offset + pad5),
    })
}

/// `(id, sequence)` of every record's mature, padded with genomic flank where the genome
/// resolves it. Ids are `<species>-novel-<n>` from 1.
pub fn padded_matures(
    records: &[NovelMirnaRecord],
    genome: &dyn GenomeAccessor,
    pad5: i64,
    pad3: i64,
    species: &str,
) -> Vec<(String, String)> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let seq = padded_span(r, pad5, pad3)
                .and_then(|(start, end)| genome.sequence(&r.chrom, start, end, r.strand))
                .unwrap_or_else(|| r.mature.clone());
            (format!("{}-novel-{}", species, i + 1), seq)
        })
        .collect()
}

pub fn write_mature_fasta(path: &Path, matures: &[(String, String)]) -> Result<()> {
    let mut writer = fasta::Writer::to_file(path)?;
    for (id, seq) in matures {
        writer.write(id, None, seq.as_bytes())?;
    }
    writer.flush()?;
    info!("Wrote {} mature sequences to {}", matures.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::genome::FastaGenome;
    use crate::models::MatureCheck;

    fn record(strand: Strand, precursor: &str, mature: &str, start: i64) -> NovelMirnaRecord {
        NovelMirnaRecord {
            precursor: precursor.into(),
            mature: mature.into(),
            star: None,
            seed: mature[2..8].into(),
            score: 0.97,
            mfe: -0.41,
            coords: format!("chr1:{}..{}:{}", start, start + precursor.len() as i64, strand),
            mature_reads: 120,
            star_reads: 0,
            mature_check: MatureCheck::Ok,
            chrom: "chr1".into(),
            start,
            end: start + precursor.len() as i64,
            strand,
        }
    }

    #[test]
    fn records_are_written_in_output_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("novel_mirna.csv");
        write_records(&path, &[record(Strand::Plus, "AAAACCCCGGGGTTTT", "CCCCGGGG", 10)]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("precursor,mature,star,seed,score,mfe,coords,mature_reads,star_reads,mature_check")
        );
        assert_eq!(
            lines.next(),
            Some("AAAACCCCGGGGTTTT,CCCCGGGG,,CCGGGG,0.97,-0.41,chr1:10..26:+,120,0,ok")
        );
    }

    #[test]
    fn matures_are_padded_on_the_transcribed_strand() {
        //                    0123456789012345678901234567890
        let genome = FastaGenome::from_records([("chr1", "TTTTTTTTTTAAAACCCCGGGGTTTTAAAAAA")]);
        let plus = record(Strand::Plus, "AAAACCCCGGGGTTTT", "CCCCGGGG", 10);
        let minus = record(Strand::Minus, "AAAACCCCGGGGTTTT", "CCCCGGGG", 10);
        let out = padded_matures(&[plus, minus], &genome, 3, 5, "hsa");
        assert_eq!(out[0], ("hsa-novel-1".to_string(), "AAACCCCGGGGTTTTA".to_string()));
        // minus precursor is the reverse complement of 10..26; mature at offset 4
        let expected = genome.sequence("chr1", 10 + 16 - 4 - 8 - 5, 10 + 16 - 4 + 3, Strand::Minus).unwrap();
        assert_eq!(out[1].1, expected);
        assert!(out[1].1.contains("CCCCGGGG"));
    }

    #[test]
    fn unresolvable_padding_falls_back_to_the_mature() {
        let genome = FastaGenome::from_records([("chr1", "CCCCGGGG")]);
        let r = record(Strand::Plus, "CCCCGGGG", "CCCCGGGG", 0);
        assert_eq!(padded_matures(&[r], &genome, 3, 5, "x")[0].1, "CCCCGGGG");
    }

    #[test]
    fn cluster_table_and_fasta_files() {
        let dir = tempfile::tempdir().unwrap();
        let clusters = vec![Cluster {
            cluster: 1,
            chrom: "chr1".into(),
            start: 5,
            end: 27,
            strand: Strand::Minus,
            reads: 100,
            length: 22,
            seq: "ACGT".into(),
            pair: Some(2),
            members: vec!["r1".into()],
        }];
        let df = cluster_table(&clusters).unwrap();
        assert_eq!(df.shape(), (1, 9));
        write_clusters(&dir.path().join("clusters.csv"), &clusters).unwrap();

        let fa = dir.path().join("novel.fa");
        write_mature_fasta(&fa, &[("x-novel-1".into(), "ACGT".into())]).unwrap();
        assert_eq!(std::fs::read_to_string(&fa).unwrap(), ">x-novel-1\nACGT\n");
    }
}
