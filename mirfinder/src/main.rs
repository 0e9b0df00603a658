use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mirfinder::config::write_default_config;
use mirfinder::data_handling::training_sets::{
    default_classifier_provider, negative_features, training_features, CodingDecoys, KnownPrecursors, TrainingLabel,
};
use mirfinder::data_handling::{filter_by_length, reads_from_frame, AlignedReadsTable, FastaGenome};
use mirfinder::helper_functions::{read_csv, resolve_path};
use mirfinder::logistic_model::{cross_validate, DEFAULT_L2};
use mirfinder::models::Dataset;
use mirfinder::output::{padded_matures, write_clusters, write_mature_fasta, write_records, write_summary};
use mirfinder::prediction_tools::{PrecomputedFolds, RnaFold, StructurePredictor};
use mirfinder::structure::features::{feature_table, StructureFeatureExtractor};
use mirfinder::{find_mirnas, ClassifierProvider, DiscoveryConfig, PrecursorClassifier};

#[derive(Debug, Parser)]
#[command(name = "mirfinder", version, about = "Novel miRNA discovery from aligned small RNA reads")]
struct Args {
    #[arg(short = 'c', long = "config", value_name = "PATH", help = "JSON configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long = "folds",
        value_name = "PATH",
        help = "CSV of precomputed folds (sequence,structure,mfe) used instead of RNAfold"
    )]
    folds: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Find novel miRNAs in a table of aligned reads
    Discover {
        #[arg(short = 'r', long = "reads", value_name = "PATH")]
        reads: PathBuf,
        #[arg(short = 'g', long = "genome", value_name = "PATH")]
        genome: PathBuf,
        #[arg(short = 'o', long = "out", value_name = "DIR", default_value = "results")]
        out: PathBuf,
        #[arg(short = 'm', long = "model", value_name = "PATH", help = "Saved classifier JSON")]
        model: Option<PathBuf>,
        #[arg(long = "score-cutoff", value_name = "FLOAT")]
        score_cutoff: Option<f64>,
        #[arg(long = "strict", action = ArgAction::SetTrue)]
        strict: bool,
    },
    /// Train and save the precursor classifier
    Train {
        #[arg(short = 'p', long = "positives", value_name = "PATH")]
        positives: PathBuf,
        #[arg(short = 'n', long = "negatives", value_name = "PATH", conflicts_with = "cds")]
        negatives: Option<PathBuf>,
        #[arg(long = "cds", value_name = "PATH", help = "Coding sequence FASTA to cut decoys from")]
        cds: Option<PathBuf>,
        #[arg(short = 'o', long = "out", value_name = "PATH", default_value = "precursor_classifier.json")]
        out: PathBuf,
        #[arg(long = "cv-folds", value_name = "N", default_value_t = 5)]
        cv_folds: usize,
    },
    /// Write the default configuration file
    InitConfig {
        #[arg(value_name = "PATH", default_value = "mirfinder.json")]
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<DiscoveryConfig> {
    match path {
        Some(p) => DiscoveryConfig::from_json(&resolve_path(p)).with_context(|| format!("loading config {}", p.display())),
        None => Ok(DiscoveryConfig::default()),
    }
}

fn predictor(folds: Option<&Path>) -> Result<Arc<dyn StructurePredictor>> {
    let predictor: Arc<dyn StructurePredictor> = match folds {
        Some(p) => Arc::new(PrecomputedFolds::from_csv(&resolve_path(p))?),
        None => Arc::new(RnaFold::from_path()?),
    };
    Ok(predictor)
}

fn run_discover(
    config: DiscoveryConfig,
    predictor: Arc<dyn StructurePredictor>,
    reads: &Path,
    genome: &Path,
    out: &Path,
    model: Option<&Path>,
) -> Result<()> {
    let table = AlignedReadsTable {
        path: resolve_path(reads),
    };
    let reads = reads_from_frame(&table.load()?)?;
    let reads = filter_by_length(reads, config.min_read_length, config.max_read_length)?;
    let genome = FastaGenome::from_path(&resolve_path(genome)).context("loading reference genome")?;

    let provider = match model {
        Some(p) => ClassifierProvider::with_model(PrecursorClassifier::load(&resolve_path(p))?),
        None => default_classifier_provider(&config, Arc::clone(&predictor)),
    };
    config.validate()?;

    let discovery = find_mirnas(&reads, &genome, predictor.as_ref(), &provider, &config)?;
    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    write_clusters(&out.join("clusters.csv"), &discovery.clusters)?;
    write_summary(&out.join("summary.json"), &discovery.summary)?;

    if discovery.records.is_empty() {
        warn!("could not find any novel miRNAs at this score cutoff");
        return Ok(());
    }
    write_records(&out.join("novel_mirna.csv"), &discovery.records)?;
    let matures = padded_matures(&discovery.records, &genome, config.pad5, config.pad3, &config.species);
    write_mature_fasta(&out.join("novel.fa"), &matures)?;
    Ok(())
}

fn run_train(
    config: &DiscoveryConfig,
    predictor: &dyn StructurePredictor,
    positives: &Path,
    negatives: Option<&Path>,
    cds: Option<&Path>,
    out: &Path,
    cv_folds: usize,
) -> Result<()> {
    let extractor = StructureFeatureExtractor::new(predictor, config.mature_seed);
    let known = KnownPrecursors {
        path: resolve_path(positives),
    }
    .load()?;
    let pos = training_features(&known, TrainingLabel::Positive, &extractor, config.mature_seed)?;

    let neg = match (negatives, cds) {
        (_, Some(cds)) => {
            let fragments = CodingDecoys::new(resolve_path(cds)).fragments()?;
            feature_table(&negative_features(&fragments, &extractor, config.mature_seed))?
        }
        (Some(p), None) => {
            let table = read_csv(&resolve_path(p))?;
            training_features(&table, TrainingLabel::Negative, &extractor, config.mature_seed)?
        }
        (None, None) => anyhow::bail!("either --negatives or --cds is required"),
    };

    if cv_folds >= 2 {
        let aucs = cross_validate(&pos, &neg, cv_folds, config.mature_seed, DEFAULT_L2)?;
        if !aucs.is_empty() {
            let mean = aucs.iter().sum::<f64>() / aucs.len() as f64;
            info!("mean AUROC over {} folds: {:.3}", aucs.len(), mean);
        }
    }

    let model = PrecursorClassifier::train(&pos, &neg, DEFAULT_L2)?;
    model.save(out)?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!("Starting mirfinder");

    match args.command {
        Command::InitConfig { path } => {
            if !write_default_config(&path)? {
                info!("{} already exists", path.display());
            }
        }
        Command::Discover {
            reads,
            genome,
            out,
            model,
            score_cutoff,
            strict,
        } => {
            let mut config = load_config(args.config.as_deref())?;
            if let Some(cutoff) = score_cutoff {
                config.score_cutoff = cutoff;
            }
            config.strict |= strict;
            let predictor = predictor(args.folds.as_deref())?;
            run_discover(config, predictor, &reads, &genome, &out, model.as_deref())?;
        }
        Command::Train {
            positives,
            negatives,
            cds,
            out,
            cv_folds,
        } => {
            let config = load_config(args.config.as_deref())?;
            let predictor = predictor(args.folds.as_deref())?;
            run_train(
                &config,
                predictor.as_ref(),
                &positives,
                negatives.as_deref(),
                cds.as_deref(),
                &out,
                cv_folds,
            )?;
        }
    }
    Ok(())
}
