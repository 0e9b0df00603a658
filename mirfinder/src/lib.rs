//! Novel miRNA discovery from genome-aligned small RNA reads.
//!
//! Reads are piled into clusters, neighbouring clusters are paired as mature/star, and
//! every locus is extended into candidate hairpins that are folded, featurised and scored
//! by a logistic precursor classifier.

pub mod clustering;
pub mod config;
pub mod data_handling;
pub mod error;
pub mod helper_functions;
pub mod logistic_model;
pub mod models;
pub mod novel;
pub mod output;
pub mod precursor;
pub mod prediction_tools;
pub mod structure;

pub use config::DiscoveryConfig;
pub use error::{MirnaError, Result};
pub use logistic_model::{ClassifierProvider, PrecursorClassifier};
pub use models::{AlignedRead, Cluster, NovelMirnaRecord, PrecursorCandidate, Strand};
pub use novel::{discover, find_mirnas, Discovery, DiscoverySummary, NovelMirnaSelector};
