pub mod bulge_graph;
pub mod features;
pub mod star;

pub use bulge_graph::{BulgeGraph, HairpinLoop, StructureError};
pub use features::{feature_names, feature_table, FeatureVector, StructureFeatureExtractor};
pub use star::{check_mature, estimate_star};
