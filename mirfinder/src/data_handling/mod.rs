pub mod aligned_reads;
pub mod genome;
pub mod training_sets;

pub use aligned_reads::{filter_by_length, reads_from_frame, AlignedReadsTable};
pub use genome::{FastaGenome, GenomeAccessor};
pub use training_sets::{default_classifier_provider, train_default_classifier, CodingDecoys, KnownPrecursors};
