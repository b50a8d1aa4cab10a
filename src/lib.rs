pub mod adjust;
pub mod batch;
pub mod config;
pub mod defaults;
pub mod genome;
pub mod index; // Seed packing and the genome-wide posting lists
pub mod paired; // The intersection-driven paired-end aligner core
pub mod read;
pub mod scoring; // Edit-distance, affine-gap, and MAPQ kernels

pub use config::AlignerConfig;
pub use genome::{Genome, GenomeLocation, INVALID_GENOME_LOCATION};
pub use index::SeedIndex;
pub use paired::{
    AlignmentStatus, Direction, IntersectingPairedEndAligner, PairedAlignmentResult,
};
pub use read::Read;
