// src/batch.rs
//
// Data-parallel driver over independent aligner instances. One align call
// is single-threaded and non-suspending; throughput comes from running one
// aligner per worker against the shared read-only index and genome.

use rayon::prelude::*;

use crate::config::AlignerConfig;
use crate::genome::Genome;
use crate::index::SeedIndex;
use crate::paired::{IntersectingPairedEndAligner, PairedAlignmentResult};
use crate::read::Read;

/// Align a batch of read pairs, primary results only. Each rayon worker
/// builds its own aligner; the index and genome are shared read-only.
pub fn align_pairs(
    index: &SeedIndex,
    genome: &Genome,
    config: &AlignerConfig,
    pairs: &[(Read, Read)],
) -> Vec<PairedAlignmentResult> {
    pairs
        .par_iter()
        .map_init(
            || IntersectingPairedEndAligner::new(index, genome, config),
            |aligner, (read0, read1)| {
                let mut result = PairedAlignmentResult::default();
                let mut first_alt_result = PairedAlignmentResult::default();
                let mut n_secondary_results = 0;

                // No secondary collection, so align cannot report a
                // too-small buffer.
                let ok = aligner.align(
                    read0,
                    read1,
                    &mut result,
                    &mut first_alt_result,
                    -1,
                    &mut n_secondary_results,
                    &mut [],
                    0,
                );
                debug_assert!(ok);

                result
            },
        )
        .collect()
}
