// src/adjust.rs
//
// Post-scoring alignment adjustment. The candidate machinery works in
// genome-wide coordinates and does not know about contig boundaries; an
// alignment whose span leaves its contig (or the genome) is not reportable,
// so this pass withdraws it. Runs over the primary and every secondary
// result unless the caller disabled adjustments.

use crate::genome::Genome;
use crate::paired::{AlignmentStatus, PairedAlignmentResult};
use crate::read::Read;

pub struct AlignmentAdjuster<'g> {
    genome: &'g Genome,
}

impl<'g> AlignmentAdjuster<'g> {
    pub fn new(genome: &'g Genome) -> AlignmentAdjuster<'g> {
        AlignmentAdjuster { genome }
    }

    /// Withdraw any end of the pair whose aligned span crosses a contig
    /// boundary or runs off the genome.
    pub fn adjust_alignments(&self, reads: [&Read; 2], result: &mut PairedAlignmentResult) {
        for which_read in 0..2 {
            if result.status[which_read] == AlignmentStatus::NotFound {
                continue;
            }

            let aligned_span = (reads[which_read].len() as i64
                - result.bases_clipped_before[which_read] as i64
                - result.bases_clipped_after[which_read] as i64)
                .max(0) as u64;

            if !self
                .genome
                .range_within_one_contig(result.location[which_read], aligned_span)
            {
                log::debug!(
                    "withdrawing read {} aligned at {}: span of {} leaves its contig",
                    which_read,
                    result.location[which_read],
                    aligned_span
                );
                result.status[which_read] = AlignmentStatus::NotFound;
                result.mapq[which_read] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paired::Direction;

    fn genome() -> Genome {
        Genome::from_contigs(vec![
            ("c1", vec![b'A'; 100], false),
            ("c2", vec![b'C'; 100], false),
        ])
    }

    fn aligned_at(location: u64) -> PairedAlignmentResult {
        let mut result = PairedAlignmentResult::default();
        for r in 0..2 {
            result.status[r] = AlignmentStatus::SingleHit;
            result.location[r] = location;
            result.direction[r] = Direction::Forward;
            result.score[r] = 0;
            result.mapq[r] = 70;
        }
        result
    }

    #[test]
    fn test_within_contig_is_untouched() {
        let genome = genome();
        let read = Read::with_uniform_quality("r", vec![b'A'; 50], b'I');
        let mut result = aligned_at(10);
        AlignmentAdjuster::new(&genome).adjust_alignments([&read, &read], &mut result);
        assert_eq!(result.status[0], AlignmentStatus::SingleHit);
    }

    #[test]
    fn test_contig_crossing_is_withdrawn() {
        let genome = genome();
        let read = Read::with_uniform_quality("r", vec![b'A'; 50], b'I');
        let mut result = aligned_at(80); // 80 + 50 crosses into c2
        AlignmentAdjuster::new(&genome).adjust_alignments([&read, &read], &mut result);
        assert_eq!(result.status[0], AlignmentStatus::NotFound);
        assert_eq!(result.mapq[0], 0);
    }

    #[test]
    fn test_clipping_shrinks_the_span() {
        let genome = genome();
        let read = Read::with_uniform_quality("r", vec![b'A'; 50], b'I');
        let mut result = aligned_at(80);
        result.bases_clipped_after = [40, 40];
        AlignmentAdjuster::new(&genome).adjust_alignments([&read, &read], &mut result);
        assert_eq!(result.status[0], AlignmentStatus::SingleHit);
    }
}
