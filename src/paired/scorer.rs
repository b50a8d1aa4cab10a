// src/paired/scorer.rs
//
// Scores one candidate location for one end of the pair. The work splits at
// the seed that produced the candidate: the tail past the seed is scored
// forward, the head before it backward against reversed copies of read and
// genome, so arbitrary indel drift at either end costs only two capped
// passes instead of a full start-shift search.
//
// When the edit-distance answer carries enough errors that an affine-gap
// interpretation could disagree, both halves are rescored with the Gotoh
// kernel (banded when the fragment is long relative to the limit).

use crate::defaults::{MAX_K, NUM_DIRECTIONS, NUM_READS_PER_PAIR, SNP_PROB};
use crate::genome::{Genome, GenomeLocation};
use crate::paired::Direction;
use crate::read::reverse_into;
use crate::scoring::{AffineGapScorer, EditDistanceScorer};

/// A successfully scored location. A location that cannot be aligned within
/// its score limit produces no `ScoredLocation` at all.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScoredLocation {
    pub score: i32,
    pub match_probability: f64,
    /// Signed shift of the alignment start produced by indels (or clipping)
    /// in the head of the read.
    pub genome_offset: i64,
    pub used_affine_gap_scoring: bool,
    pub bases_clipped_before: i32,
    pub bases_clipped_after: i32,
    pub ag_score: i32,
}

/// Per-call scoring context: the reads in all four orientations plus the
/// reusable scoring kernels. Borrows are all disjoint fields of the
/// aligner, so the candidate pools stay independently mutable.
pub(crate) struct LocationScorer<'b> {
    pub genome: &'b Genome,
    pub edit_scorer: &'b mut EditDistanceScorer,
    pub affine_scorer: &'b mut AffineGapScorer,
    pub reversed_text_scratch: &'b mut Vec<u8>,

    pub data: [[&'b [u8]; NUM_DIRECTIONS]; NUM_READS_PER_PAIR],
    pub quality: [[&'b [u8]; NUM_DIRECTIONS]; NUM_READS_PER_PAIR],
    pub reversed_data: [[&'b [u8]; NUM_DIRECTIONS]; NUM_READS_PER_PAIR],
    /// Qualities of `reversed_data`, which are exactly the qualities of the
    /// opposite-direction read taken forward; no extra buffers needed.
    pub reversed_quality: [[&'b [u8]; NUM_DIRECTIONS]; NUM_READS_PER_PAIR],

    pub seed_len: usize,
    pub max_k: i32,
    pub extra_search_depth: i32,
    pub no_ukkonen: bool,
    pub use_affine_gap: bool,
    pub match_reward: i32,
    pub sub_penalty: i32,
    pub gap_open_penalty: i32,
    pub gap_extend_penalty: i32,

    pub n_locations_scored: u64,
}

impl<'b> LocationScorer<'b> {
    /// Largest edit distance for which edit-distance and affine-gap scoring
    /// report the same alignment: GapOpen + k*GapExtend >= k * SubPenalty.
    fn max_k_for_same_alignment(&self) -> i32 {
        if self.sub_penalty > self.gap_extend_penalty {
            self.gap_open_penalty / (self.sub_penalty - self.gap_extend_penalty)
        } else {
            i32::MAX
        }
    }

    pub fn score_location(
        &mut self,
        which_read: usize,
        direction: Direction,
        genome_location: GenomeLocation,
        seed_offset: usize,
        mut score_limit: i32,
    ) -> Option<ScoredLocation> {
        self.n_locations_scored += 1;

        if self.no_ukkonen {
            score_limit = self.max_k + self.extra_search_depth;
        }
        if score_limit < 0 {
            return None;
        }

        let dir = direction.index();
        let read_data = self.data[which_read][dir];
        let read_quality = self.quality[which_read][dir];
        let read_len = read_data.len();

        // Extra space past the read in case it has deletions.
        let genome_data_len = (read_len + MAX_K) as u64;
        let data = self.genome.substring(genome_location, genome_data_len)?;

        let tail_start = seed_offset + self.seed_len;
        debug_assert_eq!(
            &data[seed_offset..tail_start],
            &read_data[seed_offset..tail_start],
            "candidate's seed does not match the genome"
        );

        // Forward from the end of the seed.
        let forward = self.edit_scorer.compute_edit_distance(
            &data[tail_start..],
            &read_data[tail_start..],
            &read_quality[tail_start..],
            score_limit,
        )?;
        let mut score1 = forward.score;
        let mut match_prob1 = forward.match_probability;
        let mut ag_score1 = (self.seed_len as i32 + (read_len - tail_start) as i32 - score1)
            * self.match_reward
            - score1 * self.sub_penalty;

        // Backward from the start of the seed, on reversed copies. The text
        // reaches up to MAX_K bases before the candidate location so head
        // deletions can pull the alignment start left.
        let head_slack = MAX_K.min(genome_location as usize);
        let head = self.genome.substring(
            genome_location - head_slack as u64,
            (seed_offset + head_slack) as u64,
        )?;
        reverse_into(head, self.reversed_text_scratch);

        let reversed_pattern = &self.reversed_data[which_read][dir][read_len - seed_offset..];
        let reversed_quality = &self.reversed_quality[which_read][dir][read_len - seed_offset..];

        let backward = self.edit_scorer.compute_edit_distance(
            self.reversed_text_scratch,
            reversed_pattern,
            reversed_quality,
            score_limit - score1,
        )?;
        let mut score2 = backward.score;
        let mut match_prob2 = backward.match_probability;
        let mut genome_offset = backward.net_indel as i64;
        let mut ag_score2 =
            (seed_offset as i32 - score2) * self.match_reward - score2 * self.sub_penalty;

        let mut used_affine_gap_scoring = false;
        let mut bases_clipped_before = 0;
        let mut bases_clipped_after = 0;

        if self.use_affine_gap && score1 + score2 > self.max_k_for_same_alignment() {
            // Enough edits that gaps could explain the read better; redo
            // both halves with affine-gap scoring.
            used_affine_gap_scoring = true;
            score1 = 0;
            score2 = 0;
            ag_score1 = self.seed_len as i32 * self.match_reward;
            ag_score2 = 0;
            match_prob1 = 1.0;
            match_prob2 = 1.0;
            genome_offset = 0;

            if tail_start != read_len {
                let pattern = &read_data[tail_start..];
                let pattern_quality = &read_quality[tail_start..];
                let text = &data[tail_start..];

                let result = if pattern.len() as i32 >= 3 * (2 * score_limit + 1) {
                    self.affine_scorer.compute_score_banded(
                        text,
                        pattern,
                        pattern_quality,
                        score_limit,
                        self.seed_len,
                    )
                } else {
                    self.affine_scorer.compute_score(
                        text,
                        pattern,
                        pattern_quality,
                        score_limit,
                        self.seed_len,
                    )
                }?;

                score1 = result.score;
                match_prob1 = result.match_probability;
                ag_score1 = result.ag_score;
                bases_clipped_after = result.bases_clipped;
            }

            if seed_offset != 0 {
                let limit_left = score_limit - score1;
                let result = if seed_offset as i32 >= 3 * (2 * limit_left + 1) {
                    self.affine_scorer.compute_score_banded(
                        self.reversed_text_scratch,
                        reversed_pattern,
                        reversed_quality,
                        limit_left,
                        self.seed_len,
                    )
                } else {
                    self.affine_scorer.compute_score(
                        self.reversed_text_scratch,
                        reversed_pattern,
                        reversed_quality,
                        limit_left,
                        self.seed_len,
                    )
                }?;

                score2 = result.score;
                match_prob2 = result.match_probability;
                // Both halves charge the seed; count it once.
                ag_score2 = result.ag_score - self.seed_len as i32 * self.match_reward;
                genome_offset = result.net_indel as i64;
                bases_clipped_before = result.bases_clipped;
            }
        }

        let score = score1 + score2;
        debug_assert!(score <= score_limit);

        // Substring probabilities multiply; the seed's bases count too.
        let match_probability =
            match_prob1 * match_prob2 * (1.0 - SNP_PROB).powi(self.seed_len as i32);

        Some(ScoredLocation {
            score,
            match_probability,
            genome_offset,
            used_affine_gap_scoring,
            bases_clipped_before,
            bases_clipped_after,
            ag_score: ag_score1 + ag_score2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::AffineGapPenalties;

    // A scorer over a tiny genome with one read placed at location 100.
    fn scored(
        read: &[u8],
        genome_bases: Vec<u8>,
        location: GenomeLocation,
        seed_offset: usize,
        score_limit: i32,
    ) -> Option<ScoredLocation> {
        let genome = Genome::from_contigs(vec![("chr1", genome_bases, false)]);
        let quality = vec![b'I'; read.len()];
        let mut reversed = Vec::new();
        reverse_into(read, &mut reversed);
        let reversed_quality = vec![b'I'; read.len()];

        let mut edit_scorer = EditDistanceScorer::new();
        let mut affine_scorer = AffineGapScorer::new(AffineGapPenalties {
            match_reward: 1,
            sub_penalty: 4,
            gap_open_penalty: 6,
            gap_extend_penalty: 1,
        });
        let mut scratch = Vec::new();

        // Only the forward slot of read 0 is exercised.
        let empty: &[u8] = &[];
        let mut scorer = LocationScorer {
            genome: &genome,
            edit_scorer: &mut edit_scorer,
            affine_scorer: &mut affine_scorer,
            reversed_text_scratch: &mut scratch,
            data: [[read, empty], [empty, empty]],
            quality: [[&quality, empty], [empty, empty]],
            reversed_data: [[&reversed, empty], [empty, empty]],
            reversed_quality: [[&reversed_quality, empty], [empty, empty]],
            seed_len: 8,
            max_k: 14,
            extra_search_depth: 2,
            no_ukkonen: false,
            use_affine_gap: true,
            match_reward: 1,
            sub_penalty: 4,
            gap_open_penalty: 6,
            gap_extend_penalty: 1,
            n_locations_scored: 0,
        };

        scorer.score_location(0, Direction::Forward, location, seed_offset, score_limit)
    }

    fn padded_genome(read: &[u8], at: usize, total: usize) -> Vec<u8> {
        let mut bases = b"ACGT"
            .iter()
            .copied()
            .cycle()
            .take(total)
            .collect::<Vec<u8>>();
        bases[at..at + read.len()].copy_from_slice(read);
        bases
    }

    #[test]
    fn test_perfect_location() {
        let read = b"TTACGGATCCAAGGTTCCGGAATT";
        let genome = padded_genome(read, 100, 300);
        let result = scored(read, genome, 100, 4, 8).unwrap();
        assert_eq!(result.score, 0);
        assert_eq!(result.genome_offset, 0);
        assert_eq!(result.ag_score, read.len() as i32);
        assert!(!result.used_affine_gap_scoring);
    }

    #[test]
    fn test_mismatch_in_tail() {
        let read = b"TTACGGATCCAAGGTTCCGGAATT";
        let mut genome = padded_genome(read, 100, 300);
        genome[100 + 20] = b'A'; // read has T here
        let result = scored(read, genome, 100, 4, 8).unwrap();
        assert_eq!(result.score, 1);
        assert_eq!(result.genome_offset, 0);
        assert!(!result.used_affine_gap_scoring);
    }

    #[test]
    fn test_mismatch_in_head() {
        let read = b"TTACGGATCCAAGGTTCCGGAATT";
        let mut genome = padded_genome(read, 100, 300);
        genome[100 + 1] = b'G';
        let result = scored(read, genome, 100, 4, 8).unwrap();
        assert_eq!(result.score, 1);
    }

    #[test]
    fn test_head_deletion_shifts_genome_offset() {
        // The genome carries one extra base inside the read's head, so the
        // backward pass consumes nine genome bases for eight read bases and
        // the alignment start shifts one base left.
        let read = b"TTACGGATCCAAGGTTCCGGAATT";
        let mut genome = padded_genome(&[], 0, 300);
        genome[91..95].copy_from_slice(&read[0..4]); // TTAC
        genome[95] = b'T'; // the extra base
        genome[96..100].copy_from_slice(&read[4..8]); // GGAT
        genome[100..116].copy_from_slice(&read[8..24]); // seed + tail
        let result = scored(read, genome, 92, 8, 8).unwrap();
        assert_eq!(result.score, 1);
        assert_eq!(result.genome_offset, -1);
    }

    #[test]
    fn test_score_limit_respected() {
        let read = b"TTACGGATCCAAGGTTCCGGAATT";
        let mut genome = padded_genome(read, 100, 300);
        genome[100 + 20] = b'A';
        genome[100 + 21] = b'C';
        genome[100 + 22] = b'T';
        assert!(scored(read, genome, 100, 4, 1).is_none());
    }

    #[test]
    fn test_location_off_genome_end() {
        let read = b"TTACGGATCCAAGGTTCCGGAATT";
        let genome = padded_genome(read, 100, 130); // no MAX_K slack after the read
        assert!(scored(read, genome, 100, 4, 8).is_none());
    }
}
