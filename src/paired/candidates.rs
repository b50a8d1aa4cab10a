// src/paired/candidates.rs
//
// Candidate bookkeeping for the scoring phase: candidate records for both
// sides of a set pair, near-duplicate merge anchors, and the running
// best/probability state kept separately for all alignments and for
// non-ALT alignments.
//
// Candidates live in flat pools owned by the aligner; cross-references are
// pool indices with a u32::MAX sentinel, so nothing here holds a borrow.

use crate::genome::{genome_location_is_within, GenomeLocation, INVALID_GENOME_LOCATION};
use crate::paired::{AlignmentStatus, Direction, PairedAlignmentResult};
use crate::scoring::{compute_mapq, MAPQ_LIMIT_FOR_SINGLE_HIT};

/// Sentinel pool index.
pub(crate) const NONE: u32 = u32::MAX;

/// Sentinel for "no alignment found yet" pair scores; far above any real
/// edit distance but safe to add small gaps to.
pub(crate) const TOO_BIG_SCORE_VALUE: i32 = 0x7fff;

/// Lazily evaluated score of a mate candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MateScore {
    NotYetScored,
    /// Scoring failed under `score_limit`; retrying is only useful with a
    /// higher limit.
    AboveLimit,
    Scored(i32),
}

/// A candidate location for the read with more hits, scored lazily and
/// cached together with the limit it was scored under.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScoringMateCandidate {
    pub more_hits_genome_location: GenomeLocation,
    pub seed_offset: u32,
    pub best_possible_score: i32,
    pub score: MateScore,
    pub score_limit: i32,
    pub match_probability: f64,
    pub genome_offset: i64,
    pub used_affine_gap_scoring: bool,
    pub bases_clipped_before: i32,
    pub bases_clipped_after: i32,
    pub ag_score: i32,
}

impl ScoringMateCandidate {
    pub fn new(
        more_hits_genome_location: GenomeLocation,
        best_possible_score: i32,
        seed_offset: u32,
    ) -> ScoringMateCandidate {
        ScoringMateCandidate {
            more_hits_genome_location,
            seed_offset,
            best_possible_score,
            score: MateScore::NotYetScored,
            score_limit: -1,
            match_probability: 0.0,
            genome_offset: 0,
            used_affine_gap_scoring: false,
            bases_clipped_before: 0,
            bases_clipped_after: 0,
            ag_score: 0,
        }
    }
}

/// A candidate location for the read with fewer hits, queued by its
/// best-possible pair score.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScoringCandidate {
    pub fewer_hits_genome_location: GenomeLocation,
    pub seed_offset: u32,
    pub which_set_pair: u8,
    /// Index of the lowest-location mate candidate within spacing range.
    pub scoring_mate_candidate_index: u32,
    pub best_possible_score: i32,
    /// Next candidate in the same best-possible-score bucket.
    pub score_list_next: u32,
    /// Merge-anchor pool index, NONE until the candidate joins a cluster.
    pub merge_anchor: u32,
}

/// Representative of a cluster of near-duplicate pair alignments: any pair
/// whose both ends land within `MERGE_CLUSTER_RADIUS` of the anchor is the
/// same alignment, possibly shifted by indels.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MergeAnchor {
    pub location_for_read_with_more_hits: GenomeLocation,
    pub location_for_read_with_fewer_hits: GenomeLocation,
    pub match_probability: f64,
    pub pair_score: i32,
    merge_radius: u64,
}

impl MergeAnchor {
    pub fn new(
        location_for_read_with_more_hits: GenomeLocation,
        location_for_read_with_fewer_hits: GenomeLocation,
        match_probability: f64,
        pair_score: i32,
        merge_radius: u64,
    ) -> MergeAnchor {
        MergeAnchor {
            location_for_read_with_more_hits,
            location_for_read_with_fewer_hits,
            match_probability,
            pair_score,
            merge_radius,
        }
    }

    fn does_range_match(
        &self,
        new_more_hit_location: GenomeLocation,
        new_fewer_hit_location: GenomeLocation,
    ) -> bool {
        genome_location_is_within(
            self.location_for_read_with_more_hits,
            new_more_hit_location,
            self.merge_radius,
        ) && genome_location_is_within(
            self.location_for_read_with_fewer_hits,
            new_fewer_hit_location,
            self.merge_radius,
        )
    }

    /// Offer a new pair alignment to the cluster. Returns
    /// `(eliminated, old_match_probability)`:
    ///
    /// - outside the cluster range: the anchor re-seats on the new pair and
    ///   nothing is eliminated;
    /// - inside with a strictly higher match probability: the new pair
    ///   replaces the representative, whose probability is handed back so
    ///   the caller can subtract it from its running sum;
    /// - inside but not better: the new pair is eliminated.
    ///
    /// Replacement is decided by match probability alone, not pair score;
    /// which duplicate survives feeds straight into MAPQ.
    pub fn check_merge(
        &mut self,
        new_more_hit_location: GenomeLocation,
        new_fewer_hit_location: GenomeLocation,
        new_match_probability: f64,
        new_pair_score: i32,
    ) -> (bool, f64) {
        if self.location_for_read_with_more_hits == INVALID_GENOME_LOCATION
            || !self.does_range_match(new_more_hit_location, new_fewer_hit_location)
        {
            self.location_for_read_with_more_hits = new_more_hit_location;
            self.location_for_read_with_fewer_hits = new_fewer_hit_location;
            self.match_probability = new_match_probability;
            self.pair_score = new_pair_score;
            (false, 0.0)
        } else if new_match_probability > self.match_probability {
            let old_match_probability = self.match_probability;
            log::trace!(
                "merge replacement at anchor ({}, {}): probability {:e} -> {:e}, score {} -> {}",
                self.location_for_read_with_more_hits,
                self.location_for_read_with_fewer_hits,
                self.match_probability,
                new_match_probability,
                self.pair_score,
                new_pair_score
            );
            self.match_probability = new_match_probability;
            self.pair_score = new_pair_score;
            (false, old_match_probability)
        } else {
            (true, 0.0)
        }
    }
}

/// One end of a scored pair, ready to be recorded as a best or secondary
/// result.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PairHit {
    pub location: GenomeLocation,
    pub direction: Direction,
    pub score: i32,
    pub used_affine_gap_scoring: bool,
    pub bases_clipped_before: i32,
    pub bases_clipped_after: i32,
    pub ag_score: i32,
}

impl Default for PairHit {
    fn default() -> Self {
        PairHit {
            location: INVALID_GENOME_LOCATION,
            direction: Direction::Forward,
            score: -1,
            used_affine_gap_scoring: false,
            bases_clipped_before: 0,
            bases_clipped_after: 0,
            ag_score: -1,
        }
    }
}

/// Running best-pair state and probability sums. Two instances exist per
/// align call: one over everything, one restricted to non-ALT locations.
#[derive(Debug, Clone)]
pub(crate) struct ScoreSet {
    pub best_pair_score: i32,
    pub probability_of_best_pair: f64,
    pub probability_of_all_pairs: f64,
    pub best_result_genome_location: [GenomeLocation; 2],
    pub best_result_direction: [Direction; 2],
    pub best_result_score: [i32; 2],
    pub best_result_used_affine_gap_scoring: [bool; 2],
    pub best_result_bases_clipped_before: [i32; 2],
    pub best_result_bases_clipped_after: [i32; 2],
    pub best_result_ag_score: [i32; 2],
}

impl ScoreSet {
    pub fn new() -> ScoreSet {
        ScoreSet {
            best_pair_score: TOO_BIG_SCORE_VALUE,
            probability_of_best_pair: 0.0,
            probability_of_all_pairs: 0.0,
            best_result_genome_location: [INVALID_GENOME_LOCATION; 2],
            best_result_direction: [Direction::Forward; 2],
            best_result_score: [-1; 2],
            best_result_used_affine_gap_scoring: [false; 2],
            best_result_bases_clipped_before: [0; 2],
            best_result_bases_clipped_after: [0; 2],
            best_result_ag_score: [-1; 2],
        }
    }

    /// Back out the probability of a merged-away result. The clamp matters:
    /// a + b - b is not necessarily a in floating point.
    pub fn update_probability_of_all_pairs(&mut self, old_pair_probability: f64) {
        self.probability_of_all_pairs =
            (self.probability_of_all_pairs - old_pair_probability).max(0.0);
    }

    /// Accumulate a surviving pair and take it as the new best when its
    /// probability beats the current best. Returns whether the best moved.
    pub fn update_best_hit_if_needed(
        &mut self,
        pair_score: i32,
        pair_probability: f64,
        hits: &[PairHit; 2],
    ) -> bool {
        self.probability_of_all_pairs += pair_probability;

        if pair_probability > self.probability_of_best_pair {
            self.best_pair_score = pair_score;
            self.probability_of_best_pair = pair_probability;
            for which_read in 0..2 {
                let hit = &hits[which_read];
                self.best_result_genome_location[which_read] = hit.location;
                self.best_result_direction[which_read] = hit.direction;
                self.best_result_score[which_read] = hit.score;
                self.best_result_used_affine_gap_scoring[which_read] =
                    hit.used_affine_gap_scoring;
                self.best_result_bases_clipped_before[which_read] = hit.bases_clipped_before;
                self.best_result_bases_clipped_after[which_read] = hit.bases_clipped_after;
                self.best_result_ag_score[which_read] = hit.ag_score;
            }
            true
        } else {
            false
        }
    }

    /// Copy the best pair into a result, computing MAPQ from the
    /// probability ratio.
    pub fn fill_in_result(
        &self,
        result: &mut PairedAlignmentResult,
        popular_seeds_skipped: &[u32; 2],
    ) {
        for which_read in 0..2 {
            result.location[which_read] = self.best_result_genome_location[which_read];
            result.direction[which_read] = self.best_result_direction[which_read];
            result.mapq[which_read] = compute_mapq(
                self.probability_of_all_pairs,
                self.probability_of_best_pair,
                self.best_result_score[which_read],
                popular_seeds_skipped[0] + popular_seeds_skipped[1],
            );
            result.status[which_read] = if result.mapq[which_read] > MAPQ_LIMIT_FOR_SINGLE_HIT {
                AlignmentStatus::SingleHit
            } else {
                AlignmentStatus::MultipleHits
            };
            result.score[which_read] = self.best_result_score[which_read];
            result.clipping_for_read_adjustment[which_read] = 0;
            result.used_affine_gap_scoring[which_read] =
                self.best_result_used_affine_gap_scoring[which_read];
            result.bases_clipped_before[which_read] =
                self.best_result_bases_clipped_before[which_read];
            result.bases_clipped_after[which_read] =
                self.best_result_bases_clipped_after[which_read];
            result.ag_score[which_read] = self.best_result_ag_score[which_read];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_anchor_replaces_on_higher_probability() {
        let mut anchor = MergeAnchor::new(1000, 1300, 1e-5, 3, 50);

        // Same cluster, better probability: replaced, old handed back.
        let (eliminated, old) = anchor.check_merge(1010, 1310, 1e-3, 2);
        assert!(!eliminated);
        assert_eq!(old, 1e-5);
        assert_eq!(anchor.match_probability, 1e-3);
        assert_eq!(anchor.pair_score, 2);
    }

    #[test]
    fn test_merge_anchor_eliminates_worse_duplicate() {
        let mut anchor = MergeAnchor::new(1000, 1300, 1e-3, 2, 50);
        let (eliminated, old) = anchor.check_merge(1020, 1280, 1e-6, 1);
        assert!(eliminated);
        assert_eq!(old, 0.0);
        // A lower score but worse probability must NOT replace.
        assert_eq!(anchor.pair_score, 2);
    }

    #[test]
    fn test_merge_anchor_reseats_outside_range() {
        let mut anchor = MergeAnchor::new(1000, 1300, 1e-3, 2, 50);
        let (eliminated, old) = anchor.check_merge(5000, 5300, 1e-7, 9);
        assert!(!eliminated);
        assert_eq!(old, 0.0);
        assert_eq!(anchor.location_for_read_with_more_hits, 5000);
    }

    #[test]
    fn test_probability_subtraction_clamps_to_zero() {
        let mut scores = ScoreSet::new();
        scores.probability_of_all_pairs = 1e-300;
        scores.update_probability_of_all_pairs(1.0);
        assert_eq!(scores.probability_of_all_pairs, 0.0);
    }

    #[test]
    fn test_best_hit_update() {
        let mut scores = ScoreSet::new();
        let hit = PairHit {
            location: 1000,
            direction: Direction::Forward,
            score: 1,
            ..PairHit::default()
        };
        assert!(scores.update_best_hit_if_needed(2, 1e-4, &[hit, hit]));
        assert_eq!(scores.best_pair_score, 2);

        // An equal-probability pair accumulates but does not displace.
        assert!(!scores.update_best_hit_if_needed(2, 1e-4, &[hit, hit]));
        assert_eq!(scores.probability_of_all_pairs, 2e-4);
        assert_eq!(scores.probability_of_best_pair, 1e-4);
    }
}
