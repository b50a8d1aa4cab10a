// src/config.rs
//
// Aligner options structure. One instance configures one aligner; the
// aligner copies what it needs at construction, so a config can be shared
// across threads building independent aligners.

use crate::defaults;

/// Options controlling candidate discovery and scoring.
#[derive(Debug, Clone)]
pub struct AlignerConfig {
    // Read / seed parameters
    pub max_read_size: u32, // Reads longer than this are a configuration error
    pub max_hits: u32,      // Per-lookup hit ceiling; the paired core gates on max_big_hits
    pub num_seeds_from_command_line: u32, // 0 = derive from seed_coverage
    pub seed_coverage: f64, // Target seed bases per read base when deriving seed count

    // Pairing parameters
    pub min_spacing: u32, // Minimum distance to allow between the two ends
    pub max_spacing: u32, // Maximum distance to allow between the two ends

    // Search parameters
    pub max_k: i32,             // Maximum edit distance for a reportable end
    pub max_big_hits: u32,      // Seeds with at least this many hits are skipped as too popular
    pub extra_search_depth: i32, // Extra edit distance explored beyond the best found
    pub max_candidate_pool_size: u32,
    pub max_secondary_alignments_per_contig: i32, // 0 = unlimited

    // Behavior flags
    pub no_ukkonen: bool,            // Disable score-limit pruning in the scorer
    pub no_ordered_evaluation: bool, // Put every candidate in bucket 0
    pub no_truncation: bool,         // Treat every best-possible-score as 0
    pub use_affine_gap: bool,
    pub ignore_alignment_adjustments_for_om: bool,

    // ALT handling
    pub alt_awareness: bool,
    pub max_score_gap_to_prefer_non_alt_alignment: i32,

    // Affine-gap penalties
    pub match_reward: i32,
    pub sub_penalty: i32,
    pub gap_open_penalty: i32,
    pub gap_extend_penalty: i32,

    /// Unnormalized pair-probability sum at which MAPQ saturates to zero and
    /// scoring stops early (only when secondary collection is off).
    pub probability_of_all_pairs_saturation: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        AlignerConfig {
            max_read_size: defaults::MAX_READ_SIZE,
            max_hits: defaults::MAX_HITS,
            num_seeds_from_command_line: 0,
            seed_coverage: defaults::SEED_COVERAGE,

            min_spacing: defaults::MIN_SPACING,
            max_spacing: defaults::MAX_SPACING,

            max_k: defaults::MAX_K_DEFAULT,
            max_big_hits: defaults::MAX_BIG_HITS,
            extra_search_depth: defaults::EXTRA_SEARCH_DEPTH,
            max_candidate_pool_size: defaults::MAX_CANDIDATE_POOL_SIZE,
            max_secondary_alignments_per_contig: 0,

            no_ukkonen: false,
            no_ordered_evaluation: false,
            no_truncation: false,
            use_affine_gap: true,
            ignore_alignment_adjustments_for_om: false,

            alt_awareness: true,
            max_score_gap_to_prefer_non_alt_alignment: defaults::MAX_SCORE_GAP_TO_PREFER_NON_ALT,

            match_reward: defaults::MATCH_REWARD,
            sub_penalty: defaults::SUB_PENALTY,
            gap_open_penalty: defaults::GAP_OPEN_PENALTY,
            gap_extend_penalty: defaults::GAP_EXTEND_PENALTY,

            probability_of_all_pairs_saturation: defaults::PROBABILITY_OF_ALL_PAIRS_SATURATION,
        }
    }
}

impl AlignerConfig {
    /// Number of seeds to use for a read of `read_len` bases.
    pub fn max_seeds_for_read_len(&self, read_len: usize, seed_len: usize) -> usize {
        if self.num_seeds_from_command_line != 0 {
            self.num_seeds_from_command_line as usize
        } else {
            (read_len as f64 * self.seed_coverage / seed_len as f64) as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_seed_count() {
        let config = AlignerConfig::default();
        // 100bp read, 16bp seeds, coverage 4.0 => 25 seeds
        assert_eq!(config.max_seeds_for_read_len(100, 16), 25);
    }

    #[test]
    fn test_command_line_seed_count_wins() {
        let config = AlignerConfig {
            num_seeds_from_command_line: 8,
            ..AlignerConfig::default()
        };
        assert_eq!(config.max_seeds_for_read_len(100, 16), 8);
    }
}
