// src/defaults.rs

// Structural Constants
pub const NUM_READS_PER_PAIR: usize = 2;
pub const NUM_DIRECTIONS: usize = 2;
pub const NUM_SET_PAIRS: usize = 2;

/// Extra genome bases fetched past the read end so deletions can be scored.
pub const MAX_K: usize = 32;

/// Two hits of the same seed within this distance count as the same location
/// when deriving the best-possible-score lower bound.
pub const MAX_MERGE_DISTANCE: u32 = 31;

/// Pair alignments whose both ends lie within this many bases of a merge
/// anchor are treated as duplicates of one another.
pub const MERGE_CLUSTER_RADIUS: u64 = 50;

// Scoring Constants
pub const MATCH_REWARD: i32 = 1;
pub const SUB_PENALTY: i32 = 4;
pub const GAP_OPEN_PENALTY: i32 = 6;
pub const GAP_EXTEND_PENALTY: i32 = 1;

/// Prior probability that any reference base differs from the sample.
pub const SNP_PROB: f64 = 0.001;

/// Per-base probability charged for each inserted or deleted base.
pub const INDEL_PROB: f64 = 0.0001;

// Aligner Defaults
pub const MAX_READ_SIZE: u32 = 400;
pub const MAX_HITS: u32 = 300;
pub const MAX_K_DEFAULT: i32 = 14;
pub const SEED_COVERAGE: f64 = 4.0;
pub const MIN_SPACING: u32 = 50;
pub const MAX_SPACING: u32 = 1000;
pub const MAX_BIG_HITS: u32 = 2048;
pub const EXTRA_SEARCH_DEPTH: i32 = 2;
pub const MAX_CANDIDATE_POOL_SIZE: u32 = 1_000_000;
pub const MAX_SCORE_GAP_TO_PREFER_NON_ALT: i32 = 3;

/// Once the (unnormalized) sum of pair probabilities reaches this value the
/// MAPQ is pinned at zero, so scoring can stop early.
pub const PROBABILITY_OF_ALL_PAIRS_SATURATION: f64 = 4.9;
