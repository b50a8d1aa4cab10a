// Scoring kernels: capped edit distance, affine-gap (Gotoh) with banded
// fallback, and mapping quality. All of them are pure with respect to the
// genome; the structs only carry reusable scratch storage.

pub mod affine_gap;
pub mod edit_distance;
pub mod mapq;

pub use affine_gap::{AffineGapPenalties, AffineGapResult, AffineGapScorer};
pub use edit_distance::{EditDistanceResult, EditDistanceScorer};
pub use mapq::{compute_mapq, MAPQ_LIMIT_FOR_SINGLE_HIT, MAX_MAPQ};

/// Score reported when a location could not be aligned within its limit.
pub const SCORE_ABOVE_LIMIT: i32 = -1;
