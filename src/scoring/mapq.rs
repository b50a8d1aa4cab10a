// src/scoring/mapq.rs
//
// Mapping quality from the ratio of the best candidate's probability to the
// probability mass of every candidate seen. Skipped popular seeds mean the
// search may have missed competing locations, so they knock the value down.

pub const MAX_MAPQ: i32 = 70;

/// Reads whose MAPQ exceeds this report `SingleHit`; everything else is
/// `MultipleHits`.
pub const MAPQ_LIMIT_FOR_SINGLE_HIT: i32 = 10;

/// Phred-scaled probability that the best candidate is the true location.
pub fn compute_mapq(
    probability_of_all_candidates: f64,
    probability_of_best_candidate: f64,
    best_end_score: i32,
    popular_seeds_skipped: u32,
) -> i32 {
    if best_end_score < 0 || probability_of_all_candidates <= 0.0 {
        return 0;
    }

    let correctness = (probability_of_best_candidate / probability_of_all_candidates).min(1.0);

    let base = if correctness >= 1.0 - 1e-10 {
        MAX_MAPQ
    } else {
        ((-10.0 * (1.0 - correctness).log10()) as i32).min(MAX_MAPQ)
    };

    (base - (popular_seeds_skipped / 2) as i32).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_hit_saturates() {
        assert_eq!(compute_mapq(1e-3, 1e-3, 0, 0), MAX_MAPQ);
    }

    #[test]
    fn test_two_equal_hits() {
        // p_best / p_all = 0.5 => -10 log10(0.5) ~ 3
        let mapq = compute_mapq(2e-3, 1e-3, 0, 0);
        assert_eq!(mapq, 3);
        assert!(mapq <= MAPQ_LIMIT_FOR_SINGLE_HIT);
    }

    #[test]
    fn test_popular_seed_penalty() {
        assert_eq!(compute_mapq(1e-3, 1e-3, 0, 20), MAX_MAPQ - 10);
        assert_eq!(compute_mapq(1e-3, 1e-3, 0, 1000), 0);
    }

    #[test]
    fn test_not_found_is_zero() {
        assert_eq!(compute_mapq(0.0, 0.0, -1, 0), 0);
        assert_eq!(compute_mapq(0.0, 0.0, 0, 0), 0);
    }
}
