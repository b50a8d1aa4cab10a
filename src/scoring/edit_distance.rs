// src/scoring/edit_distance.rs
//
// Capped edit distance between a read fragment (pattern) and a genome
// fragment (text), banded to the `limit` diagonals the cap allows. The
// pattern must be consumed completely; the alignment may end anywhere in the
// text, which the caller sizes a little long to leave room for deletions.
//
// A traceback pass converts the winning path into a match probability
// (quality-aware), an indel count, and the net indel drift between pattern
// and text, which the backward invocation turns into a genome-offset shift.

use crate::defaults::INDEL_PROB;

const INF: i32 = i32::MAX / 2;

const TRACE_DIAG: u8 = 0;
const TRACE_UP: u8 = 1; // consumed a pattern base only
const TRACE_LEFT: u8 = 2; // consumed a text base only

/// Error probability for one phred+33 quality character.
#[inline]
pub fn base_error_probability(quality: u8) -> f64 {
    let phred = quality.saturating_sub(33) as f64;
    10f64.powf(-phred / 10.0)
}

/// Outcome of a successful (within-limit) edit-distance computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditDistanceResult {
    pub score: i32,
    pub match_probability: f64,
    pub indels: i32,
    /// Pattern bases consumed minus text bases consumed. Zero unless the
    /// path contains indels.
    pub net_indel: i32,
}

/// Reusable scorer; the DP and traceback storage survive across calls.
pub struct EditDistanceScorer {
    dp: Vec<i32>,
    trace: Vec<u8>,
}

impl EditDistanceScorer {
    pub fn new() -> EditDistanceScorer {
        EditDistanceScorer {
            dp: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Edit distance of `pattern` against a prefix of `text`, capped at
    /// `limit`. None when no alignment within the cap exists.
    pub fn compute_edit_distance(
        &mut self,
        text: &[u8],
        pattern: &[u8],
        quality: &[u8],
        limit: i32,
    ) -> Option<EditDistanceResult> {
        debug_assert_eq!(pattern.len(), quality.len());

        if limit < 0 {
            return None;
        }

        let m = pattern.len();
        if m == 0 {
            return Some(EditDistanceResult {
                score: 0,
                match_probability: 1.0,
                indels: 0,
                net_indel: 0,
            });
        }

        let k = limit as usize;
        if m > text.len() + k {
            // Not enough text even with the maximum number of deletions.
            return None;
        }

        // Band of 2k+1 diagonals: cell (i, j) lives at d = j - i + k.
        let w = 2 * k + 1;
        let cells = (m + 1) * w;
        self.dp.clear();
        self.dp.resize(cells, INF);
        self.trace.clear();
        self.trace.resize(cells, TRACE_DIAG);

        let idx = |i: usize, d: usize| i * w + d;

        // Row 0: only text consumed.
        for j in 0..=k.min(text.len()) {
            self.dp[idx(0, j + k)] = j as i32;
            if j > 0 {
                self.trace[idx(0, j + k)] = TRACE_LEFT;
            }
        }

        for i in 1..=m {
            let j_lo = i.saturating_sub(k);
            let j_hi = (i + k).min(text.len());
            if j_lo > j_hi {
                return None;
            }
            for j in j_lo..=j_hi {
                let d = j + k - i;
                let mut best = INF;
                let mut step = TRACE_DIAG;

                if j > 0 {
                    let sub_cost = (pattern[i - 1] != text[j - 1]) as i32;
                    let diag = self.dp[idx(i - 1, d)];
                    if diag < INF {
                        best = diag + sub_cost;
                    }
                }
                if d + 1 < w {
                    let up = self.dp[idx(i - 1, d + 1)];
                    if up + 1 < best {
                        best = up + 1;
                        step = TRACE_UP;
                    }
                }
                if d > 0 && j > 0 {
                    let left = self.dp[idx(i, d - 1)];
                    if left + 1 < best {
                        best = left + 1;
                        step = TRACE_LEFT;
                    }
                }

                self.dp[idx(i, d)] = best;
                self.trace[idx(i, d)] = step;
            }
        }

        // Best end column in the last row; ties prefer the main diagonal,
        // then the longer text extent, so results are deterministic.
        let mut best_score = INF;
        let mut best_j = 0usize;
        for j in m.saturating_sub(k)..=(m + k).min(text.len()) {
            let score = self.dp[idx(m, j + k - m)];
            let better = score < best_score
                || (score == best_score
                    && (j.abs_diff(m) < best_j.abs_diff(m)
                        || (j.abs_diff(m) == best_j.abs_diff(m) && j > best_j)));
            if better {
                best_score = score;
                best_j = j;
            }
        }

        if best_score > limit {
            return None;
        }

        // Traceback for probability and indel accounting.
        let mut match_probability = 1.0f64;
        let mut indels = 0i32;
        let (mut i, mut j) = (m, best_j);
        while i > 0 || j > 0 {
            match self.trace[idx(i, j + k - i)] {
                TRACE_DIAG => {
                    let e = base_error_probability(quality[i - 1]);
                    if pattern[i - 1] == text[j - 1] {
                        match_probability *= 1.0 - e;
                    } else {
                        match_probability *= e / 3.0;
                    }
                    i -= 1;
                    j -= 1;
                }
                TRACE_UP => {
                    match_probability *= INDEL_PROB;
                    indels += 1;
                    i -= 1;
                }
                _ => {
                    match_probability *= INDEL_PROB;
                    indels += 1;
                    j -= 1;
                }
            }
        }

        Some(EditDistanceResult {
            score: best_score,
            match_probability,
            indels,
            net_indel: m as i32 - best_j as i32,
        })
    }
}

impl Default for EditDistanceScorer {
    fn default() -> Self {
        Self::new()
    }
}
