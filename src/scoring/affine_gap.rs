// src/scoring/affine_gap.rs
//
// Affine-gap scoring (Gotoh) of a read fragment against a genome fragment,
// anchored at the seed boundary. The far end of the pattern may be
// soft-clipped without penalty; the aligned portion is charged
// match/mismatch plus open+extend gap costs. Used when the edit-distance
// path reports enough errors that a gapped interpretation could differ.
//
// Both a full variant and a banded variant are provided; the caller picks
// the band when the pattern is long relative to the score limit.

use crate::defaults::INDEL_PROB;
use crate::scoring::edit_distance::base_error_probability;

const NEG_INF: i32 = i32::MIN / 2;

// Trace byte layout: bits 0-1 = source of H (diag / E / F),
// bit 2 = E opened from H, bit 3 = F opened from H.
const H_FROM_DIAG: u8 = 0;
const H_FROM_E: u8 = 1;
const H_FROM_F: u8 = 2;
const E_FROM_H: u8 = 1 << 2;
const F_FROM_H: u8 = 1 << 3;

/// Affine-gap penalties, fixed at scorer construction.
#[derive(Debug, Clone, Copy)]
pub struct AffineGapPenalties {
    pub match_reward: i32,
    pub sub_penalty: i32,
    pub gap_open_penalty: i32,
    pub gap_extend_penalty: i32,
}

/// Outcome of a successful affine-gap computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineGapResult {
    /// Affine-gap score of the chosen alignment, including the anchoring
    /// seed's contribution.
    pub ag_score: i32,
    /// Edit-distance equivalent (substitutions + gap bases) of the chosen
    /// alignment; never exceeds the limit handed in.
    pub score: i32,
    pub match_probability: f64,
    /// Pattern bases soft-clipped at the far end.
    pub bases_clipped: i32,
    /// Pattern bases consumed minus text bases consumed.
    pub net_indel: i32,
}

/// Reusable Gotoh scorer; matrices survive across calls.
pub struct AffineGapScorer {
    penalties: AffineGapPenalties,
    h: Vec<i32>,
    e: Vec<i32>,
    f: Vec<i32>,
    trace: Vec<u8>,
}

impl AffineGapScorer {
    pub fn new(penalties: AffineGapPenalties) -> AffineGapScorer {
        AffineGapScorer {
            penalties,
            h: Vec::new(),
            e: Vec::new(),
            f: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Full-matrix variant.
    pub fn compute_score(
        &mut self,
        text: &[u8],
        pattern: &[u8],
        quality: &[u8],
        limit: i32,
        seed_len: usize,
    ) -> Option<AffineGapResult> {
        self.compute(text, pattern, quality, limit, seed_len, usize::MAX)
    }

    /// Banded variant: only cells within `limit` diagonals of the main
    /// diagonal are evaluated. Correct whenever the caller has already
    /// established that more than `limit` gap bases cannot stay within the
    /// score limit.
    pub fn compute_score_banded(
        &mut self,
        text: &[u8],
        pattern: &[u8],
        quality: &[u8],
        limit: i32,
        seed_len: usize,
    ) -> Option<AffineGapResult> {
        self.compute(text, pattern, quality, limit, seed_len, limit.max(1) as usize)
    }

    fn compute(
        &mut self,
        text: &[u8],
        pattern: &[u8],
        quality: &[u8],
        limit: i32,
        seed_len: usize,
        band: usize,
    ) -> Option<AffineGapResult> {
        debug_assert_eq!(pattern.len(), quality.len());

        if limit < 0 {
            return None;
        }

        let p = &self.penalties;
        let seed_score = seed_len as i32 * p.match_reward;

        let m = pattern.len();
        // Text beyond m + limit bases can never be reached within the limit.
        let t = text.len().min(m + limit as usize);
        if m == 0 {
            return Some(AffineGapResult {
                ag_score: seed_score,
                score: 0,
                match_probability: 1.0,
                bases_clipped: 0,
                net_indel: 0,
            });
        }

        let stride = t + 1;
        let cells = (m + 1) * stride;
        self.h.clear();
        self.h.resize(cells, NEG_INF);
        self.e.clear();
        self.e.resize(cells, NEG_INF);
        self.f.clear();
        self.f.resize(cells, NEG_INF);
        self.trace.clear();
        self.trace.resize(cells, 0);

        let idx = |i: usize, j: usize| i * stride + j;

        self.h[idx(0, 0)] = 0;
        for j in 1..=t.min(band) {
            let gap = -(p.gap_open_penalty + j as i32 * p.gap_extend_penalty);
            self.e[idx(0, j)] = gap;
            self.h[idx(0, j)] = gap;
            self.trace[idx(0, j)] = H_FROM_E | if j == 1 { E_FROM_H } else { 0 };
        }
        for i in 1..=m.min(band) {
            let gap = -(p.gap_open_penalty + i as i32 * p.gap_extend_penalty);
            self.f[idx(i, 0)] = gap;
            self.h[idx(i, 0)] = gap;
            self.trace[idx(i, 0)] = H_FROM_F | if i == 1 { F_FROM_H } else { 0 };
        }

        for i in 1..=m {
            let j_lo = i.saturating_sub(band).max(1);
            let j_hi = i.saturating_add(band).min(t);
            if j_lo > j_hi {
                break;
            }
            for j in j_lo..=j_hi {
                let mut tr = 0u8;

                let open_e = self.h[idx(i, j - 1)] - p.gap_open_penalty - p.gap_extend_penalty;
                let extend_e = self.e[idx(i, j - 1)] - p.gap_extend_penalty;
                let e = if open_e >= extend_e {
                    tr |= E_FROM_H;
                    open_e
                } else {
                    extend_e
                };
                self.e[idx(i, j)] = e;

                let open_f = self.h[idx(i - 1, j)] - p.gap_open_penalty - p.gap_extend_penalty;
                let extend_f = self.f[idx(i - 1, j)] - p.gap_extend_penalty;
                let f = if open_f >= extend_f {
                    tr |= F_FROM_H;
                    open_f
                } else {
                    extend_f
                };
                self.f[idx(i, j)] = f;

                let matched = pattern[i - 1] == text[j - 1];
                let diag = self.h[idx(i - 1, j - 1)]
                    + if matched {
                        p.match_reward
                    } else {
                        -p.sub_penalty
                    };

                let mut h = diag;
                if e > h {
                    h = e;
                    tr |= H_FROM_E;
                }
                if f > h {
                    h = f;
                    tr = (tr & !3) | H_FROM_F;
                }

                self.h[idx(i, j)] = h;
                self.trace[idx(i, j)] = tr;
            }
        }

        // Best end anywhere; the unconsumed pattern tail is clipped free of
        // charge, so the seed-adjacent cell (0, 0) is always a fallback.
        let mut best = NEG_INF;
        let mut best_i = 0usize;
        let mut best_j = 0usize;
        for i in 0..=m {
            let j_lo = i.saturating_sub(band);
            let j_hi = i.saturating_add(band).min(t);
            for j in j_lo..=j_hi {
                let h = self.h[idx(i, j)];
                // Ties prefer consuming more pattern, then the main diagonal.
                let better = h > best
                    || (h == best
                        && (i > best_i
                            || (i == best_i && j.abs_diff(i) < best_j.abs_diff(best_i))));
                if better {
                    best = h;
                    best_i = i;
                    best_j = j;
                }
            }
        }

        // Traceback: edits and probability over the aligned portion.
        let mut edits = 0i32;
        let mut match_probability = 1.0f64;
        let (mut i, mut j) = (best_i, best_j);
        let mut state = b'H';
        while i > 0 || j > 0 {
            let tr = self.trace[idx(i, j)];
            match state {
                b'H' => match tr & 3 {
                    H_FROM_DIAG => {
                        let e = base_error_probability(quality[i - 1]);
                        if pattern[i - 1] == text[j - 1] {
                            match_probability *= 1.0 - e;
                        } else {
                            match_probability *= e / 3.0;
                            edits += 1;
                        }
                        i -= 1;
                        j -= 1;
                    }
                    H_FROM_E => state = b'E',
                    _ => state = b'F',
                },
                b'E' => {
                    match_probability *= INDEL_PROB;
                    edits += 1;
                    let opened = tr & E_FROM_H != 0;
                    j -= 1;
                    if opened {
                        state = b'H';
                    }
                }
                _ => {
                    match_probability *= INDEL_PROB;
                    edits += 1;
                    let opened = tr & F_FROM_H != 0;
                    i -= 1;
                    if opened {
                        state = b'H';
                    }
                }
            }
        }

        if edits > limit {
            return None;
        }

        Some(AffineGapResult {
            ag_score: seed_score + best,
            score: edits,
            match_probability,
            bases_clipped: (m - best_i) as i32,
            net_indel: best_i as i32 - best_j as i32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> AffineGapScorer {
        AffineGapScorer::new(AffineGapPenalties {
            match_reward: 1,
            sub_penalty: 4,
            gap_open_penalty: 6,
            gap_extend_penalty: 1,
        })
    }

    fn run(text: &[u8], pattern: &[u8], limit: i32) -> Option<AffineGapResult> {
        let quality = vec![b'I'; pattern.len()];
        scorer().compute_score(text, pattern, &quality, limit, 16)
    }

    #[test]
    fn test_perfect_match() {
        let r = run(b"ACGTACGTACGT", b"ACGTACGTACGT", 5).unwrap();
        assert_eq!(r.score, 0);
        assert_eq!(r.ag_score, 16 + 12);
        assert_eq!(r.bases_clipped, 0);
        assert_eq!(r.net_indel, 0);
    }

    #[test]
    fn test_single_substitution() {
        let r = run(b"ACGTACGTACGT", b"ACGTATGTACGT", 5).unwrap();
        assert_eq!(r.score, 1);
        assert_eq!(r.ag_score, 16 + 11 - 4);
    }

    #[test]
    fn test_gap_beats_substitutions() {
        // Deleting 2 pattern bases realigns the rest perfectly; with open 6
        // and extend 1 the gap (cost 8) beats carrying the frameshifted tail.
        let text = b"ACGTACGTCCAAGGTTCCAAGG";
        let pattern = b"ACGTACGTCCAAGGTTCCAAGGAA"; // 2 extra pattern bases at end
        let r = run(text, pattern, 6).unwrap();
        // The trailing AA is clipped rather than gapped: clipping is free.
        assert_eq!(r.bases_clipped, 2);
        assert_eq!(r.score, 0);
    }

    #[test]
    fn test_internal_insertion() {
        // Pattern has TT inserted mid-way; gap of 2 (cost 6+2=8) versus a
        // ruined tail of 8 matches: the gap wins.
        let text = b"AACCGGTTACGTACGTAACC";
        let pattern = b"AACCGGTTTTACGTACGTAACC";
        let r = run(text, pattern, 6).unwrap();
        assert_eq!(r.score, 2);
        assert_eq!(r.net_indel, 2);
        assert_eq!(r.bases_clipped, 0);
        // 20 matched bases minus the gap cost.
        assert_eq!(r.ag_score, 16 + 20 - 8);
    }

    #[test]
    fn test_banded_agrees_on_small_cases() {
        let text = b"AACCGGTTACGTACGTAACC";
        let pattern = b"AACCGGTTTTACGTACGTAACC";
        let quality = vec![b'I'; pattern.len()];
        let full = scorer()
            .compute_score(text, pattern, &quality, 6, 16)
            .unwrap();
        let banded = scorer()
            .compute_score_banded(text, pattern, &quality, 6, 16)
            .unwrap();
        assert_eq!(full, banded);
    }

    #[test]
    fn test_empty_pattern() {
        let r = run(b"ACGT", b"", 2).unwrap();
        assert_eq!(r.ag_score, 16);
        assert_eq!(r.score, 0);
    }
}
