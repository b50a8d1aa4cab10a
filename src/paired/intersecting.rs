// src/paired/intersecting.rs
//
// Paired-end aligner based on set intersections to narrow down candidate
// locations. Each read is looked up in both directions through a handful of
// seeds; the two reads of a compatible orientation pair ("set pair") then
// have their hit sets walked downward in lockstep, emitting candidate pairs
// whose ends are within the configured spacing window. Candidates queue in
// buckets by a lower bound on their pair edit distance and are scored
// cheapest-first until the remaining buckets provably cannot beat what has
// been found.
//
// Scored pairs landing within a small radius of an earlier pair are
// duplicates of the same alignment and merge into one cluster; the
// surviving probabilities feed the MAPQ of the winner.
//
// ALT handling runs two parallel score books: one over everything and one
// restricted to the primary assembly. ALT alignments only win when they
// beat the best non-ALT alignment by more than a configured gap; otherwise
// the non-ALT alignment is primary and the ALT one is reported as a
// supplementary result.

use crate::adjust::AlignmentAdjuster;
use crate::config::AlignerConfig;
use crate::defaults::{
    MAX_MERGE_DISTANCE, MERGE_CLUSTER_RADIUS, NUM_DIRECTIONS, NUM_READS_PER_PAIR, NUM_SET_PAIRS,
};
use crate::genome::{
    genome_location_is_within, Genome, GenomeLocation, INVALID_GENOME_LOCATION,
};
use crate::index::{Seed, SeedIndex};
use crate::paired::candidates::{
    MateScore, MergeAnchor, PairHit, ScoreSet, ScoringCandidate, ScoringMateCandidate, NONE,
    TOO_BIG_SCORE_VALUE,
};
use crate::paired::hit_set::HitSet;
use crate::paired::scorer::LocationScorer;
use crate::paired::seed_picker::SeedPicker;
use crate::paired::{
    AlignmentStatus, Direction, PairedAlignmentResult, FORWARD, RC,
};
use crate::read::{complement, reverse_complement_into, reverse_into, Read};
use crate::scoring::{AffineGapPenalties, AffineGapScorer, EditDistanceScorer};

/// Per-contig secondary-result count, valid only when its epoch matches the
/// aligner's current one; this avoids clearing the whole array every call.
#[derive(Clone, Copy, Default)]
struct HitsPerContigCounts {
    hits: i32,
    epoch: u64,
}

/// Score limit for the next candidate, which differs between ALT and
/// non-ALT candidates: a non-ALT alignment matters if it comes within the
/// preference gap of the best overall, while an ALT alignment must beat the
/// best non-ALT by more than the gap.
fn compute_score_limit(
    non_alt_alignment: bool,
    scores_for_all: &ScoreSet,
    scores_for_non_alt: &ScoreSet,
    max_k: i32,
    extra_search_depth: i32,
    max_score_gap: i32,
) -> i32 {
    if non_alt_alignment {
        extra_search_depth
            + max_k.min(
                (scores_for_all.best_pair_score + max_score_gap)
                    .min(scores_for_non_alt.best_pair_score),
            )
    } else {
        extra_search_depth
            + max_k.min(
                scores_for_all
                    .best_pair_score
                    .min(scores_for_non_alt.best_pair_score - max_score_gap),
            )
    }
}

fn fatal_pool_exhaustion(what: &str) -> ! {
    log::error!(
        "Ran out of {} entries. Rerunning with a larger max_candidate_pool_size will help.",
        what
    );
    std::process::exit(1);
}

pub struct IntersectingPairedEndAligner<'i> {
    index: &'i SeedIndex,
    genome: &'i Genome,
    config: AlignerConfig,
    seed_len: usize,

    scoring_candidate_pool_size: usize,
    merge_anchor_pool_size: usize,

    // Candidate pools, reset each call. Bucket lists and merge anchors are
    // pool indices rather than pointers.
    scoring_candidate_pool: Vec<ScoringCandidate>,
    scoring_mate_candidates: [Vec<ScoringMateCandidate>; NUM_SET_PAIRS],
    merge_anchor_pool: Vec<MergeAnchor>,
    /// Bucket heads indexed by best possible pair score.
    scoring_candidates: Vec<u32>,

    // Per-call read scratch.
    rc_read_data: [Vec<u8>; NUM_READS_PER_PAIR],
    rc_read_quality: [Vec<u8>; NUM_READS_PER_PAIR],
    reversed_read_data: [[Vec<u8>; NUM_DIRECTIONS]; NUM_READS_PER_PAIR],
    reversed_text_scratch: Vec<u8>,

    edit_scorer: EditDistanceScorer,
    affine_scorer: AffineGapScorer,

    hits_per_contig_counts: Vec<HitsPerContigCounts>,
    contig_count_epoch: u64,

    n_locations_scored: u64,
}

impl<'i> IntersectingPairedEndAligner<'i> {
    pub fn new(
        index: &'i SeedIndex,
        genome: &'i Genome,
        config: &AlignerConfig,
    ) -> IntersectingPairedEndAligner<'i> {
        debug_assert_eq!(index.genome_length(), genome.count_of_bases());

        let seed_len = index.seed_length() as usize;
        let max_seeds =
            config.max_seeds_for_read_len(config.max_read_size as usize, seed_len).max(1);

        let scoring_candidate_pool_size = (config.max_candidate_pool_size as usize)
            .min(config.max_big_hits as usize * max_seeds * NUM_READS_PER_PAIR);
        let merge_anchor_pool_size = scoring_candidate_pool_size;

        let n_buckets = (config.max_k + config.extra_search_depth + 1).max(1) as usize;

        let hits_per_contig_counts = if config.max_secondary_alignments_per_contig > 0 {
            vec![HitsPerContigCounts::default(); genome.num_contigs() as usize]
        } else {
            Vec::new()
        };

        IntersectingPairedEndAligner {
            index,
            genome,
            config: config.clone(),
            seed_len,
            scoring_candidate_pool_size,
            merge_anchor_pool_size,
            scoring_candidate_pool: Vec::with_capacity(scoring_candidate_pool_size.min(4096)),
            scoring_mate_candidates: [
                Vec::with_capacity((scoring_candidate_pool_size / NUM_READS_PER_PAIR).min(4096)),
                Vec::with_capacity((scoring_candidate_pool_size / NUM_READS_PER_PAIR).min(4096)),
            ],
            merge_anchor_pool: Vec::with_capacity(merge_anchor_pool_size.min(4096)),
            scoring_candidates: vec![NONE; n_buckets],
            rc_read_data: [Vec::new(), Vec::new()],
            rc_read_quality: [Vec::new(), Vec::new()],
            reversed_read_data: [[Vec::new(), Vec::new()], [Vec::new(), Vec::new()]],
            reversed_text_scratch: Vec::new(),
            edit_scorer: EditDistanceScorer::new(),
            affine_scorer: AffineGapScorer::new(AffineGapPenalties {
                match_reward: config.match_reward,
                sub_penalty: config.sub_penalty,
                gap_open_penalty: config.gap_open_penalty,
                gap_extend_penalty: config.gap_extend_penalty,
            }),
            hits_per_contig_counts,
            contig_count_epoch: 0,
            n_locations_scored: 0,
        }
    }

    /// Total scorer invocations across the aligner's lifetime.
    pub fn n_locations_scored(&self) -> u64 {
        self.n_locations_scored
    }

    /// Align a pair of reads.
    ///
    /// Returns true on success, including "nothing found" (both statuses
    /// `NotFound`). Returns false only when the secondary-result buffer is
    /// too small, in which case `*n_secondary_results` is set to the buffer
    /// size plus one and the caller should retry with a larger buffer.
    ///
    /// `max_edit_distance_for_secondary_results` of -1 disables secondary
    /// collection entirely.
    #[allow(clippy::too_many_arguments)]
    pub fn align(
        &mut self,
        read0: &Read,
        read1: &Read,
        result: &mut PairedAlignmentResult,
        first_alt_result: &mut PairedAlignmentResult,
        max_edit_distance_for_secondary_results: i32,
        n_secondary_results: &mut usize,
        secondary_results: &mut [PairedAlignmentResult],
        max_secondary_results_to_return: usize,
    ) -> bool {
        let index = self.index;
        let genome = self.genome;
        let seed_len = self.seed_len;

        let max_k = self.config.max_k;
        let extra_search_depth = self.config.extra_search_depth;
        let max_score_gap = self.config.max_score_gap_to_prefer_non_alt_alignment;
        let alt_awareness = self.config.alt_awareness;
        let min_spacing = self.config.min_spacing as u64;
        let max_spacing = self.config.max_spacing as u64;
        let no_truncation = self.config.no_truncation;
        let no_ordered_evaluation = self.config.no_ordered_evaluation;
        let saturation = self.config.probability_of_all_pairs_saturation;
        let max_edit = max_edit_distance_for_secondary_results;

        result.clear();
        first_alt_result.clear();
        *n_secondary_results = 0;

        let reads = [read0, read1];
        let read_len = [read0.len(), read1.len()];

        for which_read in 0..NUM_READS_PER_PAIR {
            if read_len[which_read] > self.config.max_read_size as usize {
                log::error!(
                    "IntersectingPairedEndAligner got too big a read ({} > {}). \
                     Raise max_read_size and rebuild the aligner.",
                    read_len[which_read],
                    self.config.max_read_size
                );
                std::process::exit(1);
            }
        }

        // Don't bother if one or both reads are too short. The minimum here
        // is the seed length; callers usually enforce a longer one.
        if read_len[0] < seed_len || read_len[1] < seed_len {
            return true;
        }

        if read0.count_of_ns() + read1.count_of_ns() > max_k.max(0) as usize {
            return true;
        }

        // Build the RC reads and the reversed copies the backward scorer
        // walks. The reversed quality of direction d is the quality of the
        // opposite direction taken forward, so no extra arrays are needed.
        for which_read in 0..NUM_READS_PER_PAIR {
            reverse_complement_into(
                reads[which_read].data(),
                &mut self.rc_read_data[which_read],
            );
            reverse_into(
                reads[which_read].quality(),
                &mut self.rc_read_quality[which_read],
            );
            reverse_into(
                reads[which_read].data(),
                &mut self.reversed_read_data[which_read][FORWARD],
            );
            let complemented = &mut self.reversed_read_data[which_read][RC];
            complemented.clear();
            complemented.extend(reads[which_read].data().iter().map(|&b| complement(b)));
        }

        let read_data: [[&[u8]; NUM_DIRECTIONS]; NUM_READS_PER_PAIR] = [
            [read0.data(), &self.rc_read_data[0]],
            [read1.data(), &self.rc_read_data[1]],
        ];
        let read_quality: [[&[u8]; NUM_DIRECTIONS]; NUM_READS_PER_PAIR] = [
            [read0.quality(), &self.rc_read_quality[0]],
            [read1.quality(), &self.rc_read_quality[1]],
        ];

        // Reset the per-call pools.
        self.scoring_candidate_pool.clear();
        self.scoring_mate_candidates[0].clear();
        self.scoring_mate_candidates[1].clear();
        self.merge_anchor_pool.clear();
        for head in &mut self.scoring_candidates {
            *head = NONE;
        }

        let max_seeds = self
            .config
            .max_seeds_for_read_len(read_len[0].max(read_len[1]), seed_len)
            .max(1);

        //
        // Phase 1: seed lookups, recorded into the four hit sets.
        //
        let mut hit_sets: [[HitSet; NUM_DIRECTIONS]; NUM_READS_PER_PAIR] = [
            [
                HitSet::new(index.hit_width(), max_seeds, MAX_MERGE_DISTANCE),
                HitSet::new(index.hit_width(), max_seeds, MAX_MERGE_DISTANCE),
            ],
            [
                HitSet::new(index.hit_width(), max_seeds, MAX_MERGE_DISTANCE),
                HitSet::new(index.hit_width(), max_seeds, MAX_MERGE_DISTANCE),
            ],
        ];

        let mut popular_seeds_skipped = [0u32; NUM_READS_PER_PAIR];
        let mut total_hits = [[0u64; NUM_DIRECTIONS]; NUM_READS_PER_PAIR];
        let mut n_small_hits = 0u64;

        for which_read in 0..NUM_READS_PER_PAIR {
            let mut picker =
                SeedPicker::new(read_data[which_read][FORWARD], seed_len, max_seeds);
            let mut begins_disjoint_hit_set = [false; NUM_DIRECTIONS];

            while let Some(site) = picker.next_seed() {
                if site.wrapped {
                    begins_disjoint_hit_set = [true; NUM_DIRECTIONS];
                }

                let seed = Seed::from_bases(
                    &read_data[which_read][FORWARD][site.offset..site.offset + seed_len],
                )
                .expect("the picker only yields N-free seeds");
                let hits = index.lookup_seed(seed);

                for dir in 0..NUM_DIRECTIONS {
                    // An RC hit marks where the reverse complement of the
                    // seed begins, which is the seed's *end* within the RC
                    // read.
                    let offset = if dir == FORWARD {
                        site.offset
                    } else {
                        read_len[which_read] - seed_len - site.offset
                    };
                    let slice = if dir == FORWARD { hits.forward } else { hits.rc };

                    if slice.len() < self.config.max_big_hits as usize {
                        total_hits[which_read][dir] += slice.len() as u64;
                        if !slice.is_empty() {
                            n_small_hits += 1;
                        }
                        hit_sets[which_read][dir].record_lookup(
                            offset as u32,
                            slice,
                            begins_disjoint_hit_set[dir],
                        );
                        begins_disjoint_hit_set[dir] = false;
                    } else {
                        popular_seeds_skipped[which_read] += 1;
                    }
                }
            }
        }

        let read_with_more_hits =
            if total_hits[0][FORWARD] + total_hits[0][RC] > total_hits[1][FORWARD] + total_hits[1][RC]
            {
                0
            } else {
                1
            };
        let read_with_fewer_hits = 1 - read_with_more_hits;

        log::debug!(
            "read 0 has {} hits, read 1 has {} hits",
            total_hits[0][FORWARD] + total_hits[0][RC],
            total_hits[1][FORWARD] + total_hits[1][RC]
        );

        let set_pair_direction: [[Direction; NUM_READS_PER_PAIR]; NUM_SET_PAIRS] = [
            [Direction::Forward, Direction::Rc],
            [Direction::Rc, Direction::Forward],
        ];

        //
        // Phase 2: intersect each set pair, emitting mate candidates for
        // the more-hits side and queued candidates for the fewer-hits side.
        //
        let mut max_used_best_possible_score_list: i32 = 0;

        for which_set_pair in 0..NUM_SET_PAIRS {
            let [read0_sets, read1_sets] = &mut hit_sets;
            let (set_for_read0, set_for_read1) = if which_set_pair == 0 {
                (&mut read0_sets[FORWARD], &mut read1_sets[RC])
            } else {
                (&mut read0_sets[RC], &mut read1_sets[FORWARD])
            };
            let (fewer_set, more_set) = if read_with_fewer_hits == 0 {
                (set_for_read0, set_for_read1)
            } else {
                (set_for_read1, set_for_read0)
            };

            // Seed the intersection state with the highest fewer-side hit.
            let Some((mut fewer_location, mut fewer_seed_offset)) = fewer_set.get_first_hit()
            else {
                continue;
            };

            let mut more_location: GenomeLocation = INVALID_GENOME_LOCATION;
            let mut more_seed_offset: u32 = 0;
            let mut out_of_more_hits_locations = false;

            // Loop invariant: fewer_location is the highest fewer-side
            // offset not yet considered; more_location likewise for its
            // side, though higher mates within range may already be pooled.
            loop {
                if more_location > fewer_location + max_spacing {
                    // The more-hits side is too high to pair with the
                    // fewer-hits hit; drop it to the highest usable spot.
                    match more_set.get_next_hit_less_than_or_equal_to(fewer_location + max_spacing)
                    {
                        Some((location, seed_offset)) => {
                            more_location = location;
                            more_seed_offset = seed_offset;
                        }
                        None => break, // end of all of the mates for this set pair
                    }
                }

                let mate_pool = &self.scoring_mate_candidates[which_set_pair];
                let no_pooled_mate_in_range = mate_pool.last().map_or(true, |mate| {
                    !genome_location_is_within(
                        mate.more_hits_genome_location,
                        fewer_location,
                        max_spacing,
                    )
                });

                if (more_location + max_spacing < fewer_location || out_of_more_hits_locations)
                    && no_pooled_mate_in_range
                {
                    // No mates for this fewer-side hit; skip to the next.
                    if out_of_more_hits_locations {
                        break;
                    }
                    match fewer_set.get_next_hit_less_than_or_equal_to(more_location + max_spacing)
                    {
                        Some((location, seed_offset)) => {
                            fewer_location = location;
                            fewer_seed_offset = seed_offset;
                        }
                        None => break,
                    }
                    continue;
                }

                // Pool every more-side hit within range of the fewer hit.
                while more_location + max_spacing >= fewer_location && !out_of_more_hits_locations
                {
                    let best_possible_score = if no_truncation {
                        0
                    } else {
                        more_set.compute_best_possible_score_for_current_hit()
                    };

                    if self.scoring_mate_candidates[which_set_pair].len()
                        >= self.scoring_candidate_pool_size / NUM_READS_PER_PAIR
                    {
                        fatal_pool_exhaustion("scoring mate candidate pool");
                    }
                    self.scoring_mate_candidates[which_set_pair].push(
                        ScoringMateCandidate::new(
                            more_location,
                            best_possible_score,
                            more_seed_offset,
                        ),
                    );
                    log::trace!(
                        "set pair {}: more-hits candidate at {}, best possible {}, seed offset {}",
                        which_set_pair,
                        more_location,
                        best_possible_score,
                        more_seed_offset
                    );

                    match more_set.get_next_lower_hit() {
                        Some((location, seed_offset)) => {
                            more_location = location;
                            more_seed_offset = seed_offset;
                        }
                        None => {
                            more_location = 0;
                            out_of_more_hits_locations = true;
                        }
                    }
                }

                // Now the fewer-side hit. Its usable mates may include
                // candidates pooled for earlier, nearby fewer-side hits, so
                // the lower bound scans the pool backward.
                let best_possible_score_fewer = if no_truncation {
                    0
                } else {
                    fewer_set.compute_best_possible_score_for_current_hit()
                };

                let mate_pool = &self.scoring_mate_candidates[which_set_pair];
                let mut lowest_best_possible_score_of_any_possible_mate =
                    max_k + extra_search_depth;
                for mate in mate_pool.iter().rev() {
                    if mate.more_hits_genome_location > fewer_location + max_spacing {
                        break;
                    }
                    lowest_best_possible_score_of_any_possible_mate =
                        lowest_best_possible_score_of_any_possible_mate
                            .min(mate.best_possible_score);
                }

                if lowest_best_possible_score_of_any_possible_mate + best_possible_score_fewer
                    <= max_k + extra_search_depth
                {
                    // This pair of ends cannot be ruled out. Queue a
                    // candidate on the right bucket (bucket 0 when ordered
                    // evaluation is off, which scores in roughly inverse
                    // genome order instead).
                    if self.scoring_candidate_pool.len() >= self.scoring_candidate_pool_size {
                        fatal_pool_exhaustion("scoring candidate pool");
                    }

                    let best_possible_score = if no_ordered_evaluation {
                        0
                    } else {
                        lowest_best_possible_score_of_any_possible_mate
                            + best_possible_score_fewer
                    };

                    let candidate_index = self.scoring_candidate_pool.len() as u32;
                    self.scoring_candidate_pool.push(ScoringCandidate {
                        fewer_hits_genome_location: fewer_location,
                        seed_offset: fewer_seed_offset,
                        which_set_pair: which_set_pair as u8,
                        scoring_mate_candidate_index: (self.scoring_mate_candidates
                            [which_set_pair]
                            .len()
                            - 1) as u32,
                        best_possible_score: best_possible_score_fewer,
                        score_list_next: self.scoring_candidates[best_possible_score as usize],
                        merge_anchor: NONE,
                    });
                    self.scoring_candidates[best_possible_score as usize] = candidate_index;
                    max_used_best_possible_score_list =
                        max_used_best_possible_score_list.max(best_possible_score);

                    log::trace!(
                        "set pair {}: fewer-hits candidate {} at {}, bucket {}, seed offset {}",
                        which_set_pair,
                        candidate_index,
                        fewer_location,
                        best_possible_score,
                        fewer_seed_offset
                    );
                }

                match fewer_set.get_next_lower_hit() {
                    Some((location, seed_offset)) => {
                        fewer_location = location;
                        fewer_seed_offset = seed_offset;
                    }
                    None => break,
                }
            }
        }

        //
        // Phase 3: score candidates bucket by bucket until what remains
        // provably cannot matter for either score book.
        //
        let mut scores_for_all_alignments = ScoreSet::new();
        let mut scores_for_non_alt_alignments = ScoreSet::new();

        let mut scorer = LocationScorer {
            genome,
            edit_scorer: &mut self.edit_scorer,
            affine_scorer: &mut self.affine_scorer,
            reversed_text_scratch: &mut self.reversed_text_scratch,
            data: read_data,
            quality: read_quality,
            reversed_data: [
                [
                    &self.reversed_read_data[0][FORWARD],
                    &self.reversed_read_data[0][RC],
                ],
                [
                    &self.reversed_read_data[1][FORWARD],
                    &self.reversed_read_data[1][RC],
                ],
            ],
            reversed_quality: [
                [&self.rc_read_quality[0], read0.quality()],
                [&self.rc_read_quality[1], read1.quality()],
            ],
            seed_len,
            max_k,
            extra_search_depth,
            no_ukkonen: self.config.no_ukkonen,
            use_affine_gap: self.config.use_affine_gap,
            match_reward: self.config.match_reward,
            sub_penalty: self.config.sub_penalty,
            gap_open_penalty: self.config.gap_open_penalty,
            gap_extend_penalty: self.config.gap_extend_penalty,
            n_locations_scored: 0,
        };

        let mut current_best_possible_score_list: i32 = 0;

        'scoring: while current_best_possible_score_list <= max_used_best_possible_score_list
            && current_best_possible_score_list
                <= extra_search_depth
                    + max_k.min(
                        (scores_for_all_alignments
                            .best_pair_score
                            .min(scores_for_non_alt_alignments.best_pair_score - max_score_gap))
                        .max(
                            (scores_for_all_alignments.best_pair_score + max_score_gap)
                                .min(scores_for_non_alt_alignments.best_pair_score),
                        ),
                    )
        {
            let head = self.scoring_candidates[current_best_possible_score_list as usize];
            if head == NONE {
                current_best_possible_score_list += 1;
                continue;
            }

            let candidate_index = head as usize;
            let candidate = self.scoring_candidate_pool[candidate_index];
            let which_set_pair = candidate.which_set_pair as usize;

            let non_alt_alignment = !alt_awareness
                || !genome.is_genome_location_alt(candidate.fewer_hits_genome_location);

            let mut score_limit = compute_score_limit(
                non_alt_alignment,
                &scores_for_all_alignments,
                &scores_for_non_alt_alignments,
                max_k,
                extra_search_depth,
                max_score_gap,
            );

            if current_best_possible_score_list > score_limit {
                // Knowing ALT vs non-ALT tightened the limit below this
                // bucket; drop the candidate.
                self.scoring_candidates[current_best_possible_score_list as usize] =
                    candidate.score_list_next;
                continue;
            }

            let fewer_end = scorer.score_location(
                read_with_fewer_hits,
                set_pair_direction[which_set_pair][read_with_fewer_hits],
                candidate.fewer_hits_genome_location,
                candidate.seed_offset as usize,
                score_limit,
            );

            if let Some(fewer_end) = fewer_end {
                debug_assert!(fewer_end.score >= candidate.best_possible_score);
                log::debug!(
                    "scored fewer-end candidate {} at {}, set pair {}, limit {}, score {}, offset {}",
                    candidate_index,
                    candidate.fewer_hits_genome_location,
                    which_set_pair,
                    score_limit,
                    fewer_end.score,
                    fewer_end.genome_offset
                );

                let fewer_adjusted_location = (candidate.fewer_hits_genome_location as i64
                    + fewer_end.genome_offset)
                    as GenomeLocation;

                // Walk mates downward from the recorded lowest one.
                let mut mate_index = candidate.scoring_mate_candidate_index as usize;
                loop {
                    let mate = self.scoring_mate_candidates[which_set_pair][mate_index];
                    debug_assert!(genome_location_is_within(
                        mate.more_hits_genome_location,
                        candidate.fewer_hits_genome_location,
                        max_spacing,
                    ));

                    let mate_in_range = !genome_location_is_within(
                        mate.more_hits_genome_location,
                        candidate.fewer_hits_genome_location,
                        min_spacing,
                    ) && mate.best_possible_score <= score_limit - fewer_end.score;

                    if mate_in_range {
                        // Score lazily; a cached ScoreAboveLimit only binds
                        // up to the limit it was computed under.
                        let needs_scoring = mate.score == MateScore::NotYetScored
                            || (mate.score == MateScore::AboveLimit
                                && mate.score_limit < score_limit - fewer_end.score);

                        if needs_scoring {
                            let scored = scorer.score_location(
                                read_with_more_hits,
                                set_pair_direction[which_set_pair][read_with_more_hits],
                                mate.more_hits_genome_location,
                                mate.seed_offset as usize,
                                score_limit - fewer_end.score,
                            );

                            let mate_slot =
                                &mut self.scoring_mate_candidates[which_set_pair][mate_index];
                            match scored {
                                Some(scored) => {
                                    debug_assert!(scored.score >= mate_slot.best_possible_score);
                                    mate_slot.score = MateScore::Scored(scored.score);
                                    mate_slot.match_probability = scored.match_probability;
                                    mate_slot.genome_offset = scored.genome_offset;
                                    mate_slot.used_affine_gap_scoring =
                                        scored.used_affine_gap_scoring;
                                    mate_slot.bases_clipped_before = scored.bases_clipped_before;
                                    mate_slot.bases_clipped_after = scored.bases_clipped_after;
                                    mate_slot.ag_score = scored.ag_score;
                                }
                                None => {
                                    mate_slot.score = MateScore::AboveLimit;
                                }
                            }
                            mate_slot.score_limit = score_limit - fewer_end.score;
                        }

                        let mate = self.scoring_mate_candidates[which_set_pair][mate_index];
                        if let MateScore::Scored(mate_score) = mate.score {
                            // Re-check against the current limit; the cache
                            // may date from a looser one.
                            if fewer_end.score + mate_score <= score_limit {
                                let pair_probability =
                                    mate.match_probability * fewer_end.match_probability;
                                let pair_score = mate_score + fewer_end.score;
                                let mate_adjusted_location = (mate.more_hits_genome_location
                                    as i64
                                    + mate.genome_offset)
                                    as GenomeLocation;

                                // Find this candidate's merge anchor, first
                                // among neighbours in the pool.
                                let mut anchor_index =
                                    self.scoring_candidate_pool[candidate_index].merge_anchor;
                                if anchor_index == NONE {
                                    let mut probe = candidate_index;
                                    while probe > 0 {
                                        probe -= 1;
                                        let neighbour = &self.scoring_candidate_pool[probe];
                                        if !(genome_location_is_within(
                                            neighbour.fewer_hits_genome_location,
                                            fewer_adjusted_location,
                                            MERGE_CLUSTER_RADIUS,
                                        ) && neighbour.which_set_pair
                                            == candidate.which_set_pair)
                                        {
                                            break;
                                        }
                                        if neighbour.merge_anchor != NONE {
                                            anchor_index = neighbour.merge_anchor;
                                            break;
                                        }
                                    }
                                    if anchor_index == NONE {
                                        for probe in
                                            candidate_index + 1..self.scoring_candidate_pool.len()
                                        {
                                            let neighbour = &self.scoring_candidate_pool[probe];
                                            if !(genome_location_is_within(
                                                neighbour.fewer_hits_genome_location,
                                                fewer_adjusted_location,
                                                MERGE_CLUSTER_RADIUS,
                                            ) && neighbour.which_set_pair
                                                == candidate.which_set_pair)
                                            {
                                                break;
                                            }
                                            if neighbour.merge_anchor != NONE {
                                                anchor_index = neighbour.merge_anchor;
                                                break;
                                            }
                                        }
                                    }
                                    if anchor_index != NONE {
                                        self.scoring_candidate_pool[candidate_index]
                                            .merge_anchor = anchor_index;
                                    }
                                }

                                let (eliminated_by_merge, old_pair_probability) = if anchor_index
                                    == NONE
                                {
                                    if self.merge_anchor_pool.len() >= self.merge_anchor_pool_size
                                    {
                                        fatal_pool_exhaustion("merge anchor pool");
                                    }
                                    let new_anchor = self.merge_anchor_pool.len() as u32;
                                    self.merge_anchor_pool.push(MergeAnchor::new(
                                        mate_adjusted_location,
                                        fewer_adjusted_location,
                                        pair_probability,
                                        pair_score,
                                        MERGE_CLUSTER_RADIUS,
                                    ));
                                    self.scoring_candidate_pool[candidate_index].merge_anchor =
                                        new_anchor;
                                    (false, 0.0)
                                } else {
                                    self.merge_anchor_pool[anchor_index as usize].check_merge(
                                        mate_adjusted_location,
                                        fewer_adjusted_location,
                                        pair_probability,
                                        pair_score,
                                    )
                                };

                                if !eliminated_by_merge {
                                    // Back out the probability of whatever
                                    // this cluster previously counted.
                                    scores_for_all_alignments
                                        .update_probability_of_all_pairs(old_pair_probability);
                                    if non_alt_alignment {
                                        scores_for_non_alt_alignments
                                            .update_probability_of_all_pairs(
                                                old_pair_probability,
                                            );
                                    }

                                    // A new best displaces the old one into
                                    // the secondary buffer when it still
                                    // fits the reporting window.
                                    if pair_probability
                                        > scores_for_all_alignments.probability_of_best_pair
                                        && max_edit != -1
                                        && max_edit
                                            >= scores_for_all_alignments.best_pair_score
                                                - pair_score
                                    {
                                        if *n_secondary_results >= secondary_results.len() {
                                            *n_secondary_results = secondary_results.len() + 1;
                                            return false;
                                        }
                                        let demoted =
                                            &mut secondary_results[*n_secondary_results];
                                        demoted.clear();
                                        demoted.aligned_as_pair = true;
                                        for r in 0..NUM_READS_PER_PAIR {
                                            demoted.direction[r] = scores_for_all_alignments
                                                .best_result_direction[r];
                                            demoted.location[r] = scores_for_all_alignments
                                                .best_result_genome_location[r];
                                            demoted.mapq[r] = 0;
                                            demoted.score[r] =
                                                scores_for_all_alignments.best_result_score[r];
                                            demoted.status[r] = AlignmentStatus::MultipleHits;
                                            demoted.used_affine_gap_scoring[r] =
                                                scores_for_all_alignments
                                                    .best_result_used_affine_gap_scoring[r];
                                            demoted.bases_clipped_before[r] =
                                                scores_for_all_alignments
                                                    .best_result_bases_clipped_before[r];
                                            demoted.bases_clipped_after[r] =
                                                scores_for_all_alignments
                                                    .best_result_bases_clipped_after[r];
                                            demoted.ag_score[r] =
                                                scores_for_all_alignments.best_result_ag_score[r];
                                        }
                                        *n_secondary_results += 1;
                                    }

                                    let mut pair_hits = [PairHit::default(); NUM_READS_PER_PAIR];
                                    pair_hits[read_with_fewer_hits] = PairHit {
                                        location: fewer_adjusted_location,
                                        direction: set_pair_direction[which_set_pair]
                                            [read_with_fewer_hits],
                                        score: fewer_end.score,
                                        used_affine_gap_scoring: fewer_end
                                            .used_affine_gap_scoring,
                                        bases_clipped_before: fewer_end.bases_clipped_before,
                                        bases_clipped_after: fewer_end.bases_clipped_after,
                                        ag_score: fewer_end.ag_score,
                                    };
                                    pair_hits[read_with_more_hits] = PairHit {
                                        location: mate_adjusted_location,
                                        direction: set_pair_direction[which_set_pair]
                                            [read_with_more_hits],
                                        score: mate_score,
                                        used_affine_gap_scoring: mate.used_affine_gap_scoring,
                                        bases_clipped_before: mate.bases_clipped_before,
                                        bases_clipped_after: mate.bases_clipped_after,
                                        ag_score: mate.ag_score,
                                    };

                                    if non_alt_alignment {
                                        scores_for_non_alt_alignments.update_best_hit_if_needed(
                                            pair_score,
                                            pair_probability,
                                            &pair_hits,
                                        );
                                    }
                                    let updated_best_score = scores_for_all_alignments
                                        .update_best_hit_if_needed(
                                            pair_score,
                                            pair_probability,
                                            &pair_hits,
                                        );

                                    score_limit = compute_score_limit(
                                        non_alt_alignment,
                                        &scores_for_all_alignments,
                                        &scores_for_non_alt_alignments,
                                        max_k,
                                        extra_search_depth,
                                        max_score_gap,
                                    );

                                    if !updated_best_score
                                        && max_edit != -1
                                        && pair_score <= max_k
                                        && max_edit
                                            >= pair_score
                                                - scores_for_all_alignments.best_pair_score
                                    {
                                        // A secondary result to save.
                                        if *n_secondary_results >= secondary_results.len() {
                                            *n_secondary_results = secondary_results.len() + 1;
                                            return false;
                                        }
                                        let secondary =
                                            &mut secondary_results[*n_secondary_results];
                                        secondary.clear();
                                        secondary.aligned_as_pair = true;
                                        for r in 0..NUM_READS_PER_PAIR {
                                            secondary.direction[r] = pair_hits[r].direction;
                                            secondary.location[r] = pair_hits[r].location;
                                            secondary.mapq[r] = 0;
                                            secondary.score[r] = pair_hits[r].score;
                                            secondary.status[r] = AlignmentStatus::MultipleHits;
                                            secondary.used_affine_gap_scoring[r] =
                                                pair_hits[r].used_affine_gap_scoring;
                                            secondary.bases_clipped_before[r] =
                                                pair_hits[r].bases_clipped_before;
                                            secondary.bases_clipped_after[r] =
                                                pair_hits[r].bases_clipped_after;
                                            secondary.ag_score[r] = pair_hits[r].ag_score;
                                        }
                                        *n_secondary_results += 1;
                                    }

                                    log::debug!(
                                        "added pair probability {:e} at ({}, {}), score {} = {} + {}, all-pairs now {:e}{}",
                                        pair_probability,
                                        fewer_adjusted_location,
                                        mate_adjusted_location,
                                        pair_score,
                                        fewer_end.score,
                                        mate_score,
                                        scores_for_all_alignments.probability_of_all_pairs,
                                        if updated_best_score { " (new best)" } else { "" }
                                    );

                                    let saturating_probability = if alt_awareness {
                                        scores_for_non_alt_alignments.probability_of_all_pairs
                                    } else {
                                        scores_for_all_alignments.probability_of_all_pairs
                                    };
                                    if saturating_probability >= saturation && max_edit == -1 {
                                        // Nothing can rescue the MAPQ from
                                        // zero; stop scoring.
                                        break 'scoring;
                                    }
                                }
                            }
                        }
                    }

                    if mate_index == 0
                        || !genome_location_is_within(
                            self.scoring_mate_candidates[which_set_pair][mate_index - 1]
                                .more_hits_genome_location,
                            candidate.fewer_hits_genome_location,
                            max_spacing,
                        )
                    {
                        break;
                    }
                    mate_index -= 1;
                }
            }

            // Pop the candidate and move on.
            self.scoring_candidates[current_best_possible_score_list as usize] =
                candidate.score_list_next;
        }

        self.n_locations_scored += scorer.n_locations_scored;
        result.n_lv_calls = scorer.n_locations_scored;
        result.n_small_hits = n_small_hits;
        drop(scorer);

        //
        // Phase 4: pick the score book to emit and post-process.
        //
        let emit_all_alignments = !alt_awareness
            || scores_for_non_alt_alignments.best_pair_score
                > scores_for_all_alignments.best_pair_score + max_score_gap;
        let score_set_to_emit = if emit_all_alignments {
            &scores_for_all_alignments
        } else {
            &scores_for_non_alt_alignments
        };

        let mut best_pair_score_for_filter = score_set_to_emit.best_pair_score;

        if score_set_to_emit.best_pair_score == TOO_BIG_SCORE_VALUE {
            // Found nothing; the result already carries the NotFound
            // baseline.
            log::debug!("no sufficiently good pairs found");
        } else {
            score_set_to_emit.fill_in_result(result, &popular_seeds_skipped);
            result.aligned_as_pair = true;

            if alt_awareness
                && !emit_all_alignments
                && scores_for_all_alignments.best_result_genome_location
                    != scores_for_non_alt_alignments.best_result_genome_location
            {
                debug_assert!(genome.is_genome_location_alt(
                    scores_for_all_alignments.best_result_genome_location[0]
                ));
                scores_for_all_alignments.fill_in_result(first_alt_result, &popular_seeds_skipped);
                first_alt_result.aligned_as_pair = true;
                first_alt_result.supplementary = [true; NUM_READS_PER_PAIR];
            }

            log::debug!(
                "returned ({}, {}) with mapq {} and {}, probability of all pairs {:e}, of best pair {:e}, pair score {}",
                result.location[0],
                result.location[1],
                result.mapq[0],
                result.mapq[1],
                score_set_to_emit.probability_of_all_pairs,
                score_set_to_emit.probability_of_best_pair,
                score_set_to_emit.best_pair_score
            );
        }

        // Alignment adjustment, then drop secondaries that fell too far
        // behind the (possibly adjusted) best score.
        for which_read in 0..NUM_READS_PER_PAIR {
            result.score_prior_to_clipping[which_read] = result.score[which_read];
        }

        let adjuster = AlignmentAdjuster::new(genome);
        if !self.config.ignore_alignment_adjustments_for_om {
            adjuster.adjust_alignments([read0, read1], result);
            if result.status[0] != AlignmentStatus::NotFound
                && result.status[1] != AlignmentStatus::NotFound
            {
                best_pair_score_for_filter = result.score[0] + result.score[1];
            }

            for i in 0..*n_secondary_results {
                let secondary = &mut secondary_results[i];
                for which_read in 0..NUM_READS_PER_PAIR {
                    secondary.score_prior_to_clipping[which_read] = secondary.score[which_read];
                }
                adjuster.adjust_alignments([read0, read1], secondary);
                if secondary.status[0] != AlignmentStatus::NotFound
                    && secondary.status[1] != AlignmentStatus::NotFound
                {
                    best_pair_score_for_filter = best_pair_score_for_filter
                        .min(secondary.score[0] + secondary.score[1]);
                }
            }
        } else {
            for i in 0..*n_secondary_results {
                let secondary = &mut secondary_results[i];
                for which_read in 0..NUM_READS_PER_PAIR {
                    secondary.score_prior_to_clipping[which_read] = secondary.score[which_read];
                }
            }
        }

        let mut i = 0;
        while i < *n_secondary_results {
            let secondary = &secondary_results[i];
            if secondary.score[0] + secondary.score[1] > best_pair_score_for_filter + max_edit
                || secondary.status[0] == AlignmentStatus::NotFound
                || secondary.status[1] == AlignmentStatus::NotFound
            {
                secondary_results[i] = secondary_results[*n_secondary_results - 1];
                *n_secondary_results -= 1;
            } else {
                i += 1;
            }
        }

        // Cap the number of secondaries per contig, counting the primary
        // against its contig. Counts are epoch-stamped so the array never
        // needs a bulk clear.
        let max_per_contig = self.config.max_secondary_alignments_per_contig;
        if max_per_contig > 0 && result.status[0] != AlignmentStatus::NotFound {
            self.contig_count_epoch += 1;
            let epoch = self.contig_count_epoch;

            let primary_contig_num = genome.contig_num_at(result.location[0]);
            let counts = &mut self.hits_per_contig_counts;
            counts[primary_contig_num as usize] = HitsPerContigCounts { hits: 1, epoch };

            let mut any_contig_has_too_many_results = false;
            for i in 0..*n_secondary_results {
                // Both ends share a contig, so either location will do.
                let contig_num =
                    genome.contig_num_at(secondary_results[i].location[0]) as usize;
                if counts[contig_num].epoch != epoch {
                    counts[contig_num] = HitsPerContigCounts { hits: 0, epoch };
                }
                counts[contig_num].hits += 1;
                if counts[contig_num].hits > max_per_contig {
                    any_contig_has_too_many_results = true;
                    break;
                }
            }

            if any_contig_has_too_many_results {
                secondary_results[..*n_secondary_results].sort_unstable_by_key(|r| {
                    (
                        genome.contig_num_at(r.location[0]),
                        r.score[0] + r.score[1],
                        r.location[0],
                    )
                });

                let mut current_contig_num = -1i32;
                let mut current_contig_count = 0;
                let mut dest = 0;
                for src in 0..*n_secondary_results {
                    let contig_num = genome.contig_num_at(secondary_results[src].location[0]);
                    if contig_num != current_contig_num {
                        current_contig_num = contig_num;
                        current_contig_count =
                            if contig_num == primary_contig_num { 1 } else { 0 };
                    }
                    current_contig_count += 1;
                    if current_contig_count <= max_per_contig {
                        secondary_results[dest] = secondary_results[src];
                        dest += 1;
                    }
                }
                *n_secondary_results = dest;
            }
        }

        if *n_secondary_results > max_secondary_results_to_return {
            secondary_results[..*n_secondary_results]
                .sort_unstable_by_key(|r| (r.score[0] + r.score[1], r.location[0], r.location[1]));
            *n_secondary_results = max_secondary_results_to_return;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_limit_dual_books() {
        let mut all = ScoreSet::new();
        let mut non_alt = ScoreSet::new();

        // Nothing found yet: limit is maxK + extra for both kinds.
        assert_eq!(compute_score_limit(true, &all, &non_alt, 14, 2, 3), 16);
        assert_eq!(compute_score_limit(false, &all, &non_alt, 14, 2, 3), 16);

        // A non-ALT best of 2 caps non-ALT candidates at 2 + extra, and ALT
        // candidates must beat 2 by more than the gap.
        non_alt.best_pair_score = 2;
        all.best_pair_score = 2;
        assert_eq!(compute_score_limit(true, &all, &non_alt, 14, 2, 3), 4);
        assert_eq!(compute_score_limit(false, &all, &non_alt, 14, 2, 3), 1);

        // An ALT best of 0 with non-ALT best of 2: non-ALT candidates may
        // still matter up to 0 + gap, while further ALT candidates would
        // have to beat the non-ALT best by more than the gap.
        all.best_pair_score = 0;
        assert_eq!(compute_score_limit(true, &all, &non_alt, 14, 2, 3), 4);
        assert_eq!(compute_score_limit(false, &all, &non_alt, 14, 2, 3), 1);
    }
}
