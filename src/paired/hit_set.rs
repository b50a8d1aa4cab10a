// src/paired/hit_set.rs
//
// Per (read, direction) collection of seed-lookup hit lists, supporting the
// descending traversal the intersection walk needs. The hit lists stay
// owned by the index; a hit set only borrows them for the duration of one
// align call.
//
// Hit lists arrive sorted strictly descending by genome location. Every
// query subtracts the seed's offset within the read, so all lookups speak
// in terms of the location the *read* would start at.
//
// Seeds recorded after a wrap of the seed picker start a new disjoint hit
// set: a group of mutually non-overlapping seeds. If every seed of some
// disjoint group misses a location, the read must have at least one edit
// there, which is what `compute_best_possible_score_for_current_hit` turns
// into a lower bound.

use crate::genome::{genome_location_is_within, GenomeLocation};
use crate::index::{HitSlice, HitWidth};

/// Sentinel index for "no lookup" in the non-empty lookup chain.
const NO_LOOKUP: u32 = u32::MAX;

/// Raw hit value in one of the two index widths.
pub(crate) trait HitLocation: Copy {
    fn as_location(self) -> GenomeLocation;
}

impl HitLocation for u32 {
    #[inline]
    fn as_location(self) -> GenomeLocation {
        self as GenomeLocation
    }
}

impl HitLocation for u64 {
    #[inline]
    fn as_location(self) -> GenomeLocation {
        self
    }
}

struct Lookup<'a, L: HitLocation> {
    seed_offset: u32,
    hits: &'a [L],
    /// Cursor into `hits`; equals `hits.len()` once exhausted.
    current: usize,
    which_disjoint_hit_set: u32,
}

#[derive(Clone, Copy, Default)]
struct DisjointHitSet {
    count_of_exhausted_hits: u32,
    miss_count: u32,
}

/// The width-generic implementation; `HitSet` wraps it in an enum so the
/// intersection algorithm exists once.
pub(crate) struct HitLookups<'a, L: HitLocation> {
    lookups: Vec<Lookup<'a, L>>,
    /// Singly linked chain over lookup indices, newest first. Kept so the
    /// best-possible-score pass touches only recorded lookups.
    chain_next: Vec<u32>,
    chain_head: u32,
    disjoint_hit_sets: Vec<DisjointHitSet>,
    max_merge_distance: u32,
    most_recent_location_returned: GenomeLocation,
}

impl<'a, L: HitLocation> HitLookups<'a, L> {
    fn new(max_seeds: usize, max_merge_distance: u32) -> Self {
        HitLookups {
            lookups: Vec::with_capacity(max_seeds),
            chain_next: Vec::with_capacity(max_seeds),
            chain_head: NO_LOOKUP,
            disjoint_hit_sets: Vec::with_capacity(max_seeds),
            max_merge_distance,
            most_recent_location_returned: 0,
        }
    }

    fn record_lookup(&mut self, seed_offset: u32, hits: &'a [L], begins_disjoint_hit_set: bool) {
        if begins_disjoint_hit_set {
            self.disjoint_hit_sets.push(DisjointHitSet::default());
        }
        debug_assert!(
            !self.disjoint_hit_sets.is_empty(),
            "first recordLookup must begin a disjoint hit set"
        );

        if hits.is_empty() {
            self.disjoint_hit_sets
                .last_mut()
                .expect("a disjoint hit set is open")
                .count_of_exhausted_hits += 1;
            return;
        }

        // Trim trailing hits smaller than the seed offset; the read would
        // start before the beginning of the genome.
        let mut n_hits = hits.len();
        while n_hits > 0 && hits[n_hits - 1].as_location() < seed_offset as GenomeLocation {
            n_hits -= 1;
        }

        let index = self.lookups.len() as u32;
        self.lookups.push(Lookup {
            seed_offset,
            hits: &hits[..n_hits],
            current: 0,
            which_disjoint_hit_set: (self.disjoint_hit_sets.len() - 1) as u32,
        });
        self.chain_next.push(self.chain_head);
        self.chain_head = index;
    }

    /// Seed the traversal: the highest read-start location over all lookups.
    fn get_first_hit(&mut self) -> Option<(GenomeLocation, u32)> {
        let mut best: Option<(GenomeLocation, u32)> = None;
        for lookup in &self.lookups {
            if let Some(&hit) = lookup.hits.first() {
                let location = hit.as_location() - lookup.seed_offset as GenomeLocation;
                if best.map_or(true, |(b, _)| location > b) {
                    best = Some((location, lookup.seed_offset));
                }
            }
        }
        if let Some((location, _)) = best {
            self.most_recent_location_returned = location;
        }
        best
    }

    /// The largest read-start location that is <= `max_location`, advancing
    /// every lookup's cursor to its own largest qualifying hit.
    fn get_next_hit_less_than_or_equal_to(
        &mut self,
        max_location: GenomeLocation,
    ) -> Option<(GenomeLocation, u32)> {
        let mut best: Option<(GenomeLocation, u32)> = None;

        for lookup in &mut self.lookups {
            let target = max_location + lookup.seed_offset as GenomeLocation;

            let mut lo = lookup.current as i64;
            let mut hi = lookup.hits.len() as i64 - 1;

            while lo <= hi {
                let probe = ((lo + hi) / 2) as usize;
                let probe_hit = lookup.hits[probe].as_location();

                // The lists are sorted descending, so this finds the first
                // (largest-index-free) entry <= target: probe qualifies and
                // its left neighbor, if any, is still above the target.
                if probe_hit <= target
                    && (probe == 0 || lookup.hits[probe - 1].as_location() > target)
                {
                    let location = probe_hit - lookup.seed_offset as GenomeLocation;
                    if best.map_or(true, |(b, _)| location > b) {
                        best = Some((location, lookup.seed_offset));
                    }
                    lookup.current = probe;
                    break;
                }

                if probe_hit > target {
                    lo = probe as i64 + 1;
                } else {
                    hi = probe as i64 - 1;
                }
            }

            if lo > hi {
                // Every remaining hit is below the target range.
                lookup.current = lookup.hits.len();
            }
        }

        if let Some((location, _)) = best {
            debug_assert!(location <= max_location);
            self.most_recent_location_returned = location;
        }
        best
    }

    /// The largest read-start location strictly below the most recently
    /// returned one.
    fn get_next_lower_hit(&mut self) -> Option<(GenomeLocation, u32)> {
        let mut best: Option<(GenomeLocation, u32)> = None;

        for lookup in &mut self.lookups {
            let offset = lookup.seed_offset as GenomeLocation;

            // Step past the hit we already returned.
            if lookup.current != lookup.hits.len()
                && lookup.hits[lookup.current].as_location() - offset
                    == self.most_recent_location_returned
            {
                lookup.current += 1;
            }

            if lookup.current == lookup.hits.len() {
                continue;
            }

            let hit = lookup.hits[lookup.current].as_location();
            if hit >= offset {
                let location = hit - offset;
                if best.map_or(true, |(b, _)| location > b) {
                    best = Some((location, lookup.seed_offset));
                }
            }
        }

        if let Some((location, _)) = best {
            self.most_recent_location_returned = location;
        }
        best
    }

    /// Lower bound on the edit distance of the read at the location most
    /// recently returned: the largest count, over the disjoint hit-set
    /// groups, of member seeds that miss the location.
    fn compute_best_possible_score_for_current_hit(&mut self) -> i32 {
        for set in &mut self.disjoint_hit_sets {
            set.miss_count = set.count_of_exhausted_hits;
        }

        let mut index = self.chain_head;
        while index != NO_LOOKUP {
            let lookup = &self.lookups[index as usize];
            let expected =
                self.most_recent_location_returned + lookup.seed_offset as GenomeLocation;

            let current_is_close = lookup.current != lookup.hits.len()
                && genome_location_is_within(
                    lookup.hits[lookup.current].as_location(),
                    expected,
                    self.max_merge_distance as u64,
                );
            let previous_is_close = lookup.current != 0
                && genome_location_is_within(
                    lookup.hits[lookup.current - 1].as_location(),
                    expected,
                    self.max_merge_distance as u64,
                );

            if !(current_is_close || previous_is_close) {
                self.disjoint_hit_sets[lookup.which_disjoint_hit_set as usize].miss_count += 1;
            }

            index = self.chain_next[index as usize];
        }

        self.disjoint_hit_sets
            .iter()
            .map(|set| set.miss_count)
            .max()
            .unwrap_or(0) as i32
    }
}

/// Hit set in the width the index was built with.
pub(crate) enum HitSet<'a> {
    Bits32(HitLookups<'a, u32>),
    Bits64(HitLookups<'a, u64>),
}

impl<'a> HitSet<'a> {
    pub fn new(width: HitWidth, max_seeds: usize, max_merge_distance: u32) -> HitSet<'a> {
        match width {
            HitWidth::Bits32 => HitSet::Bits32(HitLookups::new(max_seeds, max_merge_distance)),
            HitWidth::Bits64 => HitSet::Bits64(HitLookups::new(max_seeds, max_merge_distance)),
        }
    }

    pub fn record_lookup(
        &mut self,
        seed_offset: u32,
        hits: HitSlice<'a>,
        begins_disjoint_hit_set: bool,
    ) {
        match (self, hits) {
            (HitSet::Bits32(set), HitSlice::Bits32(hits)) => {
                set.record_lookup(seed_offset, hits, begins_disjoint_hit_set)
            }
            (HitSet::Bits64(set), HitSlice::Bits64(hits)) => {
                set.record_lookup(seed_offset, hits, begins_disjoint_hit_set)
            }
            _ => unreachable!("hit width differs from the index's"),
        }
    }

    pub fn get_first_hit(&mut self) -> Option<(GenomeLocation, u32)> {
        match self {
            HitSet::Bits32(set) => set.get_first_hit(),
            HitSet::Bits64(set) => set.get_first_hit(),
        }
    }

    pub fn get_next_hit_less_than_or_equal_to(
        &mut self,
        max_location: GenomeLocation,
    ) -> Option<(GenomeLocation, u32)> {
        match self {
            HitSet::Bits32(set) => set.get_next_hit_less_than_or_equal_to(max_location),
            HitSet::Bits64(set) => set.get_next_hit_less_than_or_equal_to(max_location),
        }
    }

    pub fn get_next_lower_hit(&mut self) -> Option<(GenomeLocation, u32)> {
        match self {
            HitSet::Bits32(set) => set.get_next_lower_hit(),
            HitSet::Bits64(set) => set.get_next_lower_hit(),
        }
    }

    pub fn compute_best_possible_score_for_current_hit(&mut self) -> i32 {
        match self {
            HitSet::Bits32(set) => set.compute_best_possible_score_for_current_hit(),
            HitSet::Bits64(set) => set.compute_best_possible_score_for_current_hit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set32(max_seeds: usize) -> HitLookups<'static, u32> {
        HitLookups::new(max_seeds, 31)
    }

    #[test]
    fn test_first_hit_is_maximum_over_lookups() {
        let mut set = set32(4);
        set.record_lookup(0, &[500, 300, 100], true);
        set.record_lookup(10, &[410, 310, 110], false);

        // 410 - 10 = 400 < 500 - 0.
        assert_eq!(set.get_first_hit(), Some((500, 0)));
    }

    #[test]
    fn test_trailing_hits_below_offset_are_trimmed() {
        let mut set = set32(4);
        set.record_lookup(20, &[500, 19, 5], true);
        assert_eq!(set.get_first_hit(), Some((480, 20)));
        // The trimmed entries must never surface.
        assert_eq!(set.get_next_lower_hit(), None);
    }

    #[test]
    fn test_next_hit_less_than_or_equal_to() {
        let mut set = set32(4);
        set.record_lookup(0, &[900, 500, 100], true);
        set.record_lookup(5, &[705, 305], false);

        assert_eq!(set.get_first_hit(), Some((900, 0)));
        // 705 - 5 = 700 is the largest location <= 800.
        assert_eq!(set.get_next_hit_less_than_or_equal_to(800), Some((700, 5)));
        // Exact boundary: 500 <= 500.
        assert_eq!(set.get_next_hit_less_than_or_equal_to(500), Some((500, 0)));
        assert_eq!(set.get_next_hit_less_than_or_equal_to(50), None);
    }

    #[test]
    fn test_next_lower_hit_walks_descending() {
        let mut set = set32(4);
        set.record_lookup(0, &[900, 500, 100], true);
        set.record_lookup(5, &[905, 505], false);

        // Both lookups resolve to 900; the cursor of each must advance past
        // it so we do not return the same location twice.
        assert_eq!(set.get_first_hit(), Some((900, 0)));
        assert_eq!(set.get_next_lower_hit(), Some((500, 0)));
        assert_eq!(set.get_next_lower_hit(), Some((100, 0)));
        assert_eq!(set.get_next_lower_hit(), None);
    }

    #[test]
    fn test_best_possible_score_counts_disjoint_misses() {
        let mut set = set32(4);
        // Group 0: two seeds, both hitting location 1000.
        set.record_lookup(0, &[1000, 200], true);
        set.record_lookup(10, &[1010, 400], false);
        // Group 1: one seed that misses 1000 entirely.
        set.record_lookup(3, &[703], true);

        assert_eq!(set.get_first_hit(), Some((1000, 0)));
        // Group 0 has both seeds close by; group 1 misses => bound 1.
        assert_eq!(set.compute_best_possible_score_for_current_hit(), 1);
    }

    #[test]
    fn test_exhausted_lookups_count_as_misses() {
        let mut set = set32(4);
        set.record_lookup(0, &[1000], true);
        set.record_lookup(10, &[], false); // no hits: exhausted in group 0
        set.record_lookup(5, &[], true); // group 1, exhausted

        assert_eq!(set.get_first_hit(), Some((1000, 0)));
        // Group 0: one exhausted, one close => 1. Group 1: exhausted => 1.
        assert_eq!(set.compute_best_possible_score_for_current_hit(), 1);
    }

    #[test]
    fn test_merge_distance_tolerance() {
        let mut set = set32(4);
        set.record_lookup(0, &[1000], true);
        set.record_lookup(10, &[990], true); // resolves to 980, within 31 of 1000

        assert_eq!(set.get_first_hit(), Some((1000, 0)));
        // The second group's hit (990) is within maxMergeDistance of
        // 1000 + 10, so neither group misses.
        assert_eq!(set.compute_best_possible_score_for_current_hit(), 0);
    }

    #[test]
    fn test_64_bit_variant_behaves_identically() {
        let mut set: HitLookups<'static, u64> = HitLookups::new(4, 31);
        let high = 1u64 << 40;
        let hits: &'static [u64] = Box::leak(Box::new([high + 900, high + 500]));
        set.record_lookup(0, hits, true);

        assert_eq!(set.get_first_hit(), Some((high + 900, 0)));
        assert_eq!(
            set.get_next_hit_less_than_or_equal_to(high + 600),
            Some((high + 500, 0))
        );
        assert_eq!(set.get_next_lower_hit(), None);
    }
}
