// src/index/seed_index.rs
//
// Seed lookup table over a genome: every valid seed position maps to the
// list of genome locations where that seed occurs, sorted strictly
// descending. Lookups return borrowed slices; the lists are owned by the
// index for its whole lifetime.
//
// Position storage is 32-bit when the genome fits in a u32 and 64-bit
// otherwise, chosen once at build time. The aligner mirrors the choice in
// its hit-set machinery instead of widening everything to u64 up front.

use std::collections::HashMap;

use crate::genome::{Genome, GenomeLocation};
use crate::index::seed::Seed;

/// Width of the hit lists an index hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitWidth {
    Bits32,
    Bits64,
}

/// Borrowed hit list in the index's native width.
#[derive(Debug, Clone, Copy)]
pub enum HitSlice<'a> {
    Bits32(&'a [u32]),
    Bits64(&'a [u64]),
}

impl<'a> HitSlice<'a> {
    pub fn len(&self) -> usize {
        match self {
            HitSlice::Bits32(h) => h.len(),
            HitSlice::Bits64(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The two hit lists for one seed lookup: occurrences of the seed itself
/// and of its reverse complement.
#[derive(Debug, Clone, Copy)]
pub struct SeedHits<'a> {
    pub forward: HitSlice<'a>,
    pub rc: HitSlice<'a>,
}

enum Postings {
    Bits32(HashMap<u64, Vec<u32>>),
    Bits64(HashMap<u64, Vec<u64>>),
}

pub struct SeedIndex {
    seed_len: u32,
    genome_len: u64,
    postings: Postings,
}

const EMPTY_32: &[u32] = &[];
const EMPTY_64: &[u64] = &[];

impl SeedIndex {
    /// Scan `genome` and build the posting lists. Seeds that would span a
    /// contig boundary are not indexed; an aligned read never crosses one.
    pub fn build(genome: &Genome, seed_len: u32) -> SeedIndex {
        assert!(
            (1..=32).contains(&seed_len),
            "seed length must be in 1..=32, got {}",
            seed_len
        );

        let use_64 = genome.count_of_bases() > u32::MAX as u64;
        let mut postings = if use_64 {
            Postings::Bits64(HashMap::new())
        } else {
            Postings::Bits32(HashMap::new())
        };

        for contig_num in 0..genome.num_contigs() {
            let contig = genome.contig(contig_num);
            if contig.length < seed_len as u64 {
                continue;
            }
            let bases = genome
                .substring(contig.beginning_location, contig.length)
                .expect("contig range is inside the genome");

            for offset in 0..=(bases.len() - seed_len as usize) {
                let text = &bases[offset..offset + seed_len as usize];
                let Some(seed) = Seed::from_bases(text) else {
                    continue;
                };
                let location = contig.beginning_location + offset as GenomeLocation;
                match &mut postings {
                    Postings::Bits32(map) => {
                        map.entry(seed.as_packed()).or_default().push(location as u32)
                    }
                    Postings::Bits64(map) => {
                        map.entry(seed.as_packed()).or_default().push(location)
                    }
                }
            }
        }

        // Posting lists were filled in ascending genome order; the
        // intersection walks from high locations down.
        match &mut postings {
            Postings::Bits32(map) => {
                for list in map.values_mut() {
                    list.reverse();
                }
            }
            Postings::Bits64(map) => {
                for list in map.values_mut() {
                    list.reverse();
                }
            }
        }

        log::debug!(
            "built seed index: seed_len={}, genome_len={}, distinct_seeds={}",
            seed_len,
            genome.count_of_bases(),
            match &postings {
                Postings::Bits32(m) => m.len(),
                Postings::Bits64(m) => m.len(),
            }
        );

        SeedIndex {
            seed_len,
            genome_len: genome.count_of_bases(),
            postings,
        }
    }

    pub fn seed_length(&self) -> u32 {
        self.seed_len
    }

    pub fn genome_length(&self) -> u64 {
        self.genome_len
    }

    pub fn hit_width(&self) -> HitWidth {
        match self.postings {
            Postings::Bits32(_) => HitWidth::Bits32,
            Postings::Bits64(_) => HitWidth::Bits64,
        }
    }

    /// Look up a seed: forward occurrences and reverse-complement
    /// occurrences, each sorted strictly descending.
    pub fn lookup_seed(&self, seed: Seed) -> SeedHits<'_> {
        let rc = seed.reverse_complement(self.seed_len);
        match &self.postings {
            Postings::Bits32(map) => SeedHits {
                forward: HitSlice::Bits32(
                    map.get(&seed.as_packed()).map_or(EMPTY_32, Vec::as_slice),
                ),
                rc: HitSlice::Bits32(map.get(&rc.as_packed()).map_or(EMPTY_32, Vec::as_slice)),
            },
            Postings::Bits64(map) => SeedHits {
                forward: HitSlice::Bits64(
                    map.get(&seed.as_packed()).map_or(EMPTY_64, Vec::as_slice),
                ),
                rc: HitSlice::Bits64(map.get(&rc.as_packed()).map_or(EMPTY_64, Vec::as_slice)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_genome() -> Genome {
        // AACGT repeated gives multiple hits for the same 4-mer.
        Genome::from_contigs(vec![("chr1", b"AACGTAACGTAACGT".to_vec(), false)])
    }

    fn hits32(slice: HitSlice<'_>) -> Vec<u32> {
        match slice {
            HitSlice::Bits32(h) => h.to_vec(),
            HitSlice::Bits64(_) => panic!("expected 32-bit hits"),
        }
    }

    #[test]
    fn test_lookup_sorted_descending() {
        let genome = small_genome();
        let index = SeedIndex::build(&genome, 4);
        assert_eq!(index.hit_width(), HitWidth::Bits32);

        let seed = Seed::from_bases(b"AACG").unwrap();
        let hits = index.lookup_seed(seed);
        assert_eq!(hits32(hits.forward), vec![10, 5, 0]);

        // rc(AACG) = CGTT, which never occurs.
        assert!(hits.rc.is_empty());
    }

    #[test]
    fn test_rc_hits_are_rc_occurrences() {
        let genome = Genome::from_contigs(vec![("c", b"AAAATTTT".to_vec(), false)]);
        let index = SeedIndex::build(&genome, 4);

        // rc(AAAA) = TTTT occurs at 4.
        let hits = index.lookup_seed(Seed::from_bases(b"AAAA").unwrap());
        assert_eq!(hits32(hits.forward), vec![0]);
        assert_eq!(hits32(hits.rc), vec![4]);
    }

    #[test]
    fn test_contig_boundary_seeds_not_indexed() {
        let genome = Genome::from_contigs(vec![
            ("c1", b"AAAA".to_vec(), false),
            ("c2", b"CCCC".to_vec(), false),
        ]);
        let index = SeedIndex::build(&genome, 4);

        // The 4-mer spanning the boundary (AACC at location 2) must be absent.
        let hits = index.lookup_seed(Seed::from_bases(b"AACC").unwrap());
        assert!(hits.forward.is_empty());
    }

    #[test]
    fn test_n_bases_break_seeds() {
        let genome = Genome::from_contigs(vec![("c", b"AANAA".to_vec(), false)]);
        let index = SeedIndex::build(&genome, 2);
        let hits = index.lookup_seed(Seed::from_bases(b"AA").unwrap());
        assert_eq!(hits32(hits.forward), vec![3, 0]);
    }
}
