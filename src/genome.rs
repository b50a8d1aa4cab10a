// src/genome.rs
//
// In-memory reference genome: contigs laid out back to back in one base
// array, addressed by a single genome-wide location. Contigs flagged as ALT
// hold alternative haplotypes; alignments there are only preferred when no
// primary-assembly alignment comes close enough.

/// Genome-wide base offset. Totally ordered; contig membership is resolved
/// through the owning `Genome`.
pub type GenomeLocation = u64;

/// Sentinel for "no location".
pub const INVALID_GENOME_LOCATION: GenomeLocation = GenomeLocation::MAX;

/// True when `location` and `other` are within `distance` of each other.
#[inline]
pub fn genome_location_is_within(
    location: GenomeLocation,
    other: GenomeLocation,
    distance: u64,
) -> bool {
    location.abs_diff(other) <= distance
}

/// One reference sequence within the genome.
#[derive(Debug, Clone)]
pub struct Contig {
    pub name: String,
    pub beginning_location: GenomeLocation,
    pub length: u64,
    pub is_alt: bool,
}

/// The reference: one contiguous base array plus the contig table.
#[derive(Debug)]
pub struct Genome {
    bases: Vec<u8>,
    contigs: Vec<Contig>,
}

impl Genome {
    /// Assemble a genome from `(name, sequence, is_alt)` contig descriptions.
    /// Contigs are placed back to back in the order given.
    pub fn from_contigs<S: Into<String>>(contig_seqs: Vec<(S, Vec<u8>, bool)>) -> Genome {
        let mut bases = Vec::new();
        let mut contigs = Vec::with_capacity(contig_seqs.len());

        for (name, seq, is_alt) in contig_seqs {
            contigs.push(Contig {
                name: name.into(),
                beginning_location: bases.len() as GenomeLocation,
                length: seq.len() as u64,
                is_alt,
            });
            bases.extend_from_slice(&seq);
        }

        Genome { bases, contigs }
    }

    pub fn count_of_bases(&self) -> u64 {
        self.bases.len() as u64
    }

    pub fn num_contigs(&self) -> u32 {
        self.contigs.len() as u32
    }

    /// The bases starting at `location`, or None if the range runs off the
    /// end of the genome.
    pub fn substring(&self, location: GenomeLocation, len: u64) -> Option<&[u8]> {
        let start = location as usize;
        let end = start.checked_add(len as usize)?;
        self.bases.get(start..end)
    }

    /// The contig containing `location`, or None when out of range.
    pub fn contig_at(&self, location: GenomeLocation) -> Option<&Contig> {
        let num = self.contig_num_at(location);
        if num < 0 {
            None
        } else {
            Some(&self.contigs[num as usize])
        }
    }

    /// Index of the contig containing `location`; -1 when out of range.
    pub fn contig_num_at(&self, location: GenomeLocation) -> i32 {
        if location >= self.count_of_bases() {
            return -1;
        }
        // Last contig whose beginning is <= location.
        let idx = self
            .contigs
            .partition_point(|c| c.beginning_location <= location);
        idx as i32 - 1
    }

    pub fn contig(&self, num: u32) -> &Contig {
        &self.contigs[num as usize]
    }

    pub fn is_genome_location_alt(&self, location: GenomeLocation) -> bool {
        self.contig_at(location).map_or(false, |c| c.is_alt)
    }

    /// True when `[location, location + len)` lies entirely within one contig.
    pub fn range_within_one_contig(&self, location: GenomeLocation, len: u64) -> bool {
        match self.contig_at(location) {
            None => false,
            Some(contig) => location + len <= contig.beginning_location + contig.length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_contig_genome() -> Genome {
        Genome::from_contigs(vec![
            ("chr1", b"ACGTACGTAC".to_vec(), false),
            ("chr1_alt", b"TTTTGGGG".to_vec(), true),
        ])
    }

    #[test]
    fn test_contig_lookup() {
        let genome = two_contig_genome();
        assert_eq!(genome.count_of_bases(), 18);
        assert_eq!(genome.num_contigs(), 2);
        assert_eq!(genome.contig_at(0).unwrap().name, "chr1");
        assert_eq!(genome.contig_at(9).unwrap().name, "chr1");
        assert_eq!(genome.contig_at(10).unwrap().name, "chr1_alt");
        assert_eq!(genome.contig_num_at(17), 1);
        assert_eq!(genome.contig_num_at(18), -1);
        assert!(genome.contig_at(18).is_none());
    }

    #[test]
    fn test_substring_bounds() {
        let genome = two_contig_genome();
        assert_eq!(genome.substring(0, 4).unwrap(), b"ACGT");
        assert_eq!(genome.substring(16, 2).unwrap(), b"GG");
        assert!(genome.substring(16, 3).is_none());
        assert!(genome.substring(INVALID_GENOME_LOCATION, 1).is_none());
    }

    #[test]
    fn test_alt_classification() {
        let genome = two_contig_genome();
        assert!(!genome.is_genome_location_alt(5));
        assert!(genome.is_genome_location_alt(12));
        assert!(!genome.is_genome_location_alt(100)); // out of range is not ALT
    }

    #[test]
    fn test_range_within_one_contig() {
        let genome = two_contig_genome();
        assert!(genome.range_within_one_contig(0, 10));
        assert!(!genome.range_within_one_contig(8, 4)); // crosses into chr1_alt
        assert!(genome.range_within_one_contig(10, 8));
        assert!(!genome.range_within_one_contig(10, 9));
    }

    #[test]
    fn test_location_is_within() {
        assert!(genome_location_is_within(100, 131, 31));
        assert!(genome_location_is_within(131, 100, 31));
        assert!(!genome_location_is_within(100, 132, 31));
    }
}
