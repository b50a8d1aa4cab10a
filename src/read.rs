// src/read.rs
//
// A sequencing read: bases plus per-base phred+33 qualities. The aligner
// derives reverse-complement and reversed views itself; this type stays a
// plain immutable container.

/// Complement of one ASCII base. N stays N.
#[inline]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        _ => b'N',
    }
}

/// Write the reverse complement of `data` into `out` (cleared first).
pub fn reverse_complement_into(data: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.extend(data.iter().rev().map(|&b| complement(b)));
}

/// Write `data` reversed into `out` (cleared first).
pub fn reverse_into(data: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.extend(data.iter().rev().copied());
}

/// An immutable read.
#[derive(Debug, Clone)]
pub struct Read {
    id: String,
    data: Vec<u8>,
    quality: Vec<u8>,
}

impl Read {
    pub fn new<S: Into<String>>(id: S, data: Vec<u8>, quality: Vec<u8>) -> Read {
        assert_eq!(data.len(), quality.len(), "base and quality lengths differ");
        Read {
            id: id.into(),
            data,
            quality,
        }
    }

    /// A read with uniform quality, convenient for tests and benchmarks.
    pub fn with_uniform_quality<S: Into<String>>(id: S, data: Vec<u8>, quality: u8) -> Read {
        let len = data.len();
        Read::new(id, data, vec![quality; len])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn quality(&self) -> &[u8] {
        &self.quality
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Count of bases that are not one of A, C, G, T.
    pub fn count_of_ns(&self) -> usize {
        self.data
            .iter()
            .filter(|&&b| !matches!(b, b'A' | b'C' | b'G' | b'T'))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        let mut out = Vec::new();
        reverse_complement_into(b"ACGTN", &mut out);
        assert_eq!(out, b"NACGT");
    }

    #[test]
    fn test_reverse() {
        let mut out = Vec::new();
        reverse_into(b"ACGT", &mut out);
        assert_eq!(out, b"TGCA");
    }

    #[test]
    fn test_n_count() {
        let read = Read::with_uniform_quality("r", b"ACGNNT".to_vec(), b'I');
        assert_eq!(read.count_of_ns(), 2);
        assert_eq!(read.len(), 6);
    }
}
