// benches/align_bench.rs
// Criterion benchmark for the paired-end align path over a synthetic genome.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use intersect_align::config::AlignerConfig;
use intersect_align::genome::Genome;
use intersect_align::paired::{IntersectingPairedEndAligner, PairedAlignmentResult};
use intersect_align::read::{reverse_complement_into, Read};
use intersect_align::SeedIndex;

const SEED_LEN: u32 = 16;
const READ_LEN: usize = 100;

fn random_bases(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

fn flip_base(base: u8) -> u8 {
    match base {
        b'A' => b'C',
        b'C' => b'G',
        b'G' => b'T',
        _ => b'A',
    }
}

fn make_genome(rng: &mut StdRng) -> Genome {
    Genome::from_contigs(vec![("chr1", random_bases(rng, 100_000), false)])
}

fn make_pairs(genome: &Genome, rng: &mut StdRng, n: usize) -> Vec<(Read, Read)> {
    (0..n)
        .map(|i| {
            let start = rng.gen_range(0..90_000u64);
            let mate_start = start + rng.gen_range(200..800u64);

            let mut read0 = genome.substring(start, READ_LEN as u64).unwrap().to_vec();
            // One SNP per read keeps the scorer honest.
            read0[READ_LEN / 2] = flip_base(read0[READ_LEN / 2]);
            let mate = genome.substring(mate_start, READ_LEN as u64).unwrap();
            let mut read1 = Vec::new();
            reverse_complement_into(mate, &mut read1);

            (
                Read::with_uniform_quality(format!("b{}/1", i), read0, b'I'),
                Read::with_uniform_quality(format!("b{}/2", i), read1, b'I'),
            )
        })
        .collect()
}

fn bench_paired_align(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let genome = make_genome(&mut rng);
    let index = SeedIndex::build(&genome, SEED_LEN);
    let config = AlignerConfig::default();
    let pairs = make_pairs(&genome, &mut rng, 64);

    let mut group = c.benchmark_group("paired_align");
    group.throughput(Throughput::Elements(pairs.len() as u64));
    group.bench_function("snp_pairs_100bp", |b| {
        let mut aligner = IntersectingPairedEndAligner::new(&index, &genome, &config);
        let mut result = PairedAlignmentResult::default();
        let mut first_alt_result = PairedAlignmentResult::default();

        b.iter(|| {
            for (read0, read1) in &pairs {
                let mut n_secondary_results = 0;
                aligner.align(
                    black_box(read0),
                    black_box(read1),
                    &mut result,
                    &mut first_alt_result,
                    -1,
                    &mut n_secondary_results,
                    &mut [],
                    0,
                );
            }
            black_box(result.location)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_paired_align);
criterion_main!(benches);
