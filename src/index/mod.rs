// Seed index: packed seeds and the genome-wide posting lists the paired
// aligner intersects.

pub mod seed;
pub mod seed_index;

pub use seed::Seed;
pub use seed_index::{HitSlice, HitWidth, SeedHits, SeedIndex};
