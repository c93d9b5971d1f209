//! A minimal syllable-combining name generator for sector labels.
//!
//! The reference implementation's `namegen.c` ships hundreds of hand-curated
//! names and constellation tables; that's game content out of scope here
//! (§1 "Game content ... name generators"). This is the smallest mechanism
//! that satisfies "sectors with random names" structurally, not a content
//! table.

use rand::Rng;

const FIRST: &[&str] = &["Al", "Bel", "Cor", "Dra", "Esh", "Fen", "Gor", "Hyl"];
const LAST: &[&str] = &["ara", "inor", "oth", "yxis", "ani", "orum", "ess", "ulon"];

pub fn random_sector_name(rng: &mut impl Rng) -> String {
    let first = FIRST[rng.gen_range(0..FIRST.len())];
    let last = LAST[rng.gen_range(0..LAST.len())];
    format!("{}{}", first, last)
}
