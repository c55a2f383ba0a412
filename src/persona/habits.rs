//! Synthetic behavioral habits.
//!
//! Habits are flavor only: a fixed pool of quirks, a deterministic pick per
//! session. They never feed back into safety-relevant logic.

use md5::{Digest, Md5};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

const QUIRK_POOL: [&str; 6] = [
    "Often uses analogies related to old clockwork mechanisms.",
    "Has a habit of starting complex explanations with 'Observe...'.",
    "Occasionally apologizes for being 'excessively precise'.",
    "Uses metaphors derived from biological systems theory.",
    "Tends to structure lists in groups of three for 'optimal clarity'.",
    "Frequently uses phrases like 'strictly speaking' or 'in essence'.",
];

pub const HABIT_PROVENANCE: &str = "generated_l2_habits";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Habit {
    pub text: &'static str,
    pub synthetic: bool,
    pub provenance: &'static str,
}

#[derive(Debug, Clone)]
pub struct HabitGenerator {
    count: usize,
}

impl Default for HabitGenerator {
    fn default() -> Self {
        Self { count: 2 }
    }
}

impl HabitGenerator {
    pub fn new(count: usize) -> Self {
        Self {
            count: count.min(QUIRK_POOL.len()),
        }
    }

    /// Pick `count` distinct quirks, deterministically for `seed`.
    pub fn generate(&self, seed: &str) -> Vec<Habit> {
        let digest = Md5::digest(seed.as_bytes());
        let mut seed_bytes = [0u8; 8];
        seed_bytes.copy_from_slice(&digest[..8]);
        let mut rng = StdRng::seed_from_u64(u64::from_be_bytes(seed_bytes));

        QUIRK_POOL
            .choose_multiple(&mut rng, self.count)
            .map(|text| Habit {
                text: *text,
                synthetic: true,
                provenance: HABIT_PROVENANCE,
            })
            .collect()
    }

    /// Bullet list under the habits header.
    pub fn render(&self, seed: &str) -> String {
        self.generate(seed)
            .iter()
            .map(|h| format!("- {}", h.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
