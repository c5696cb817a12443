use crate::fairness::SeedCommitment;
use rand::RngCore;
use std::collections::VecDeque;

/// Supplies the secret seed for each new round.
pub trait SeedSource: Send {
    fn next_seed(&mut self, round_number: u64) -> SeedCommitment;
}

/// 16 random bytes, hex encoded, with the round number appended.
#[derive(Debug, Default)]
pub struct RandomSeedSource;

impl SeedSource for RandomSeedSource {
    fn next_seed(&mut self, round_number: u64) -> SeedCommitment {
        let mut secret = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut secret);
        SeedCommitment::new(format!("{}{}", hex::encode(secret), round_number))
    }
}

/// Replays a fixed list of seed prefixes, each suffixed with the round
/// number, then falls back to random seeds.
#[derive(Debug, Default)]
pub struct FixedSeedSource {
    prefixes: VecDeque<String>,
    fallback: RandomSeedSource,
}

impl FixedSeedSource {
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            fallback: RandomSeedSource,
        }
    }

    /// Seeds used verbatim, without the round number suffix.
    pub fn exact(seeds: impl IntoIterator<Item = impl Into<String>>) -> ExactSeedSource {
        ExactSeedSource {
            seeds: seeds.into_iter().map(Into::into).collect(),
            fallback: RandomSeedSource,
        }
    }
}

impl SeedSource for FixedSeedSource {
    fn next_seed(&mut self, round_number: u64) -> SeedCommitment {
        match self.prefixes.pop_front() {
            Some(prefix) => SeedCommitment::new(format!("{}{}", prefix, round_number)),
            None => self.fallback.next_seed(round_number),
        }
    }
}

/// See [`FixedSeedSource::exact`].
#[derive(Debug, Default)]
pub struct ExactSeedSource {
    seeds: VecDeque<String>,
    fallback: RandomSeedSource,
}

impl SeedSource for ExactSeedSource {
    fn next_seed(&mut self, round_number: u64) -> SeedCommitment {
        match self.seeds.pop_front() {
            Some(seed) => SeedCommitment::new(seed),
            None => self.fallback.next_seed(round_number),
        }
    }
}
