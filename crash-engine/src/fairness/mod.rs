pub mod source;

pub use source::{FixedSeedSource, RandomSeedSource, SeedSource};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex digits of the digest used as the crash-point integer window.
const WINDOW_HEX_DIGITS: usize = 8;
const MODULUS: u64 = 100_000;
/// Crash points are expressed in hundredths.
const SCALE: u64 = 100;
const MIN_CRASH_HUNDREDTHS: u64 = 100;

/// A round's secret seed together with its published commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCommitment {
    #[serde(skip)]
    seed: String,
    hash: String,
}

impl SeedCommitment {
    pub fn new(seed: String) -> Self {
        let hash = commitment_hash(&seed);
        Self { seed, hash }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn crash_point(&self) -> f64 {
        generate_crash_point(&self.seed)
    }

    pub fn verify(&self, seed: &str) -> bool {
        verify_commitment(seed, &self.hash)
    }
}

/// Hex SHA-256 of the seed string.
pub fn commitment_hash(seed: &str) -> String {
    hex::encode(Sha256::digest(seed.as_bytes()))
}

pub fn verify_commitment(seed: &str, hash: &str) -> bool {
    commitment_hash(seed).eq_ignore_ascii_case(hash.trim())
}

/// Crash point in hundredths, e.g. `379` for 3.79x.
///
/// The first 32 bits of the seed digest are reduced mod 100000 and inverted,
/// so low multipliers dominate and the tail is long. The `+ 1` keeps the
/// divisor non-zero.
pub fn crash_point_hundredths(seed: &str) -> u64 {
    let digest = commitment_hash(seed);
    let window = u64::from_str_radix(&digest[..WINDOW_HEX_DIGITS], 16).unwrap_or(0);

    let hundredths = (SCALE * MODULUS) / (window % MODULUS + 1);
    hundredths.max(MIN_CRASH_HUNDREDTHS)
}

/// Deterministic crash multiplier for a seed, two decimals, at least 1.00.
pub fn generate_crash_point(seed: &str) -> f64 {
    crash_point_hundredths(seed) as f64 / SCALE as f64
}
