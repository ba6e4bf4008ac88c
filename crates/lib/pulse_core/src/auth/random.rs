//! High-entropy random strings for auth keys and OAuth `state`.

use rand::distr::Alphanumeric;
use rand::{Rng, rng};

/// Length of auth keys and `state` values, excluding any prefix.
pub const RANDOM_KEY_LEN: usize = 32;

/// Generate `len` alphanumeric characters from the thread-local CSPRNG.
pub fn random_chars(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
