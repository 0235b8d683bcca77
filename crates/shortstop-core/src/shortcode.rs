use serde::{Deserialize, Serialize};
use std::fmt::Display;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the UTF-8 bytes of `input`.
fn fnv1a_32(input: &str) -> u32 {
    input.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// The compact key a long URL is filed under.
///
/// Codes are derived deterministically: the same long URL yields the same
/// code in every process and every backend. Two different long URLs may
/// collide on one code; resolving that is the backend's job, not the
/// generator's.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(String);

impl ShortCode {
    /// Derives the short code for a long URL.
    ///
    /// The 32-bit FNV-1a hash of the URL, rendered as lowercase hex without
    /// leading zeros.
    pub fn from_long_url(long: &str) -> Self {
        Self(format!("{:x}", fnv1a_32(long)))
    }

    /// Wraps an already-known code, e.g. one read back from the log or the
    /// database. No derivation is performed.
    pub fn new_unchecked(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShortCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
