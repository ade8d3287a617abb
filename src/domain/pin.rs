use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const PIN_LENGTH: usize = 4;

/// Returns true if `pin` is exactly four ASCII digits.
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit())
}

/// One-way SHA-256 digest of a PIN, stored as lowercase hex.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinHash(String);

impl PinHash {
    pub fn of(pin: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(pin.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn matches(&self, input: &str) -> bool {
        *self == Self::of(input)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep digests out of debug output.
impl fmt::Debug for PinHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PinHash(..)")
    }
}
