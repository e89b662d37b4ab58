//! Integrity tokens stamped on every ledger block.
//!
//! A token is 16 random bytes rendered as `0x` + 32 lowercase hex digits. It is
//! NOT derived from the block content or from the previous block: two blocks
//! with identical fields get unrelated tokens, and nothing can be checked
//! against it later.

use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes behind a token.
pub const TOKEN_BYTES: usize = 16;

/// Generate a fresh integrity token using the OS RNG.
pub fn generate_integrity_token() -> String {
    let mut raw = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut raw);
    format!("0x{}", hex::encode(raw))
}
