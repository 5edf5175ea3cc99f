//! Challenge token generation.

use rand::Rng;

/// Symbols a human can read back without ambiguity (0, O, 1, I and L
/// excluded).
pub const TOKEN_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Token length; 31^6 is roughly 887 million combinations against three
/// attempts.
pub const TOKEN_LEN: usize = 6;

/// Draw a fresh challenge token.
pub fn generate_token<R: Rng>(rng: &mut R) -> String {
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}
