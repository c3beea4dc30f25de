//! crates/pickup_core/src/code.rs
//!
//! Human-readable tracking codes. The alphabet leaves out 0, 1, I and O so a code
//! can be read back over the counter without confusion.

use rand::Rng;

pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;

pub fn generate_code() -> String {
    generate_code_with(&mut rand::thread_rng())
}

/// Samples `CODE_LENGTH` symbols uniformly from `CODE_ALPHABET`.
pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Upper-cases and trims what a customer typed in.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}
