//! Random identifier generation.
//!
//! Pseudonymous entity IDs and escrow blob names are both drawn from the
//! same alphanumeric alphabet. Collision math (via the Nano ID collision
//! calculator): at 100 IDs per second, a 13-character ID needs on the order
//! of 7 thousand years for a 1% probability of a single collision.

use nanoid::nanoid;

/// Alphabet for generated identifiers: `[0-9A-Za-z]`.
pub const ID_ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H',
    'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r',
    's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Generate a random alphanumeric identifier of the given length.
pub fn generate_id(length: usize) -> String {
    nanoid!(length, &ID_ALPHABET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_have_requested_length() {
        assert_eq!(generate_id(13).len(), 13);
        assert_eq!(generate_id(20).len(), 20);
    }

    #[test]
    fn test_generated_ids_are_alphanumeric() {
        let id = generate_id(64);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = generate_id(13);
        let b = generate_id(13);
        assert_ne!(a, b);
    }
}
