//! Client-side id generation.
//!
//! Record ids are minted locally so a create call can hand ids back to the
//! caller before the backend round-trip completes. The format is a `rec`
//! prefix followed by 14 alphanumeric characters.

use rand::Rng;

pub const RECORD_ID_PREFIX: &str = "rec";
const ID_BODY_LEN: usize = 14;
const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Generate a fresh record id, e.g. `recA1b2C3d4E5f6G7`.
pub fn generate_record_id() -> String {
    let mut rng = rand::thread_rng();
    let mut id = String::with_capacity(RECORD_ID_PREFIX.len() + ID_BODY_LEN);
    id.push_str(RECORD_ID_PREFIX);
    for _ in 0..ID_BODY_LEN {
        let i = rng.gen_range(0..ALPHABET.len());
        id.push(ALPHABET[i] as char);
    }
    id
}

/// Whether `s` has the shape of a locally-minted record id.
pub fn is_record_id(s: &str) -> bool {
    s.len() == RECORD_ID_PREFIX.len() + ID_BODY_LEN
        && s.starts_with(RECORD_ID_PREFIX)
        && s[RECORD_ID_PREFIX.len()..]
            .bytes()
            .all(|b| b.is_ascii_alphanumeric())
}
