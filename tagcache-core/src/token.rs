//! Generation-token creation.
//!
//! A generation token marks the current epoch of a tag. It only needs to
//! be short and effectively unique within the TTL window of reuse, not
//! unguessable. UUIDv7 supplies time-ordered bits plus randomness; the
//! 128-bit value is base62-encoded to keep composite cache keys compact.

use uuid::Uuid;

const BASE62_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789abcdefghijklmnopqrstuvwxyz";

/// Create a new generation token (at most 22 base62 characters).
pub fn new_token() -> String {
    encode_base62(Uuid::now_v7().as_u128())
}

fn encode_base62(mut n: u128) -> String {
    if n == 0 {
        return char::from(BASE62_ALPHABET[0]).to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE62_ALPHABET[(n % 62) as usize]);
        n /= 62;
    }
    out.reverse();
    // The alphabet is pure ASCII, so the buffer is valid UTF-8.
    out.into_iter().map(char::from).collect()
}
