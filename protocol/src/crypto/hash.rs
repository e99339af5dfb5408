//! # Client Binding Tags
//!
//! A nut can be bound to the client it was issued to (usually its IP address).
//! Rather than sealing the identifier itself, the nut carries a 4-byte tag:
//! the first bytes of a BLAKE3 digest of the identifier. Four bytes is plenty
//! to tell "same client" from "someone else" without making the nut any longer.
//!
//! The all-zero tag is reserved as the "unbound" sentinel. A real identifier
//! whose digest happens to start with four zero bytes (probability 2^-32) is
//! remapped to `00 00 00 01`, so a bound nut can never decrypt to the
//! sentinel. The remap is deterministic, so validation recomputes the same tag.

use crate::config::CLIENT_TAG_LENGTH;

/// Binding tag of a nut issued without a client identifier.
pub const UNBOUND_TAG: [u8; CLIENT_TAG_LENGTH] = [0u8; CLIENT_TAG_LENGTH];

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derives the binding tag for an optional client identifier.
///
/// `None` and the empty string both mean "no binding requested".
pub fn client_tag(client_id: Option<&str>) -> [u8; CLIENT_TAG_LENGTH] {
    match client_id.filter(|id| !id.is_empty()) {
        None => UNBOUND_TAG,
        Some(id) => tag_from_digest(&blake3_hash(id.as_bytes())),
    }
}

fn tag_from_digest(digest: &[u8; 32]) -> [u8; CLIENT_TAG_LENGTH] {
    let mut tag = [0u8; CLIENT_TAG_LENGTH];
    tag.copy_from_slice(&digest[..CLIENT_TAG_LENGTH]);
    if tag == UNBOUND_TAG {
        tag[CLIENT_TAG_LENGTH - 1] = 1;
    }
    tag
}
