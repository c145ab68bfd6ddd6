//! Fallback identities for documents without a usable `serdes/meta` id.
//!
//! The digest covers the member *path*, not the document: two empty documents
//! at different paths must not collide, and the id must not move when the
//! document is edited.

use sha2::{Digest as _, Sha256};
use std::fmt::Write as _;

/// Prefix of every synthesized id.
pub const SYNTHESIZED_ID_PREFIX: &str = "mb_";

/// `mb_` followed by the SHA-256 of the path in lowercase hex.
pub fn synthesized_entity_id(member_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(member_path.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(SYNTHESIZED_ID_PREFIX.len() + 64);
    out.push_str(SYNTHESIZED_ID_PREFIX);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
