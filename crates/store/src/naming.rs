//! Collection naming.
//!
//! Collection ids are restricted to `[A-Za-z0-9_-]` and at most 63
//! characters, the limit most vector stores enforce. A name that already
//! fits is used as is. Any other name keeps a 55-character prefix of its
//! sanitised form and gains a short SHA-256 suffix of the raw name, so
//! `bob.smith@corp.com` and `bob_smith@corp_com` never share a collection.
//! Names that merely look hashed (ending in `_` plus 8 hex digits) are
//! hashed as well, which keeps suffixed ids out of reach of literal ones.

use sha2::{Digest, Sha256};

pub const MAX_COLLECTION_NAME: usize = 63;
const PREFIX_LEN: usize = 55;
const SUFFIX_HEX: usize = 8;

pub const PERSONAL_PREFIX: &str = "user_docs_";
pub const ROLE_PREFIX: &str = "role_";

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn looks_hashed(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() > SUFFIX_HEX
        && bytes[bytes.len() - SUFFIX_HEX - 1] == b'_'
        && bytes[bytes.len() - SUFFIX_HEX..]
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}

/// Map `name` to a valid collection id, injectively.
///
/// Characters outside `[A-Za-z0-9_-]` become `_`. When that changed
/// anything, or the name exceeds [`MAX_COLLECTION_NAME`], a hash suffix of
/// the raw name is appended.
pub fn sanitize_collection_name(name: &str) -> String {
    if name.len() <= MAX_COLLECTION_NAME && name.chars().all(is_allowed) && !looks_hashed(name) {
        return name.to_string();
    }

    let sanitized: String = name.chars().map(|c| if is_allowed(c) { c } else { '_' }).collect();
    let digest = Sha256::digest(name.as_bytes());
    let suffix: String = digest.iter().take(SUFFIX_HEX / 2).map(|b| format!("{b:02x}")).collect();
    let prefix: String = sanitized.chars().take(PREFIX_LEN).collect();
    format!("{prefix}_{suffix}")
}

/// The personal collection owned by `user_id`.
pub fn personal_collection(user_id: &str) -> String {
    sanitize_collection_name(&format!("{PERSONAL_PREFIX}{user_id}"))
}

/// The collection owned by a literal role name.
pub fn role_collection(role: &str) -> String {
    sanitize_collection_name(&format!("{ROLE_PREFIX}{}", role.to_lowercase()))
}
