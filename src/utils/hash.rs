use sha2::{Digest, Sha256};

/// Hex length of every identity produced here.
const ID_LEN: usize = 32;

/// Stable identity from a domain tag and its parts.
///
/// Parts are separated by a unit separator so `("ab", "c")` and `("a", "bc")`
/// never collide. The tag keeps identities of different kinds apart.
pub fn stable_id(tag: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tag.as_bytes());
    for part in parts {
        hasher.update([0x1f]);
        hasher.update(part.as_bytes());
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}

/// SHA-256 of text content, used to spot the same post under another keyword.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
