use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 over the JSON of an input and the result computed from it.
///
/// All maps in the engine are ordered, so the JSON (and the digest) is stable
/// for identical inputs.
pub fn audit_digest<I: Serialize, R: Serialize>(
    input: &I,
    result: &R,
) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(input)?);
    hasher.update(b"\n");
    hasher.update(serde_json::to_vec(result)?);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn digest_is_stable_and_input_sensitive() {
        let input: BTreeMap<&str, i32> = [("b", 2), ("a", 1)].into_iter().collect();
        let first = audit_digest(&input, &"result").unwrap();
        let second = audit_digest(&input, &"result").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, audit_digest(&input, &"other").unwrap());
    }
}
