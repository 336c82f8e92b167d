use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a token string. Stored and compared instead of the
/// raw token so a leaked config dump or log line never exposes the secret.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a presented bearer token against a stored token hash.
/// Comparing digests rather than the raw secret keeps the comparison
/// timing-independent of the token contents.
pub fn token_matches(presented: &str, expected_hash: &str) -> bool {
    hash_token(presented) == expected_hash
}

#[cfg(test)]
mod tests {
    use super::{hash_token, token_matches};

    #[test]
    fn hash_is_stable_hex_sha256() {
        let hash = hash_token("trace_svc_example");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("trace_svc_example"));
    }

    #[test]
    fn token_matches_only_the_hashed_token() {
        let hash = hash_token("trace_svc_example");
        assert!(token_matches("trace_svc_example", &hash));
        assert!(!token_matches("trace_svc_other", &hash));
        assert!(!token_matches("", &hash));
    }
}
