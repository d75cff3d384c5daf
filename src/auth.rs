//! Bearer-token helpers for the REST API.
//!
//! Every user holds one opaque device token issued at registration. Token
//! comparison is constant-time so lookup cost does not leak where a
//! candidate token diverges from a stored one.

/// Compare a provided token against a stored token in constant time.
///
/// Returns `false` if either token is empty.
pub fn token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();

    // Empty tokens are never valid
    if provided.is_empty() || expected.is_empty() {
        return false;
    }

    let len_match = provided.len() == expected.len();

    // XOR accumulator: if any byte differs, result will be non-zero
    let mut diff: u8 = 0;
    for (a, b) in provided.iter().zip(expected.iter()) {
        diff |= a ^ b;
    }

    len_match && diff == 0
}

/// Extracts the bearer token from an Authorization header value.
///
/// Expected format: "Bearer <token>"
/// Returns `None` if the header doesn't match the expected format.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();

    // Case-insensitive "Bearer " prefix check (RFC 6750 allows case-insensitive)
    if header.len() < 7 {
        return None;
    }

    let (prefix, token) = header.split_at(7);
    if prefix.eq_ignore_ascii_case("Bearer ") {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    } else {
        None
    }
}
