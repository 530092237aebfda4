//! Access token claim inspection.
//!
//! Tokens are decoded without verifying the signature. The only purpose is
//! reading the expiry; the server remains the authority on validity.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::Deserialize;

use super::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Expiry as Unix seconds
    pub exp: i64,
}

impl TokenClaims {
    /// Decode the payload segment of a `header.payload.signature` token
    pub fn decode(token: &str) -> Result<Self, AuthError> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next()) {
            (Some(_), Some(payload)) if !payload.is_empty() => payload.trim_end_matches('='),
            _ => return Err(AuthError::MalformedCredential),
        };

        // Issuers are supposed to use base64url, but some emit the standard alphabet
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|_| STANDARD_NO_PAD.decode(payload))
            .map_err(|_| AuthError::MalformedCredential)?;

        serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedCredential)
    }

    /// Expiry in milliseconds since the epoch
    pub fn expires_at_ms(&self) -> i64 {
        self.exp.saturating_mul(1000)
    }

    pub fn is_expired_at(&self, now_ms: i64, leeway_ms: i64) -> bool {
        self.expires_at_ms() <= now_ms.saturating_add(leeway_ms)
    }
}

/// Check whether a token must be refreshed before use.
/// Undecodable tokens can never be valid, so they count as expired.
pub fn is_expired(token: &str, now_ms: i64, leeway_ms: i64) -> bool {
    match TokenClaims::decode(token) {
        Ok(claims) => claims.is_expired_at(now_ms, leeway_ms),
        Err(_) => true,
    }
}

#[cfg(test)]
pub(crate) fn token_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{},"user_id":7}}"#, exp));
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    const NOW_MS: i64 = 1_700_000_000_000;

    #[test]
    fn test_decode_reads_exp() {
        let token = token_with_exp(1_700_000_600);
        let claims = TokenClaims::decode(&token).unwrap();
        assert_eq!(claims.exp, 1_700_000_600);
        assert_eq!(claims.expires_at_ms(), 1_700_000_600_000);
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"exp":12}"#);
        let token = format!("e30.{}.sig", payload);
        assert_eq!(TokenClaims::decode(&token).unwrap().exp, 12);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(TokenClaims::decode(""), Err(AuthError::MalformedCredential));
        assert_eq!(TokenClaims::decode("no-dots"), Err(AuthError::MalformedCredential));
        assert_eq!(TokenClaims::decode("a..c"), Err(AuthError::MalformedCredential));
        assert_eq!(TokenClaims::decode("a.!!!.c"), Err(AuthError::MalformedCredential));
        // Valid base64, but not a JSON object with exp
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"x"}"#);
        assert_eq!(
            TokenClaims::decode(&format!("a.{}.c", payload)),
            Err(AuthError::MalformedCredential)
        );
    }

    #[test]
    fn test_expiry_boundary() {
        // exp * 1000 == now counts as expired
        assert!(is_expired(&token_with_exp(NOW_MS / 1000), NOW_MS, 0));
        assert!(is_expired(&token_with_exp(NOW_MS / 1000 - 1), NOW_MS, 0));
        assert!(!is_expired(&token_with_exp(NOW_MS / 1000 + 1), NOW_MS, 0));
    }

    #[test]
    fn test_leeway_expires_early() {
        let token = token_with_exp(NOW_MS / 1000 + 30);
        assert!(!is_expired(&token, NOW_MS, 0));
        assert!(is_expired(&token, NOW_MS, 60_000));
    }

    #[test]
    fn test_malformed_counts_as_expired() {
        assert!(is_expired("not-a-jwt", NOW_MS, 0));
    }
}
