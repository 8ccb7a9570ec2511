//! State and PKCE generation
//!
//! Both the anti-CSRF `state` and the PKCE `code_verifier` are 32 bytes from
//! the operating system CSPRNG, encoded as unpadded base64url (43 chars).
//! The challenge is `BASE64URL(SHA256(verifier))` per RFC 7636 (S256).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::{rngs::OsRng, TryRngCore};
use sha2::{Digest, Sha256};

use super::types::{OAuthError, OAuthHandshake};

/// Number of random bytes behind each state and verifier
pub const RANDOM_BYTES: usize = 32;

/// Only the S256 method is ever offered
pub const CODE_CHALLENGE_METHOD: &str = "S256";

fn random_token() -> Result<String, OAuthError> {
    let mut bytes = [0u8; RANDOM_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| OAuthError::EntropyUnavailable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate an unpredictable `state` value
///
/// # Errors
///
/// Returns [`OAuthError::EntropyUnavailable`] if the OS random source fails.
/// There is no weaker fallback.
pub fn generate_state() -> Result<String, OAuthError> {
    random_token()
}

/// Generate a PKCE `code_verifier` (43 chars from the unreserved set)
///
/// # Errors
///
/// Returns [`OAuthError::EntropyUnavailable`] if the OS random source fails.
pub fn generate_code_verifier() -> Result<String, OAuthError> {
    random_token()
}

/// Derive the S256 `code_challenge` for a verifier
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Check a verifier against a previously issued challenge
#[must_use]
pub fn verify_challenge(verifier: &str, challenge: &str) -> bool {
    code_challenge(verifier) == challenge
}

/// Create a fresh handshake
///
/// Generates the state and, when `pkce_enabled`, the verifier/challenge pair.
///
/// # Errors
///
/// Returns [`OAuthError::EntropyUnavailable`] if randomness cannot be obtained.
pub fn begin_handshake(
    user_id: Option<String>,
    redirect_back_path: String,
    pkce_enabled: bool,
) -> Result<OAuthHandshake, OAuthError> {
    let state = generate_state()?;
    let (code_verifier, code_challenge) = if pkce_enabled {
        let verifier = generate_code_verifier()?;
        let challenge = code_challenge(&verifier);
        (Some(verifier), Some(challenge))
    } else {
        (None, None)
    };

    Ok(OAuthHandshake {
        state,
        code_verifier,
        code_challenge,
        user_id,
        redirect_back_path,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn is_unreserved(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
    }

    #[test]
    fn test_state_is_43_url_safe_chars() {
        let state = generate_state().unwrap();
        assert_eq!(state.len(), 43);
        assert!(state.chars().all(is_unreserved));
    }

    #[test]
    fn test_states_are_unique() {
        let states: HashSet<String> = (0..10_000).map(|_| generate_state().unwrap()).collect();
        assert_eq!(states.len(), 10_000);
    }

    #[test]
    fn test_verifier_length_within_rfc_bounds() {
        let verifier = generate_code_verifier().unwrap();
        assert!((43..=128).contains(&verifier.len()));
        assert!(verifier.chars().all(is_unreserved));
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r7wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_begin_handshake_with_pkce() {
        let handshake = begin_handshake(Some("u1".into()), "/dashboard".into(), true).unwrap();
        let verifier = handshake.code_verifier.as_deref().unwrap();
        let challenge = handshake.code_challenge.as_deref().unwrap();
        assert!(verify_challenge(verifier, challenge));
        assert_ne!(handshake.state, verifier);
        assert_eq!(handshake.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_begin_handshake_without_pkce() {
        let handshake = begin_handshake(None, "/".into(), false).unwrap();
        assert!(handshake.code_verifier.is_none());
        assert!(handshake.code_challenge.is_none());
    }

    proptest! {
        #[test]
        fn challenge_is_deterministic_and_url_safe(verifier in "[A-Za-z0-9._~-]{43,128}") {
            let a = code_challenge(&verifier);
            let b = code_challenge(&verifier);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.len(), 43);
            prop_assert!(a.chars().all(is_unreserved));
            prop_assert!(verify_challenge(&verifier, &a));
        }
    }
}
