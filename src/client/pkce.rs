//! PKCE verifier and challenge (RFC 7636, `S256` method).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// The only challenge method this client sends.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Random bytes behind each verifier. Encodes to 43 characters.
pub const VERIFIER_BYTES: usize = 32;

/// A verifier and the challenge derived from it.
///
/// # Examples
///
/// ```
/// use pkce_tasks::client::pkce::{challenge_for, PkcePair};
///
/// let pair = PkcePair::generate();
/// assert_eq!(pair.verifier.len(), 43);
/// assert_eq!(pair.challenge, challenge_for(&pair.verifier));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Secret kept by the client until the code exchange.
    pub verifier: String,
    /// `base64url(SHA-256(verifier))`, sent on the authorize request.
    pub challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

impl PkcePair {
    /// Generates a fresh verifier from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let bytes: [u8; VERIFIER_BYTES] = rand::random();
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Derives the challenge for an existing verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// `base64url(SHA-256(verifier))` without padding.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
