use std::fmt;

use hmac::{Hmac, Mac};
use rand::{distr::Alphanumeric, Rng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Number of characters in a generated invite token.
pub const TOKEN_LENGTH: usize = 12;

/// Shortest server key accepted for token hashing.
pub const MIN_KEY_LEN: usize = 32;

/// Tokens shorter than this are masked entirely in logs.
const MIN_REDACTABLE_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invite key must be at least {MIN_KEY_LEN} bytes, got {0}")]
    TooShort(usize),
    #[error("invite key is not valid hex")]
    InvalidHex,
    #[error("invite key has an invalid length for HMAC")]
    InvalidLength,
}

/// Plaintext invite token.
///
/// Zeroized on drop. `Debug` and `Display` only show the redacted preview; the
/// plaintext is reachable through [`InviteToken::expose`] alone.
#[derive(Clone, PartialEq, Eq)]
pub struct InviteToken(Zeroizing<String>);

impl InviteToken {
    /// Wrap caller-supplied input. No format check: a malformed token just won't match.
    pub fn parse(input: &str) -> Self {
        InviteToken(Zeroizing::new(input.trim().to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn redacted(&self) -> String {
        redact_token(&self.0)
    }
}

impl fmt::Debug for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InviteToken").field(&self.redacted()).finish()
    }
}

impl fmt::Display for InviteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Generate a fresh invite token: [`TOKEN_LENGTH`] characters drawn uniformly
/// from `[A-Za-z0-9]` by the thread-local CSPRNG.
pub fn generate_invite_token() -> InviteToken {
    let token: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();
    InviteToken(Zeroizing::new(token))
}

/// Non-reversible preview for logs: `ab…yz`.
pub fn redact_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < MIN_REDACTABLE_LEN {
        return "****".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}…{}", head, tail)
}

/// Server-side secret the token digests are keyed with.
///
/// Neither the key nor a [`TokenHasher`] built from it can be printed:
///
/// ```compile_fail
/// fn assert_debug<T: std::fmt::Debug>() {}
/// assert_debug::<hearth_crypto::InviteKey>();
/// ```
///
/// ```compile_fail
/// fn assert_debug<T: std::fmt::Debug>() {}
/// assert_debug::<hearth_crypto::TokenHasher>();
/// ```
#[derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct InviteKey(Zeroizing<Vec<u8>>);

impl InviteKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() < MIN_KEY_LEN {
            return Err(KeyError::TooShort(bytes.len()));
        }
        Ok(InviteKey(Zeroizing::new(bytes.to_vec())))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(hex::decode(s.trim()).map_err(|_| KeyError::InvalidHex)?);
        Self::from_bytes(&bytes)
    }

    /// Fresh random 32-byte key.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; MIN_KEY_LEN]);
        rand::rng().fill_bytes(bytes.as_mut_slice());
        InviteKey(bytes)
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0.as_slice()))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Hex HMAC-SHA256 digest of a token. Equality is constant-time.
#[derive(Clone)]
pub struct TokenHash(String);

impl TokenHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl PartialEq for TokenHash {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for TokenHash {}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TokenHash").field(&redact_token(&self.0)).finish()
    }
}

/// Keyed hasher for invite tokens.
///
/// The same token always maps to the same digest under one key, which is what
/// lets the store look invites up by an indexed column.
#[derive(Clone)]
pub struct TokenHasher {
    mac: HmacSha256,
}

impl TokenHasher {
    pub fn new(key: &InviteKey) -> Result<Self, KeyError> {
        let mac =
            HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| KeyError::InvalidLength)?;
        Ok(Self { mac })
    }

    pub fn hash(&self, token: &str) -> TokenHash {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        TokenHash(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn hasher() -> TokenHasher {
        TokenHasher::new(&InviteKey::generate()).unwrap()
    }

    #[test]
    fn generated_tokens_are_alphanumeric() {
        for _ in 0..100 {
            let token = generate_invite_token();
            assert_eq!(token.expose().len(), TOKEN_LENGTH);
            assert!(token.expose().chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn generated_tokens_do_not_repeat() {
        let seen: HashSet<String> = (0..1000)
            .map(|_| generate_invite_token().expose().to_string())
            .collect();
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn hash_is_deterministic_per_key() {
        let h = hasher();
        assert_eq!(h.hash("Ab3dEf9hJk2M"), h.hash("Ab3dEf9hJk2M"));
        assert_eq!(h.hash("Ab3dEf9hJk2M").as_str().len(), 64);
    }

    #[test]
    fn single_character_mutation_changes_hash() {
        let h = hasher();
        let token = "Ab3dEf9hJk2M";
        let original = h.hash(token);
        for i in 0..token.len() {
            let mut mutated: Vec<u8> = token.as_bytes().to_vec();
            mutated[i] = if mutated[i] == b'x' { b'y' } else { b'x' };
            let mutated = String::from_utf8(mutated).unwrap();
            assert_ne!(h.hash(&mutated), original, "position {}", i);
        }
    }

    #[test]
    fn different_keys_give_different_hashes() {
        assert_ne!(hasher().hash("Ab3dEf9hJk2M"), hasher().hash("Ab3dEf9hJk2M"));
    }

    #[test]
    fn key_loading() {
        let key = InviteKey::generate();
        let hex_key = key.to_hex();
        let reloaded = InviteKey::from_hex(&hex_key).unwrap();
        assert_eq!(
            TokenHasher::new(&key).unwrap().hash("t"),
            TokenHasher::new(&reloaded).unwrap().hash("t")
        );

        assert!(matches!(
            InviteKey::from_bytes(&[7u8; 16]),
            Err(KeyError::TooShort(16))
        ));
        assert!(matches!(
            InviteKey::from_hex("not hex"),
            Err(KeyError::InvalidHex)
        ));
    }

    #[test]
    fn redaction() {
        assert_eq!(redact_token("Ab3dEf9hJk2M"), "Ab…2M");
        assert_eq!(redact_token("short"), "****");
        assert_eq!(redact_token(""), "****");

        let token = InviteToken::parse("  Ab3dEf9hJk2M\n");
        assert_eq!(token.expose(), "Ab3dEf9hJk2M");
        assert_eq!(format!("{}", token), "Ab…2M");
        assert!(!format!("{:?}", token).contains("Ab3dEf9hJk2M"));
    }

    #[test]
    fn sensitive_types_impl_zeroize() {
        fn assert_zeroize<T: zeroize::Zeroize>() {}
        assert_zeroize::<InviteKey>();
    }
}
