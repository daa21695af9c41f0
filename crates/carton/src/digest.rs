//! Typed content digests.
//!
//! A digest is the `algorithm:hex` string used both to address a resource
//! in the archive and to verify its bytes. The algorithm set is a closed
//! enum: digest strings are validated once, at parse time, and everything
//! downstream works with the typed form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

use crate::error::DigestError;

/// The supported digest algorithms (SHA-2 family).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// The algorithm's name in digest strings.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded digest for this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        }
    }

    /// Start a streaming hash context for this algorithm.
    pub fn context(&self) -> DigestContext {
        match self {
            DigestAlgorithm::Sha256 => DigestContext::Sha256(Sha256::new()),
            DigestAlgorithm::Sha512 => DigestContext::Sha512(Sha512::new()),
        }
    }

    fn parse(name: &str) -> Result<Self, DigestError> {
        match name {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            other => Err(DigestError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated `algorithm:hex` content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl Digest {
    /// Compute the digest of a byte slice.
    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let mut context = algorithm.context();
        context.update(data);
        Self {
            algorithm,
            hex: context.finalize_hex(),
        }
    }

    /// The digest algorithm.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// The lowercase hex checksum, without the algorithm prefix.
    ///
    /// This is also the resource's storage key inside the archive, which
    /// is what makes descriptors sharing a digest collapse onto a single
    /// stored payload.
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, hex) = s
            .split_once(':')
            .ok_or_else(|| DigestError::Malformed(s.to_string()))?;
        let algorithm = DigestAlgorithm::parse(name)?;
        if hex.len() != algorithm.hex_len()
            || !hex.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(DigestError::Malformed(s.to_string()));
        }
        Ok(Self {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A running hash over one of the supported algorithms.
#[derive(Debug)]
pub enum DigestContext {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl DigestContext {
    /// Feed a chunk into the running hash.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            DigestContext::Sha256(h) => h.update(data),
            DigestContext::Sha512(h) => h.update(data),
        }
    }

    /// Finish the hash and return the lowercase hex checksum.
    pub fn finalize_hex(self) -> String {
        match self {
            DigestContext::Sha256(h) => hex::encode(h.finalize()),
            DigestContext::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// SHA-256 of a byte slice as a lowercase hex string.
///
/// Used for the contents document digest in `contents.sig`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HELLO_SHA256: &str =
        "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn parses_valid_digest() {
        let digest: Digest = HELLO_SHA256.parse().unwrap();
        assert_eq!(digest.algorithm(), DigestAlgorithm::Sha256);
        assert_eq!(digest.to_string(), HELLO_SHA256);
    }

    #[test]
    fn computes_known_digest() {
        let digest = Digest::compute(DigestAlgorithm::Sha256, b"hello");
        assert_eq!(digest.to_string(), HELLO_SHA256);
    }

    #[test]
    fn rejects_missing_separator() {
        let err = "sha256deadbeef".parse::<Digest>().unwrap_err();
        assert!(matches!(err, DigestError::Malformed(_)));
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let err = format!("md5:{}", "a".repeat(32)).parse::<Digest>().unwrap_err();
        assert!(matches!(err, DigestError::UnsupportedAlgorithm(name) if name == "md5"));
    }

    #[test]
    fn rejects_wrong_hex_length() {
        let err = "sha256:deadbeef".parse::<Digest>().unwrap_err();
        assert!(matches!(err, DigestError::Malformed(_)));
    }

    #[test]
    fn rejects_non_hex_characters() {
        let err = format!("sha256:{}", "z".repeat(64)).parse::<Digest>().unwrap_err();
        assert!(matches!(err, DigestError::Malformed(_)));
    }

    #[test]
    fn normalizes_uppercase_hex() {
        let upper = format!("sha256:{}", "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824");
        let digest: Digest = upper.parse().unwrap();
        assert_eq!(digest.to_string(), HELLO_SHA256);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut context = DigestAlgorithm::Sha256.context();
        context.update(b"hel");
        context.update(b"lo");
        assert_eq!(
            context.finalize_hex(),
            Digest::compute(DigestAlgorithm::Sha256, b"hello").hex()
        );
    }

    proptest! {
        #[test]
        fn display_round_trips(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let digest = Digest::compute(DigestAlgorithm::Sha256, &data);
            let parsed: Digest = digest.to_string().parse().unwrap();
            prop_assert_eq!(parsed, digest);
        }

        #[test]
        fn sha512_round_trips(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let digest = Digest::compute(DigestAlgorithm::Sha512, &data);
            let parsed: Digest = digest.to_string().parse().unwrap();
            prop_assert_eq!(parsed.algorithm(), DigestAlgorithm::Sha512);
        }
    }
}
