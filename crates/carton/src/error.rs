//! Error types for the carton bundle format.
//!
//! Errors are grouped per concern (digest, signature, contents document)
//! and converge into [`BundleError`], the error type of the public
//! read/write surface.

use thiserror::Error;

/// Errors raised while parsing or verifying content digests.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("malformed digest {0:?} (expected \"algorithm:hex\")")]
    Malformed(String),

    #[error("unsupported digest algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("expected digest {expected} does not match calculated digest {actual}")]
    Mismatch { expected: String, actual: String },
}

/// Errors raised while signing or verifying the contents document.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("key material could not be parsed as PEM")]
    UnsupportedKey,

    #[error("signature could not be decoded")]
    MalformedSignature,

    #[error("contents.sig is malformed: {0}")]
    MalformedEnvelope(String),

    #[error("contents.json has invalid signature")]
    Invalid,

    #[error("signed bundle requires a public key to be provided")]
    MissingKey,

    #[error("public key provided but bundle is missing signature")]
    UnexpectedSignature,
}

/// Validation errors for the contents document.
///
/// Each structural violation maps to exactly one variant so callers can
/// tell which rule was broken.
#[derive(Debug, Error)]
pub enum ContentsError {
    #[error("contents.json is not valid JSON: {0}")]
    Malformed(String),

    #[error("contents.json is not a JSON object")]
    NotAnObject,

    #[error("missing \"{0}\" in contents.json")]
    MissingField(&'static str),

    #[error("unsupported bundle version {found} (expected {expected})")]
    UnsupportedVersion { expected: &'static str, found: String },

    #[error("expected type ({expected}) does not match received type ({found})")]
    TypeMismatch { expected: String, found: String },

    #[error("missing \"{field}\" in \"resources\" of contents.json")]
    MissingResourceField { index: usize, field: &'static str },

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error("a resource with id \"{0}\" has already been declared")]
    DuplicateResourceId(String),
}

/// Top-level error type for bundle reading and writing.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Contents(#[from] ContentsError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying archive could not be decoded (malformed framing,
    /// truncation, premature end).
    #[error("archive error: {0}")]
    Archive(String),

    #[error("unexpected entry {found:?} (expected {expected:?})")]
    UnexpectedEntry { expected: String, found: String },

    #[error("contents.json appears to be corrupted")]
    ContentsCorrupted,

    #[error("unknown resource {0:?}")]
    UnknownResource(String),

    #[error("resource {id:?} has size {actual} but {expected} bytes were declared")]
    SizeMismatch { id: String, expected: u64, actual: u64 },

    #[error("bundle is missing resources: {0:?}")]
    MissingResources(Vec<String>),

    #[error("manifest() must be called before resources()")]
    ManifestNotRead,

    #[error("resources have already been consumed")]
    AlreadyConsumed,

    #[error("bundle has already been finalized")]
    AlreadyFinalized,

    #[error("bundle was aborted after an earlier write failure")]
    Aborted,
}

impl BundleError {
    /// True if this error indicates an integrity violation of stored
    /// bytes rather than API misuse.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            BundleError::Digest(_) | BundleError::SizeMismatch { .. } | BundleError::ContentsCorrupted
        )
    }
}
