//! use certbundle::error::CertKitError;

use thiserror::Error;

/// Represents errors that can occur while issuing, chaining or packaging certificates.
///
/// Every variant is terminal for the call that produced it; nothing in this
/// crate retries or recovers internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CertKitError {
    /// The requested key or signature algorithm family is not implemented.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A private key does not fit the public key or certificate it is used with.
    #[error("Algorithm mismatch: {0}")]
    AlgorithmMismatch(String),

    /// `not_before` is not strictly earlier than `not_after`.
    #[error("Invalid validity period: not before {not_before} is not earlier than not after {not_after}")]
    InvalidValidityPeriod {
        not_before: time::OffsetDateTime,
        not_after: time::OffsetDateTime,
    },

    /// No trust anchor could be reached from the target certificate.
    #[error("No certification path found for {0}")]
    NoPathFound(String),

    /// Encoding a bundle failed.
    #[error("Failed to serialize bundle: {0}")]
    SerializationError(String),

    /// The bundle password violates the password policy or does not open the bundle.
    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    /// A certificate signature does not verify against its issuer key.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),
}

impl From<der::Error> for CertKitError {
    /// Converts a `der::Error` into a `CertKitError`.
    fn from(err: der::Error) -> Self {
        CertKitError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for CertKitError {
    fn from(err: rsa::Error) -> Self {
        CertKitError::KeyGenerationError(err.to_string())
    }
}

impl From<pkcs8::Error> for CertKitError {
    fn from(err: pkcs8::Error) -> Self {
        CertKitError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for CertKitError {
    fn from(err: pkcs8::spki::Error) -> Self {
        CertKitError::DecodingError(err.to_string())
    }
}

impl From<p12_keystore::error::Error> for CertKitError {
    /// A failed MAC check means the password does not open the bundle.
    fn from(err: p12_keystore::error::Error) -> Self {
        match err {
            p12_keystore::error::Error::MacError(_) => {
                CertKitError::InvalidPassword("bundle integrity check failed".to_string())
            }
            other => CertKitError::DecodingError(other.to_string()),
        }
    }
}
