use core::fmt;
use core::str::FromStr;

use der::pem::LineEnding;
use der::{Decode, Encode};
use dsa::{
    Components as DsaComponents, KeySize as DsaKeySize, SigningKey as DsaSigningKey,
    VerifyingKey as DsaVerifyingKey,
};
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rand_core::OsRng;
use rsa::pkcs1v15::{
    Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey,
};
use rsa::signature::{DigestVerifier, SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use zeroize::Zeroizing;

use crate::cert::SignatureAlgorithm;
use crate::error::CertKitError;

pub type Result<T> = std::result::Result<T, CertKitError>;

/// RSA modulus sizes accepted by [`KeyPair::generate`].
pub const RSA_KEY_SIZES: [usize; 3] = [2048, 3072, 4096];

/// DSA prime sizes accepted by [`KeyPair::generate`]. 1024-bit keys use a
/// 160-bit subgroup, the larger ones a 256-bit subgroup.
pub const DSA_KEY_SIZES: [usize; 3] = [1024, 2048, 3072];

/// A key algorithm family, together with its size parameter where one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    EcdsaP256,
    EcdsaP384,
    EcdsaP521,
    Ed25519,
    Dsa { bits: usize },
}

impl KeyAlgorithm {
    /// The signature algorithm a key of this family signs with.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyAlgorithm::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            KeyAlgorithm::EcdsaP256 => SignatureAlgorithm::Sha256WithECDSA,
            KeyAlgorithm::EcdsaP384 => SignatureAlgorithm::Sha384WithECDSA,
            KeyAlgorithm::EcdsaP521 => SignatureAlgorithm::Sha512WithECDSA,
            KeyAlgorithm::Ed25519 => SignatureAlgorithm::Ed25519,
            KeyAlgorithm::Dsa { .. } => SignatureAlgorithm::Sha256WithDSA,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "rsa{bits}"),
            KeyAlgorithm::EcdsaP256 => f.write_str("p256"),
            KeyAlgorithm::EcdsaP384 => f.write_str("p384"),
            KeyAlgorithm::EcdsaP521 => f.write_str("p521"),
            KeyAlgorithm::Ed25519 => f.write_str("ed25519"),
            KeyAlgorithm::Dsa { bits } => write!(f, "dsa{bits}"),
        }
    }
}

impl FromStr for KeyAlgorithm {
    type Err = CertKitError;

    /// Parses a family name such as `rsa2048`, `ecdsa-p256`, `dsa-2048` or `ed25519`.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        let algorithm = match name.as_str() {
            "p256" | "ecdsa-p256" | "secp256r1" | "prime256v1" => KeyAlgorithm::EcdsaP256,
            "p384" | "ecdsa-p384" | "secp384r1" => KeyAlgorithm::EcdsaP384,
            "p521" | "ecdsa-p521" | "secp521r1" => KeyAlgorithm::EcdsaP521,
            "ed25519" => KeyAlgorithm::Ed25519,
            "rsa" => KeyAlgorithm::Rsa { bits: 2048 },
            "dsa" => KeyAlgorithm::Dsa { bits: 2048 },
            other => {
                let sized = |prefix: &str| {
                    other
                        .strip_prefix(prefix)
                        .map(|rest| rest.trim_start_matches('-'))
                        .and_then(|rest| rest.parse::<usize>().ok())
                };
                if let Some(bits) = sized("rsa") {
                    KeyAlgorithm::Rsa { bits }
                } else if let Some(bits) = sized("dsa") {
                    KeyAlgorithm::Dsa { bits }
                } else {
                    return Err(CertKitError::UnsupportedAlgorithm(s.to_string()));
                }
            }
        };
        Ok(algorithm)
    }
}

/// Supported key types for certificate operations.
#[derive(Clone)]
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
    },
    EcdsaP256 {
        signing_key: p256::ecdsa::SigningKey,
    },
    EcdsaP384 {
        signing_key: p384::ecdsa::SigningKey,
    },
    EcdsaP521 {
        secret_key: p521::SecretKey,
    },
    Ed25519 {
        signing_key: Ed25519SigningKey,
    },
    Dsa {
        signing_key: DsaSigningKey,
    },
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generates a key pair of the given family from the OS random source.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        let key_pair = match algorithm {
            KeyAlgorithm::Rsa { bits } => Self::generate_rsa(bits)?,
            KeyAlgorithm::EcdsaP256 => Self::generate_ecdsa_p256(),
            KeyAlgorithm::EcdsaP384 => Self::generate_ecdsa_p384(),
            KeyAlgorithm::EcdsaP521 => Self::generate_ecdsa_p521(),
            KeyAlgorithm::Ed25519 => Self::generate_ed25519(),
            KeyAlgorithm::Dsa { bits } => Self::generate_dsa(bits)?,
        };
        tracing::debug!(%algorithm, "generated key pair");
        Ok(key_pair)
    }

    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        if !RSA_KEY_SIZES.contains(&bits) {
            return Err(CertKitError::UnsupportedAlgorithm(format!(
                "RSA with a {bits}-bit modulus"
            )));
        }
        let private = RsaPrivateKey::new(&mut OsRng, bits)?;
        Ok(KeyPair::Rsa {
            private: Box::new(private),
        })
    }

    /// Generate a DSA key pair with fresh domain parameters of the given prime size.
    ///
    /// Parameter generation searches for primes and takes noticeably longer
    /// than any other family.
    pub fn generate_dsa(bits: usize) -> Result<Self> {
        let key_size = match bits {
            1024 => DsaKeySize::DSA_1024_160,
            2048 => DsaKeySize::DSA_2048_256,
            3072 => DsaKeySize::DSA_3072_256,
            _ => {
                return Err(CertKitError::UnsupportedAlgorithm(format!(
                    "DSA with a {bits}-bit prime"
                )));
            }
        };
        let components = DsaComponents::generate(&mut OsRng, key_size);
        Ok(KeyPair::Dsa {
            signing_key: DsaSigningKey::generate(&mut OsRng, components),
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        KeyPair::EcdsaP256 {
            signing_key: p256::ecdsa::SigningKey::random(&mut OsRng),
        }
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        KeyPair::EcdsaP384 {
            signing_key: p384::ecdsa::SigningKey::random(&mut OsRng),
        }
    }

    /// Generate an ECDSA P-521 key pair.
    pub fn generate_ecdsa_p521() -> Self {
        KeyPair::EcdsaP521 {
            secret_key: p521::SecretKey::random(&mut OsRng),
        }
    }

    /// Generate an Ed25519 key pair.
    pub fn generate_ed25519() -> Self {
        KeyPair::Ed25519 {
            signing_key: Ed25519SigningKey::generate(&mut OsRng),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa { private } => KeyAlgorithm::Rsa {
                bits: private.size() * 8,
            },
            KeyPair::EcdsaP256 { .. } => KeyAlgorithm::EcdsaP256,
            KeyPair::EcdsaP384 { .. } => KeyAlgorithm::EcdsaP384,
            KeyPair::EcdsaP521 { .. } => KeyAlgorithm::EcdsaP521,
            KeyPair::Ed25519 { .. } => KeyAlgorithm::Ed25519,
            KeyPair::Dsa { signing_key } => KeyAlgorithm::Dsa {
                bits: dsa_prime_bits(signing_key.verifying_key()),
            },
        }
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.algorithm().signature_algorithm()
    }

    /// Returns the public half of the key pair.
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Rsa { private } => PublicKey::Rsa(RsaPublicKey::from(private.as_ref())),
            KeyPair::EcdsaP256 { signing_key } => {
                PublicKey::EcdsaP256(signing_key.verifying_key().to_owned())
            }
            KeyPair::EcdsaP384 { signing_key } => {
                PublicKey::EcdsaP384(signing_key.verifying_key().to_owned())
            }
            KeyPair::EcdsaP521 { secret_key } => PublicKey::EcdsaP521(secret_key.public_key()),
            KeyPair::Ed25519 { signing_key } => PublicKey::Ed25519(signing_key.verifying_key()),
            KeyPair::Dsa { signing_key } => PublicKey::Dsa(signing_key.verifying_key().clone()),
        }
    }

    /// Returns the subject public key info of the public half.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        self.public_key().to_spki()
    }

    /// Signs `data` with the signature algorithm implied by the key family.
    ///
    /// ECDSA and DSA signatures are DER encoded as X.509 expects; Ed25519
    /// signatures are the raw 64 bytes. DSA signs a SHA-256 digest, truncated
    /// to the subgroup size for 1024-bit keys.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_error = |e: rsa::signature::Error| CertKitError::EncodingError(e.to_string());
        match self {
            KeyPair::Rsa { private } => {
                let signing_key = RsaSigningKey::<Sha256>::new(private.as_ref().clone());
                let signature = signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_vec())
            }
            KeyPair::EcdsaP256 { signing_key } => {
                let signature: p256::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384 { signing_key } => {
                let signature: p384::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP521 { secret_key } => {
                let signing_key = p521::ecdsa::SigningKey::from_bytes(&secret_key.to_bytes())
                    .map_err(signing_error)?;
                let signature: p521::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::Ed25519 { signing_key } => {
                let signature = signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_bytes().to_vec())
            }
            KeyPair::Dsa { signing_key } => {
                let signature: dsa::Signature =
                    signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_vec())
            }
        }
    }

    /// Exports the private key as an unencrypted PKCS#8 document.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let document = match self {
            KeyPair::Rsa { private } => private.to_pkcs8_der()?,
            KeyPair::EcdsaP256 { signing_key } => signing_key.to_pkcs8_der()?,
            KeyPair::EcdsaP384 { signing_key } => signing_key.to_pkcs8_der()?,
            KeyPair::EcdsaP521 { secret_key } => secret_key.to_pkcs8_der()?,
            KeyPair::Ed25519 { signing_key } => signing_key.to_pkcs8_der()?,
            KeyPair::Dsa { signing_key } => signing_key.to_pkcs8_der()?,
        };
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        let der = self.to_pkcs8_der()?;
        let pem = der::pem::encode_string("PRIVATE KEY", LineEnding::LF, &der)
            .map_err(|e| CertKitError::EncodingError(e.to_string()))?;
        Ok(Zeroizing::new(pem))
    }

    /// Imports a private key from an unencrypted PKCS#8 document.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = pkcs8::PrivateKeyInfo::try_from(der)?;
        let algorithm = info.algorithm.oid;

        if algorithm == const_oid::db::rfc5912::RSA_ENCRYPTION {
            let private = RsaPrivateKey::from_pkcs8_der(der)?;
            return Ok(KeyPair::Rsa {
                private: Box::new(private),
            });
        }
        if algorithm == const_oid::db::rfc8410::ID_ED_25519 {
            return Ok(KeyPair::Ed25519 {
                signing_key: Ed25519SigningKey::from_pkcs8_der(der)?,
            });
        }
        if algorithm == const_oid::db::rfc5912::ID_DSA {
            return Ok(KeyPair::Dsa {
                signing_key: DsaSigningKey::from_pkcs8_der(der)?,
            });
        }
        if algorithm == const_oid::db::rfc5912::ID_EC_PUBLIC_KEY {
            let curve = info.algorithm.parameters_oid()?;
            return match curve {
                const_oid::db::rfc5912::SECP_256_R_1 => Ok(KeyPair::EcdsaP256 {
                    signing_key: p256::ecdsa::SigningKey::from_pkcs8_der(der)?,
                }),
                const_oid::db::rfc5912::SECP_384_R_1 => Ok(KeyPair::EcdsaP384 {
                    signing_key: p384::ecdsa::SigningKey::from_pkcs8_der(der)?,
                }),
                const_oid::db::rfc5912::SECP_521_R_1 => Ok(KeyPair::EcdsaP521 {
                    secret_key: p521::SecretKey::from_pkcs8_der(der)?,
                }),
                other => Err(CertKitError::UnsupportedAlgorithm(format!(
                    "elliptic curve {other}"
                ))),
            };
        }

        Err(CertKitError::UnsupportedAlgorithm(format!(
            "private key algorithm {algorithm}"
        )))
    }

    /// Imports a private key from a PEM encoded PKCS#8 document.
    pub fn import_from_pkcs8_pem(pem: &str) -> Result<Self> {
        let (label, der) = der::pem::decode_vec(pem.as_bytes())
            .map_err(|e| CertKitError::DecodingError(e.to_string()))?;
        if label != "PRIVATE KEY" {
            return Err(CertKitError::InvalidInput(format!(
                "expected a PRIVATE KEY PEM block, found {label}"
            )));
        }
        Self::from_pkcs8_der(&Zeroizing::new(der))
    }
}

/// The public half of a [`KeyPair`], or the key carried in a certificate.
#[derive(Clone, Debug, PartialEq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
    EcdsaP521(p521::PublicKey),
    Ed25519(Ed25519VerifyingKey),
    Dsa(DsaVerifyingKey),
}

impl Eq for PublicKey {}

fn dsa_prime_bits(verifying_key: &DsaVerifyingKey) -> usize {
    verifying_key.components().p().bits()
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        key_pair.public_key()
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::Rsa(public) => KeyAlgorithm::Rsa {
                bits: public.size() * 8,
            },
            PublicKey::EcdsaP256(_) => KeyAlgorithm::EcdsaP256,
            PublicKey::EcdsaP384(_) => KeyAlgorithm::EcdsaP384,
            PublicKey::EcdsaP521(_) => KeyAlgorithm::EcdsaP521,
            PublicKey::Ed25519(_) => KeyAlgorithm::Ed25519,
            PublicKey::Dsa(verifying_key) => KeyAlgorithm::Dsa {
                bits: dsa_prime_bits(verifying_key),
            },
        }
    }

    /// Returns true when both keys belong to the same algorithm family.
    ///
    /// RSA or DSA keys of different sizes are the same family.
    pub fn same_family(&self, other: &PublicKey) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    /// Encodes the key as a `SubjectPublicKeyInfo`.
    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let document = match self {
            PublicKey::Rsa(public) => public.to_public_key_der()?,
            PublicKey::EcdsaP256(verifying_key) => verifying_key.to_public_key_der()?,
            PublicKey::EcdsaP384(verifying_key) => verifying_key.to_public_key_der()?,
            PublicKey::EcdsaP521(public) => public.to_public_key_der()?,
            PublicKey::Ed25519(verifying_key) => verifying_key.to_public_key_der()?,
            PublicKey::Dsa(verifying_key) => verifying_key.to_public_key_der()?,
        };
        Ok(SubjectPublicKeyInfoOwned::from_der(document.as_bytes())?)
    }

    /// Decodes a key from a certificate's `SubjectPublicKeyInfo`.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        let algorithm = spki.algorithm.oid;

        if algorithm == const_oid::db::rfc5912::RSA_ENCRYPTION {
            return Ok(PublicKey::Rsa(RsaPublicKey::from_public_key_der(&der)?));
        }
        if algorithm == const_oid::db::rfc8410::ID_ED_25519 {
            return Ok(PublicKey::Ed25519(Ed25519VerifyingKey::from_public_key_der(
                &der,
            )?));
        }
        if algorithm == const_oid::db::rfc5912::ID_DSA {
            return Ok(PublicKey::Dsa(DsaVerifyingKey::from_public_key_der(&der)?));
        }
        if algorithm == const_oid::db::rfc5912::ID_EC_PUBLIC_KEY {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .ok_or_else(|| {
                    CertKitError::DecodingError("EC public key without curve".to_string())
                })?
                .decode_as::<const_oid::ObjectIdentifier>()?;
            return match curve {
                const_oid::db::rfc5912::SECP_256_R_1 => Ok(PublicKey::EcdsaP256(
                    p256::ecdsa::VerifyingKey::from_public_key_der(&der)?,
                )),
                const_oid::db::rfc5912::SECP_384_R_1 => Ok(PublicKey::EcdsaP384(
                    p384::ecdsa::VerifyingKey::from_public_key_der(&der)?,
                )),
                const_oid::db::rfc5912::SECP_521_R_1 => Ok(PublicKey::EcdsaP521(
                    p521::PublicKey::from_public_key_der(&der)?,
                )),
                other => Err(CertKitError::UnsupportedAlgorithm(format!(
                    "elliptic curve {other}"
                ))),
            };
        }

        Err(CertKitError::UnsupportedAlgorithm(format!(
            "public key algorithm {algorithm}"
        )))
    }

    /// Key identifier per RFC 5280 section 4.2.1.2, method 1: the SHA-1 hash
    /// of the subject public key bits.
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.to_spki()?;
        let key_id = <sha1::Sha1 as sha1::Digest>::digest(spki.subject_public_key.raw_bytes());
        Ok(key_id.to_vec())
    }

    /// Verifies `signature` over `data` with the family's signature algorithm.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let invalid = |e: rsa::signature::Error| CertKitError::InvalidSignature(e.to_string());
        match self {
            PublicKey::Rsa(public) => {
                let verifying_key = RsaVerifyingKey::<Sha256>::new(public.clone());
                let signature = RsaSignature::try_from(signature).map_err(invalid)?;
                verifying_key.verify(data, &signature).map_err(invalid)
            }
            PublicKey::EcdsaP256(verifying_key) => {
                let signature = p256::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                verifying_key.verify(data, &signature).map_err(invalid)
            }
            PublicKey::EcdsaP384(verifying_key) => {
                let signature = p384::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                verifying_key.verify(data, &signature).map_err(invalid)
            }
            PublicKey::EcdsaP521(public) => {
                let verifying_key =
                    p521::ecdsa::VerifyingKey::from_sec1_bytes(&public.to_sec1_bytes())
                        .map_err(invalid)?;
                let signature = p521::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                verifying_key.verify(data, &signature).map_err(invalid)
            }
            PublicKey::Ed25519(verifying_key) => {
                let signature =
                    ed25519_dalek::Signature::from_slice(signature).map_err(invalid)?;
                verifying_key.verify(data, &signature).map_err(invalid)
            }
            PublicKey::Dsa(verifying_key) => {
                let signature = dsa::Signature::try_from(signature).map_err(invalid)?;
                verifying_key.verify(data, &signature).map_err(invalid)
            }
        }
    }

    /// Verifies `signature` over `data` made with `algorithm`.
    ///
    /// Besides the family's own algorithm, DSA keys accept dsa-with-SHA1,
    /// which older CA certificates are signed with. New signatures never use it.
    pub fn verify_with(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        match (self, algorithm) {
            (PublicKey::Dsa(verifying_key), SignatureAlgorithm::Sha1WithDSA) => {
                let invalid =
                    |e: rsa::signature::Error| CertKitError::InvalidSignature(e.to_string());
                let signature = dsa::Signature::try_from(signature).map_err(invalid)?;
                let digest = <sha1::Sha1 as sha1::Digest>::new_with_prefix(data);
                verifying_key
                    .verify_digest(digest, &signature)
                    .map_err(invalid)
            }
            _ if algorithm == self.algorithm().signature_algorithm() => {
                self.verify(data, signature)
            }
            _ => Err(CertKitError::AlgorithmMismatch(format!(
                "signed with {algorithm:?}, key signs with {:?}",
                self.algorithm().signature_algorithm()
            ))),
        }
    }
}
