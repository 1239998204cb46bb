pub mod extensions;
pub mod params;

use crate::error::CertKitError;
pub type Result<T> = std::result::Result<T, CertKitError>;
use der::{Decode, DecodePem, Encode, EncodePem};
use extensions::ToAndFromX509Extension;
use params::{CertificationRequestInfo, DistinguishedName, ExtensionParam, Validity};
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;

use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
    /// SHA-384 with ECDSA.
    Sha384WithECDSA,
    /// SHA-512 with ECDSA.
    Sha512WithECDSA,
    /// Ed25519 (pure EdDSA, no separate digest).
    Ed25519,
    /// DSA over a SHA-256 digest.
    Sha256WithDSA,
    /// DSA over a SHA-1 digest. Only verified, never produced.
    Sha1WithDSA,
}

impl SignatureAlgorithm {
    pub fn oid(&self) -> const_oid::ObjectIdentifier {
        match self {
            SignatureAlgorithm::Sha256WithRSA => {
                const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION
            }
            SignatureAlgorithm::Sha256WithECDSA => const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
            SignatureAlgorithm::Sha384WithECDSA => const_oid::db::rfc5912::ECDSA_WITH_SHA_384,
            SignatureAlgorithm::Sha512WithECDSA => const_oid::db::rfc5912::ECDSA_WITH_SHA_512,
            SignatureAlgorithm::Ed25519 => const_oid::db::rfc8410::ID_ED_25519,
            SignatureAlgorithm::Sha256WithDSA => const_oid::db::rfc5912::DSA_WITH_SHA_256,
            SignatureAlgorithm::Sha1WithDSA => const_oid::db::rfc5912::DSA_WITH_SHA_1,
        }
    }

    /// Maps a signature algorithm OID back to the enum.
    pub fn from_oid(oid: const_oid::ObjectIdentifier) -> Result<Self> {
        match oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Ok(Self::Sha256WithRSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => Ok(Self::Sha256WithECDSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_384 => Ok(Self::Sha384WithECDSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_512 => Ok(Self::Sha512WithECDSA),
            const_oid::db::rfc8410::ID_ED_25519 => Ok(Self::Ed25519),
            const_oid::db::rfc5912::DSA_WITH_SHA_256 => Ok(Self::Sha256WithDSA),
            const_oid::db::rfc5912::DSA_WITH_SHA_1 => Ok(Self::Sha1WithDSA),
            other => Err(CertKitError::UnsupportedAlgorithm(format!(
                "signature algorithm {other}"
            ))),
        }
    }
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA carries explicit NULL parameters (RFC 4055); ECDSA, DSA and
    /// Ed25519 omit them (RFC 5758, RFC 8410).
    fn from(value: SignatureAlgorithm) -> Self {
        let parameters = match value {
            SignatureAlgorithm::Sha256WithRSA => Some(der::asn1::AnyRef::NULL.into()),
            _ => None,
        };
        x509_cert::spki::AlgorithmIdentifierOwned {
            oid: value.oid(),
            parameters,
        }
    }
}

/// Represents an X.509 certificate.
///
/// Certificates are immutable once signed. Equality is equality of the
/// encoded structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_der(der)?,
        })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_pem(pem.as_bytes())?,
        })
    }

    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| CertKitError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(der::pem::LineEnding::LF)
            .map_err(|e| CertKitError::EncodingError(e.to_string()))
    }

    pub fn subject(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    /// The subject name reduced to the attributes [`DistinguishedName`] models.
    pub fn subject_dn(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(self.subject())
    }

    pub fn subject_common_name(&self) -> Option<String> {
        params::common_name(self.subject())
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.inner.tbs_certificate.serial_number
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.inner
            .tbs_certificate
            .validity
            .not_before
            .to_system_time()
            .into()
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.inner
            .tbs_certificate
            .validity
            .not_after
            .to_system_time()
            .into()
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_oid(self.inner.signature_algorithm.oid)
    }

    pub fn extensions(&self) -> Vec<ExtensionParam> {
        self.inner
            .tbs_certificate
            .extensions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|ext| ExtensionParam {
                oid: ext.extn_id,
                critical: ext.critical,
                value: ext.extn_value.as_bytes().to_vec(),
            })
            .collect()
    }

    /// Decodes the extension of type `E`, together with its critical flag.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<(bool, E)>> {
        self.extensions()
            .into_iter()
            .find(|ext| ext.oid == E::OID)
            .map(|ext| Ok((ext.critical, ext.to_extension()?)))
            .transpose()
    }

    /// A certificate is self-signed when its issuer is equivalent to its
    /// subject. The signature is not checked.
    pub fn is_self_signed(&self) -> bool {
        params::names_equivalent(self.issuer(), self.subject())
    }

    /// Checks the signature over the to-be-signed part with `issuer_key`.
    pub fn verify_signature(&self, issuer_key: &PublicKey) -> Result<()> {
        let algorithm = self.signature_algorithm()?;
        let tbs = self.inner.tbs_certificate.to_der()?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            CertKitError::DecodingError("signature has unused bits".to_string())
        })?;
        issuer_key.verify_with(algorithm, &tbs, signature)
    }

    /// Creates a new self-signed certificate.
    ///
    /// # Arguments
    /// * `cert_info` - The certification request information.
    /// * `key` - The key pair used to sign the certificate; its public half must be the requested subject key.
    /// * `validity` - The validity period.
    /// * `serial_number` - The serial number.
    pub fn new_self_signed(
        cert_info: &CertificationRequestInfo,
        key: &KeyPair,
        validity: Validity,
        serial_number: SerialNumber,
    ) -> Result<Self> {
        if cert_info.subject_public_key != key.public_key() {
            return Err(CertKitError::AlgorithmMismatch(
                "self-signed certificate must certify the signing key".to_string(),
            ));
        }
        // For self-signed certificates, the issuer is the same as the subject
        let self_issuer = SelfIssuer {
            name: cert_info.subject.as_x509_name()?,
            key,
        };
        self_issuer.issue(cert_info, validity, serial_number)
    }
}

// Helper struct for self-signed certificates
struct SelfIssuer<'a> {
    name: Name,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Name {
        self.name.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }

    fn issuer_public_key(&self) -> Result<PublicKey> {
        Ok(self.key.public_key())
    }
}

/// A CA certificate together with its private key.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issuer for CertificateWithPrivateKey {
    fn issuer_name(&self) -> Name {
        // The name of the issuer is the subject of the certificate
        self.cert.subject().clone()
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    fn issuer_public_key(&self) -> Result<PublicKey> {
        self.cert.public_key().map_err(|e| match e {
            CertKitError::UnsupportedAlgorithm(what) => CertKitError::AlgorithmMismatch(format!(
                "CA certificate carries a {what} key, which no supported private key matches"
            )),
            other => other,
        })
    }

    /// Uses the certificate's subject key identifier when it has one.
    fn issuer_key_identifier(&self) -> Result<Vec<u8>> {
        match self.cert.extension::<extensions::SubjectKeyIdentifier>()? {
            Some((_, ski)) => Ok(ski.key_identifier),
            None => self.issuer_public_key()?.key_identifier(),
        }
    }
}
