//! End-to-end issuance: load the CA, generate a key, issue a leaf, find its
//! path and package everything into a bundle.
//!
//! Where the CA comes from and where the bundle goes are left to a
//! [`CredentialSource`] and a [`BundleSink`].

use std::fmt;

use bon::Builder;
use zeroize::Zeroizing;

use crate::bundle::{Bundle, check_password, package};
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::chain::build_path;
use crate::error::CertKitError;
use crate::issuer::Issuer;
use crate::key::{KeyAlgorithm, KeyPair};
use crate::serial::SerialNumberSource;

/// Supplies the CA certificate and private key that sign new certificates.
pub trait CredentialSource {
    fn load(&self) -> Result<CertificateWithPrivateKey, CertKitError>;
}

/// Receives the encoded bundle.
pub trait BundleSink {
    fn accept(&mut self, bundle: &[u8]) -> Result<(), CertKitError>;
}

/// Keeps the last accepted bundle in memory.
impl BundleSink for Vec<u8> {
    fn accept(&mut self, bundle: &[u8]) -> Result<(), CertKitError> {
        self.clear();
        self.extend_from_slice(bundle);
        Ok(())
    }
}

/// CA credentials as a PEM certificate and a PEM PKCS#8 private key.
pub struct PemCredentialSource {
    certificate_pem: String,
    private_key_pem: Zeroizing<String>,
}

impl PemCredentialSource {
    pub fn new(certificate_pem: impl Into<String>, private_key_pem: impl Into<String>) -> Self {
        Self {
            certificate_pem: certificate_pem.into(),
            private_key_pem: Zeroizing::new(private_key_pem.into()),
        }
    }
}

impl CredentialSource for PemCredentialSource {
    fn load(&self) -> Result<CertificateWithPrivateKey, CertKitError> {
        let cert = Certificate::from_pem(&self.certificate_pem)?;
        let key = KeyPair::import_from_pkcs8_pem(&self.private_key_pem)?;
        if cert.public_key()? != key.public_key() {
            return Err(CertKitError::AlgorithmMismatch(
                "CA private key does not belong to the CA certificate".to_string(),
            ));
        }
        Ok(CertificateWithPrivateKey { cert, key })
    }
}

/// CA credentials held in a password-protected PKCS#12 file.
///
/// The CA certificate is the bundled certificate whose public key matches the
/// bundled private key.
pub struct Pkcs12CredentialSource {
    bytes: Vec<u8>,
    password: Zeroizing<String>,
}

impl Pkcs12CredentialSource {
    pub fn new(bytes: impl Into<Vec<u8>>, password: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

impl CredentialSource for Pkcs12CredentialSource {
    fn load(&self) -> Result<CertificateWithPrivateKey, CertKitError> {
        let unpacked = Bundle::open(&self.bytes, &self.password)?;
        let public_key = unpacked.private_key.public_key();
        let cert = unpacked
            .certificates
            .into_iter()
            .find(|cert| cert.public_key().is_ok_and(|key| key == public_key))
            .ok_or_else(|| {
                CertKitError::AlgorithmMismatch(
                    "no certificate in the bundle matches its private key".to_string(),
                )
            })?;
        Ok(CertificateWithPrivateKey {
            cert,
            key: unpacked.private_key,
        })
    }
}

/// What to issue and how to package it.
///
/// # Fields
/// * `friendly_name` - Alias of the certificate and key in the bundle.
/// * `subject_name` - Common name of the issued certificate.
/// * `organization` - Organization of the issued certificate.
/// * `country` - Two-letter country code of the issued certificate.
/// * `validity` - Validity period of the issued certificate.
/// * `password` - Bundle password.
/// * `key_algorithm` - Algorithm of the generated key; defaults to the CA key's.
#[derive(Clone, Builder)]
pub struct IssuanceConfig {
    pub friendly_name: String,
    pub subject_name: String,
    pub organization: Option<String>,
    pub country: String,
    pub validity: Validity,
    #[builder(into)]
    pub password: Zeroizing<String>,
    pub key_algorithm: Option<KeyAlgorithm>,
}

impl fmt::Debug for IssuanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuanceConfig")
            .field("friendly_name", &self.friendly_name)
            .field("subject_name", &self.subject_name)
            .field("organization", &self.organization)
            .field("country", &self.country)
            .field("validity", &self.validity)
            .field("password", &"<redacted>")
            .field("key_algorithm", &self.key_algorithm)
            .finish()
    }
}

/// Issues a certificate for a fresh key and hands the packaged bundle to `sink`.
///
/// The path is built from the issued certificate over the CA certificate
/// followed by `pool`; the bundle holds the path's certificates above the
/// leaf. Nothing reaches `sink` unless every step succeeds.
///
/// # Errors
/// * `InvalidPassword` - the configured password is too short.
/// * `UnsupportedAlgorithm` - the key algorithm cannot be generated.
/// * `InvalidInput` - the country is not a two-letter code.
/// * `InvalidValidityPeriod`, `InvalidInput`, `AlgorithmMismatch` - as for [`Issuer::issue`].
/// * `NoPathFound` - no trust anchor is reachable from the issued certificate.
/// * `SerializationError` - the bundle could not be encoded.
pub fn issue_bundle<C, S, K>(
    config: &IssuanceConfig,
    credentials: &C,
    serials: &S,
    pool: &[Certificate],
    sink: &mut K,
) -> Result<Certificate, CertKitError>
where
    C: CredentialSource + ?Sized,
    S: SerialNumberSource + ?Sized,
    K: BundleSink + ?Sized,
{
    check_password(&config.password)?;
    config.validity.check()?;
    if config.country.chars().count() != 2 {
        return Err(CertKitError::InvalidInput(format!(
            "country must be a two-letter code, got {:?}",
            config.country
        )));
    }

    let ca = credentials.load()?;
    let algorithm = config.key_algorithm.unwrap_or_else(|| ca.key.algorithm());
    let key = KeyPair::generate(algorithm)?;

    let request = CertificationRequestInfo::builder()
        .subject(
            DistinguishedName::builder()
                .common_name(config.subject_name.clone())
                .maybe_organization(config.organization.clone())
                .country(config.country.clone())
                .build(),
        )
        .subject_public_key(key.public_key())
        .build();
    let cert = ca.issue(
        &request,
        config.validity.clone(),
        serials.next_serial_number()?,
    )?;

    let mut candidates = Vec::with_capacity(pool.len() + 1);
    candidates.push(ca.cert);
    candidates.extend_from_slice(pool);
    let path = build_path(&cert, &candidates)?;

    let bytes = package(
        &key,
        &cert,
        &config.friendly_name,
        &config.password,
        path.issuers(),
    )?;
    sink.accept(&bytes)?;

    tracing::debug!(
        friendly_name = %config.friendly_name,
        subject = %cert.subject(),
        path_length = path.len(),
        "issued bundle"
    );
    Ok(cert)
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::cert::SignatureAlgorithm;
    use crate::cert::params::names_equivalent;
    use crate::serial::{SequentialSerialNumbers, serial_number_from_u64};

    struct Fixed(CertificateWithPrivateKey);

    impl CredentialSource for Fixed {
        fn load(&self) -> Result<CertificateWithPrivateKey, CertKitError> {
            Ok(self.0.clone())
        }
    }

    fn root(cn: &str) -> CertificateWithPrivateKey {
        let key = KeyPair::generate_ecdsa_p256();
        let info = CertificationRequestInfo::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name(cn.to_string())
                    .build(),
            )
            .subject_public_key(key.public_key())
            .is_ca(true)
            .build();
        let cert = Certificate::new_self_signed(
            &info,
            &key,
            Validity::for_days(30),
            serial_number_from_u64(1).unwrap(),
        )
        .unwrap();
        CertificateWithPrivateKey { cert, key }
    }

    fn config(password: &str) -> IssuanceConfig {
        let not_before = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        IssuanceConfig::builder()
            .friendly_name("device".to_string())
            .subject_name("device.example".to_string())
            .organization("Example".to_string())
            .country("DE".to_string())
            .validity(Validity::new(not_before, not_before + Duration::days(365)).unwrap())
            .password(password.to_string())
            .build()
    }

    #[test]
    fn issues_and_packages_against_the_ca() {
        let ca = root("Issuing CA");
        let mut sink = Vec::new();
        let cert = issue_bundle(
            &config("secret"),
            &Fixed(ca.clone()),
            &SequentialSerialNumbers::starting_at(100),
            &[],
            &mut sink,
        )
        .unwrap();

        assert!(names_equivalent(cert.issuer(), ca.cert.subject()));
        assert_eq!(cert.serial_number(), &serial_number_from_u64(100).unwrap());
        assert_eq!(cert.subject_common_name().as_deref(), Some("device.example"));
        cert.verify_signature(&ca.cert.public_key().unwrap()).unwrap();

        let unpacked = Bundle::open(&sink, "secret").unwrap();
        assert_eq!(unpacked.friendly_name, "device");
        assert_eq!(unpacked.certificates, [cert, ca.cert]);
        assert_eq!(unpacked.private_key.algorithm(), KeyAlgorithm::EcdsaP256);
    }

    #[test]
    fn key_algorithm_can_differ_from_the_ca() {
        let ca = root("Issuing CA");
        let mut config = config("secret");
        config.key_algorithm = Some(KeyAlgorithm::Ed25519);
        let mut sink = Vec::new();
        let cert = issue_bundle(
            &config,
            &Fixed(ca),
            &SequentialSerialNumbers::starting_at(1),
            &[],
            &mut sink,
        )
        .unwrap();
        assert_eq!(cert.public_key().unwrap().algorithm(), KeyAlgorithm::Ed25519);
    }

    #[test]
    fn short_password_fails_before_loading_credentials() {
        struct Unreachable;
        impl CredentialSource for Unreachable {
            fn load(&self) -> Result<CertificateWithPrivateKey, CertKitError> {
                panic!("credentials must not be loaded");
            }
        }

        let mut sink = Vec::new();
        let err = issue_bundle(
            &config(""),
            &Unreachable,
            &SequentialSerialNumbers::starting_at(1),
            &[],
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, CertKitError::InvalidPassword(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn country_must_have_two_letters() {
        let mut config = config("secret");
        config.country = "DEU".to_string();
        let mut sink = Vec::new();
        let err = issue_bundle(
            &config,
            &Fixed(root("Issuing CA")),
            &SequentialSerialNumbers::starting_at(1),
            &[],
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, CertKitError::InvalidInput(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn pem_credentials_must_match() {
        let ca = root("Issuing CA");
        let other = KeyPair::generate_ecdsa_p256();

        let source = PemCredentialSource::new(
            ca.cert.to_pem().unwrap(),
            ca.key.to_pkcs8_pem().unwrap().as_str(),
        );
        assert_eq!(source.load().unwrap().cert, ca.cert);

        let source = PemCredentialSource::new(
            ca.cert.to_pem().unwrap(),
            other.to_pkcs8_pem().unwrap().as_str(),
        );
        assert!(matches!(
            source.load().unwrap_err(),
            CertKitError::AlgorithmMismatch(_)
        ));
    }

    #[test]
    fn pkcs12_credentials_pick_the_key_certificate() {
        let root = root("Root");
        let ca_key = KeyPair::generate_ecdsa_p256();
        let ca_request = CertificationRequestInfo::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name("Issuing CA".to_string())
                    .build(),
            )
            .subject_public_key(ca_key.public_key())
            .is_ca(true)
            .build();
        let ca_cert = root
            .issue(&ca_request, Validity::for_days(30), serial_number_from_u64(2).unwrap())
            .unwrap();
        let stored = package(&ca_key, &ca_cert, "ca", "store pass", &[root.cert.clone()]).unwrap();

        let source = Pkcs12CredentialSource::new(stored, "store pass");
        let mut sink = Vec::new();
        let cert = issue_bundle(
            &config("secret"),
            &source,
            &SequentialSerialNumbers::starting_at(5),
            &[root.cert.clone()],
            &mut sink,
        )
        .unwrap();

        let unpacked = Bundle::open(&sink, "secret").unwrap();
        assert_eq!(unpacked.certificates, [cert, ca_cert, root.cert]);
    }

    #[test]
    fn issues_from_a_legacy_dsa_ca_bundle() {
        let source = Pkcs12CredentialSource::new(
            include_bytes!("../tests/data/legacy_ca.p12").as_slice(),
            "changeit",
        );
        let ca = source.load().unwrap();
        assert_eq!(ca.key.algorithm(), KeyAlgorithm::Dsa { bits: 1024 });
        assert_eq!(
            ca.cert.signature_algorithm().unwrap(),
            SignatureAlgorithm::Sha1WithDSA
        );

        let mut config = config("secret");
        config.key_algorithm = Some(KeyAlgorithm::EcdsaP256);
        let mut sink = Vec::new();
        let cert = issue_bundle(
            &config,
            &source,
            &SequentialSerialNumbers::starting_at(9),
            &[],
            &mut sink,
        )
        .unwrap();
        assert_eq!(cert.signature_algorithm().unwrap(), SignatureAlgorithm::Sha256WithDSA);

        let unpacked = Bundle::open(&sink, "secret").unwrap();
        assert_eq!(unpacked.certificates, [cert.clone(), ca.cert.clone()]);
        let path = build_path(&cert, &[ca.cert]).unwrap();
        path.verify_signatures().unwrap();
    }

    #[test]
    fn unreachable_anchor_leaves_sink_untouched() {
        let root = root("Root");
        let ca_key = KeyPair::generate_ecdsa_p256();
        let ca_request = CertificationRequestInfo::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name("Issuing CA".to_string())
                    .build(),
            )
            .subject_public_key(ca_key.public_key())
            .is_ca(true)
            .build();
        let ca_cert = root
            .issue(&ca_request, Validity::for_days(30), serial_number_from_u64(2).unwrap())
            .unwrap();

        let mut sink = Vec::new();
        let err = issue_bundle(
            &config("secret"),
            &Fixed(CertificateWithPrivateKey {
                cert: ca_cert,
                key: ca_key,
            }),
            &SequentialSerialNumbers::starting_at(1),
            &[],
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, CertKitError::NoPathFound(_)));
        assert!(sink.is_empty());
    }
}
