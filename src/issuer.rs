use std::collections::HashSet;

use der::Encode;
use der::flagset::FlagSet;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;

use crate::cert::Certificate;
use crate::cert::extensions::AuthorityKeyIdentifier;
use crate::cert::extensions::BasicConstraints;
use crate::cert::extensions::KeyUsage;
use crate::cert::extensions::KeyUsages;
use crate::cert::extensions::SubjectKeyIdentifier;
use crate::cert::params::Validity;
use crate::cert::params::{CertificationRequestInfo, ExtensionParam};
use crate::error::CertKitError;
use crate::key::{KeyPair, PublicKey};
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// Returns the encoded name of the issuer, copied into issued certificates as-is.
    fn issuer_name(&self) -> Name;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Returns the public key that issued certificates are verified with.
    fn issuer_public_key(&self) -> Result<PublicKey, CertKitError>;

    /// Returns the key identifier placed in the authority key identifier of
    /// issued certificates. Defaults to the SHA-1 hash of the issuer key.
    fn issuer_key_identifier(&self) -> Result<Vec<u8>, CertKitError> {
        self.issuer_public_key()?.key_identifier()
    }

    /// Issues a certificate based on the provided certification request information.
    ///
    /// The certificate carries a non-critical authority key identifier taken
    /// from [`Issuer::issuer_key_identifier`] and a non-critical subject key identifier derived
    /// from the subject key. CA requests additionally get critical
    /// BasicConstraints and KeyUsage (keyCertSign, cRLSign).
    ///
    /// # Errors
    /// * `InvalidValidityPeriod` - `not_before` is not earlier than `not_after`.
    /// * `InvalidInput` - the subject is empty or an extension is repeated.
    /// * `AlgorithmMismatch` - the signing key does not belong to the issuer public key.
    fn issue(
        &self,
        cert_request: &CertificationRequestInfo,
        validity: Validity,
        serial_number: SerialNumber,
    ) -> Result<Certificate, CertKitError> {
        validity.check()?;
        if cert_request.subject.is_empty() {
            return Err(CertKitError::InvalidInput(
                "certificate subject has no attributes".to_string(),
            ));
        }

        let issuer_public_key = self.issuer_public_key()?;
        let signing_public_key = self.signing_key().public_key();
        if !signing_public_key.same_family(&issuer_public_key) {
            return Err(CertKitError::AlgorithmMismatch(format!(
                "signing key is {}, issuer certificate key is {}",
                signing_public_key.algorithm(),
                issuer_public_key.algorithm()
            )));
        }
        if signing_public_key != issuer_public_key {
            return Err(CertKitError::AlgorithmMismatch(
                "signing key is not the private half of the issuer certificate key".to_string(),
            ));
        }

        let signature_algo = self.signing_key().signature_algorithm();

        let authority_key_id = AuthorityKeyIdentifier {
            key_identifier: self.issuer_key_identifier()?,
        };
        let subject_key_id = SubjectKeyIdentifier {
            key_identifier: cert_request.subject_public_key.key_identifier()?,
        };

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(authority_key_id, false)?,
            ExtensionParam::from_extension(subject_key_id, false)?,
        ];

        if cert_request.is_ca {
            let basic_constraints = BasicConstraints {
                is_ca: true,
                max_path_length: None,
            };
            let key_usage_flags: FlagSet<KeyUsages> = KeyUsages::KeyCertSign | KeyUsages::CRLSign;
            extensions.push(ExtensionParam::from_extension(basic_constraints, true)?);
            extensions.push(ExtensionParam::from_extension(
                KeyUsage(key_usage_flags),
                true,
            )?);
        }

        extensions.extend(cert_request.extensions.iter().cloned());

        let mut seen = HashSet::new();
        if let Some(duplicate) = extensions.iter().find(|ext| !seen.insert(ext.oid)) {
            return Err(CertKitError::InvalidInput(format!(
                "extension {} appears more than once",
                duplicate.oid
            )));
        }

        let tbs_cert = TbsCertificate {
            serial_number,
            signature_algorithm: signature_algo,
            issuer: self.issuer_name(),
            not_before: validity.not_before,
            not_after: validity.not_after,
            subject: cert_request.subject.clone(),
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let signature = self
            .signing_key()
            .sign_data(&tbs_cert_inner.to_der()?)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.into(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        let certificate = Certificate { inner: cert_inner };
        tracing::debug!(
            subject = %certificate.subject(),
            issuer = %certificate.issuer(),
            algorithm = ?signature_algo,
            is_ca = cert_request.is_ca,
            "issued certificate"
        );
        Ok(certificate)
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::cert::CertificateWithPrivateKey;
    use crate::cert::extensions::ToAndFromX509Extension;
    use crate::cert::params::DistinguishedName;
    use crate::serial::serial_number_from_u64;

    fn ca(key: KeyPair) -> CertificateWithPrivateKey {
        let info = CertificationRequestInfo::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name("MyCA CommonName".to_string())
                    .build(),
            )
            .subject_public_key(key.public_key())
            .is_ca(true)
            .build();
        let cert = Certificate::new_self_signed(
            &info,
            &key,
            Validity::for_days(10),
            serial_number_from_u64(1).unwrap(),
        )
        .unwrap();
        CertificateWithPrivateKey { cert, key }
    }

    fn leaf_request() -> CertificationRequestInfo {
        CertificationRequestInfo::builder()
            .subject(
                DistinguishedName::builder()
                    .common_name("leaf".to_string())
                    .build(),
            )
            .subject_public_key(KeyPair::generate_ed25519().public_key())
            .build()
    }

    #[test]
    fn leaf_gets_exactly_two_non_critical_key_identifiers() {
        let ca = ca(KeyPair::generate_ecdsa_p256());
        let cert = ca
            .issue(
                &leaf_request(),
                Validity::for_days(1),
                serial_number_from_u64(2).unwrap(),
            )
            .unwrap();
        let extensions = cert.extensions();
        assert_eq!(extensions.len(), 2);
        assert!(extensions.iter().all(|ext| !ext.critical));
        assert_eq!(extensions[0].oid, AuthorityKeyIdentifier::OID);
        assert_eq!(extensions[1].oid, SubjectKeyIdentifier::OID);
    }

    #[test]
    fn authority_key_id_follows_the_ca_subject_key_id() {
        let mut ca = ca(KeyPair::generate_ecdsa_p256());
        let custom_id = vec![0x5a; 8];
        let encoded = SubjectKeyIdentifier {
            key_identifier: custom_id.clone(),
        }
        .to_x509_extension_value()
        .unwrap();
        let extensions = ca.cert.inner.tbs_certificate.extensions.as_mut().unwrap();
        let ski = extensions
            .iter_mut()
            .find(|ext| ext.extn_id == SubjectKeyIdentifier::OID)
            .unwrap();
        ski.extn_value = der::asn1::OctetString::new(encoded).unwrap();

        let cert = ca
            .issue(
                &leaf_request(),
                Validity::for_days(1),
                serial_number_from_u64(2).unwrap(),
            )
            .unwrap();
        let (_, aki) = cert.extension::<AuthorityKeyIdentifier>().unwrap().unwrap();
        assert_eq!(aki.key_identifier, custom_id);
        assert_ne!(
            aki.key_identifier,
            ca.key.public_key().key_identifier().unwrap()
        );
    }

    #[test]
    fn rejects_empty_subject() {
        let ca = ca(KeyPair::generate_ecdsa_p256());
        let mut request = leaf_request();
        request.subject = DistinguishedName::default();
        let err = ca
            .issue(&request, Validity::for_days(1), serial_number_from_u64(2).unwrap())
            .unwrap_err();
        assert!(matches!(err, CertKitError::InvalidInput(_)));
    }

    #[test]
    fn rejects_inverted_validity() {
        let ca = ca(KeyPair::generate_ecdsa_p256());
        let now = OffsetDateTime::now_utc();
        let validity = Validity {
            not_before: now,
            not_after: now - time::Duration::hours(1),
        };
        let err = ca
            .issue(&leaf_request(), validity, serial_number_from_u64(2).unwrap())
            .unwrap_err();
        assert!(matches!(err, CertKitError::InvalidValidityPeriod { .. }));
    }

    #[test]
    fn rejects_ca_key_of_another_family() {
        let mut ca = ca(KeyPair::generate_ecdsa_p256());
        ca.key = KeyPair::generate_ed25519();
        let err = ca
            .issue(
                &leaf_request(),
                Validity::for_days(1),
                serial_number_from_u64(2).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, CertKitError::AlgorithmMismatch(_)));
    }

    #[test]
    fn rejects_ca_key_of_same_family_but_other_key() {
        let mut ca = ca(KeyPair::generate_ecdsa_p256());
        ca.key = KeyPair::generate_ecdsa_p256();
        let err = ca
            .issue(
                &leaf_request(),
                Validity::for_days(1),
                serial_number_from_u64(2).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, CertKitError::AlgorithmMismatch(_)));
    }

    #[test]
    fn rejects_duplicate_extensions() {
        let ca = ca(KeyPair::generate_ecdsa_p256());
        let mut request = leaf_request();
        request.extensions = vec![
            ExtensionParam::from_extension(
                SubjectKeyIdentifier {
                    key_identifier: vec![9; 20],
                },
                false,
            )
            .unwrap(),
        ];
        let err = ca
            .issue(&request, Validity::for_days(1), serial_number_from_u64(2).unwrap())
            .unwrap_err();
        assert!(matches!(err, CertKitError::InvalidInput(_)));
    }
}
