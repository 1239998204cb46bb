#![allow(dead_code)]

use certbundle::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
use certbundle::cert::{Certificate, CertificateWithPrivateKey};
use certbundle::issuer::Issuer;
use certbundle::key::{KeyPair, PublicKey};
use certbundle::serial::{SequentialSerialNumbers, SerialNumberSource};
use time::{Duration, OffsetDateTime};

/// 2024-01-01T00:00:00Z
pub const NOT_BEFORE: i64 = 1_704_067_200;

pub fn validity(days: i64) -> Validity {
    let not_before = OffsetDateTime::from_unix_timestamp(NOT_BEFORE).unwrap();
    Validity::new(not_before, not_before + Duration::days(days)).unwrap()
}

pub fn ca_request(common_name: &str, key: &KeyPair) -> CertificationRequestInfo {
    CertificationRequestInfo::builder()
        .subject(
            DistinguishedName::builder()
                .common_name(common_name.to_string())
                .organization("MyCA Org".to_string())
                .country("US".to_string())
                .build(),
        )
        .subject_public_key(PublicKey::from_key_pair(key))
        .is_ca(true)
        .build()
}

pub fn leaf_request(common_name: &str, key: &KeyPair) -> CertificationRequestInfo {
    CertificationRequestInfo::builder()
        .subject(
            DistinguishedName::builder()
                .common_name(common_name.to_string())
                .organization("MyCA Org".to_string())
                .country("US".to_string())
                .build(),
        )
        .subject_public_key(PublicKey::from_key_pair(key))
        .build()
}

pub fn generate_ca_cert() -> CertificateWithPrivateKey {
    generate_ca_cert_with_key(KeyPair::generate_ecdsa_p256())
}

pub fn generate_ca_cert_with_key(ca_key: KeyPair) -> CertificateWithPrivateKey {
    let cert = Certificate::new_self_signed(
        &ca_request("myca.local", &ca_key),
        &ca_key,
        validity(3650),
        SequentialSerialNumbers::starting_at(1)
            .next_serial_number()
            .unwrap(),
    )
    .unwrap();
    CertificateWithPrivateKey { cert, key: ca_key }
}

pub fn generate_intermediate(
    parent: &CertificateWithPrivateKey,
    common_name: &str,
) -> CertificateWithPrivateKey {
    let key = KeyPair::generate_ecdsa_p256();
    let cert = parent
        .issue(
            &ca_request(common_name, &key),
            validity(1825),
            SequentialSerialNumbers::starting_at(2)
                .next_serial_number()
                .unwrap(),
        )
        .unwrap();
    CertificateWithPrivateKey { cert, key }
}

pub fn generate_leaf(
    issuer: &CertificateWithPrivateKey,
    common_name: &str,
) -> CertificateWithPrivateKey {
    let key = KeyPair::generate_ecdsa_p256();
    let cert = issuer
        .issue(
            &leaf_request(common_name, &key),
            validity(365),
            SequentialSerialNumbers::starting_at(3)
                .next_serial_number()
                .unwrap(),
        )
        .unwrap();
    CertificateWithPrivateKey { cert, key }
}
