//! Password-protected PKCS#12 bundles.
//!
//! A [`Bundle`] pairs a private key with its certificate and the issuers above
//! it. The key entry is stored under the bundle's friendly name and links to
//! its own certificate only. Each chain member is a standalone certificate
//! entry under its subject common name.

use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};

use crate::cert::Certificate;
use crate::chain::build_path;
use crate::error::CertKitError;
use crate::key::KeyPair;

/// Shortest accepted bundle password, in characters.
pub const MIN_PASSWORD_LEN: usize = 1;

/// Rejects passwords shorter than [`MIN_PASSWORD_LEN`].
pub fn check_password(password: &str) -> Result<(), CertKitError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CertKitError::InvalidPassword(format!(
            "password must be at least {MIN_PASSWORD_LEN} character(s) long"
        )));
    }
    Ok(())
}

/// A certificate stored in a bundle under an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertEntry {
    pub alias: String,
    pub certificate: Certificate,
}

/// The private key entry and the aliases of the certificates it is linked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub alias: String,
    pub certificate_aliases: Vec<String>,
}

/// In-memory model of a bundle, built once and then serialized.
#[derive(Debug)]
pub struct Bundle<'a> {
    key: &'a KeyPair,
    key_entry: KeyEntry,
    cert_entries: Vec<CertEntry>,
}

impl<'a> Bundle<'a> {
    /// Lays out the entries for `cert` and its `chain`.
    ///
    /// Chain members equal to `cert` are skipped. Aliases are unique within a
    /// bundle: a chain member whose alias is already taken, by the friendly
    /// name or an earlier member, is dropped.
    ///
    /// # Errors
    /// * `InvalidInput` - `friendly_name` is empty.
    /// * `AlgorithmMismatch` - `key` is not the private half of the certificate key.
    pub fn new(
        key: &'a KeyPair,
        cert: &Certificate,
        friendly_name: &str,
        chain: &[Certificate],
    ) -> Result<Self, CertKitError> {
        if friendly_name.is_empty() {
            return Err(CertKitError::InvalidInput(
                "bundle friendly name is empty".to_string(),
            ));
        }
        if cert.public_key()? != key.public_key() {
            return Err(CertKitError::AlgorithmMismatch(
                "private key does not belong to the bundled certificate".to_string(),
            ));
        }

        let mut cert_entries = vec![CertEntry {
            alias: friendly_name.to_string(),
            certificate: cert.clone(),
        }];
        for member in chain.iter().filter(|member| *member != cert) {
            let alias = member
                .subject_common_name()
                .unwrap_or_else(|| member.subject().to_string());
            if cert_entries.iter().any(|entry| entry.alias == alias) {
                tracing::warn!(
                    alias,
                    subject = %member.subject(),
                    "alias taken, chain member dropped"
                );
                continue;
            }
            cert_entries.push(CertEntry {
                alias,
                certificate: member.clone(),
            });
        }

        Ok(Self {
            key,
            key_entry: KeyEntry {
                alias: friendly_name.to_string(),
                certificate_aliases: vec![friendly_name.to_string()],
            },
            cert_entries,
        })
    }

    pub fn friendly_name(&self) -> &str {
        &self.key_entry.alias
    }

    pub fn key_entry(&self) -> &KeyEntry {
        &self.key_entry
    }

    /// Certificate entries, the bundled certificate first, then the chain
    /// members in the order given.
    pub fn cert_entries(&self) -> &[CertEntry] {
        &self.cert_entries
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert_entries[0].certificate
    }

    /// Encodes the bundle as PKCS#12 protected by `password`.
    ///
    /// Key and certificates are PBES2 encrypted (PBKDF2-HMAC-SHA256,
    /// AES-256-CBC) and the whole is sealed with an HMAC-SHA256 MAC.
    ///
    /// The key bag is named after the friendly name and shares a localKeyId,
    /// the certificate's subject key identifier, with the certificate bag.
    /// Every chain member becomes a trusted certificate bag carrying its
    /// alias as friendlyName and no localKeyId, so it is not linked to the key.
    pub fn to_pkcs12(&self, password: &str) -> Result<Vec<u8>, CertKitError> {
        check_password(password)?;

        let key_der = self.key.to_pkcs8_der()?;
        let local_key_id = self.certificate().public_key()?.key_identifier()?;

        let mut store = KeyStore::new();
        for entry in &self.cert_entries[1..] {
            store.add_entry(
                &entry.alias,
                KeyStoreEntry::Certificate(to_p12_certificate(&entry.certificate)?),
            );
        }
        store.add_entry(
            &self.key_entry.alias,
            KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(
                key_der.as_slice(),
                &local_key_id,
                vec![to_p12_certificate(self.certificate())?],
            )),
        );
        store
            .writer(password)
            .write()
            .map_err(|e| CertKitError::SerializationError(e.to_string()))
    }

    /// Reads back a bundle written by [`Bundle::to_pkcs12`] or any other
    /// PKCS#12 writer holding one private key.
    ///
    /// Issuers come from the standalone certificate entries and from any
    /// certificates the writer linked to the key. They are put in path order
    /// above the key's certificate when a path to a self-signed one exists,
    /// and follow it in the order read otherwise.
    ///
    /// # Errors
    /// * `InvalidPassword` - the MAC does not verify with `password`.
    /// * `DecodingError` - the bytes are not PKCS#12 or hold no private key.
    pub fn open(bytes: &[u8], password: &str) -> Result<UnpackedBundle, CertKitError> {
        let store = KeyStore::from_pkcs12(bytes, password)?;
        let (alias, key_chain) = store.private_key_chain().ok_or_else(|| {
            CertKitError::DecodingError("bundle holds no private key".to_string())
        })?;

        let private_key = KeyPair::from_pkcs8_der(key_chain.key())?;
        let linked = key_chain
            .chain()
            .iter()
            .map(|cert| Certificate::from_der(cert.as_der()))
            .collect::<Result<Vec<_>, _>>()?;
        let (certificate, linked_issuers) = linked.split_first().ok_or_else(|| {
            CertKitError::DecodingError(format!("key entry {alias:?} has no certificate"))
        })?;

        let cert_entries = store
            .entries()
            .filter_map(|(alias, entry)| match entry {
                KeyStoreEntry::Certificate(cert) => Some((alias, cert)),
                KeyStoreEntry::PrivateKeyChain(_) => None,
            })
            .map(|(alias, cert)| {
                Ok(CertEntry {
                    alias: alias.clone(),
                    certificate: Certificate::from_der(cert.as_der())?,
                })
            })
            .collect::<Result<Vec<_>, CertKitError>>()?;

        let mut pool = linked_issuers.to_vec();
        pool.extend(cert_entries.iter().map(|entry| entry.certificate.clone()));
        let mut certificates = match build_path(certificate, &pool) {
            Ok(path) => path.into_vec(),
            Err(_) => vec![certificate.clone()],
        };
        for cert in pool {
            if !certificates.contains(&cert) {
                certificates.push(cert);
            }
        }

        Ok(UnpackedBundle {
            friendly_name: alias.to_string(),
            certificates,
            linked_certificates: linked.len(),
            cert_entries,
            private_key,
        })
    }
}

/// The contents of an opened bundle.
#[derive(Debug)]
pub struct UnpackedBundle {
    /// Alias of the private key entry.
    pub friendly_name: String,
    /// The key's certificate followed by its issuers.
    pub certificates: Vec<Certificate>,
    /// How many certificates the key entry itself links to.
    pub linked_certificates: usize,
    /// Standalone certificate entries, sorted by alias.
    pub cert_entries: Vec<CertEntry>,
    pub private_key: KeyPair,
}

fn to_p12_certificate(cert: &Certificate) -> Result<p12_keystore::Certificate, CertKitError> {
    p12_keystore::Certificate::from_der(&cert.to_der()?)
        .map_err(|e| CertKitError::SerializationError(e.to_string()))
}

/// Packages `key`, `cert` and `chain` into a PKCS#12 bundle.
///
/// The password is checked before anything is built.
///
/// # Errors
/// * `InvalidPassword` - the password is shorter than [`MIN_PASSWORD_LEN`].
/// * `InvalidInput` - `friendly_name` is empty.
/// * `AlgorithmMismatch` - `key` does not belong to `cert`.
/// * `SerializationError` - PKCS#12 encoding failed.
pub fn package(
    key: &KeyPair,
    cert: &Certificate,
    friendly_name: &str,
    password: &str,
    chain: &[Certificate],
) -> Result<Vec<u8>, CertKitError> {
    check_password(password)?;
    let bundle = Bundle::new(key, cert, friendly_name, chain)?;
    let bytes = bundle.to_pkcs12(password)?;
    tracing::debug!(
        friendly_name,
        certificates = bundle.cert_entries().len(),
        size = bytes.len(),
        "packaged bundle"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::CertificateWithPrivateKey;
    use crate::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
    use crate::issuer::Issuer;
    use crate::serial::serial_number_from_u64;

    fn subject(cn: &str) -> DistinguishedName {
        DistinguishedName::builder()
            .common_name(cn.to_string())
            .build()
    }

    fn self_signed(name: DistinguishedName) -> CertificateWithPrivateKey {
        let key = KeyPair::generate_ecdsa_p256();
        let info = CertificationRequestInfo::builder()
            .subject(name)
            .subject_public_key(key.public_key())
            .is_ca(true)
            .build();
        let cert = Certificate::new_self_signed(
            &info,
            &key,
            Validity::for_days(1),
            serial_number_from_u64(1).unwrap(),
        )
        .unwrap();
        CertificateWithPrivateKey { cert, key }
    }

    fn issue(
        issuer: &CertificateWithPrivateKey,
        name: DistinguishedName,
        is_ca: bool,
    ) -> CertificateWithPrivateKey {
        let key = KeyPair::generate_ecdsa_p256();
        let info = CertificationRequestInfo::builder()
            .subject(name)
            .subject_public_key(key.public_key())
            .is_ca(is_ca)
            .build();
        let cert = issuer
            .issue(&info, Validity::for_days(1), serial_number_from_u64(7).unwrap())
            .unwrap();
        CertificateWithPrivateKey { cert, key }
    }

    #[test]
    fn entries_follow_the_chain() {
        let root = self_signed(subject("Root"));
        let intermediate = issue(&root, subject("Intermediate"), true);
        let leaf = issue(&intermediate, subject("device"), false);

        let chain = [intermediate.cert.clone(), root.cert.clone()];
        let bundle = Bundle::new(&leaf.key, &leaf.cert, "my device", &chain).unwrap();

        let aliases: Vec<&str> = bundle
            .cert_entries()
            .iter()
            .map(|entry| entry.alias.as_str())
            .collect();
        assert_eq!(aliases, ["my device", "Intermediate", "Root"]);
        assert_eq!(bundle.key_entry().alias, "my device");
        assert_eq!(bundle.key_entry().certificate_aliases, ["my device"]);
        assert_eq!(bundle.certificate(), &leaf.cert);
    }

    #[test]
    fn leaf_in_chain_is_skipped() {
        let root = self_signed(subject("Root"));
        let leaf = issue(&root, subject("device"), false);

        let chain = [leaf.cert.clone(), root.cert.clone()];
        let bundle = Bundle::new(&leaf.key, &leaf.cert, "device", &chain).unwrap();
        assert_eq!(bundle.cert_entries().len(), 2);
        assert_eq!(bundle.cert_entries()[1].certificate, root.cert);
    }

    #[test]
    fn chain_member_without_common_name_uses_subject() {
        let root = self_signed(
            DistinguishedName::builder()
                .organization("Example Org".to_string())
                .country("US".to_string())
                .build(),
        );
        let leaf = issue(&root, subject("device"), false);

        let bundle = Bundle::new(&leaf.key, &leaf.cert, "device", &[root.cert.clone()]).unwrap();
        assert_eq!(bundle.cert_entries()[1].alias, root.cert.subject().to_string());
    }

    #[test]
    fn first_holder_of_an_alias_wins() {
        let first = self_signed(subject("Shared"));
        let second = self_signed(subject("Shared"));
        let named_like_the_bundle = self_signed(subject("device"));
        let leaf = issue(&first, subject("device"), false);

        let chain = [
            first.cert.clone(),
            second.cert.clone(),
            named_like_the_bundle.cert.clone(),
        ];
        let bundle = Bundle::new(&leaf.key, &leaf.cert, "device", &chain).unwrap();
        assert_eq!(bundle.cert_entries().len(), 2);
        assert_eq!(bundle.cert_entries()[1].alias, "Shared");
        assert_eq!(bundle.cert_entries()[1].certificate, first.cert);

        let bytes = bundle.to_pkcs12("secret").unwrap();
        let unpacked = Bundle::open(&bytes, "secret").unwrap();
        assert_eq!(unpacked.friendly_name, "device");
        assert_eq!(unpacked.certificates, [leaf.cert, first.cert]);
    }

    #[test]
    fn chain_members_are_standalone_entries() {
        let root = self_signed(subject("Root"));
        let intermediate = issue(&root, subject("Intermediate"), true);
        let leaf = issue(&intermediate, subject("device"), false);

        let chain = [intermediate.cert.clone(), root.cert.clone()];
        let bytes = package(&leaf.key, &leaf.cert, "my device", "secret", &chain).unwrap();

        let store = KeyStore::from_pkcs12(&bytes, "secret").unwrap();
        assert_eq!(store.entries_count(), 3);
        match store.entry("my device") {
            Some(KeyStoreEntry::PrivateKeyChain(key_chain)) => {
                assert_eq!(key_chain.chain().len(), 1);
                assert_eq!(key_chain.chain()[0].as_der(), leaf.cert.to_der().unwrap());
            }
            other => panic!("expected a key entry, got {other:?}"),
        }
        for (alias, cert) in [("Intermediate", &intermediate.cert), ("Root", &root.cert)] {
            match store.entry(alias) {
                Some(KeyStoreEntry::Certificate(entry)) => {
                    assert_eq!(entry.as_der(), cert.to_der().unwrap())
                }
                other => panic!("expected a certificate entry for {alias}, got {other:?}"),
            }
        }

        let unpacked = Bundle::open(&bytes, "secret").unwrap();
        assert_eq!(unpacked.linked_certificates, 1);
        let aliases: Vec<&str> = unpacked
            .cert_entries
            .iter()
            .map(|entry| entry.alias.as_str())
            .collect();
        assert_eq!(aliases, ["Intermediate", "Root"]);
    }

    #[test]
    fn round_trips_through_pkcs12() {
        let root = self_signed(subject("Root"));
        let intermediate = issue(&root, subject("Intermediate"), true);
        let leaf = issue(&intermediate, subject("device"), false);

        let chain = [intermediate.cert.clone(), root.cert.clone()];
        let bytes = package(&leaf.key, &leaf.cert, "my device", "secret", &chain).unwrap();

        let unpacked = Bundle::open(&bytes, "secret").unwrap();
        assert_eq!(unpacked.friendly_name, "my device");
        assert_eq!(
            unpacked.certificates,
            [leaf.cert.clone(), intermediate.cert.clone(), root.cert.clone()]
        );
        assert_eq!(unpacked.private_key.public_key(), leaf.key.public_key());
    }

    #[test]
    fn wrong_password_does_not_open() {
        let root = self_signed(subject("Root"));
        let leaf = issue(&root, subject("device"), false);
        let bytes = package(&leaf.key, &leaf.cert, "device", "secret", &[root.cert]).unwrap();

        let err = Bundle::open(&bytes, "not the secret").unwrap_err();
        assert!(matches!(err, CertKitError::InvalidPassword(_)));
    }

    #[test]
    fn empty_password_is_rejected() {
        let root = self_signed(subject("Root"));
        let leaf = issue(&root, subject("device"), false);

        let err = package(&leaf.key, &leaf.cert, "device", "", &[root.cert]).unwrap_err();
        assert!(matches!(err, CertKitError::InvalidPassword(_)));
    }

    #[test]
    fn empty_friendly_name_is_rejected() {
        let root = self_signed(subject("Root"));
        let leaf = issue(&root, subject("device"), false);

        let err = package(&leaf.key, &leaf.cert, "", "secret", &[]).unwrap_err();
        assert!(matches!(err, CertKitError::InvalidInput(_)));
    }

    #[test]
    fn foreign_key_is_rejected() {
        let root = self_signed(subject("Root"));
        let leaf = issue(&root, subject("device"), false);

        let err = package(&root.key, &leaf.cert, "device", "secret", &[]).unwrap_err();
        assert!(matches!(err, CertKitError::AlgorithmMismatch(_)));
    }

    #[test]
    fn garbage_is_not_a_bundle() {
        let err = Bundle::open(b"definitely not pkcs12", "secret").unwrap_err();
        assert!(matches!(err, CertKitError::DecodingError(_)));
    }
}
