//! # certbundle - CA-signed certificates, trust paths and PKCS#12 bundles
//!
//! certbundle issues X.509 certificates signed by a certificate authority,
//! finds the path from an issued certificate to a self-signed trust anchor in
//! an unordered pool of certificates, and packages the private key with its
//! certificate and chain into a password-protected PKCS#12 bundle. It is
//! built on the RustCrypto crates; `openssl` and `botan` are only used by the
//! tests.
//!
//! ## Supported Key Types
//!
//! - **RSA**: 2048, 3072, and 4096-bit keys, signed with SHA-256
//! - **ECDSA**: P-256, P-384, and P-521 curves
//! - **Ed25519**
//!
//! ## Quick Start
//!
//! ### Issuing a Certificate
//!
//! ```rust,no_run
//! use certbundle::{
//!     cert::{Certificate, CertificateWithPrivateKey, params::{CertificationRequestInfo, DistinguishedName, Validity}},
//!     issuer::Issuer,
//!     key::KeyPair,
//!     serial::{RandomSerialNumbers, SerialNumberSource},
//! };
//!
//! # fn main() -> Result<(), certbundle::error::CertKitError> {
//! let ca_key = KeyPair::generate_ecdsa_p256();
//! let ca_info = CertificationRequestInfo::builder()
//!     .subject(DistinguishedName::builder().common_name("Example CA".to_string()).build())
//!     .subject_public_key(ca_key.public_key())
//!     .is_ca(true)
//!     .build();
//! let ca = CertificateWithPrivateKey {
//!     cert: Certificate::new_self_signed(
//!         &ca_info,
//!         &ca_key,
//!         Validity::for_days(3650),
//!         RandomSerialNumbers.next_serial_number()?,
//!     )?,
//!     key: ca_key,
//! };
//!
//! let device_key = KeyPair::generate_ecdsa_p256();
//! let device_info = CertificationRequestInfo::builder()
//!     .subject(
//!         DistinguishedName::builder()
//!             .common_name("device-42".to_string())
//!             .organization("Example Corp".to_string())
//!             .country("US".to_string())
//!             .build(),
//!     )
//!     .subject_public_key(device_key.public_key())
//!     .build();
//! let device_cert = ca.issue(
//!     &device_info,
//!     Validity::for_days(365),
//!     RandomSerialNumbers.next_serial_number()?,
//! )?;
//! println!("{}", device_cert.to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Building a Path and Packaging a Bundle
//!
//! ```rust,no_run
//! use certbundle::{bundle, cert::Certificate, chain::build_path, key::KeyPair};
//!
//! # fn run(device_key: &KeyPair, device_cert: &Certificate, pool: &[Certificate]) -> Result<Vec<u8>, certbundle::error::CertKitError> {
//! let path = build_path(device_cert, pool)?;
//! let p12 = bundle::package(device_key, device_cert, "device-42", "changeit", path.issuers())?;
//! # Ok(p12)
//! # }
//! ```
//!
//! [`issuance::issue_bundle`] runs the whole sequence against a
//! [`issuance::CredentialSource`] and a [`issuance::BundleSink`].
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`error::CertKitError`]:
//!
//! ```rust
//! use certbundle::{bundle::Bundle, error::CertKitError};
//!
//! match Bundle::open(b"not a bundle", "changeit") {
//!     Ok(_) => println!("opened"),
//!     Err(CertKitError::InvalidPassword(msg)) => println!("wrong password: {}", msg),
//!     Err(e) => println!("other error: {}", e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: Key generation, PKCS#8 import/export, signing and verification
//! - [`cert`]: Certificates, distinguished names and extensions
//! - [`issuer`]: Certificate issuing by a CA
//! - [`serial`]: Serial number sources
//! - [`chain`]: Certification path building
//! - [`bundle`]: PKCS#12 packaging
//! - [`issuance`]: End-to-end issuance with pluggable credentials and output
//! - [`error`]: Error type
//! - [`tbs_certificate`]: Low-level certificate structure

pub mod bundle;
pub mod cert;
pub mod chain;
pub mod error;
pub mod issuance;
pub mod issuer;
pub mod key;
pub mod serial;
pub mod tbs_certificate;
