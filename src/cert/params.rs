use std::collections::BTreeSet;

use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::{PrintableStringRef, SetOfVec, Utf8StringRef};
use der::{Any, Tag, Tagged};
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
use crate::error::CertKitError;
use crate::key::PublicKey;

pub const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
pub const COUNTRY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
pub const LOCALITY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
pub const STATE_OR_PROVINCE_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
pub const ORGANIZATION_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
pub const ORGANIZATIONAL_UNIT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

/// Parameters for building an X.509 certificate.
///
/// This struct contains the subject, public key, and optional extensions for the certificate.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `is_ca` - Issue a CA certificate (adds critical BasicConstraints and KeyUsage).
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Distinguished name parameters for building an X.509 certificate.
///
/// Attributes are always encoded in the order CN, OU, O, L, ST, C, one
/// attribute per RDN, so the same parameters produce the same bytes.
/// Equality ignores that order and compares the normalized attribute set.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The country (C), a two-letter code.
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
#[derive(Clone, Debug, Builder, Default)]
pub struct DistinguishedName {
    pub common_name: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    /// Attribute type and value pairs in encoding order.
    fn attributes(&self) -> Vec<(ObjectIdentifier, &str)> {
        [
            (COMMON_NAME, &self.common_name),
            (ORGANIZATIONAL_UNIT_NAME, &self.organization_unit),
            (ORGANIZATION_NAME, &self.organization),
            (LOCALITY_NAME, &self.locality),
            (STATE_OR_PROVINCE_NAME, &self.state),
            (COUNTRY_NAME, &self.country),
        ]
        .into_iter()
        .filter_map(|(oid, value)| value.as_deref().map(|v| (oid, v)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes().is_empty()
    }

    /// Converts the distinguished name to an X.509-compatible format.
    ///
    /// The country is encoded as a PrintableString, every other attribute as
    /// a UTF8String.
    pub fn as_x509_name(&self) -> Result<Name, CertKitError> {
        let mut rdns = Vec::new();
        for (oid, value) in self.attributes() {
            let value = if oid == COUNTRY_NAME {
                if value.len() != 2 {
                    return Err(CertKitError::InvalidInput(format!(
                        "country must be a two-letter code, got {value:?}"
                    )));
                }
                let printable = PrintableStringRef::new(value)
                    .map_err(|e| CertKitError::InvalidInput(e.to_string()))?;
                Any::encode_from(&printable)?
            } else {
                Any::encode_from(&Utf8StringRef::new(value)?)?
            };
            let attribute = AttributeTypeAndValue { oid, value };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![attribute])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509-compatible format.
    ///
    /// Attributes other than the six supported ones are dropped. When an
    /// attribute repeats, the first occurrence wins.
    pub fn from_x509_name(x509dn: &Name) -> Self {
        let mut dn = DistinguishedName::default();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Some(value) = attribute_string(&attr.value) else {
                    continue;
                };
                let slot = match attr.oid {
                    COMMON_NAME => &mut dn.common_name,
                    COUNTRY_NAME => &mut dn.country,
                    LOCALITY_NAME => &mut dn.locality,
                    STATE_OR_PROVINCE_NAME => &mut dn.state,
                    ORGANIZATION_NAME => &mut dn.organization,
                    ORGANIZATIONAL_UNIT_NAME => &mut dn.organization_unit,
                    _ => continue,
                };
                slot.get_or_insert(value);
            }
        }
        dn
    }

    fn normalized(&self) -> NormalizedName {
        NormalizedName(
            self.attributes()
                .into_iter()
                .map(|(oid, value)| (oid, normalize_value(value)))
                .collect(),
        )
    }
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for DistinguishedName {}

/// The attribute set of a name, used to decide name equivalence.
///
/// String values are trimmed, inner whitespace runs collapse to one space and
/// letters are lower-cased; values that are not strings keep their raw bytes
/// in `#hex` form. RDN boundaries and attribute order are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormalizedName(BTreeSet<(ObjectIdentifier, String)>);

impl NormalizedName {
    pub fn from_x509_name(name: &Name) -> Self {
        NormalizedName(
            name.0
                .iter()
                .flat_map(|rdn| rdn.0.iter())
                .map(|attr| {
                    let value = match attribute_string(&attr.value) {
                        Some(s) => normalize_value(&s),
                        None => raw_value(&attr.value),
                    };
                    (attr.oid, value)
                })
                .collect(),
        )
    }
}

/// Returns true when both names carry the same attribute set.
pub fn names_equivalent(a: &Name, b: &Name) -> bool {
    NormalizedName::from_x509_name(a) == NormalizedName::from_x509_name(b)
}

/// Returns the first common name attribute of `name`, if any.
pub fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|attr| attr.oid == COMMON_NAME)
        .and_then(|attr| attribute_string(&attr.value))
}

fn attribute_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(value.value()).ok().map(str::to_string)
        }
        _ => None,
    }
}

fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn raw_value(value: &Any) -> String {
    let hex: String = value.value().iter().map(|b| format!("{b:02x}")).collect();
    format!("#{hex}")
}

/// Certificate validity period.
///
/// This struct represents the `notBefore` and `notAfter` fields in a certificate.
/// Certificates store whole seconds, so [`Validity::new`] and
/// [`Validity::for_days`] drop sub-second parts up front and the encoded
/// bounds equal the stored ones.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// Years a certificate time can be encoded in.
pub const ENCODABLE_YEARS: std::ops::RangeInclusive<i32> = 1970..=9999;

impl Validity {
    /// Creates a validity period, rejecting an empty or inverted range.
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Result<Self, CertKitError> {
        let validity = Self {
            not_before: whole_seconds(not_before),
            not_after: whole_seconds(not_after),
        };
        validity.check()?;
        Ok(validity)
    }

    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Self {
        let now = whole_seconds(OffsetDateTime::now_utc());
        Self {
            not_before: now,
            not_after: now + Duration::days(days),
        }
    }

    /// Checks the period as it will be encoded, in whole seconds.
    ///
    /// # Errors
    /// * `InvalidInput` - a bound falls outside [`ENCODABLE_YEARS`].
    /// * `InvalidValidityPeriod` - `not_before` is not earlier than `not_after`.
    pub fn check(&self) -> Result<(), CertKitError> {
        let not_before = whole_seconds(self.not_before);
        let not_after = whole_seconds(self.not_after);
        if let Some(at) = [not_before, not_after]
            .into_iter()
            .find(|at| !ENCODABLE_YEARS.contains(&at.year()))
        {
            return Err(CertKitError::InvalidInput(format!(
                "certificate time {at} is outside the years {} to {}",
                ENCODABLE_YEARS.start(),
                ENCODABLE_YEARS.end()
            )));
        }
        if not_before < not_after {
            Ok(())
        } else {
            Err(CertKitError::InvalidValidityPeriod {
                not_before,
                not_after,
            })
        }
    }
}

fn whole_seconds(at: OffsetDateTime) -> OffsetDateTime {
    at - Duration::nanoseconds(i64::from(at.nanosecond()))
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(
        extension: E,
        critical: bool,
    ) -> Result<Self, CertKitError> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E, CertKitError> {
        E::from_x509_extension_value(&self.value)
    }
}
