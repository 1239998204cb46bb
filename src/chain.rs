//! Certification path building.
//!
//! A path is an ordered sequence of certificates where:
//! - The first certificate is the target (usually a leaf)
//! - Each subsequent certificate is the issuer of the previous one
//! - The last certificate is a self-signed trust anchor
//!
//! Issuance is decided by name equivalence only: `child.issuer` must carry
//! the same attribute set as `parent.subject`. Signatures are not checked
//! while building; [`CertificatePath::verify_signatures`] does that
//! separately.

use std::collections::HashSet;
use std::ops::Deref;

use crate::cert::Certificate;
use crate::cert::params::NormalizedName;
use crate::error::CertKitError;

/// An ordered certification path from a target certificate to a trust anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePath {
    certificates: Vec<Certificate>,
}

impl CertificatePath {
    /// Returns the certificate the path was built for.
    pub fn target(&self) -> &Certificate {
        &self.certificates[0]
    }

    /// Returns the self-signed certificate that terminates the path.
    pub fn trust_anchor(&self) -> &Certificate {
        &self.certificates[self.certificates.len() - 1]
    }

    /// Returns every certificate above the target, ending with the anchor.
    pub fn issuers(&self) -> &[Certificate] {
        &self.certificates[1..]
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Always false: a path holds at least its target.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn as_slice(&self) -> &[Certificate] {
        &self.certificates
    }

    pub fn into_vec(self) -> Vec<Certificate> {
        self.certificates
    }

    /// Verifies each certificate's signature with the key of the next one,
    /// and the anchor's signature with its own key.
    pub fn verify_signatures(&self) -> Result<(), CertKitError> {
        for pair in self.certificates.windows(2) {
            let (child, parent) = (&pair[0], &pair[1]);
            child.verify_signature(&parent.public_key()?)?;
        }
        let anchor = self.trust_anchor();
        anchor.verify_signature(&anchor.public_key()?)
    }
}

impl Deref for CertificatePath {
    type Target = [Certificate];

    fn deref(&self) -> &Self::Target {
        &self.certificates
    }
}

impl<'a> IntoIterator for &'a CertificatePath {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.certificates.iter()
    }
}

struct Candidate<'a> {
    cert: &'a Certificate,
    subject: NormalizedName,
    issuer: NormalizedName,
}

impl<'a> Candidate<'a> {
    fn new(cert: &'a Certificate) -> Self {
        Self {
            cert,
            subject: NormalizedName::from_x509_name(cert.subject()),
            issuer: NormalizedName::from_x509_name(cert.issuer()),
        }
    }

    fn issued_by(&self, parent: &Candidate<'_>) -> bool {
        self.issuer == parent.subject
    }
}

/// Builds a certification path from `target` to a self-signed certificate in `pool`.
///
/// The pool is split into anchors (self-signed) and intermediates; the
/// target joins the intermediates. Starting at the target, a depth-first
/// search looks for a certificate whose subject matches the current issuer,
/// trying anchors before intermediates and each group in pool order, and
/// backtracks out of dead ends. An issuer name whose search failed without
/// running into a certificate already on the path is not searched again. No
/// certificate appears twice on a path. The
/// first complete path found is returned; when duplicates offer several
/// paths, no ranking takes place.
///
/// A self-signed target is its own path.
///
/// # Errors
/// `NoPathFound` when no anchor is reachable.
pub fn build_path(
    target: &Certificate,
    pool: &[Certificate],
) -> Result<CertificatePath, CertKitError> {
    let start = Candidate::new(target);
    if start.issued_by(&start) {
        tracing::debug!(subject = %target.subject(), "target is self-signed");
        return Ok(CertificatePath {
            certificates: vec![target.clone()],
        });
    }

    let (anchors, mut intermediates): (Vec<_>, Vec<_>) = pool
        .iter()
        .map(Candidate::new)
        .partition(|candidate| candidate.issued_by(candidate));
    intermediates.push(Candidate::new(target));

    tracing::debug!(
        subject = %target.subject(),
        anchors = anchors.len(),
        intermediates = intermediates.len(),
        "building certification path"
    );

    let mut search = PathSearch {
        anchors: &anchors,
        intermediates: &intermediates,
        dead_ends: HashSet::new(),
    };
    let mut path = vec![&start];
    if let Search::Found = search.extend(&mut path) {
        let certificates: Vec<Certificate> = path.iter().map(|c| c.cert.clone()).collect();
        tracing::debug!(length = certificates.len(), "certification path found");
        Ok(CertificatePath { certificates })
    } else {
        Err(CertKitError::NoPathFound(target.subject().to_string()))
    }
}

enum Search {
    Found,
    /// `blocked` is set when a certificate was passed over because it was
    /// already on the path, so the failure depends on the path.
    DeadEnd { blocked: bool },
}

struct PathSearch<'p> {
    anchors: &'p [Candidate<'p>],
    intermediates: &'p [Candidate<'p>],
    /// Issuer names that lead to no anchor from any path.
    dead_ends: HashSet<&'p NormalizedName>,
}

impl<'p> PathSearch<'p> {
    /// Appends issuers to `path` until an anchor is reached. On a dead end
    /// `path` is left as it was.
    fn extend(&mut self, path: &mut Vec<&'p Candidate<'p>>) -> Search {
        let current = path[path.len() - 1];
        if self.dead_ends.contains(&current.issuer) {
            return Search::DeadEnd { blocked: false };
        }

        let on_path = |path: &[&Candidate<'_>], candidate: &Candidate<'_>| {
            path.iter().any(|c| c.cert == candidate.cert)
        };
        let mut blocked = false;

        for anchor in self.anchors.iter().filter(|anchor| current.issued_by(anchor)) {
            if on_path(path, anchor) {
                blocked = true;
                continue;
            }
            path.push(anchor);
            return Search::Found;
        }

        for candidate in self.intermediates {
            if !current.issued_by(candidate) {
                continue;
            }
            if on_path(path, candidate) {
                blocked = true;
                continue;
            }
            path.push(candidate);
            match self.extend(path) {
                Search::Found => return Search::Found,
                Search::DeadEnd { blocked: inner } => blocked |= inner,
            }
            path.pop();
        }

        if !blocked {
            self.dead_ends.insert(&current.issuer);
        }
        Search::DeadEnd { blocked }
    }
}
