//! Serial number assignment.
//!
//! Issuing never picks a serial number by itself; callers hand one in,
//! usually drawn from a [`SerialNumberSource`]. Uniqueness across a CA is
//! the source's job.

use std::sync::atomic::{AtomicU64, Ordering};

use rand_core::{OsRng, RngCore};
use x509_cert::serial_number::SerialNumber;

use crate::error::CertKitError;

/// Number of random bytes in a serial from [`RandomSerialNumbers`].
pub const RANDOM_SERIAL_LEN: usize = 16;

/// Supplies serial numbers for newly issued certificates.
pub trait SerialNumberSource {
    fn next_serial_number(&self) -> Result<SerialNumber, CertKitError>;
}

/// Draws 128-bit positive serial numbers from the OS random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSerialNumbers;

impl SerialNumberSource for RandomSerialNumbers {
    fn next_serial_number(&self) -> Result<SerialNumber, CertKitError> {
        let mut bytes = [0u8; RANDOM_SERIAL_LEN];
        OsRng.fill_bytes(&mut bytes);
        // Clear the sign bit and keep the leading byte non-zero so the
        // INTEGER stays positive and minimally encoded.
        bytes[0] = (bytes[0] & 0x7f) | 0x01;
        Ok(SerialNumber::new(&bytes)?)
    }
}

/// Hands out increasing serial numbers starting from a given value.
///
/// Safe to share between threads; each call returns a distinct value.
#[derive(Debug)]
pub struct SequentialSerialNumbers {
    next: AtomicU64,
}

impl SequentialSerialNumbers {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl SerialNumberSource for SequentialSerialNumbers {
    fn next_serial_number(&self) -> Result<SerialNumber, CertKitError> {
        let value = self.next.fetch_add(1, Ordering::Relaxed);
        if value == u64::MAX {
            return Err(CertKitError::InvalidInput(
                "sequential serial numbers exhausted".to_string(),
            ));
        }
        serial_number_from_u64(value)
    }
}

/// Encodes `value` as a positive serial number. Zero is rejected (RFC 5280
/// section 4.1.2.2).
pub fn serial_number_from_u64(value: u64) -> Result<SerialNumber, CertKitError> {
    if value == 0 {
        return Err(CertKitError::InvalidInput(
            "serial number must be positive".to_string(),
        ));
    }
    let be = value.to_be_bytes();
    let first = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
    let mut bytes = be[first..].to_vec();
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    Ok(SerialNumber::new(&bytes)?)
}
