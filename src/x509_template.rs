//! Building blocks shared by the CA and leaf certificate builders.

use chrono::{DateTime, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509Name};

use crate::error::PkiError;
use crate::profiles::ValidityPeriod;

pub(crate) const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
pub(crate) const RSA_KEY_SIZE_DEFAULT: u32 = 4096;

/// Generate an RSA key pair of `bits` bits.
pub(crate) fn generate_rsa_key(bits: u32) -> Result<PKey<Private>, PkiError> {
    let rsa = Rsa::generate(bits).map_err(PkiError::KeyGenerationFailed)?;
    PKey::from_rsa(rsa).map_err(PkiError::KeyGenerationFailed)
}

/// Build an X.509 name from `(nid, value)` pairs, skipping empty values.
pub(crate) fn build_name(entries: &[(Nid, &str)]) -> Result<X509Name, PkiError> {
    let mut name_builder = X509Name::builder().map_err(PkiError::construction("name builder"))?;
    for (nid, value) in entries {
        if value.is_empty() {
            continue;
        }
        name_builder
            .append_entry_by_nid(*nid, value)
            .map_err(PkiError::construction("subject entry"))?;
    }
    Ok(name_builder.build())
}

/// Set version, serial number and validity window on `builder`.
pub(crate) fn apply_header(
    builder: &mut X509Builder,
    serial_number: u32,
    validity: ValidityPeriod,
    issued_at: DateTime<Utc>,
) -> Result<DateTime<Utc>, PkiError> {
    builder
        .set_version(X509_VERSION_3)
        .map_err(PkiError::construction("version"))?;

    let serial = BigNum::from_u32(serial_number)
        .and_then(|bn| bn.to_asn1_integer())
        .map_err(PkiError::construction("serial number"))?;
    builder
        .set_serial_number(&serial)
        .map_err(PkiError::construction("serial number"))?;

    let not_after = validity.not_after(issued_at).ok_or_else(|| {
        PkiError::Config(format!("validity of {} overflows the calendar", validity))
    })?;

    let not_before = Asn1Time::from_unix(issued_at.timestamp())
        .map_err(PkiError::construction("not_before"))?;
    builder
        .set_not_before(&not_before)
        .map_err(PkiError::construction("not_before"))?;

    let not_after_asn1 = Asn1Time::from_unix(not_after.timestamp())
        .map_err(PkiError::construction("not_after"))?;
    builder
        .set_not_after(&not_after_asn1)
        .map_err(PkiError::construction("not_after"))?;

    Ok(not_after)
}
