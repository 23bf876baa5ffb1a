//! Root CA Certificate Generation Module
//!
//! Generates the self-signed certificate authority every other credential of
//! a bootstrap run chains to.
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are the same
//! - **Basic Constraints**: CA=true, critical, no path length
//! - **Key Usage**: digitalSignature, keyCertSign
//! - **Extended Key Usage**: clientAuth, serverAuth (the same CA signs both leaf kinds)
//! - **Key Size**: RSA 4096-bit
//! - **Validity**: 6 months from issuance
//! - **Serial Number**: fixed, only one CA exists per run
//!
//! # Example
//! ```rust,no_run
//! # use sandbox_pki::configs::CaSubject;
//! # use sandbox_pki::generate_root_ca::issue_root_ca;
//! # fn example() -> Result<(), sandbox_pki::PkiError> {
//! let ca = issue_root_ca(std::path::Path::new("out"), &CaSubject::default())?;
//! // out/sandbox.crt and out/sandbox.key now exist
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::X509;
use tracing::info;

use crate::configs::CaSubject;
use crate::error::PkiError;
use crate::key_material::KeyMaterial;
use crate::profiles::{ValidityPeriod, CA_SERIAL_NUMBER};
use crate::x509_template::{apply_header, build_name, generate_rsa_key, RSA_KEY_SIZE_DEFAULT};

pub const CA_VALIDITY: ValidityPeriod = ValidityPeriod::Months(6);

// ================= RSA Root CA Builder =================

/// Builder for the RSA key pair and self-signed root CA certificate
///
/// Distinguished name fields left empty are omitted from the subject.
pub struct RsaRootCABuilder {
    subject_common_name: String,
    organization: String,
    country: String,
    province: String,
    locality: String,
    street_address: String,
    postal_code: String,
    validity: ValidityPeriod,
    serial_number: u32,
    key_bits: u32,
    issued_at: Option<DateTime<Utc>>,
}

impl Default for RsaRootCABuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RsaRootCABuilder {
    /// Create a builder with an empty subject and the standard CA parameters
    pub fn new() -> Self {
        Self {
            subject_common_name: String::new(),
            organization: String::new(),
            country: String::new(),
            province: String::new(),
            locality: String::new(),
            street_address: String::new(),
            postal_code: String::new(),
            validity: CA_VALIDITY,
            serial_number: CA_SERIAL_NUMBER,
            key_bits: RSA_KEY_SIZE_DEFAULT,
            issued_at: None,
        }
    }

    /// Builder pre-filled with the subject from configuration
    pub fn from_subject(subject: &CaSubject) -> Self {
        Self::new()
            .subject_common_name(subject.common_name.clone())
            .organization(subject.organization.clone())
            .country(subject.country.clone())
            .province(subject.province.clone())
            .locality(subject.locality.clone())
            .street_address(subject.street_address.clone())
            .postal_code(subject.postal_code.clone())
    }

    /// Set the common name (CN) for the certificate
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set the organization (O) for the certificate
    pub fn organization(mut self, org: String) -> Self {
        self.organization = org;
        self
    }

    /// Set the country (C) for the certificate (2-letter ISO code)
    pub fn country(mut self, country: String) -> Self {
        self.country = country;
        self
    }

    /// Set the state/province (ST) for the certificate
    pub fn province(mut self, province: String) -> Self {
        self.province = province;
        self
    }

    /// Set the locality (L) for the certificate
    pub fn locality(mut self, locality: String) -> Self {
        self.locality = locality;
        self
    }

    pub fn street_address(mut self, street: String) -> Self {
        self.street_address = street;
        self
    }

    pub fn postal_code(mut self, postal_code: String) -> Self {
        self.postal_code = postal_code;
        self
    }

    /// Set the validity period (default: 6 months)
    pub fn validity(mut self, validity: ValidityPeriod) -> Self {
        self.validity = validity;
        self
    }

    /// RSA modulus size. Anything other than 4096 is meant for tests.
    pub fn key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    /// Pin the start of the validity window instead of using the current time.
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }

    /// Build the RSA key pair and self-signed root CA certificate
    ///
    /// # Errors
    /// - [`PkiError::KeyGenerationFailed`] if the RSA key cannot be generated
    /// - [`PkiError::CertificateConstructionFailed`] if any certificate field,
    ///   extension or the signature cannot be produced
    pub fn build(self) -> Result<KeyMaterial, PkiError> {
        let private_key = generate_rsa_key(self.key_bits)?;

        let mut builder = X509::builder().map_err(PkiError::construction("X509 builder"))?;
        apply_header(
            &mut builder,
            self.serial_number,
            self.validity,
            self.issued_at.unwrap_or_else(Utc::now),
        )?;

        let name = build_name(&[
            (Nid::COUNTRYNAME, self.country.as_str()),
            (Nid::STATEORPROVINCENAME, self.province.as_str()),
            (Nid::LOCALITYNAME, self.locality.as_str()),
            (Nid::STREETADDRESS, self.street_address.as_str()),
            (Nid::POSTALCODE, self.postal_code.as_str()),
            (Nid::ORGANIZATIONNAME, self.organization.as_str()),
            (Nid::COMMONNAME, self.subject_common_name.as_str()),
        ])?;

        builder
            .set_subject_name(&name)
            .map_err(PkiError::construction("subject"))?;
        builder
            .set_issuer_name(&name)
            .map_err(PkiError::construction("issuer"))?;
        builder
            .set_pubkey(&private_key)
            .map_err(PkiError::construction("public key"))?;

        let bc = BasicConstraints::new()
            .critical()
            .ca()
            .build()
            .map_err(PkiError::construction("BasicConstraints"))?;
        builder
            .append_extension(bc)
            .map_err(PkiError::construction("BasicConstraints"))?;

        let ku = KeyUsage::new()
            .critical()
            .digital_signature()
            .key_cert_sign()
            .build()
            .map_err(PkiError::construction("KeyUsage"))?;
        builder
            .append_extension(ku)
            .map_err(PkiError::construction("KeyUsage"))?;

        let eku = ExtendedKeyUsage::new()
            .client_auth()
            .server_auth()
            .build()
            .map_err(PkiError::construction("ExtendedKeyUsage"))?;
        builder
            .append_extension(eku)
            .map_err(PkiError::construction("ExtendedKeyUsage"))?;

        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .map_err(PkiError::construction("SubjectKeyIdentifier"))?;
        builder
            .append_extension(ski)
            .map_err(PkiError::construction("SubjectKeyIdentifier"))?;

        builder
            .sign(&private_key, MessageDigest::sha256())
            .map_err(PkiError::construction("signature"))?;

        Ok(KeyMaterial::new(builder.build(), private_key))
    }
}

/// Generate the root CA and persist it as `<dest>/<name>.crt` / `<dest>/<name>.key`.
///
/// The returned material is handed straight to the leaf issuer, so callers
/// never need to read the CA back from disk.
pub fn issue_root_ca(destination_dir: &Path, subject: &CaSubject) -> Result<KeyMaterial, PkiError> {
    let ca = RsaRootCABuilder::from_subject(subject).build()?;
    let (certificate_path, _) = ca.save(destination_dir, &subject.name)?;
    info!(
        ca = %subject.name,
        path = %certificate_path.display(),
        validity = %CA_VALIDITY,
        "root CA issued"
    );
    Ok(ca)
}
