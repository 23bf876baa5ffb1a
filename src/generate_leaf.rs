//! Leaf Certificate Generation Module
//!
//! Issues end-entity certificates signed by the root CA. The CA's private key
//! is the only signer in the system; a leaf can never sign anything itself.
//!
//! # Certificate Properties
//! - **Basic Constraints**: CA=false, critical
//! - **Key Usage**: digitalSignature
//! - **Extended Key Usage**: from the [`LeafProfile`]
//! - **Subject Alternative Name**: DNS then IP entries, in profile order
//! - **Authority Key Identifier**: points at the CA key
//! - **Key Size**: RSA 4096-bit

use std::path::Path;

use chrono::{DateTime, Utc};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage as EkuExtension, KeyUsage,
    SubjectAlternativeName,
};
use openssl::x509::X509;
use tracing::{info, warn};

use crate::error::PkiError;
use crate::key_material::KeyMaterial;
use crate::profiles::{ExtendedKeyUsage, LeafProfile};
use crate::x509_template::{apply_header, build_name, generate_rsa_key, RSA_KEY_SIZE_DEFAULT};

// ================= RSA Leaf Certificate Builder =================

/// Builder for an RSA key pair and a leaf certificate signed by a CA
///
/// # Examples
/// ```rust,no_run
/// # use sandbox_pki::generate_leaf::RsaLeafBuilder;
/// # use sandbox_pki::key_material::KeyMaterial;
/// # use sandbox_pki::profiles::LeafProfile;
/// # fn example(ca: &KeyMaterial) -> Result<(), sandbox_pki::PkiError> {
/// let client = RsaLeafBuilder::new(ca, LeafProfile::client()).build()?;
/// # Ok(())
/// # }
/// ```
pub struct RsaLeafBuilder<'a> {
    ca: &'a KeyMaterial,
    profile: LeafProfile,
    key_bits: u32,
    issued_at: Option<DateTime<Utc>>,
}

impl<'a> RsaLeafBuilder<'a> {
    /// Create a builder that signs `profile` with `ca`
    ///
    /// # Arguments
    /// * `ca` - CA certificate (issuer name) and private key (signer)
    /// * `profile` - identity, SANs, usage, validity and serial of the leaf
    pub fn new(ca: &'a KeyMaterial, profile: LeafProfile) -> Self {
        Self {
            ca,
            profile,
            key_bits: RSA_KEY_SIZE_DEFAULT,
            issued_at: None,
        }
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

    /// Build the leaf key pair and CA-signed certificate
    ///
    /// # Errors
    /// - [`PkiError::KeyGenerationFailed`] if the RSA key cannot be generated
    /// - [`PkiError::CertificateConstructionFailed`] if a field, extension or
    ///   the CA signature cannot be produced
    pub fn build(self) -> Result<KeyMaterial, PkiError> {
        let profile = &self.profile;
        let private_key = generate_rsa_key(self.key_bits)?;

        let mut builder = X509::builder().map_err(PkiError::construction("X509 builder"))?;
        let not_after = apply_header(
            &mut builder,
            profile.serial_number,
            profile.validity,
            self.issued_at.unwrap_or_else(Utc::now),
        )?;
        warn_if_outliving_ca(self.ca, profile, not_after);

        let subject_name = build_name(&[
            (Nid::ORGANIZATIONNAME, profile.organization.as_str()),
            (Nid::COMMONNAME, profile.common_name.as_str()),
        ])?;
        builder
            .set_subject_name(&subject_name)
            .map_err(PkiError::construction("subject"))?;

        // Issuer is the CA's subject
        builder
            .set_issuer_name(self.ca.certificate.subject_name())
            .map_err(PkiError::construction("issuer"))?;
        builder
            .set_pubkey(&private_key)
            .map_err(PkiError::construction("public key"))?;

        // CA=false: end-entity certificate
        let bc = BasicConstraints::new()
            .critical()
            .build()
            .map_err(PkiError::construction("BasicConstraints"))?;
        builder
            .append_extension(bc)
            .map_err(PkiError::construction("BasicConstraints"))?;

        let ku = KeyUsage::new()
            .critical()
            .digital_signature()
            .build()
            .map_err(PkiError::construction("KeyUsage"))?;
        builder
            .append_extension(ku)
            .map_err(PkiError::construction("KeyUsage"))?;

        if !profile.extended_key_usage.is_empty() {
            let mut eku = EkuExtension::new();
            for usage in &profile.extended_key_usage {
                match usage {
                    ExtendedKeyUsage::ClientAuth => eku.client_auth(),
                    ExtendedKeyUsage::ServerAuth => eku.server_auth(),
                };
            }
            let eku = eku
                .build()
                .map_err(PkiError::construction("ExtendedKeyUsage"))?;
            builder
                .append_extension(eku)
                .map_err(PkiError::construction("ExtendedKeyUsage"))?;
        }

        if !profile.dns_sans.is_empty() || !profile.ip_sans.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for dns in &profile.dns_sans {
                san.dns(dns);
            }
            for ip in &profile.ip_sans {
                san.ip(&ip.to_string());
            }
            let san = san
                .build(&builder.x509v3_context(Some(&self.ca.certificate), None))
                .map_err(PkiError::construction("SubjectAlternativeName"))?;
            builder
                .append_extension(san)
                .map_err(PkiError::construction("SubjectAlternativeName"))?;
        }

        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .build(&builder.x509v3_context(Some(&self.ca.certificate), None))
            .map_err(PkiError::construction("AuthorityKeyIdentifier"))?;
        builder
            .append_extension(aki)
            .map_err(PkiError::construction("AuthorityKeyIdentifier"))?;

        // Sign with the CA's private key
        builder
            .sign(&self.ca.private_key, MessageDigest::sha256())
            .map_err(PkiError::construction("signature"))?;

        Ok(KeyMaterial::new(builder.build(), private_key))
    }
}

fn warn_if_outliving_ca(ca: &KeyMaterial, profile: &LeafProfile, leaf_not_after: DateTime<Utc>) {
    let Ok(leaf_end) = openssl::asn1::Asn1Time::from_unix(leaf_not_after.timestamp()) else {
        return;
    };
    let Ok(diff) = ca.certificate.not_after().diff(&leaf_end) else {
        return;
    };
    if diff.days > 0 || (diff.days == 0 && diff.secs > 0) {
        warn!(
            leaf = %profile.common_name,
            serial = profile.serial_number,
            leaf_validity = %profile.validity,
            ca_not_after = %ca.certificate.not_after(),
            "leaf certificate outlives its issuing CA"
        );
    }
}

/// Issue a leaf signed by the in-memory `ca` and persist it as
/// `<dest>/<leaf_name>.crt` / `<dest>/<leaf_name>.key`.
///
/// Key generation and signing failures are reported as
/// [`PkiError::IssuanceFailed`] naming the leaf.
pub fn issue_leaf(
    destination_dir: &Path,
    ca: &KeyMaterial,
    leaf_name: &str,
    profile: &LeafProfile,
) -> Result<KeyMaterial, PkiError> {
    let leaf = RsaLeafBuilder::new(ca, profile.clone())
        .build()
        .map_err(|source| PkiError::IssuanceFailed {
            leaf: leaf_name.to_string(),
            source: Box::new(source),
        })?;
    let (certificate_path, _) = leaf.save(destination_dir, leaf_name)?;
    info!(
        leaf = leaf_name,
        path = %certificate_path.display(),
        validity = %profile.validity,
        "leaf certificate issued"
    );
    Ok(leaf)
}

/// Like [`issue_leaf`], but reads the CA back from `<dest>/<ca_name>.crt` and
/// `<dest>/<ca_name>.key` first.
///
/// Missing or unparsable CA files are [`PkiError::CaUnavailable`].
pub fn issue_leaf_from_disk(
    destination_dir: &Path,
    ca_name: &str,
    leaf_name: &str,
    profile: &LeafProfile,
) -> Result<KeyMaterial, PkiError> {
    let ca = KeyMaterial::load(destination_dir, ca_name).map_err(|source| {
        PkiError::CaUnavailable {
            ca_name: ca_name.to_string(),
            dir: destination_dir.to_path_buf(),
            source,
        }
    })?;
    issue_leaf(destination_dir, &ca, leaf_name, profile)
}
