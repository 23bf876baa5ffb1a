//! Sandbox PKI - one-shot certificate bootstrap for development clusters
//!
//! Creates a throwaway Public Key Infrastructure in a single directory: a
//! self-signed root CA, a `client` and a `server` certificate signed by it,
//! and optionally a Java truststore/keystore bundle per Kafka broker whose
//! certificates chain to the same CA.
//!
//! # Overview
//!
//! ```text
//! Root CA (self-signed, CA=true, 6 months)
//!   ├── client  (clientAuth, 6 months)
//!   ├── server  (serverAuth, 10 years)
//!   └── kafka.<role>.keystore.jks  (signed through openssl, 30 days)
//! ```
//!
//! # Output Layout
//!
//! ```text
//! <dest>/sandbox.crt, sandbox.key
//! <dest>/client.crt,  client.key
//! <dest>/server.crt,  server.key
//! <dest>/<role>/kafka.<role>.{truststore,keystore}.jks
//! <dest>/<role>/kafka.<role>.{unsigned,signed}.crt
//! <dest>/<role>/<role>_{sslkey,keystore,truststore}.creds
//! ```
//!
//! # As a Library
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! use sandbox_pki::bootstrap::{Bootstrap, TerminalPassword};
//! use sandbox_pki::configs::{BootstrapConfig, CaSubject, KeystoreSettings};
//! use sandbox_pki::external_tool::SystemToolInvoker;
//!
//! fn main() -> Result<(), sandbox_pki::PkiError> {
//!     let config = BootstrapConfig::new(
//!         PathBuf::from("pki"),
//!         CaSubject::default(),
//!         vec!["broker-0".to_string(), "broker-1".to_string()],
//!         false,
//!         KeystoreSettings::default(),
//!     )?;
//!     let invoker = SystemToolInvoker::new(Duration::from_secs(120));
//!     let outcome = Bootstrap::new(&config).run(&TerminalPassword, &invoker)?;
//!     println!("CA written to {}", outcome.ca_certificate.display());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`key_material`]: PEM codec and atomic file writes
//! - [`generate_root_ca`]: self-signed root CA
//! - [`generate_leaf`] / [`profiles`]: CA-signed leaf certificates
//! - [`keystore`]: `keytool`/`openssl` pipeline per Kafka role
//! - [`bootstrap`]: orchestration of a whole run
//!
//! # Security
//!
//! - RSA 4096-bit keys, SHA-256 signatures
//! - Private key and credential files are created with mode `0600` on Unix
//! - The keystore password never appears in log output

pub mod bootstrap;
pub mod configs;
pub mod error;
pub mod external_tool;
pub mod generate_leaf;
pub mod generate_root_ca;
pub mod key_material;
pub mod keystore;
pub mod logging;
pub mod profiles;
mod x509_template;

pub use error::{CodecError, PkiError};
