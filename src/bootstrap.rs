//! PKI Bootstrap Orchestrator
//!
//! Sequences one run: prepare the destination, issue the root CA, issue the
//! `client` and `server` leaves with it, then provision the requested Kafka
//! keystores. Issuance failures end the run; keystore failures are collected
//! per role in the [`ProvisionReport`].

use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::configs::BootstrapConfig;
use crate::error::PkiError;
use crate::external_tool::ToolInvoker;
use crate::generate_leaf::issue_leaf;
use crate::generate_root_ca::issue_root_ca;
use crate::key_material::KeyMaterial;
use crate::keystore::{KeystoreProvisioner, ProvisionReport};
use crate::profiles::{LeafProfile, CLIENT_LEAF_NAME, SERVER_LEAF_NAME};

/// `keytool` refuses store passwords shorter than this.
pub const MIN_PASSWORD_LEN: usize = 6;

const PASSWORD_PROMPT: &str = "Keystore password: ";

/// Where the keystore password comes from.
pub trait PasswordSource {
    fn read_password(&self) -> Result<SecretString, PkiError>;
}

/// Reads the password from the controlling terminal without echo.
#[derive(Debug, Default)]
pub struct TerminalPassword;

impl PasswordSource for TerminalPassword {
    fn read_password(&self) -> Result<SecretString, PkiError> {
        let password = rpassword::prompt_password(PASSWORD_PROMPT)
            .map_err(|e| PkiError::InteractiveInputFailed(e.to_string()))?;
        validate_password(SecretString::from(password))
    }
}

/// A password known up front, e.g. from a test harness.
pub struct FixedPassword(SecretString);

impl FixedPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(SecretString::from(password.into()))
    }
}

impl PasswordSource for FixedPassword {
    fn read_password(&self) -> Result<SecretString, PkiError> {
        validate_password(SecretString::from(self.0.expose_secret().to_owned()))
    }
}

pub fn validate_password(password: SecretString) -> Result<SecretString, PkiError> {
    let length = password.expose_secret().chars().count();
    if length < MIN_PASSWORD_LEN {
        return Err(PkiError::InteractiveInputFailed(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(password)
}

/// Remove everything inside `destination`, keeping the directory itself.
///
/// A missing destination is left alone. The working directory and its
/// ancestors are never purged.
pub fn purge_destination(destination: &Path) -> Result<(), PkiError> {
    if !destination.exists() {
        return Ok(());
    }
    let working_dir = std::env::current_dir().map_err(PkiError::io(destination))?;
    refuse_purging_working_dir(destination, &working_dir)?;
    let entries = fs::read_dir(destination).map_err(PkiError::io(destination))?;
    for entry in entries {
        let entry = entry.map_err(PkiError::io(destination))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(PkiError::io(&path))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path).map_err(PkiError::io(&path))?;
        } else {
            fs::remove_file(&path).map_err(PkiError::io(&path))?;
        }
    }
    Ok(())
}

fn refuse_purging_working_dir(destination: &Path, working_dir: &Path) -> Result<(), PkiError> {
    let resolved = destination
        .canonicalize()
        .map_err(PkiError::io(destination))?;
    let working_dir = working_dir
        .canonicalize()
        .map_err(PkiError::io(working_dir))?;
    if working_dir.starts_with(&resolved) {
        return Err(PkiError::PreconditionFailed {
            path: destination.to_path_buf(),
            reason: "refusing to purge the working directory or one of its parents; \
                     pass an explicit --dest"
                .to_string(),
        });
    }
    Ok(())
}

/// Create `destination` if needed and require it to be an empty directory.
pub fn prepare_destination(destination: &Path) -> Result<(), PkiError> {
    let precondition = |reason: String| PkiError::PreconditionFailed {
        path: destination.to_path_buf(),
        reason,
    };

    if destination.exists() && !destination.is_dir() {
        return Err(precondition("not a directory".to_string()));
    }
    fs::create_dir_all(destination)
        .map_err(|e| precondition(format!("cannot create directory: {}", e)))?;

    let mut entries = fs::read_dir(destination)
        .map_err(|e| precondition(format!("cannot list directory: {}", e)))?;
    if entries.next().is_some() {
        return Err(precondition(
            "directory is not empty (use --cleanup to purge it)".to_string(),
        ));
    }
    Ok(())
}

/// Paths and keystore results of a finished run.
#[derive(Debug)]
pub struct BootstrapOutcome {
    pub ca_certificate: PathBuf,
    pub client_certificate: PathBuf,
    pub server_certificate: PathBuf,
    pub keystores: ProvisionReport,
}

impl BootstrapOutcome {
    /// 0 when every requested role was provisioned, otherwise the exit code
    /// of the first failed role.
    pub fn exit_code(&self) -> i32 {
        self.keystores
            .first_failure()
            .map(PkiError::exit_code)
            .unwrap_or(0)
    }
}

pub struct Bootstrap<'a> {
    config: &'a BootstrapConfig,
}

impl<'a> Bootstrap<'a> {
    pub fn new(config: &'a BootstrapConfig) -> Self {
        Self { config }
    }

    /// Execute the run.
    ///
    /// Nothing is written before the destination check passes, and the
    /// password (only asked for when keystores were requested) is read before
    /// the first key is generated.
    pub fn run(
        &self,
        passwords: &dyn PasswordSource,
        invoker: &dyn ToolInvoker,
    ) -> Result<BootstrapOutcome, PkiError> {
        let config = self.config;
        let destination = config.destination.as_path();

        if config.cleanup {
            purge_destination(destination)?;
            info!(dest = %destination.display(), "destination purged");
        }
        prepare_destination(destination)?;

        let password = if config.provisions_keystores() {
            Some(passwords.read_password()?)
        } else {
            None
        };

        let ca = issue_root_ca(destination, &config.ca)?;
        issue_leaf(destination, &ca, CLIENT_LEAF_NAME, &LeafProfile::client())?;
        issue_leaf(destination, &ca, SERVER_LEAF_NAME, &LeafProfile::server())?;

        let keystores = match password {
            Some(password) => {
                info!(roles = ?config.roles, parallel = config.keystore.parallel, "provisioning keystores");
                KeystoreProvisioner::new(destination, &config.ca.name, &config.keystore, invoker)
                    .provision(&config.roles, &password)
            }
            None => ProvisionReport::default(),
        };

        info!(
            dest = %destination.display(),
            keystores = keystores.bundles.len(),
            failed = keystores.failures.len(),
            "bootstrap finished"
        );
        Ok(BootstrapOutcome {
            ca_certificate: KeyMaterial::certificate_path(destination, &config.ca.name),
            client_certificate: KeyMaterial::certificate_path(destination, CLIENT_LEAF_NAME),
            server_certificate: KeyMaterial::certificate_path(destination, SERVER_LEAF_NAME),
            keystores,
        })
    }
}
