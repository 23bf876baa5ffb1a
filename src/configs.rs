//! Run configuration
//!
//! [`AppConfig`] is the optional TOML file; every section and field has a
//! default so an absent file behaves like an empty one. Command-line flags are
//! layered on top and the result is frozen into a [`BootstrapConfig`], which is
//! built once and handed to the orchestrator by reference.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PkiError;
use crate::profiles::{CLIENT_LEAF_NAME, SERVER_LEAF_NAME};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub ca: CaSubject,
    #[serde(default)]
    pub keystore: KeystoreSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Name and distinguished name of the root CA.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CaSubject {
    #[serde(default = "default_ca_name")]
    pub name: String,
    #[serde(default = "default_ca_cn")]
    pub common_name: String,
    #[serde(default = "default_ca_org")]
    pub organization: String,
    #[serde(default = "default_ca_country")]
    pub country: String,
    #[serde(default)]
    pub province: String,
    #[serde(default = "default_ca_locality")]
    pub locality: String,
    #[serde(default = "default_ca_street")]
    pub street_address: String,
    #[serde(default = "default_ca_postal_code")]
    pub postal_code: String,
}

impl Default for CaSubject {
    fn default() -> Self {
        Self {
            name: default_ca_name(),
            common_name: default_ca_cn(),
            organization: default_ca_org(),
            country: default_ca_country(),
            province: String::new(),
            locality: default_ca_locality(),
            street_address: default_ca_street(),
            postal_code: default_ca_postal_code(),
        }
    }
}

fn default_ca_name() -> String {
    "sandbox".to_string()
}

fn default_ca_cn() -> String {
    "soltedev.pro".to_string()
}

fn default_ca_org() -> String {
    "Solte Dev.".to_string()
}

fn default_ca_country() -> String {
    "FI".to_string()
}

fn default_ca_locality() -> String {
    "Helsinki".to_string()
}

fn default_ca_street() -> String {
    "Alesy Katty".to_string()
}

fn default_ca_postal_code() -> String {
    "13220".to_string()
}

/// What happens to the remaining roles when one role's pipeline fails.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep provisioning the other roles; completed bundles are kept.
    #[default]
    Isolate,
    /// Stop at the first failing role.
    FailFast,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KeystoreSettings {
    #[serde(default = "default_keytool")]
    pub keytool: String,
    #[serde(default = "default_openssl")]
    pub openssl: String,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for KeystoreSettings {
    fn default() -> Self {
        Self {
            keytool: default_keytool(),
            openssl: default_openssl(),
            tool_timeout_secs: default_tool_timeout_secs(),
            parallel: false,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl KeystoreSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

fn default_keytool() -> String {
    "keytool".to_string()
}

fn default_openssl() -> String {
    "openssl".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(config_str)?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// Immutable parameters of one bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub destination: PathBuf,
    pub ca: CaSubject,
    /// Keystore roles in request order; empty disables keystore provisioning.
    pub roles: Vec<String>,
    /// Purge the destination's contents before the emptiness check.
    pub cleanup: bool,
    pub keystore: KeystoreSettings,
}

impl BootstrapConfig {
    /// Validate and normalise the requested roles, then freeze the run
    /// parameters.
    ///
    /// Role names are trimmed and empty entries dropped. Duplicates and names
    /// that are not a single plain path component are rejected, because every
    /// role owns exactly one subdirectory of the destination.
    pub fn new(
        destination: PathBuf,
        ca: CaSubject,
        roles: Vec<String>,
        cleanup: bool,
        keystore: KeystoreSettings,
    ) -> Result<Self, PkiError> {
        let roles = normalize_roles(roles)?;
        if ca.name.trim().is_empty() || !is_plain_component(&ca.name) {
            return Err(PkiError::Config(format!(
                "CA name `{}` must be a plain file name",
                ca.name
            )));
        }
        if ca.name == CLIENT_LEAF_NAME || ca.name == SERVER_LEAF_NAME {
            return Err(PkiError::Config(format!(
                "CA name `{}` is reserved for a leaf certificate",
                ca.name
            )));
        }
        let issued = issued_file_names(&ca.name);
        if let Some(role) = roles.iter().find(|role| issued.contains(*role)) {
            return Err(PkiError::Config(format!(
                "role `{}` collides with an issued certificate file",
                role
            )));
        }
        if keystore.tool_timeout_secs == 0 {
            return Err(PkiError::Config(
                "keystore.tool_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            destination,
            ca,
            roles,
            cleanup,
            keystore,
        })
    }

    pub fn provisions_keystores(&self) -> bool {
        !self.roles.is_empty()
    }
}

/// Files written directly into the destination, which role directories must
/// not shadow.
fn issued_file_names(ca_name: &str) -> Vec<String> {
    [ca_name, CLIENT_LEAF_NAME, SERVER_LEAF_NAME]
        .iter()
        .flat_map(|stem| [format!("{stem}.crt"), format!("{stem}.key")])
        .collect()
}

fn normalize_roles(raw: Vec<String>) -> Result<Vec<String>, PkiError> {
    let mut seen = BTreeSet::new();
    let mut roles = Vec::with_capacity(raw.len());
    for role in raw {
        let role = role.trim();
        if role.is_empty() {
            continue;
        }
        if !is_plain_component(role) {
            return Err(PkiError::Config(format!(
                "role `{}` must be a plain directory name",
                role
            )));
        }
        if !seen.insert(role.to_string()) {
            return Err(PkiError::Config(format!("role `{}` requested twice", role)));
        }
        roles.push(role.to_string());
    }
    Ok(roles)
}

fn is_plain_component(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\'])
}
