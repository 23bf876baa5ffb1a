//! End-to-end runs of the orchestrator against scratch directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sandbox_pki::bootstrap::{Bootstrap, FixedPassword, PasswordSource};
use sandbox_pki::configs::{BootstrapConfig, CaSubject, KeystoreSettings};
use sandbox_pki::external_tool::{InvokeError, ToolInvoker, ToolOutput};
use sandbox_pki::key_material::KeyMaterial;
use sandbox_pki::PkiError;
use secrecy::SecretString;
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;

/// Succeeds at everything and remembers what it was asked to run.
#[derive(Default)]
struct RecordingInvoker {
    calls: Mutex<Vec<String>>,
}

impl ToolInvoker for RecordingInvoker {
    fn invoke(
        &self,
        program: &str,
        _args: &[String],
        _secrets: &[(&str, &SecretString)],
    ) -> Result<ToolOutput, InvokeError> {
        self.calls.lock().unwrap().push(program.to_string());
        Ok(ToolOutput::succeeded())
    }
}

/// Fails the test if the password is ever requested.
struct NoPassword;

impl PasswordSource for NoPassword {
    fn read_password(&self) -> Result<SecretString, PkiError> {
        panic!("password must not be requested");
    }
}

fn config(dest: PathBuf, roles: &[&str], cleanup: bool) -> BootstrapConfig {
    BootstrapConfig::new(
        dest,
        CaSubject::default(),
        roles.iter().map(|r| r.to_string()).collect(),
        cleanup,
        KeystoreSettings::default(),
    )
    .unwrap()
}

struct Usage {
    client_auth: bool,
    server_auth: bool,
    is_ca: bool,
    dns: Vec<String>,
}

fn inspect(path: &Path) -> Usage {
    let data = fs::read(path).unwrap();
    let (_, pem) = parse_x509_pem(&data).unwrap();
    let cert = pem.parse_x509().unwrap();
    let eku = cert.extended_key_usage().unwrap().unwrap().value;
    let dns = cert
        .subject_alternative_name()
        .unwrap()
        .map(|san| {
            san.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    Usage {
        client_auth: eku.client_auth,
        server_auth: eku.server_auth,
        is_ca: cert.is_ca(),
        dns,
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn fresh_destination_gets_ca_and_both_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pki");
    let config = config(dest.clone(), &[], false);
    let invoker = RecordingInvoker::default();

    let outcome = Bootstrap::new(&config).run(&NoPassword, &invoker).unwrap();

    assert_eq!(
        file_names(&dest),
        vec![
            "client.crt",
            "client.key",
            "sandbox.crt",
            "sandbox.key",
            "server.crt",
            "server.key"
        ]
    );
    assert_eq!(outcome.exit_code(), 0);
    assert!(invoker.calls.lock().unwrap().is_empty());

    let ca = KeyMaterial::load(&dest, "sandbox").unwrap();
    let ca_key = ca.certificate.public_key().unwrap();
    for leaf in ["client", "server"] {
        let leaf = KeyMaterial::load(&dest, leaf).unwrap();
        assert!(leaf.certificate.verify(&ca_key).unwrap());
    }

    let ca_usage = inspect(&outcome.ca_certificate);
    assert!(ca_usage.is_ca);
    assert!(ca_usage.client_auth && ca_usage.server_auth);

    let client = inspect(&outcome.client_certificate);
    assert!(client.client_auth && !client.server_auth && !client.is_ca);
    assert_eq!(client.dns, vec!["client.localhost", "localhost"]);

    let server = inspect(&outcome.server_certificate);
    assert!(server.server_auth && !server.client_auth && !server.is_ca);
    assert_eq!(server.dns, vec!["server.localhost", "localhost"]);
}

#[test]
fn non_empty_destination_fails_every_time_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
    let config = config(dir.path().to_path_buf(), &["broker-0"], false);
    let invoker = RecordingInvoker::default();

    for _ in 0..2 {
        let err = Bootstrap::new(&config)
            .run(&NoPassword, &invoker)
            .unwrap_err();
        assert!(matches!(err, PkiError::PreconditionFailed { .. }), "{err:?}");
        assert_eq!(err.exit_code(), 11);
    }
    assert_eq!(file_names(dir.path()), vec!["notes.txt"]);
    assert!(invoker.calls.lock().unwrap().is_empty());
}

#[test]
fn cleanup_purges_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("sandbox.crt"), "stale").unwrap();
    fs::create_dir(dir.path().join("broker-9")).unwrap();
    let config = config(dir.path().to_path_buf(), &[], true);

    Bootstrap::new(&config)
        .run(&NoPassword, &RecordingInvoker::default())
        .unwrap();

    assert!(!dir.path().join("broker-9").exists());
    KeyMaterial::load(dir.path(), "sandbox").unwrap();
}

#[test]
fn short_password_stops_before_issuance() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().to_path_buf(), &["broker-0"], false);

    let err = Bootstrap::new(&config)
        .run(&FixedPassword::new("abc"), &RecordingInvoker::default())
        .unwrap_err();

    assert_eq!(err.exit_code(), 18);
    assert!(file_names(dir.path()).is_empty());
}

#[test]
fn keystore_roles_get_their_own_directories() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path().to_path_buf(), &["broker-0", "broker-1"], false);
    let invoker = RecordingInvoker::default();

    let outcome = Bootstrap::new(&config)
        .run(&FixedPassword::new("sandbox-pass"), &invoker)
        .unwrap();

    assert_eq!(outcome.keystores.bundles.len(), 2);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(invoker.calls.lock().unwrap().len(), 12);
    for role in ["broker-0", "broker-1"] {
        let role_dir = dir.path().join(role);
        for kind in ["sslkey", "keystore", "truststore"] {
            let creds = role_dir.join(format!("{role}_{kind}.creds"));
            assert_eq!(fs::read_to_string(creds).unwrap(), "sandbox-pass\n");
        }
    }
}
