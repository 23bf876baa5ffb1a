//! Keystore Provisioner
//!
//! Builds one Java truststore/keystore bundle per Kafka role with `keytool`
//! and signs the role certificate with the bootstrap CA through `openssl`.
//!
//! Each role runs a strictly sequential six-step pipeline:
//!
//! 1. seed the truststore with the CA as `CARoot`
//! 2. generate the role key pair inside the keystore
//! 3. export a CSR for it
//! 4. sign the CSR with the CA key
//! 5. import the CA into the keystore
//! 6. import the signed certificate into the keystore
//!
//! A failing step stops its role immediately. The credential files are only
//! written once all six steps have succeeded.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::configs::{FailurePolicy, KeystoreSettings};
use crate::error::{CodecError, PkiError};
use crate::external_tool::{InvokeError, ToolInvoker};
use crate::key_material::{write_secret_file, KeyMaterial};
use crate::profiles::KEYSTORE_SERIAL_BASE;

/// Environment variable carrying the store password into `keytool`/`openssl`.
pub const STORE_PASSWORD_ENV: &str = "SANDBOX_PKI_STORE_PASS";

const CA_ALIAS: &str = "CARoot";
const KEY_ALIAS: &str = "localhost";
const ROLE_CERT_VALIDITY_DAYS: &str = "30";
const ROLE_DNAME: &str = "CN=localhost, OU=Dev, O=Box, L=Vantaa, ST=Uusimaa, C=FI";
const ROLE_SAN: &str = "SAN=DNS:localhost";

/// Progress of one role through the pipeline. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    Start,
    TruststoreSeeded,
    KeystoreKeyGenerated,
    CsrExported,
    CsrSigned,
    CaChainImported,
    Complete,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineStage::Start => "start",
            PipelineStage::TruststoreSeeded => "truststore seeded",
            PipelineStage::KeystoreKeyGenerated => "keystore key generated",
            PipelineStage::CsrExported => "CSR exported",
            PipelineStage::CsrSigned => "CSR signed",
            PipelineStage::CaChainImported => "CA chain imported",
            PipelineStage::Complete => "complete",
        };
        f.write_str(label)
    }
}

/// Files belonging to one role, all under `<dest>/<role>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePaths {
    pub directory: PathBuf,
    pub truststore: PathBuf,
    pub keystore: PathBuf,
    pub unsigned_certificate: PathBuf,
    pub signed_certificate: PathBuf,
    pub sslkey_creds: PathBuf,
    pub keystore_creds: PathBuf,
    pub truststore_creds: PathBuf,
}

impl RolePaths {
    pub fn new(destination: &Path, role: &str) -> Self {
        let directory = destination.join(role);
        let artifact = |suffix: &str| directory.join(format!("kafka.{}.{}", role, suffix));
        let creds = |kind: &str| directory.join(format!("{}_{}.creds", role, kind));
        Self {
            truststore: artifact("truststore.jks"),
            keystore: artifact("keystore.jks"),
            unsigned_certificate: artifact("unsigned.crt"),
            signed_certificate: artifact("signed.crt"),
            sslkey_creds: creds("sslkey"),
            keystore_creds: creds("keystore"),
            truststore_creds: creds("truststore"),
            directory,
        }
    }

    pub fn credential_files(&self) -> [&Path; 3] {
        [
            &self.sslkey_creds,
            &self.keystore_creds,
            &self.truststore_creds,
        ]
    }
}

/// One external command of the pipeline and the stage it leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    pub reaches: PipelineStage,
    pub program: String,
    pub args: Vec<String>,
}

impl PipelineStep {
    fn new(reaches: PipelineStage, program: &str, args: &[&str]) -> Self {
        Self {
            reaches,
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// Program and arguments joined for log output.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The six commands that take a role from [`PipelineStage::Start`] to
/// [`PipelineStage::Complete`].
///
/// The store password never appears in the arguments; the tools read it from
/// the [`STORE_PASSWORD_ENV`] variable of the child process.
pub fn pipeline_plan(
    settings: &KeystoreSettings,
    paths: &RolePaths,
    ca_certificate: &Path,
    ca_private_key: &Path,
    serial_number: u32,
) -> Vec<PipelineStep> {
    let keytool = settings.keytool.as_str();
    let openssl = settings.openssl.as_str();
    let truststore = paths.truststore.to_string_lossy().into_owned();
    let keystore = paths.keystore.to_string_lossy().into_owned();
    let unsigned = paths.unsigned_certificate.to_string_lossy().into_owned();
    let signed = paths.signed_certificate.to_string_lossy().into_owned();
    let ca_cert = ca_certificate.to_string_lossy().into_owned();
    let ca_key = ca_private_key.to_string_lossy().into_owned();
    let serial = serial_number.to_string();
    let passin = format!("env:{}", STORE_PASSWORD_ENV);
    let (truststore, keystore, unsigned, signed) = (
        truststore.as_str(),
        keystore.as_str(),
        unsigned.as_str(),
        signed.as_str(),
    );
    let (ca_cert, ca_key, serial, passin) =
        (ca_cert.as_str(), ca_key.as_str(), serial.as_str(), passin.as_str());
    let store_auth = [
        "-storepass:env",
        STORE_PASSWORD_ENV,
        "-keypass:env",
        STORE_PASSWORD_ENV,
        "-noprompt",
    ];

    let keytool_step = |reaches: PipelineStage, args: &[&str]| {
        let mut full: Vec<&str> = args.to_vec();
        full.extend_from_slice(&store_auth);
        PipelineStep::new(reaches, keytool, &full)
    };

    vec![
        keytool_step(
            PipelineStage::TruststoreSeeded,
            &["-keystore", truststore, "-alias", CA_ALIAS, "-import", "-file", ca_cert],
        ),
        keytool_step(
            PipelineStage::KeystoreKeyGenerated,
            &[
                "-keystore",
                keystore,
                "-alias",
                KEY_ALIAS,
                "-validity",
                ROLE_CERT_VALIDITY_DAYS,
                "-genkey",
                "-keyalg",
                "RSA",
                "-dname",
                ROLE_DNAME,
                "-ext",
                ROLE_SAN,
            ],
        ),
        keytool_step(
            PipelineStage::CsrExported,
            &["-keystore", keystore, "-alias", KEY_ALIAS, "-certreq", "-file", unsigned],
        ),
        PipelineStep::new(
            PipelineStage::CsrSigned,
            openssl,
            &[
                "x509",
                "-req",
                "-CA",
                ca_cert,
                "-CAkey",
                ca_key,
                "-in",
                unsigned,
                "-out",
                signed,
                "-days",
                ROLE_CERT_VALIDITY_DAYS,
                "-set_serial",
                serial,
                "-passin",
                passin,
            ],
        ),
        keytool_step(
            PipelineStage::CaChainImported,
            &["-keystore", keystore, "-alias", CA_ALIAS, "-import", "-file", ca_cert],
        ),
        keytool_step(
            PipelineStage::Complete,
            &["-keystore", keystore, "-alias", KEY_ALIAS, "-import", "-file", signed],
        ),
    ]
}

/// A fully provisioned role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreBundle {
    pub role: String,
    pub serial_number: u32,
    pub paths: RolePaths,
}

#[derive(Debug)]
pub struct RoleFailure {
    pub role: String,
    pub error: PkiError,
}

/// Outcome of provisioning every requested role.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    /// Completed roles, in request order.
    pub bundles: Vec<KeystoreBundle>,
    /// Failed roles, in request order.
    pub failures: Vec<RoleFailure>,
    /// Roles left incomplete because another role failed under fail-fast.
    pub skipped: Vec<String>,
}

impl ProvisionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    pub fn first_failure(&self) -> Option<&PkiError> {
        self.failures.first().map(|failure| &failure.error)
    }
}

/// Runs the per-role pipelines against the CA persisted as
/// `<dest>/<ca_name>.crt` / `.key`.
pub struct KeystoreProvisioner<'a> {
    destination: &'a Path,
    ca_name: &'a str,
    settings: &'a KeystoreSettings,
    invoker: &'a dyn ToolInvoker,
}

impl<'a> KeystoreProvisioner<'a> {
    pub fn new(
        destination: &'a Path,
        ca_name: &'a str,
        settings: &'a KeystoreSettings,
        invoker: &'a dyn ToolInvoker,
    ) -> Self {
        Self {
            destination,
            ca_name,
            settings,
            invoker,
        }
    }

    /// Provision `roles` in order, honouring the configured failure policy
    /// and parallelism.
    pub fn provision(&self, roles: &[String], password: &SecretString) -> ProvisionReport {
        let abort = AtomicBool::new(false);
        let results: Vec<(String, Option<Result<KeystoreBundle, PkiError>>)> =
            if self.settings.parallel {
                std::thread::scope(|scope| {
                    let handles: Vec<_> = roles
                        .iter()
                        .enumerate()
                        .map(|(index, role)| {
                            let abort = &abort;
                            scope.spawn(move || self.run_guarded(role, index, password, abort))
                        })
                        .collect();
                    roles
                        .iter()
                        .zip(handles)
                        .map(|(role, handle)| {
                            let result = handle
                                .join()
                                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                            (role.clone(), result)
                        })
                        .collect()
                })
            } else {
                roles
                    .iter()
                    .enumerate()
                    .map(|(index, role)| {
                        (role.clone(), self.run_guarded(role, index, password, &abort))
                    })
                    .collect()
            };

        let mut report = ProvisionReport::default();
        for (role, result) in results {
            match result {
                Some(Ok(bundle)) => report.bundles.push(bundle),
                Some(Err(error)) => {
                    warn!(role = %role, error = %error, "keystore provisioning failed");
                    report.failures.push(RoleFailure { role, error });
                }
                None => report.skipped.push(role),
            }
        }
        report
    }

    /// `None` when fail-fast tripped before the role could complete.
    fn run_guarded(
        &self,
        role: &str,
        index: usize,
        password: &SecretString,
        abort: &AtomicBool,
    ) -> Option<Result<KeystoreBundle, PkiError>> {
        match self.provision_role(role, index, password, abort) {
            Ok(bundle) => bundle.map(Ok),
            Err(error) => {
                if self.settings.failure_policy == FailurePolicy::FailFast {
                    abort.store(true, Ordering::SeqCst);
                }
                Some(Err(error))
            }
        }
    }

    /// Run the full pipeline for a single role.
    ///
    /// `index` is the role's position in the request and determines the
    /// serial number of its signed certificate. Returns `Ok(None)` if `abort`
    /// is raised before the role starts or between two of its steps.
    fn provision_role(
        &self,
        role: &str,
        index: usize,
        password: &SecretString,
        abort: &AtomicBool,
    ) -> Result<Option<KeystoreBundle>, PkiError> {
        if abort.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let paths = RolePaths::new(self.destination, role);
        let serial_number = role_serial(index)?;
        let ca_certificate = KeyMaterial::certificate_path(self.destination, self.ca_name);
        let ca_private_key = KeyMaterial::private_key_path(self.destination, self.ca_name);

        fs::create_dir_all(&paths.directory).map_err(PkiError::io(&paths.directory))?;

        let steps = pipeline_plan(
            self.settings,
            &paths,
            &ca_certificate,
            &ca_private_key,
            serial_number,
        );

        let mut stage = PipelineStage::Start;
        for step in &steps {
            if abort.load(Ordering::SeqCst) {
                debug!(role, at = %stage, "role abandoned after another role failed");
                return Ok(None);
            }
            debug!(
                role,
                from = %stage,
                to = %step.reaches,
                command = %step.command_line(),
                "running pipeline step"
            );
            self.run_step(role, step, password)?;
            stage = step.reaches;
        }

        let contents = format!("{}\n", password.expose_secret());
        for path in paths.credential_files() {
            write_secret_file(path, &contents).map_err(codec_to_pki)?;
        }

        info!(
            role,
            serial = serial_number,
            keystore = %paths.keystore.display(),
            "keystore bundle provisioned"
        );
        Ok(Some(KeystoreBundle {
            role: role.to_string(),
            serial_number,
            paths,
        }))
    }

    fn run_step(
        &self,
        role: &str,
        step: &PipelineStep,
        password: &SecretString,
    ) -> Result<(), PkiError> {
        let failed = |status, stdout, stderr| PkiError::ExternalToolFailed {
            role: role.to_string(),
            stage: step.reaches,
            tool: step.program.clone(),
            status,
            stdout,
            stderr,
        };
        let secrets = [(STORE_PASSWORD_ENV, password)];
        match self.invoker.invoke(&step.program, &step.args, &secrets) {
            Ok(output) if output.success => Ok(()),
            Ok(output) => Err(failed(output.status, output.stdout, output.stderr)),
            Err(InvokeError::TimedOut { after, .. }) => Err(PkiError::ExternalToolTimeout {
                role: role.to_string(),
                stage: step.reaches,
                tool: step.program.clone(),
                timeout: after,
            }),
            Err(err) => Err(failed(None, String::new(), err.to_string())),
        }
    }
}

fn role_serial(index: usize) -> Result<u32, PkiError> {
    u32::try_from(index)
        .ok()
        .and_then(|index| KEYSTORE_SERIAL_BASE.checked_add(index))
        .ok_or_else(|| PkiError::Config(format!("too many keystore roles ({})", index)))
}

fn codec_to_pki(err: CodecError) -> PkiError {
    match err {
        CodecError::Io { path, source } => PkiError::Io { path, source },
        other => PkiError::PemCodec(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external_tool::ToolOutput;
    use std::sync::Mutex;
    use std::time::Duration;

    const PASSWORD: &str = "changeit";

    type Call = (String, Vec<String>, Vec<(String, String)>);

    struct RecordingInvoker {
        calls: Mutex<Vec<Call>>,
        fail_when: fn(&str, &[String]) -> Option<Result<ToolOutput, InvokeError>>,
    }

    impl RecordingInvoker {
        fn succeeding() -> Self {
            Self::failing_when(|_, _| None)
        }

        fn failing_when(
            fail_when: fn(&str, &[String]) -> Option<Result<ToolOutput, InvokeError>>,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_when,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ToolInvoker for RecordingInvoker {
        fn invoke(
            &self,
            program: &str,
            args: &[String],
            secrets: &[(&str, &SecretString)],
        ) -> Result<ToolOutput, InvokeError> {
            let env = secrets
                .iter()
                .map(|(name, value)| (name.to_string(), value.expose_secret().to_string()))
                .collect();
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec(), env));
            (self.fail_when)(program, args).unwrap_or_else(|| Ok(ToolOutput::succeeded()))
        }
    }

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn password() -> SecretString {
        SecretString::from(PASSWORD.to_string())
    }

    fn openssl_fails(program: &str, _: &[String]) -> Option<Result<ToolOutput, InvokeError>> {
        (program == "openssl").then(|| Ok(ToolOutput::failed(1, "unable to load CA private key")))
    }

    #[test]
    fn role_paths_follow_kafka_layout() {
        let paths = RolePaths::new(Path::new("/out"), "broker-0");
        assert_eq!(paths.directory, Path::new("/out/broker-0"));
        assert_eq!(
            paths.truststore,
            Path::new("/out/broker-0/kafka.broker-0.truststore.jks")
        );
        assert_eq!(
            paths.signed_certificate,
            Path::new("/out/broker-0/kafka.broker-0.signed.crt")
        );
        assert_eq!(
            paths.keystore_creds,
            Path::new("/out/broker-0/broker-0_keystore.creds")
        );
    }

    #[test]
    fn plan_has_six_forward_steps() {
        let paths = RolePaths::new(Path::new("out"), "broker-0");
        let plan = pipeline_plan(
            &KeystoreSettings::default(),
            &paths,
            Path::new("out/sandbox.crt"),
            Path::new("out/sandbox.key"),
            2024,
        );
        let stages: Vec<PipelineStage> = plan.iter().map(|step| step.reaches).collect();
        assert_eq!(
            stages,
            vec![
                PipelineStage::TruststoreSeeded,
                PipelineStage::KeystoreKeyGenerated,
                PipelineStage::CsrExported,
                PipelineStage::CsrSigned,
                PipelineStage::CaChainImported,
                PipelineStage::Complete,
            ]
        );
        assert!(stages.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(plan[3].program, "openssl");
        assert!(plan[1].args.contains(&ROLE_DNAME.to_string()));
        let serial_at = plan[3].args.iter().position(|a| a == "-set_serial").unwrap();
        assert_eq!(plan[3].args[serial_at + 1], "2024");
    }

    #[test]
    fn password_reaches_tools_through_the_environment_only() {
        let dir = tempfile::tempdir().unwrap();
        let settings = KeystoreSettings::default();
        let invoker = RecordingInvoker::succeeding();
        let provisioner = KeystoreProvisioner::new(dir.path(), "sandbox", &settings, &invoker);

        let report = provisioner.provision(&roles(&["broker-0"]), &password());

        assert!(report.is_success());
        let calls = invoker.calls();
        assert_eq!(calls.len(), 6);
        for (program, args, env) in &calls {
            assert!(
                args.iter().all(|arg| !arg.contains(PASSWORD)),
                "{program} {args:?}"
            );
            assert_eq!(
                env,
                &vec![(STORE_PASSWORD_ENV.to_string(), PASSWORD.to_string())]
            );
        }
        let (_, openssl_args, _) = &calls[3];
        assert!(openssl_args.contains(&format!("env:{}", STORE_PASSWORD_ENV)));
        assert!(calls[0].1.contains(&"-storepass:env".to_string()));
    }

    #[test]
    fn debug_log_shows_each_command_without_password() {
        let dir = tempfile::tempdir().unwrap();
        let log = tempfile::NamedTempFile::new().unwrap();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(Mutex::new(log.reopen().unwrap()))
            .finish();
        let settings = KeystoreSettings::default();
        let invoker = RecordingInvoker::succeeding();
        let provisioner = KeystoreProvisioner::new(dir.path(), "sandbox", &settings, &invoker);

        let report = tracing::subscriber::with_default(subscriber, || {
            provisioner.provision(&roles(&["broker-0"]), &password())
        });

        assert!(report.is_success());
        let output = fs::read_to_string(log.path()).unwrap();
        assert_eq!(output.matches("running pipeline step").count(), 6, "{output}");
        assert!(output.contains("-certreq"), "{output}");
        assert!(!output.contains(PASSWORD), "{output}");
    }

    #[test]
    fn two_roles_produce_two_complete_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let settings = KeystoreSettings::default();
        let invoker = RecordingInvoker::succeeding();
        let provisioner = KeystoreProvisioner::new(dir.path(), "sandbox", &settings, &invoker);

        let report = provisioner.provision(&roles(&["broker-0", "broker-1"]), &password());

        assert!(report.is_success());
        assert_eq!(report.bundles.len(), 2);
        assert_eq!(report.bundles[0].serial_number, 2024);
        assert_eq!(report.bundles[1].serial_number, 2025);
        for bundle in &report.bundles {
            assert!(bundle.paths.directory.is_dir());
            for creds in bundle.paths.credential_files() {
                assert_eq!(fs::read_to_string(creds).unwrap(), "changeit\n");
            }
        }
        assert_eq!(invoker.calls().len(), 12);
    }

    #[test]
    fn signing_failure_halts_before_chain_import() {
        let dir = tempfile::tempdir().unwrap();
        let settings = KeystoreSettings::default();
        let invoker = RecordingInvoker::failing_when(openssl_fails);
        let provisioner = KeystoreProvisioner::new(dir.path(), "sandbox", &settings, &invoker);

        let report = provisioner.provision(&roles(&["broker-0"]), &password());

        assert!(report.bundles.is_empty());
        match report.first_failure() {
            Some(PkiError::ExternalToolFailed {
                role,
                stage,
                tool,
                status,
                stderr,
                ..
            }) => {
                assert_eq!(role, "broker-0");
                assert_eq!(*stage, PipelineStage::CsrSigned);
                assert_eq!(tool, "openssl");
                assert_eq!(*status, Some(1));
                assert!(stderr.contains("CA private key"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(invoker.calls().len(), 4);
        let paths = RolePaths::new(dir.path(), "broker-0");
        for creds in paths.credential_files() {
            assert!(!creds.exists());
        }
    }

    #[test]
    fn isolate_policy_keeps_going_after_a_failure() {
        fn first_role_fails(program: &str, args: &[String]) -> Option<Result<ToolOutput, InvokeError>> {
            let first = args.iter().any(|arg| arg.contains("kafka.broker-0."));
            (program == "openssl" && first).then(|| Ok(ToolOutput::failed(1, "boom")))
        }
        let dir = tempfile::tempdir().unwrap();
        let settings = KeystoreSettings::default();
        let invoker = RecordingInvoker::failing_when(first_role_fails);
        let provisioner = KeystoreProvisioner::new(dir.path(), "sandbox", &settings, &invoker);

        let report = provisioner.provision(&roles(&["broker-0", "broker-1"]), &password());

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].role, "broker-0");
        assert_eq!(report.bundles.len(), 1);
        assert_eq!(report.bundles[0].role, "broker-1");
        assert!(!report.is_success());
    }

    #[test]
    fn fail_fast_skips_remaining_roles() {
        let dir = tempfile::tempdir().unwrap();
        let settings = KeystoreSettings {
            failure_policy: FailurePolicy::FailFast,
            ..KeystoreSettings::default()
        };
        let invoker = RecordingInvoker::failing_when(openssl_fails);
        let provisioner = KeystoreProvisioner::new(dir.path(), "sandbox", &settings, &invoker);

        let report = provisioner.provision(&roles(&["broker-0", "broker-1"]), &password());

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.skipped, vec!["broker-1".to_string()]);
        assert_eq!(invoker.calls().len(), 4);
        assert!(!dir.path().join("broker-1").exists());
    }

    #[test]
    fn timeout_is_reported_with_stage() {
        fn keygen_hangs(_: &str, args: &[String]) -> Option<Result<ToolOutput, InvokeError>> {
            args.iter().any(|arg| arg == "-genkey").then(|| {
                Err(InvokeError::TimedOut {
                    program: "keytool".to_string(),
                    after: Duration::from_secs(120),
                })
            })
        }
        let dir = tempfile::tempdir().unwrap();
        let settings = KeystoreSettings::default();
        let invoker = RecordingInvoker::failing_when(keygen_hangs);
        let provisioner = KeystoreProvisioner::new(dir.path(), "sandbox", &settings, &invoker);

        let report = provisioner.provision(&roles(&["broker-0"]), &password());

        let err = report.first_failure().unwrap();
        assert_eq!(err.exit_code(), 17);
        match err {
            PkiError::ExternalToolTimeout { stage, .. } => {
                assert_eq!(*stage, PipelineStage::KeystoreKeyGenerated);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parallel_roles_report_in_request_order() {
        let dir = tempfile::tempdir().unwrap();
        let settings = KeystoreSettings {
            parallel: true,
            ..KeystoreSettings::default()
        };
        let invoker = RecordingInvoker::succeeding();
        let provisioner = KeystoreProvisioner::new(dir.path(), "sandbox", &settings, &invoker);
        let requested = roles(&["broker-2", "broker-0", "broker-1"]);

        let report = provisioner.provision(&requested, &password());

        let completed: Vec<&str> = report.bundles.iter().map(|b| b.role.as_str()).collect();
        assert_eq!(completed, vec!["broker-2", "broker-0", "broker-1"]);
        assert_eq!(report.bundles[2].serial_number, 2026);
        assert_eq!(invoker.calls().len(), 18);
    }

    #[test]
    fn stage_display() {
        assert_eq!(PipelineStage::CsrSigned.to_string(), "CSR signed");
        assert_eq!(PipelineStage::Complete.to_string(), "complete");
    }
}
