//! Integration tests for release inspection through a scripted command runner.
//!
//! These tests verify the command protocol, the component image cache, the
//! architecture fallback chain and retried extraction without `oc` or
//! `skopeo` installed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use rstest::rstest;
use tempfile::TempDir;

use imageset_resolver::exec::{CommandOutput, CommandRunner, ExecError};
use imageset_resolver::release::{
    OcRelease, ReleaseConfig, ReleaseError, ReleaseInspector, RetryPolicy,
    OPENSHIFT_BAREMETAL_INSTALL, OPENSHIFT_INSTALL,
};

const PULL_SECRET: &str = r#"{"auths":{"quay.io":{"auth":"dGVzdDp0ZXN0"}}}"#;

/// One recorded command.
#[derive(Debug, Clone)]
struct Invocation {
    program: String,
    args: Vec<String>,
    secret_path: Option<PathBuf>,
    secret: Option<String>,
}

type Responder = Box<dyn Fn(&Invocation, usize) -> CommandOutput + Send + Sync>;

/// Runner that answers from a script and records every call.
struct ScriptedRunner {
    calls: Mutex<Vec<Invocation>>,
    count: AtomicUsize,
    delay: Duration,
    respond: Responder,
}

impl ScriptedRunner {
    fn new(respond: impl Fn(&Invocation, usize) -> CommandOutput + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
            delay: Duration::ZERO,
            respond: Box::new(respond),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_to(&self, program: &str) -> usize {
        self.calls().iter().filter(|c| c.program == program).count()
    }
}

fn secret_path(args: &[String]) -> Option<PathBuf> {
    if let Some(path) = args
        .iter()
        .find_map(|a| a.strip_prefix("--registry-config="))
    {
        return Some(PathBuf::from(path));
    }
    args.iter()
        .position(|a| a == "--authfile")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        _timeout: Option<Duration>,
    ) -> Result<CommandOutput, ExecError> {
        let secret_path = secret_path(args);
        let invocation = Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            secret: secret_path
                .as_ref()
                .and_then(|p| std::fs::read_to_string(p).ok()),
            secret_path,
        };
        let index = self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(invocation.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok((self.respond)(&invocation, index))
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}

fn fail(exit_code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code,
    }
}

fn test_config(temp_dir: &TempDir) -> ReleaseConfig {
    ReleaseConfig {
        cache_dir: temp_dir.path().join("cache"),
        retry: RetryPolicy {
            max_tries: 5,
            delay: Duration::ZERO,
        },
        ..ReleaseConfig::default()
    }
}

fn release_with(runner: &Arc<ScriptedRunner>, config: ReleaseConfig) -> OcRelease {
    OcRelease::new(Arc::clone(runner) as Arc<dyn CommandRunner>, config)
}

#[tokio::test]
async fn test_component_image_lookups_are_coalesced() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new(|_, _| ok("quay.io/openshift/must-gather@sha256:abc\n"))
            .with_delay(Duration::from_millis(20)),
    );
    let release = release_with(&runner, test_config(&temp_dir));

    let lookups = (0..16).map(|_| {
        release.must_gather_image("quay.io/ocp-release:4.14.2-x86_64", None, PULL_SECRET)
    });
    let results = join_all(lookups).await;

    assert_eq!(results.len(), 16);
    for result in results {
        assert_eq!(result.unwrap(), "quay.io/openshift/must-gather@sha256:abc");
    }
    assert_eq!(runner.calls().len(), 1);
    assert!(runner.calls()[0]
        .args
        .contains(&"--image-for=must-gather".to_string()));

    // Another component of the same release is its own key.
    release
        .mco_image("quay.io/ocp-release:4.14.2-x86_64", None, PULL_SECRET)
        .await
        .unwrap();
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn test_failed_component_lookup_is_retried_by_next_caller() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, index| {
        if index == 0 {
            fail(1, "error: unauthorized")
        } else {
            ok("quay.io/mco@sha256:def")
        }
    }));
    let release = release_with(&runner, test_config(&temp_dir));

    let err = release
        .mco_image("quay.io/ocp-release:4.15.0", None, PULL_SECRET)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), Some(1));

    let image = release
        .mco_image("quay.io/ocp-release:4.15.0", None, PULL_SECRET)
        .await
        .unwrap();
    assert_eq!(image, "quay.io/mco@sha256:def");
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn test_major_minor_version_of_multi_payload() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, _| ok("'4.14.2-multi'\n")));
    let release = release_with(&runner, test_config(&temp_dir));

    let minor = release
        .major_minor_version("quay.io/ocp-release:4.14.2-multi", None, PULL_SECRET)
        .await
        .unwrap();
    assert_eq!(minor, "4.14");

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, "oc");
    assert!(calls[0].args.contains(&"quay.io/ocp-release:4.14.2-multi".to_string()));
}

#[tokio::test]
async fn test_pull_secret_file_lives_for_one_command() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, _| ok("'4.14.2'\n")));
    let release = release_with(&runner, test_config(&temp_dir));

    let version = release
        .openshift_version("quay.io/ocp-release:4.14.2-x86_64", None, PULL_SECRET)
        .await
        .unwrap();
    assert_eq!(version, "4.14.2");

    let call = &runner.calls()[0];
    assert_eq!(call.program, "oc");
    assert_eq!(call.secret.as_deref(), Some(PULL_SECRET));
    assert!(call.args.contains(&"{{.metadata.version}}".to_string()));
    assert!(call.args.contains(&"--insecure=false".to_string()));
    assert!(call.args.last().unwrap().starts_with("--registry-config="));

    let secret_path = call.secret_path.clone().unwrap();
    assert!(!secret_path.exists());
}

#[tokio::test]
async fn test_pull_secret_file_removed_after_failure() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, _| fail(2, "error: not found")));
    let release = release_with(&runner, test_config(&temp_dir));

    let err = release
        .openshift_version("quay.io/ocp-release:4.99.0", None, PULL_SECRET)
        .await
        .unwrap_err();
    match err {
        ReleaseError::CommandFailed {
            command,
            exit_code,
            stderr,
            ..
        } => {
            assert!(command.starts_with("oc adm release info"));
            assert_eq!(exit_code, 2);
            assert_eq!(stderr, "error: not found");
        }
        other => panic!("unexpected error: {other}"),
    }

    let secret_path = runner.calls()[0].secret_path.clone().unwrap();
    assert!(!secret_path.exists());
}

#[tokio::test]
async fn test_mirror_is_queried_insecurely() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, _| ok("mirror.local/must-gather@sha256:1")));
    let release = release_with(&runner, test_config(&temp_dir));

    release
        .must_gather_image(
            "quay.io/ocp-release:4.14.2-x86_64",
            Some("mirror.local/ocp-release:4.14.2"),
            PULL_SECRET,
        )
        .await
        .unwrap();

    let args = &runner.calls()[0].args;
    assert!(args.contains(&"--insecure=true".to_string()));
    assert!(args.contains(&"mirror.local/ocp-release:4.14.2".to_string()));
    assert!(!args.contains(&"quay.io/ocp-release:4.14.2-x86_64".to_string()));
}

#[tokio::test]
async fn test_missing_release_image_and_mirror() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, _| ok("")));
    let release = release_with(&runner, test_config(&temp_dir));

    let err = release
        .must_gather_image("", None, PULL_SECRET)
        .await
        .unwrap_err();
    assert!(matches!(err, ReleaseError::MissingReleaseImage));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_architecture_from_image_info_skips_fallback() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|call, _| match call.program.as_str() {
        "oc" => ok(r#"{"config": {"architecture": "amd64", "os": "linux"}}"#),
        _ => fail(1, "unexpected"),
    }));
    let release = release_with(&runner, test_config(&temp_dir));

    let architectures = release
        .release_architectures("quay.io/ocp-release:4.14.2-x86_64", PULL_SECRET)
        .await
        .unwrap();

    assert_eq!(architectures, vec!["x86_64"]);
    assert_eq!(runner.calls_to("oc"), 1);
    assert_eq!(runner.calls_to("skopeo"), 0);
}

#[tokio::test]
async fn test_architectures_fall_back_to_manifest_list() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|call, _| match call.program.as_str() {
        "oc" => fail(1, "error: the image is a manifest list"),
        _ => ok(r#"{
            "manifests": [
                {"platform": {"architecture": "amd64", "os": "linux"}},
                {"platform": {"architecture": "arm64", "os": "linux"}},
                {"platform": {"architecture": "", "os": "linux"}}
            ]
        }"#),
    }));
    let release = release_with(&runner, test_config(&temp_dir));

    let architectures = release
        .release_architectures("quay.io/ocp-release:4.15.0-multi", PULL_SECRET)
        .await
        .unwrap();

    assert_eq!(architectures, vec!["x86_64", "arm64"]);
    assert_eq!(runner.calls_to("oc"), 1);
    assert_eq!(runner.calls_to("skopeo"), 1);

    let skopeo = runner
        .calls()
        .into_iter()
        .find(|c| c.program == "skopeo")
        .unwrap();
    assert!(skopeo
        .args
        .contains(&"docker://quay.io/ocp-release:4.15.0-multi".to_string()));
    assert_eq!(skopeo.secret.as_deref(), Some(PULL_SECRET));
}

#[tokio::test]
async fn test_architectures_fail_when_both_lookups_fail() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|call, _| match call.program.as_str() {
        "oc" => fail(1, "error: manifest unknown"),
        _ => ok("not json"),
    }));
    let release = release_with(&runner, test_config(&temp_dir));

    let err = release
        .release_architectures("quay.io/ocp-release:bogus", PULL_SECRET)
        .await
        .unwrap_err();
    assert!(matches!(err, ReleaseError::ImageInfo { .. }));
    assert!(err.to_string().starts_with("failed to get image info"));
}

#[tokio::test]
async fn test_manifest_list_without_architectures() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|call, _| match call.program.as_str() {
        "oc" => fail(1, "error: manifest list"),
        _ => ok(r#"{"manifests": [{"platform": {"architecture": ""}}]}"#),
    }));
    let release = release_with(&runner, test_config(&temp_dir));

    let err = release
        .release_architectures("quay.io/ocp-release:empty", PULL_SECRET)
        .await
        .unwrap_err();
    assert!(matches!(err, ReleaseError::NoManifestArchitecture { .. }));
}

#[tokio::test]
async fn test_extraction_recovers_from_transient_failures() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, index| {
        if index < 2 {
            fail(1, "error: unexpected EOF")
        } else {
            ok("")
        }
    }));
    let config = test_config(&temp_dir);
    let cache_dir = config.cache_dir.clone();
    let release = release_with(&runner, config);

    let release_image = "quay.io/ocp-release:4.15.0-x86_64";
    let path = release
        .extract(release_image, None, PULL_SECRET, "4.15.0")
        .await
        .unwrap();

    assert_eq!(
        path,
        cache_dir.join(release_image).join(OPENSHIFT_BAREMETAL_INSTALL)
    );
    assert!(cache_dir.join(release_image).is_dir());

    let calls = runner.calls();
    assert_eq!(calls.len(), 3);
    // Every attempt runs the same command.
    assert!(calls.iter().all(|c| c.args[..6] == calls[0].args[..6]));
    assert!(calls[0]
        .args
        .contains(&format!("--command={OPENSHIFT_BAREMETAL_INSTALL}")));
}

#[tokio::test]
async fn test_extraction_gives_up_after_max_tries() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, _| fail(1, "error: unexpected EOF")));
    let release = release_with(&runner, test_config(&temp_dir));

    let err = release
        .extract("quay.io/ocp-release:4.16.1-x86_64", None, PULL_SECRET, "4.16.1")
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), Some(1));
    assert_eq!(runner.calls().len(), 5);
    assert!(runner.calls()[0]
        .args
        .contains(&format!("--command={OPENSHIFT_INSTALL}")));
}

#[tokio::test]
async fn test_extraction_from_mirror_uses_icsp_file() {
    let temp_dir = TempDir::new().unwrap();
    let icsp = temp_dir.path().join("icsp.yaml");
    let runner = Arc::new(ScriptedRunner::new(|_, _| ok("")));
    let config = ReleaseConfig {
        icsp_file: Some(icsp.clone()),
        ..test_config(&temp_dir)
    };
    let release = release_with(&runner, config);

    release
        .extract(
            "quay.io/ocp-release:4.15.0-x86_64",
            Some("mirror.local/ocp-release:4.15.0"),
            PULL_SECRET,
            "4.15.0",
        )
        .await
        .unwrap();
    release
        .extract("quay.io/ocp-release:4.15.0-x86_64", None, PULL_SECRET, "4.15.0")
        .await
        .unwrap();

    let calls = runner.calls();
    let icsp_arg = format!("--icsp-file={}", icsp.display());
    assert!(calls[0].args.contains(&icsp_arg));
    assert!(calls[0].args.contains(&"--insecure=true".to_string()));
    assert!(!calls[1].args.contains(&icsp_arg));
    assert!(calls[1].args.contains(&"--insecure=false".to_string()));
}

#[tokio::test]
async fn test_database_index_extraction() {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, index| {
        if index == 0 {
            fail(1, "error: timeout")
        } else {
            ok("")
        }
    }));
    let config = test_config(&temp_dir);
    let cache_dir = config.cache_dir.clone();
    let release = release_with(&runner, config);

    let index_image = "registry.redhat.io/redhat/redhat-operator-index:v4.14";
    let path = release
        .extract_database_index(index_image, PULL_SECRET)
        .await
        .unwrap();

    assert_eq!(path, cache_dir.join(index_image).join("index.db"));
    assert_eq!(runner.calls().len(), 2);
    assert!(runner.calls()[0].args.contains(&"--confirm".to_string()));
}

#[rstest]
#[case("4.15.0", false, OPENSHIFT_BAREMETAL_INSTALL)]
#[case("4.15.0", true, OPENSHIFT_BAREMETAL_INSTALL)]
#[case("4.16.0", false, OPENSHIFT_INSTALL)]
#[case("4.16.0", true, OPENSHIFT_BAREMETAL_INSTALL)]
#[case("4.17.2", false, OPENSHIFT_INSTALL)]
#[case("4.17.2", true, OPENSHIFT_BAREMETAL_INSTALL)]
fn test_release_binary_path(#[case] version: &str, #[case] fips: bool, #[case] binary: &str) {
    let temp_dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new(|_, _| ok("")));
    let config = ReleaseConfig {
        fips,
        ..test_config(&temp_dir)
    };
    let cache_dir = config.cache_dir.clone();
    let release = release_with(&runner, config);

    let target = release
        .release_binary_path("quay.io/ocp-release:x", version)
        .unwrap();
    assert_eq!(target.binary, binary);
    assert_eq!(target.workdir, cache_dir.join("quay.io/ocp-release:x"));
    assert_eq!(target.path, target.workdir.join(binary));
    assert!(runner.calls().is_empty());
}
