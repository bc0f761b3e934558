//! Argument vectors for `oc` and `skopeo`.
//!
//! Commands are built as argv, never as a shell string, so image references
//! and paths are passed through verbatim. Flag names and order follow the
//! tools' CLI.

use std::fmt;
use std::path::Path;

/// How a tool is told where the registry credentials live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlag {
    /// `--registry-config=<path>` (oc)
    RegistryConfig,
    /// `--authfile <path>` (skopeo)
    AuthFile,
}

impl AuthFlag {
    fn args(self, path: &Path) -> Vec<String> {
        match self {
            Self::RegistryConfig => vec![format!("--registry-config={}", path.display())],
            Self::AuthFile => vec!["--authfile".to_string(), path.display().to_string()],
        }
    }
}

/// One invocation of an external image tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: &'static str,
    args: Vec<String>,
    auth: AuthFlag,
}

impl ToolCommand {
    fn oc(args: Vec<String>) -> Self {
        Self {
            program: "oc",
            args,
            auth: AuthFlag::RegistryConfig,
        }
    }

    /// `oc adm release info --image-for=<name> --insecure=<bool> <image>`
    pub fn image_for(name: &str, insecure: bool, release_image: &str) -> Self {
        Self::oc(vec![
            "adm".into(),
            "release".into(),
            "info".into(),
            format!("--image-for={name}"),
            format!("--insecure={insecure}"),
            release_image.into(),
        ])
    }

    /// `oc adm release info -o template --template {{.metadata.version}} --insecure=<bool> <image>`
    pub fn release_version(insecure: bool, release_image: &str) -> Self {
        Self::oc(vec![
            "adm".into(),
            "release".into(),
            "info".into(),
            "-o".into(),
            "template".into(),
            "--template".into(),
            "{{.metadata.version}}".into(),
            format!("--insecure={insecure}"),
            release_image.into(),
        ])
    }

    /// `oc adm release extract --command=<name> --to=<dir> --insecure=<bool> [--icsp-file=<file>] <image>`
    pub fn release_extract(
        binary: &str,
        to: &Path,
        insecure: bool,
        icsp_file: Option<&Path>,
        release_image: &str,
    ) -> Self {
        let mut args = vec![
            "adm".into(),
            "release".into(),
            "extract".into(),
            format!("--command={binary}"),
            format!("--to={}", to.display()),
            format!("--insecure={insecure}"),
        ];
        if let Some(icsp) = icsp_file {
            args.push(format!("--icsp-file={}", icsp.display()));
        }
        args.push(release_image.into());
        Self::oc(args)
    }

    /// `oc image info --output json <image>`
    pub fn image_info(image: &str) -> Self {
        Self::oc(vec![
            "image".into(),
            "info".into(),
            "--output".into(),
            "json".into(),
            image.into(),
        ])
    }

    /// `oc image extract --path /database/index.db:<dir> --confirm <image>`
    pub fn database_index_extract(to: &Path, index_image: &str) -> Self {
        Self::oc(vec![
            "image".into(),
            "extract".into(),
            "--path".into(),
            format!("/database/index.db:{}", to.display()),
            "--confirm".into(),
            index_image.into(),
        ])
    }

    /// `skopeo inspect --raw --no-tags docker://<image>`
    pub fn manifest_list(image: &str) -> Self {
        Self {
            program: "skopeo",
            args: vec![
                "inspect".into(),
                "--raw".into(),
                "--no-tags".into(),
                format!("docker://{image}"),
            ],
            auth: AuthFlag::AuthFile,
        }
    }

    pub fn program(&self) -> &'static str {
        self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Arguments with the credentials flag for `pull_secret` appended.
    pub fn args_with_auth(&self, pull_secret: &Path) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(self.auth.args(pull_secret));
        args
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
