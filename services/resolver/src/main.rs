//! imageset-resolver
//!
//! Resolves release images, component images and OS images for a version
//! and CPU architecture, printing the result as JSON.
//!
//! ## Backends
//!
//! - **Database** (default): the configured corpus is seeded into
//!   `DATABASE_URL` and queried per lookup
//! - **Cluster** (`ENABLE_KUBE_API=true`): the configured corpus is extended
//!   from the cluster image sets in `CLUSTER_IMAGE_SETS_FILE`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use imageset_resolver::config::Config;
use imageset_resolver::exec::SystemCommandRunner;
use imageset_resolver::release::{OcRelease, ReleaseInspector};
use imageset_resolver::versions::{
    new_handler, Backend, ClusterImageSetFile, Handler, ReleaseImageStore,
};

/// Release image resolver.
#[derive(Debug, Parser)]
#[command(name = "imageset-resolver")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File holding the registry pull secret.
    #[arg(long, global = true, env = "PULL_SECRET_FILE")]
    pull_secret_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(flatten)]
    Lookup(LookupCommand),

    /// Detect the architectures of a release image.
    Architectures {
        #[arg(long)]
        release_image: String,
    },

    /// Show, and optionally extract, the installer binary of a release.
    BinaryPath {
        #[arg(long)]
        release_image: String,

        /// Release version, used to pick the installer binary.
        #[arg(long)]
        openshift_version: String,

        /// Extract the binary into the cache.
        #[arg(long)]
        extract: bool,
    },

    /// Extract the database index of an operator index image.
    ExtractIndex {
        #[arg(long)]
        index_image: String,
    },
}

/// Subcommands answered by a release image handler.
#[derive(Debug, Subcommand)]
enum LookupCommand {
    /// Resolve the release image for a version and architecture.
    ReleaseImage {
        /// `x.y` or `x.y.z[-pre]`.
        #[arg(long)]
        openshift_version: String,

        /// CPU architecture. Defaults to x86_64.
        #[arg(long, default_value = "")]
        arch: String,
    },

    /// Look up a release image by pull reference.
    ReleaseByUrl {
        #[arg(long)]
        url: String,
    },

    /// Resolve the OS image for a version and architecture.
    OsImage {
        /// Release version. Empty selects the latest OS image.
        #[arg(long, default_value = "")]
        openshift_version: String,

        #[arg(long, default_value = "")]
        arch: String,
    },

    /// Resolve the must-gather images for a version and architecture.
    MustGather {
        #[arg(long)]
        openshift_version: String,

        #[arg(long, default_value = "")]
        arch: String,
    },

    /// Check that a release image exists for an RHCOS version.
    ValidateRhcos {
        #[arg(long)]
        rhcos_version: String,

        #[arg(long, default_value = "")]
        arch: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!(
        release_images = config.release_images.len(),
        os_images = config.os_images.len(),
        enable_kube_api = config.enable_kube_api,
        "Configuration loaded"
    );

    let pull_secret = load_pull_secret(cli.pull_secret_file.as_deref()).await?;
    let release = Arc::new(OcRelease::new(
        Arc::new(SystemCommandRunner),
        config.release.clone(),
    ));

    match cli.command {
        Commands::Architectures { release_image } => {
            let architectures = release
                .release_architectures(&release_image, &pull_secret)
                .await?;
            print_json(&architectures)
        }
        Commands::BinaryPath {
            release_image,
            openshift_version,
            extract,
        } => {
            let mirror = config.release_image_mirror.as_deref();
            let path = if extract {
                release
                    .extract(&release_image, mirror, &pull_secret, &openshift_version)
                    .await?
            } else {
                release.release_binary_path(&release_image, &openshift_version)?.path
            };
            print_json(&json!({ "path": path }))
        }
        Commands::ExtractIndex { index_image } => {
            let path = release
                .extract_database_index(&index_image, &pull_secret)
                .await?;
            print_json(&json!({ "path": path }))
        }
        Commands::Lookup(command) => {
            let handler = build_handler(&config, release).await?;
            run_lookup(handler.as_ref(), command, &pull_secret).await
        }
    }
}

async fn build_handler(config: &Config, release: Arc<OcRelease>) -> Result<Arc<dyn Handler>> {
    let backend = if config.enable_kube_api {
        Backend::Kube {
            lister: Arc::new(ClusterImageSetFile::new(&config.cluster_image_sets_file)),
            concurrency: config.cluster_image_set_concurrency,
        }
    } else {
        Backend::Database(ReleaseImageStore::connect(&config.db).await?)
    };

    let handler = new_handler(config.handler_options(), release, backend)
        .await
        .context("failed to build release image handler")?;
    Ok(handler)
}

async fn run_lookup(
    handler: &dyn Handler,
    command: LookupCommand,
    pull_secret: &str,
) -> Result<()> {
    match command {
        LookupCommand::ReleaseImage {
            openshift_version,
            arch,
        } => print_json(
            &handler
                .get_release_image(&openshift_version, &arch, pull_secret)
                .await?,
        ),
        LookupCommand::ReleaseByUrl { url } => {
            print_json(&handler.get_release_image_by_url(&url, pull_secret).await?)
        }
        LookupCommand::OsImage {
            openshift_version,
            arch,
        } => print_json(&handler.os_image(&openshift_version, &arch)?),
        LookupCommand::MustGather {
            openshift_version,
            arch,
        } => print_json(
            &handler
                .get_must_gather_images(&openshift_version, &arch, pull_secret)
                .await?,
        ),
        LookupCommand::ValidateRhcos {
            rhcos_version,
            arch,
        } => {
            handler
                .validate_release_image_for_rhcos(&rhcos_version, &arch)
                .await?;
            print_json(&json!({ "valid": true }))
        }
    }
}

/// Pull secret from `path`, or from `PULL_SECRET` when no file is given.
async fn load_pull_secret(path: Option<&std::path::Path>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read pull secret from {}", path.display())),
        None => Ok(std::env::var("PULL_SECRET").unwrap_or_default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
