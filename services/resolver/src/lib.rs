//! Release image resolver.
//!
//! Resolves the release payload, component images and OS image for a
//! requested product version and CPU architecture.
//!
//! ## Modules
//!
//! - `exec`: external process execution and private temporary files
//! - `release`: `oc`/`skopeo` command construction, component image cache,
//!   architecture detection and retried extraction
//! - `versions`: the `Handler` lookups over a database or cluster-backed corpus
//! - `config`: environment configuration

pub mod config;
pub mod exec;
pub mod release;
pub mod versions;

pub use config::Config;
pub use versions::{new_handler, Backend, Handler, HandlerOptions};
