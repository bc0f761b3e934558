//! Release and OS image catalog.
//!
//! Pure selection logic shared by every resolver backend. Nothing here
//! touches the network, the filesystem or external tools.
//!
//! ## Modules
//!
//! - `arch`: CPU architecture vocabulary and alias folding
//! - `version`: lenient version parsing and ordering
//! - `model`: `ReleaseImage` / `OsImage` records and corpus loading
//! - `matcher`: release image selection by version and architecture
//! - `osimages`: OS image lookup
//!
//! # Invariants
//!
//! - A loaded corpus is either fully valid or rejected as a whole
//! - Selection is deterministic for a given corpus, regardless of order
//! - Ignored versions are never selected

pub mod arch;
pub mod error;
pub mod matcher;
pub mod model;
pub mod osimages;
pub mod version;

pub use error::CatalogError;
pub use matcher::{validate_release_image_for_rhcos, VersionMatcher};
pub use model::{prepare_release_images, OsImage, ReleaseImage, SupportLevel};
pub use osimages::OsImageCatalog;
pub use version::{Version, VersionFormat};
