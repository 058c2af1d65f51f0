//! Build recipe verification and compose manifest generation for dockyard.
//!
//! # Files produced under the source root
//!
//! ```text
//! <source root>/
//!   <service context>/Dockerfile   ── written only when missing (recipe::verify_or_synthesize)
//!   docker-compose.yml             ── rebuilt from scratch on every emit (compose::ComposeManifest)
//! ```
//!
//! # Recipe policy
//!
//! A service without a `Dockerfile` gets a placeholder rendered by
//! [`RecipeGenerator`] under the default `synthesize` policy. The placeholder
//! builds, but its base image and start command are guesses. Under the
//! `require` policy a missing recipe is an error instead.
//!
//! # Manifest ordering
//!
//! Services are keyed by name in a sorted map and every other collection
//! keeps its configured order, so identical inputs serialize to identical
//! bytes.

pub mod compose;
pub mod recipe;

pub use compose::{ComposeError, ComposeManifest, ComposeService};
pub use recipe::{RECIPE_FILE_NAME, RecipeError, RecipeGenerator, RecipeStatus};
