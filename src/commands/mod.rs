//! One handler per command family. Each returns `Ok(false)` for commands it
//! does not own so `main` can chain them.
//!
//! - `catalog.rs`: catalog / export-metadata.
//! - `quality.rs`: test coverage, thresholds, validators, map dupes, backfill, testgen.
//! - `links.rs`: link analysis, baseline drift, no-coverage, audit, lychee grading.
//! - `release.rs`: manifests, verification, provenance, repository scans.
//!
//! Domain exit codes are raised here, after the report is printed.

pub mod catalog;
pub mod links;
pub mod quality;
pub mod release;

pub use catalog::handle_catalog_commands;
pub use links::handle_links_commands;
pub use quality::{handle_quality_commands, handle_validate_commands};
pub use release::{handle_release_commands, handle_scan_commands};
