//! Everything the commands do, minus argument parsing and printing.
//!
//! ## Map
//! - `metadata.rs`: snapshot-cached metadata loader + policy index.
//! - `derive.rs`: placeholder detection and name/standard/owner/tag derivation.
//! - `catalog.rs`: coverage docs, policies index/CSV, plugin index, metadata export.
//! - `test_coverage.rs`: Rego deny/test heuristics, priorities, threshold gate, pairs.
//! - `validate.rs`: JSON Schema validation of metadata, maps and plugin index.
//! - `compliance.rs`: duplicate policy detection/fix in compliance maps.
//! - `backfill.rs`: owner/tags/jurisdiction backfill.
//! - `links.rs`: link analysis, baseline drift, audit, lychee classification.
//! - `testgen.rs`: deny-rule test scaffolding.
//! - `release.rs`: bundle/dist manifests, verification, provenance.
//! - `hygiene.rs`: secret and invisible-Unicode scans.
//! - `settings.rs`: `rulehub.toml` and environment toggles.
//! - `storage.rs`: file writes, hashing, timestamps, git probes.
//! - `output.rs`: JSON/text output helpers.
//!
//! Services return reports; only `output.rs` prints and only handlers exit.
//! Writes go through `storage.rs` so parent directories and sorted JSON stay
//! consistent.

pub mod backfill;
pub mod catalog;
pub mod compliance;
pub mod derive;
pub mod hygiene;
pub mod links;
pub mod metadata;
pub mod output;
pub mod release;
pub mod settings;
pub mod storage;
pub mod test_coverage;
pub mod testgen;
pub mod validate;
