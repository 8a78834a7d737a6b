//! Data shared by every command: records read from the content store, the
//! artifacts written under `dist/` and `docs/`, and the report structs behind
//! `--json`.
//!
//! - `models.rs`: metadata and map records, generated artifacts, reports.
//! - `constants.rs`: default layout paths, env variable names, vendor domains.
//!
//! Nothing here touches the filesystem or network.
//!
//! Field names and order of the artifact structs are the on-disk format of
//! `dist/`; keep them in step with `docs/contracts/*`.

pub mod constants;
pub mod models;
