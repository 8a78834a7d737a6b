//! Metadata loading.
//!
//! `load_all_metadata` keeps a process-local snapshot cache keyed by the
//! resolved root: a call is a hit iff the sorted `(path, mtime, size)` list of
//! every `metadata.yaml` below the root equals the one seen last time.

use crate::domain::constants::{ENV_METADATA_CACHE, METADATA_FILE};
use crate::domain::models::{MetadataDoc, PolicyMeta};
use crate::store::{
    field, field_nonempty, normalize_paths, read_yaml_mapping, rel_path, scalar_string,
    yaml_to_json, Layout,
};
use serde::Serialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::UNIX_EPOCH;
use tracing::debug;

type Snapshot = Vec<(PathBuf, u128, u64)>;

struct CacheEntry {
    snapshot: Snapshot,
    docs: Vec<MetadataDoc>,
}

#[derive(Default)]
struct MetadataCache {
    entries: HashMap<PathBuf, CacheEntry>,
    hits: u64,
    misses: u64,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

fn cache() -> &'static Mutex<MetadataCache> {
    static CACHE: OnceLock<Mutex<MetadataCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(MetadataCache::default()))
}

fn resolved(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}

fn build_snapshot(root: &Path) -> Snapshot {
    let mut snap: Snapshot = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == METADATA_FILE)
        .filter_map(|e| {
            let md = e.metadata().ok()?;
            let mtime = md
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            Some((resolved(e.path()), mtime, md.len()))
        })
        .collect();
    snap.sort();
    snap
}

fn parse_snapshot(snapshot: &Snapshot) -> Vec<MetadataDoc> {
    snapshot
        .iter()
        .filter_map(|(path, _, _)| {
            let data = read_yaml_mapping(path)?;
            let id = field_nonempty(&data, "id").or_else(|| {
                path.parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
            })?;
            Some(MetadataDoc {
                id,
                file: path.clone(),
                data,
            })
        })
        .collect()
}

/// All parsable `metadata.yaml` mappings under `root`, sorted by path.
pub fn load_all_metadata(root: &Path, use_cache: bool) -> Vec<MetadataDoc> {
    let use_cache = use_cache && std::env::var(ENV_METADATA_CACHE).as_deref() != Ok("0");
    let key = resolved(root);
    let snapshot = build_snapshot(root);

    if !use_cache {
        return parse_snapshot(&snapshot);
    }

    let Ok(mut guard) = cache().lock() else {
        return parse_snapshot(&snapshot);
    };
    let hit = guard
        .entries
        .get(&key)
        .filter(|e| e.snapshot == snapshot)
        .map(|e| e.docs.clone());
    if let Some(docs) = hit {
        guard.hits += 1;
        debug!(root = %key.display(), "metadata cache hit");
        return docs;
    }
    let docs = parse_snapshot(&snapshot);
    guard.misses += 1;
    guard.entries.insert(
        key,
        CacheEntry {
            snapshot,
            docs: docs.clone(),
        },
    );
    docs
}

/// Drop the cached snapshot for `root`, or every snapshot when `None`.
pub fn invalidate(root: Option<&Path>) {
    if let Ok(mut guard) = cache().lock() {
        match root {
            Some(r) => {
                guard.entries.remove(&resolved(r));
            }
            None => guard.entries.clear(),
        }
    }
}

pub fn stats() -> CacheStats {
    cache()
        .lock()
        .map(|g| CacheStats {
            hits: g.hits,
            misses: g.misses,
        })
        .unwrap_or(CacheStats { hits: 0, misses: 0 })
}

fn jurisdiction_of(data: &serde_yaml::Mapping) -> Option<Vec<String>> {
    match data.get("jurisdiction") {
        Some(Value::Sequence(items)) if !items.is_empty() => {
            return Some(items.iter().filter_map(scalar_string).collect());
        }
        Some(Value::String(s)) if !s.trim().is_empty() => return Some(vec![s.clone()]),
        _ => {}
    }
    let geo = data.get("geo").and_then(Value::as_mapping)?;
    if let Some(scope) = field_nonempty(geo, "scope") {
        return Some(vec![scope.trim().to_string()]);
    }
    if let Some(Value::Sequence(regions)) = geo.get("regions") {
        let out: Vec<String> = regions
            .iter()
            .filter_map(scalar_string)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if !out.is_empty() {
            return Some(out);
        }
    }
    None
}

/// `<domain>.<short>` from `<policies>/<domain>/<short>/metadata.yaml`.
pub fn derived_id(policies_root: &Path, meta: &Path) -> Option<String> {
    let rel = rel_path(policies_root, meta.parent()?);
    let mut parts = rel.split('/').filter(|p| !p.is_empty());
    let domain = parts.next()?;
    let short = parts.next()?;
    Some(format!("{domain}.{short}"))
}

/// Policy id → normalized metadata record, iterated in sorted id order.
pub fn load_metadata_index(layout: &Layout) -> BTreeMap<String, PolicyMeta> {
    let mut idx = BTreeMap::new();
    for doc in load_all_metadata(&layout.policies, true) {
        let y = &doc.data;
        let Some(pid) = field_nonempty(y, "id").or_else(|| derived_id(&layout.policies, &doc.file))
        else {
            continue;
        };
        let (standard, version) = match y.get("standard") {
            Some(Value::Mapping(std)) => (field(std, "name"), field(std, "version")),
            Some(v) => (scalar_string(v), field(y, "version")),
            None => (None, field(y, "version")),
        };
        let tags = match y.get("tags") {
            Some(Value::Sequence(items)) => Some(items.iter().filter_map(scalar_string).collect()),
            _ => None,
        };
        let policy_dir = doc
            .file
            .parent()
            .map(|p| rel_path(&resolved(&layout.root), p))
            .unwrap_or_default();
        idx.insert(
            pid,
            PolicyMeta {
                name: field(y, "name"),
                standard,
                version,
                paths: normalize_paths(y.get("path")),
                description: field(y, "description"),
                framework: field(y, "framework"),
                severity: field(y, "severity"),
                owner: field(y, "owner"),
                tags,
                links: y.get("links").and_then(yaml_to_json).filter(|v| !v.is_null()),
                geo: y.get("geo").and_then(yaml_to_json).filter(|v| !v.is_null()),
                jurisdiction: jurisdiction_of(y),
                policy_dir,
            },
        );
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_meta(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, body).unwrap();
    }

    #[test]
    fn cache_hits_until_snapshot_changes() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_meta(tmp.path(), "gdpr/a/metadata.yaml", "id: gdpr.a\n");
        let before = stats();
        let first = load_all_metadata(tmp.path(), true);
        let second = load_all_metadata(tmp.path(), true);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        let after = stats();
        assert!(after.misses > before.misses);
        assert!(after.hits > before.hits);

        write_meta(tmp.path(), "gdpr/b/metadata.yaml", "id: gdpr.b\n");
        assert_eq!(load_all_metadata(tmp.path(), true).len(), 2);
        invalidate(Some(tmp.path()));
        assert_eq!(load_all_metadata(tmp.path(), false).len(), 2);
    }

    #[test]
    fn unparsable_and_non_mapping_files_are_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_meta(tmp.path(), "a/x/metadata.yaml", "id: [unclosed\n");
        write_meta(tmp.path(), "a/y/metadata.yaml", "- just\n- a list\n");
        write_meta(tmp.path(), "a/z/metadata.yaml", "name: Z\n");
        let docs = load_all_metadata(tmp.path(), false);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "z");
    }

    #[test]
    fn empty_metadata_file_counts_as_empty_mapping() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_meta(tmp.path(), "policies/gdpr/data_retention/metadata.yaml", "");
        let docs = load_all_metadata(&tmp.path().join("policies"), false);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "data_retention");

        let layout = Layout::discover(tmp.path()).unwrap();
        let idx = load_metadata_index(&layout);
        let m = idx.get("gdpr.data_retention").expect("derived id");
        assert!(m.name.is_none());
        assert!(m.paths.is_empty());
    }

    #[test]
    fn index_derives_id_and_normalizes_scalar_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_meta(
            tmp.path(),
            "policies/aml/suspicious_activity/metadata.yaml",
            "name: SAR\npath: policies/aml/suspicious_activity/policy.rego\ngeo:\n  scope: EU\n",
        );
        let layout = Layout::discover(tmp.path()).unwrap();
        let idx = load_metadata_index(&layout);
        let m = idx.get("aml.suspicious_activity").expect("derived id");
        assert_eq!(m.paths, vec!["policies/aml/suspicious_activity/policy.rego"]);
        assert_eq!(m.jurisdiction, Some(vec!["EU".to_string()]));
        assert_eq!(m.policy_dir, "policies/aml/suspicious_activity");
    }

    #[test]
    fn nested_standard_wins_over_flat_version() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_meta(
            tmp.path(),
            "policies/pci/tokens/metadata.yaml",
            "id: pci.tokens\nstandard:\n  name: PCI DSS\n  version: '4.0'\nversion: '3.2'\n",
        );
        let layout = Layout::discover(tmp.path()).unwrap();
        let idx = load_metadata_index(&layout);
        let m = &idx["pci.tokens"];
        assert_eq!(m.standard.as_deref(), Some("PCI DSS"));
        assert_eq!(m.version.as_deref(), Some("4.0"));
    }
}
