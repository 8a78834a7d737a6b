//! Release integrity: manifests, their verification, and provenance.
//!
//! ## Manifests
//! Both manifests list `{path, sha256, bytes}` entries plus an `aggregate_hash`:
//! sha256 over the `"<sha256>  <path>"` lines of all entries sorted by path,
//! joined with `\n` (no trailing newline). Files are written with sorted keys
//! through `<output>.tmp`.
//!
//! ## Verification
//! Checks stop at the first error unless `all` is set; warnings never stop.

use crate::domain::constants::*;
use crate::domain::models::{BundleManifest, DistManifest, Issue, ManifestEntry, VerifyReport};
use crate::services::output::quoted_list;
use crate::services::storage::{git_head, git_remote, sha256_file, sha256_hex, sorted_json, utc_now_iso, write_atomic};
use crate::store::{rel_path, StoreError};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn aggregate_hash(entries: &[ManifestEntry]) -> String {
    let mut sorted: Vec<&ManifestEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));
    let lines: Vec<String> = sorted
        .iter()
        .map(|e| format!("{}  {}", e.sha256, e.path))
        .collect();
    sha256_hex(lines.join("\n").as_bytes())
}

fn is_bundle_file(rel: &str, exclude_tests: bool) -> bool {
    if exclude_tests && rel.ends_with("_test.rego") {
        return false;
    }
    rel.ends_with(METADATA_FILE) || rel.ends_with(".rego")
}

/// Bundle source files below `policies`, relative and sorted.
pub fn bundle_files(policies: &Path, exclude_tests: bool) -> Vec<String> {
    let mut out: Vec<String> = walkdir::WalkDir::new(policies)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| rel_path(policies, e.path()))
        .filter(|rel| is_bundle_file(rel, exclude_tests))
        .collect();
    out.sort();
    out
}

fn dist_files(dist: &Path, exclude: &str) -> Vec<String> {
    let Ok(rd) = std::fs::read_dir(dist) else {
        return Vec::new();
    };
    let mut out: Vec<String> = rd
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n != exclude)
        .collect();
    out.sort();
    out
}

fn entries(base: &Path, rels: Vec<String>) -> anyhow::Result<Vec<ManifestEntry>> {
    rels.into_iter()
        .map(|path| {
            let (sha256, bytes) = sha256_file(&base.join(&path))?;
            Ok(ManifestEntry { path, sha256, bytes })
        })
        .collect()
}

fn require_dir(what: &'static str, dir: &Path) -> Result<(), StoreError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(StoreError::MissingDir {
            what,
            path: dir.display().to_string(),
        })
    }
}

fn require_file(what: &'static str, file: &Path) -> Result<(), StoreError> {
    if file.is_file() {
        Ok(())
    } else {
        Err(StoreError::MissingInput {
            what,
            path: file.display().to_string(),
        })
    }
}

pub fn bundle_manifest(
    repo_root: &Path,
    policies: &Path,
    schema_version: i64,
    exclude_tests: bool,
) -> anyhow::Result<BundleManifest> {
    require_dir("Policies root", policies)?;
    let policies_list = entries(policies, bundle_files(policies, exclude_tests))?;
    Ok(BundleManifest {
        schema_version,
        build_commit: git_head(repo_root).unwrap_or_else(|| "unknown".into()),
        build_time: utc_now_iso(),
        aggregate_hash: aggregate_hash(&policies_list),
        policies: policies_list,
    })
}

/// Top-level files of `dist`, minus the manifest being written.
pub fn dist_manifest(
    repo_root: &Path,
    dist: &Path,
    output: &Path,
    schema_version: i64,
) -> anyhow::Result<DistManifest> {
    require_dir("dist directory", dist)?;
    let out_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let artifacts = entries(dist, dist_files(dist, &out_name))?;
    Ok(DistManifest {
        schema_version,
        build_commit: git_head(repo_root).unwrap_or_else(|| "unknown".into()),
        build_time: utc_now_iso(),
        aggregate_hash: aggregate_hash(&artifacts),
        artifacts,
    })
}

pub fn write_sorted<T: Serialize>(path: &Path, data: &T) -> anyhow::Result<()> {
    let mut body = sorted_json(data)?;
    body.push('\n');
    write_atomic(path, &body)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Bundle,
    Dist,
}

impl ManifestKind {
    fn list_key(self) -> &'static str {
        match self {
            ManifestKind::Bundle => "policies",
            ManifestKind::Dist => "artifacts",
        }
    }

    fn entry_label(self, i: usize) -> String {
        match self {
            ManifestKind::Bundle => format!("Policy[{i}]"),
            ManifestKind::Dist => format!("artifacts[{i}]"),
        }
    }

    fn noun(self) -> &'static str {
        match self {
            ManifestKind::Bundle => "policy",
            ManifestKind::Dist => "artifact",
        }
    }

    pub fn ok_line(self) -> &'static str {
        match self {
            ManifestKind::Bundle => "OK: bundle integrity verified",
            ManifestKind::Dist => "OK: dist manifest verified",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub allow_extra: bool,
    pub all: bool,
    pub skip_git: bool,
    pub exclude_tests: bool,
}

struct Halt;

struct Issues {
    list: Vec<Issue>,
    all: bool,
}

impl Issues {
    fn error(&mut self, message: String) -> Result<(), Halt> {
        self.list.push(Issue {
            level: "ERROR".into(),
            message,
        });
        if self.all {
            Ok(())
        } else {
            Err(Halt)
        }
    }

    fn warn(&mut self, message: String) {
        self.list.push(Issue {
            level: "WARN".into(),
            message,
        });
    }
}

fn missing_keys(obj: Option<&serde_json::Map<String, Value>>, required: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = required
        .iter()
        .filter(|k| obj.map_or(true, |o| !o.contains_key(**k)))
        .map(|k| k.to_string())
        .collect();
    out.sort();
    out
}

fn well_formed(entry: &Value) -> Option<ManifestEntry> {
    serde_json::from_value(entry.clone()).ok()
}

struct Target<'a> {
    kind: ManifestKind,
    manifest_name: String,
    base: &'a Path,
    repo_root: &'a Path,
}

fn run_checks(
    t: &Target<'_>,
    manifest: &Value,
    opts: &VerifyOptions,
    issues: &mut Issues,
    checked: &mut usize,
) -> Result<(), Halt> {
    let obj = manifest.as_object();
    let list_key = t.kind.list_key();
    let required = ["schema_version", "build_commit", "build_time", list_key, "aggregate_hash"];
    let missing = missing_keys(obj, &required);
    if !missing.is_empty() {
        issues.error(format!("Manifest missing keys: {}", quoted_list(&missing)))?;
    }

    let raw_entries: Vec<Value> = manifest
        .get(list_key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for (i, e) in raw_entries.iter().enumerate() {
        let missing = missing_keys(e.as_object(), &["path", "sha256", "bytes"]);
        if !missing.is_empty() {
            issues.error(format!("{} missing keys: {}", t.kind.entry_label(i), quoted_list(&missing)))?;
        }
    }
    let listed: Vec<ManifestEntry> = raw_entries.iter().filter_map(well_formed).collect();

    if t.kind == ManifestKind::Bundle && !opts.skip_git {
        let recorded = manifest.get("build_commit").and_then(Value::as_str).filter(|s| !s.is_empty());
        match (git_head(t.repo_root), recorded) {
            (None, _) => issues.warn("Git not available to verify commit".into()),
            (Some(head), Some(rec)) if head != rec => {
                issues.error(format!("Git HEAD {head} != manifest build_commit {rec}"))?;
            }
            _ => {}
        }
    }

    let mut seen = BTreeSet::new();
    for e in &listed {
        let file = t.base.join(&e.path);
        if !file.is_file() {
            issues.error(format!("Missing {} file: {}", t.kind.noun(), e.path))?;
            continue;
        }
        let Ok((sha, size)) = sha256_file(&file) else {
            issues.error(format!("Unreadable {} file: {}", t.kind.noun(), e.path))?;
            continue;
        };
        *checked += 1;
        seen.insert(e.path.clone());
        if sha != e.sha256 {
            issues.error(format!("Hash mismatch {}: manifest {} != actual {sha}", e.path, e.sha256))?;
        }
        if size != e.bytes {
            issues.error(format!("Size mismatch {}: manifest {} != actual {size}", e.path, e.bytes))?;
        }
    }

    if !opts.allow_extra {
        let on_disk = match t.kind {
            ManifestKind::Bundle => bundle_files(t.base, opts.exclude_tests),
            ManifestKind::Dist => dist_files(t.base, &t.manifest_name),
        };
        let extras: Vec<String> = on_disk
            .into_iter()
            .filter(|p| !seen.contains(p))
            .take(10)
            .collect();
        if !extras.is_empty() {
            let what = match t.kind {
                ManifestKind::Bundle => "Extra policy files not in manifest",
                ManifestKind::Dist => "Extra dist files not in manifest",
            };
            issues.error(format!("{what}: {}", quoted_list(&extras)))?;
        }
    }

    let agg = aggregate_hash(&listed);
    let recorded = manifest.get("aggregate_hash").and_then(Value::as_str);
    if recorded != Some(agg.as_str()) {
        issues.error(format!(
            "aggregate_hash mismatch: manifest {} != recomputed {agg}",
            recorded.unwrap_or("None")
        ))?;
    }
    Ok(())
}

/// Check files under `base` against the manifest at `manifest_path`.
pub fn verify(
    kind: ManifestKind,
    repo_root: &Path,
    manifest_path: &Path,
    base: &Path,
    opts: &VerifyOptions,
) -> anyhow::Result<VerifyReport> {
    require_file("Manifest", manifest_path)?;
    match kind {
        ManifestKind::Bundle => require_dir("Policies root", base)?,
        ManifestKind::Dist => require_dir("Dist dir", base)?,
    }
    let mut issues = Issues {
        list: Vec::new(),
        all: opts.all,
    };
    let mut checked = 0usize;
    let raw = std::fs::read_to_string(manifest_path)?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(manifest) => {
            let target = Target {
                kind,
                manifest_name: manifest_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                base,
                repo_root,
            };
            let _ = run_checks(&target, &manifest, opts, &mut issues, &mut checked);
        }
        Err(e) => {
            let _ = issues.error(format!("Manifest JSON parse error: {e}"));
        }
    }
    debug!(checked, issues = issues.list.len(), "manifest verification finished");
    Ok(VerifyReport {
        manifest: manifest_path.display().to_string(),
        checked,
        issues: issues.list,
    })
}

impl VerifyReport {
    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.level == "ERROR").count()
    }
}

pub fn render_verify(report: &VerifyReport, kind: ManifestKind) -> String {
    let mut lines: Vec<String> = report
        .issues
        .iter()
        .map(|i| format!("[{}] {}", i.level, i.message))
        .collect();
    match report.error_count() {
        0 => lines.push(kind.ok_line().to_string()),
        n => lines.push(format!("FAIL: {n} error(s)")),
    }
    lines.join("\n")
}

pub struct ProvenanceInput {
    pub bundle: PathBuf,
    pub manifest: PathBuf,
    pub bundle_name: String,
    pub manifest_name: String,
    pub builder_id: Option<String>,
    pub workflow_ref: Option<String>,
}

fn builder_id(explicit: Option<String>, remote: &str) -> String {
    if let Some(id) = explicit.filter(|s| !s.trim().is_empty()) {
        return id;
    }
    if remote.starts_with("https://github.com/") {
        remote.strip_suffix(".git").unwrap_or(remote).to_string()
    } else {
        DEFAULT_BUILDER_ID.to_string()
    }
}

/// in-toto Statement with an SLSA v0.2 predicate for the bundle.
pub fn build_provenance(repo_root: &Path, input: &ProvenanceInput) -> anyhow::Result<Value> {
    require_file("Bundle", &input.bundle)?;
    require_file("Manifest", &input.manifest)?;
    let commit = git_head(repo_root).unwrap_or_else(|| "unknown".into());
    let remote = git_remote(repo_root).unwrap_or_default();
    let (bundle_sha, _) = sha256_file(&input.bundle)?;
    let (manifest_sha, _) = sha256_file(&input.manifest)?;
    let started = chrono::Utc::now();
    let finished = chrono::Utc::now();
    let short: String = commit.chars().take(12).collect();

    Ok(json!({
        "_type": IN_TOTO_STATEMENT_TYPE,
        "subject": [{"name": input.bundle_name, "digest": {"sha256": bundle_sha}}],
        "predicateType": SLSA_PREDICATE_TYPE,
        "predicate": {
            "buildType": input.workflow_ref.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| DEFAULT_BUILD_TYPE.into()),
            "builder": {"id": builder_id(input.builder_id.clone(), &remote)},
            "invocation": {
                "parameters": {"make_target": "opa-bundle"},
                "environment": {},
                "configSource": {
                    "uri": remote,
                    "digest": {"sha1": commit},
                    "entryPoint": "Makefile:opa-bundle",
                },
            },
            "metadata": {
                "buildInvocationID": format!("{short}-{}", started.timestamp()),
                "buildStartedOn": started.to_rfc3339(),
                "buildFinishedOn": finished.to_rfc3339(),
            },
            "materials": [
                {"uri": remote, "digest": {"sha1": commit}},
                {"uri": input.manifest_name, "digest": {"sha256": manifest_sha}},
            ],
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, sha: &str) -> ManifestEntry {
        ManifestEntry {
            path: path.into(),
            sha256: sha.into(),
            bytes: 1,
        }
    }

    #[test]
    fn aggregate_is_order_independent() {
        let a = aggregate_hash(&[entry("b.rego", "22"), entry("a.rego", "11")]);
        let b = aggregate_hash(&[entry("a.rego", "11"), entry("b.rego", "22")]);
        assert_eq!(a, b);
        assert_eq!(a, sha256_hex(b"11  a.rego\n22  b.rego"));
    }

    #[test]
    fn bundle_selection_honours_exclude_tests() {
        assert!(is_bundle_file("gdpr/x/policy.rego", true));
        assert!(is_bundle_file("gdpr/x/metadata.yaml", true));
        assert!(!is_bundle_file("gdpr/x/policy_test.rego", true));
        assert!(is_bundle_file("gdpr/x/policy_test.rego", false));
        assert!(!is_bundle_file("gdpr/x/README.md", false));
    }

    #[test]
    fn builder_id_prefers_env_then_github_remote() {
        assert_eq!(builder_id(Some("ci".into()), ""), "ci");
        assert_eq!(
            builder_id(None, "https://github.com/rulehub/rulehub.git"),
            "https://github.com/rulehub/rulehub"
        );
        assert_eq!(builder_id(None, "git@github.com:x/y.git"), DEFAULT_BUILDER_ID);
    }

    #[test]
    fn dist_verification_detects_tampering() {
        let tmp = tempfile::tempdir().unwrap();
        let dist = tmp.path().join("dist");
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(dist.join("a.json"), "{}").unwrap();
        std::fs::write(dist.join("b.csv"), "x").unwrap();
        let out = dist.join(DIST_MANIFEST_FILE);
        let m = dist_manifest(tmp.path(), &dist, &out, 1).unwrap();
        assert_eq!(m.artifacts.len(), 2);
        write_sorted(&out, &m).unwrap();

        let opts = VerifyOptions::default();
        let ok = verify(ManifestKind::Dist, tmp.path(), &out, &dist, &opts).unwrap();
        assert_eq!(ok.error_count(), 0);
        assert_eq!(ok.checked, 2);

        std::fs::write(dist.join("a.json"), "{\"x\":1}").unwrap();
        std::fs::write(dist.join("c.txt"), "new").unwrap();
        let all = VerifyOptions {
            all: true,
            ..Default::default()
        };
        let bad = verify(ManifestKind::Dist, tmp.path(), &out, &dist, &all).unwrap();
        let msgs: Vec<&str> = bad.issues.iter().map(|i| i.message.as_str()).collect();
        assert!(msgs.iter().any(|m| m.starts_with("Hash mismatch a.json")));
        assert!(msgs.iter().any(|m| m.starts_with("Size mismatch a.json")));
        assert!(msgs.contains(&"Extra dist files not in manifest: ['c.txt']"));

        let fast = verify(ManifestKind::Dist, tmp.path(), &out, &dist, &opts).unwrap();
        assert_eq!(fast.error_count(), 1);
    }

    #[test]
    fn missing_manifest_keys_are_listed_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let m = tmp.path().join("m.json");
        std::fs::write(&m, r#"{"policies": [], "schema_version": 1}"#).unwrap();
        let opts = VerifyOptions {
            skip_git: true,
            ..Default::default()
        };
        let r = verify(ManifestKind::Bundle, tmp.path(), &m, tmp.path(), &opts).unwrap();
        assert_eq!(
            r.issues[0].message,
            "Manifest missing keys: ['aggregate_hash', 'build_commit', 'build_time']"
        );
        assert_eq!(r.issues.len(), 1);
    }
}
