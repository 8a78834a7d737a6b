use crate::domain::constants::*;
use crate::domain::models::*;
use crate::services::derive::{
    derive_owner, derive_standard_version, derive_tags, framework_from_paths, humanize_name,
    is_placeholder,
};
use crate::services::metadata::{load_all_metadata, load_metadata_index, stats};
use crate::services::settings::{env_flag, env_int};
use crate::services::storage::{pretty_json, sorted_json, write_if_changed, write_text};
use crate::store::{field, load_maps, scalar_string, Layout};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

pub type PathStatusIndex = BTreeMap<String, Vec<PathStatus>>;

fn show(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("None")
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

pub fn fmt_pct(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Existence of every metadata `path` entry, relative to the repository root.
pub fn path_status(layout: &Layout, idx: &BTreeMap<String, PolicyMeta>) -> PathStatusIndex {
    let mut seen: HashMap<String, bool> = HashMap::new();
    idx.iter()
        .map(|(pid, meta)| {
            let entries = meta
                .paths
                .iter()
                .map(|p| {
                    let exists = *seen
                        .entry(p.clone())
                        .or_insert_with(|| layout.root.join(p).exists());
                    PathStatus {
                        path: p.clone(),
                        exists,
                    }
                })
                .collect();
            (pid.clone(), entries)
        })
        .collect()
}

pub fn build_markdown(
    maps: &[ComplianceMap],
    idx: &BTreeMap<String, PolicyMeta>,
    status: &PathStatusIndex,
) -> String {
    let mut lines: Vec<String> = vec!["# Compliance Coverage".into(), String::new()];
    for m in maps {
        lines.push(format!("## {} {}", show(&m.regulation), show(&m.version)));
        lines.push(String::new());
        lines.push("| Section | Title | Policies | Coverage | Paths |".into());
        lines.push("|---|---|---|---|---|".into());
        let (mut covered, mut total) = (0usize, 0usize);
        for sec in &m.sections {
            let pols = &sec.policies;
            let all_known = pols.iter().all(|p| idx.contains_key(p));
            let cov = if all_known && !pols.is_empty() {
                "OK"
            } else {
                "WARN"
            };
            covered += pols.iter().filter(|p| idx.contains_key(*p)).count();
            total += pols.len();
            let paths_cell = pols
                .iter()
                .map(|pid| {
                    let entries = status.get(pid).map(Vec::as_slice).unwrap_or(&[]);
                    if entries.is_empty() {
                        format!("{pid}: —")
                    } else {
                        let parts: Vec<String> = entries
                            .iter()
                            .map(|e| format!("{} {}", if e.exists { "OK" } else { "MISS" }, e.path))
                            .collect();
                        format!("{pid}: {}", parts.join(", "))
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            lines.push(format!(
                "| `{}` | {} | {} | {} | {} |",
                sec.id,
                sec.title.as_deref().unwrap_or(""),
                pols.join(", "),
                cov,
                paths_cell
            ));
        }
        lines.push(String::new());
        if total > 0 {
            lines.push(format!(
                "**Coverage**: {covered}/{total} ({}%)",
                100 * covered / total
            ));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

fn append_test_presence(md: &mut String, cov: &PresenceCoverage) {
    md.push_str("\n## Policy Test Coverage (Gatekeeper Rego)\n\n");
    md.push_str(&format!(
        "Policies with tests: {}/{} ({}%)\n\n",
        cov.tested,
        cov.total,
        fmt_pct(cov.percent)
    ));
    if !cov.missing.is_empty() {
        md.push_str("Missing tests for:\n\n");
        for miss in &cov.missing {
            md.push_str(&format!("- `{miss}`\n"));
        }
        md.push('\n');
    }
}

fn node_id(pid: &str) -> String {
    pid.replace('.', "_")
}

pub fn build_mermaid(maps: &[ComplianceMap], idx: &BTreeMap<String, PolicyMeta>) -> String {
    let mut g = vec!["flowchart LR".to_string()];
    for m in maps {
        let reg = format!("{} {}", show(&m.regulation), show(&m.version));
        let reg_id = reg.replace(' ', "_");
        g.push(format!("{reg_id}([\"{reg}\"])"));
        for sec in &m.sections {
            let sec_id = format!(
                "{reg_id}_{}",
                sec.id
                    .replace(['.', ' '], "_")
                    .replace(['(', ')'], "")
            );
            g.push(format!(
                "{sec_id}[\"{}: {}\"]",
                sec.id,
                sec.title.as_deref().unwrap_or("")
            ));
            g.push(format!("{reg_id} --> {sec_id}"));
            for pid in &sec.policies {
                let nid = node_id(pid);
                let meta = idx.get(pid);
                let title = match meta {
                    Some(m) => show(&m.name).to_string(),
                    None => pid.clone(),
                };
                g.push(format!("{nid}[\"{title}\n({pid})\"]:::node"));
                let class = if meta.is_some() { "present" } else { "missing" };
                g.push(format!("class {nid} {class};"));
                g.push(format!("{sec_id} --> {nid}"));
            }
        }
    }
    g.push("classDef present fill:lightgreen,stroke:#333,stroke-width:1px;".into());
    g.push("classDef missing fill:#ffcccc,stroke:#333,stroke-width:1px;".into());
    g.join("\n")
}

pub fn render_html(mermaid: &str) -> String {
    format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"><title>RuleHub Coverage</title>
<script src="https://cdn.jsdelivr.net/npm/mermaid/dist/mermaid.min.js"></script>
</head><body>
<h1>Compliance Coverage</h1>
<div class="mermaid">{mermaid}</div>
<script>mermaid.initialize({{ startOnLoad: true }});</script>
</body></html>"#
    )
}

fn kyverno_severity(layout: &Layout, paths: &[String]) -> Option<String> {
    for p in paths {
        if !(p.ends_with(".yaml") || p.ends_with(".yml")) {
            continue;
        }
        let Ok(raw) = std::fs::read_to_string(layout.root.join(p)) else {
            continue;
        };
        let Ok(doc) = serde_yaml::from_str::<serde_yaml::Value>(&raw) else {
            continue;
        };
        let action = doc
            .get("spec")
            .and_then(|s| s.get("validationFailureAction"))
            .and_then(|v| v.as_str());
        if let Some(a) = action {
            return Some(if a.eq_ignore_ascii_case("enforce") { "high" } else { "low" }.into());
        }
    }
    None
}

pub fn build_policies_index(
    layout: &Layout,
    idx: &BTreeMap<String, PolicyMeta>,
    status: &PathStatusIndex,
) -> Vec<PolicyIndexEntry> {
    idx.iter()
        .map(|(pid, meta)| {
            let framework = meta
                .framework
                .clone()
                .filter(|f| !f.is_empty())
                .or_else(|| framework_from_paths(&meta.paths).map(str::to_string));
            let mut severity = meta.severity.clone().filter(|s| !s.is_empty());
            if severity.is_none() {
                severity = match framework.as_deref() {
                    Some("kyverno") => kyverno_severity(layout, &meta.paths),
                    Some("gatekeeper") if meta.paths.iter().any(|p| p.contains("/constraints/")) => {
                        Some("high".into())
                    }
                    Some("gatekeeper") => Some("medium".into()),
                    _ => None,
                };
            }
            PolicyIndexEntry {
                id: pid.clone(),
                name: meta.name.clone(),
                standard: meta.standard.clone(),
                version: meta.version.clone(),
                description: meta.description.clone(),
                framework,
                severity,
                paths: status.get(pid).cloned().unwrap_or_default(),
                geo: meta.geo.clone(),
            }
        })
        .collect()
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn write_policies_csv(path: &Path, policies: &[PolicyIndexEntry]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut w = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    w.write_record([
        "id",
        "name",
        "standard",
        "version",
        "framework",
        "severity",
        "geo_regions",
        "paths_count",
        "paths",
    ])?;
    for p in policies {
        let regions = p
            .geo
            .as_ref()
            .and_then(|g| g.get("regions"))
            .and_then(Value::as_array)
            .map(|r| r.iter().map(value_text).collect::<Vec<_>>().join(";"))
            .unwrap_or_default();
        let flat_paths = p
            .paths
            .iter()
            .filter(|s| !s.path.is_empty())
            .map(|s| s.path.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let opt = |o: &Option<String>| o.clone().unwrap_or_default();
        w.write_record([
            p.id.clone(),
            opt(&p.name),
            opt(&p.standard),
            opt(&p.version),
            opt(&p.framework),
            opt(&p.severity),
            regions,
            p.paths.len().to_string(),
            flat_paths,
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Per-map coverage plus the `"{regulation} {version} {section} — {title}"`
/// labels attached to each policy id.
pub fn build_coverage(
    maps: &[ComplianceMap],
    idx: &BTreeMap<String, PolicyMeta>,
    status: &PathStatusIndex,
) -> (Vec<CoverageRegulation>, HashMap<String, Vec<String>>) {
    let mut out = Vec::new();
    let mut labels: HashMap<String, Vec<String>> = HashMap::new();
    for m in maps {
        let mut totals = CoverageTotals::default();
        let mut sections = Vec::new();
        for sec in &m.sections {
            let mut entry = CoverageSection {
                section: sec.id.clone(),
                title: sec.title.clone().unwrap_or_default(),
                policies: Vec::new(),
            };
            for pid in &sec.policies {
                let meta = idx.get(pid);
                if meta.is_some() {
                    totals.covered += 1;
                }
                totals.total += 1;
                entry.policies.push(CoveragePolicy {
                    id: pid.clone(),
                    found: meta.is_some(),
                    name: meta.and_then(|m| m.name.clone()),
                    paths: status.get(pid).cloned().unwrap_or_default(),
                });
                let mut label = format!("{} {} {}", show(&m.regulation), show(&m.version), sec.id);
                if let Some(t) = sec.title.as_deref().filter(|t| !t.is_empty()) {
                    label = format!("{label} — {t}");
                }
                labels.entry(pid.clone()).or_default().push(label);
            }
            sections.push(entry);
        }
        out.push(CoverageRegulation {
            regulation: m.regulation.clone(),
            version: m.version.clone(),
            sections,
            totals,
        });
    }
    (out, labels)
}

fn repo_url(base: &str, rel: &str) -> String {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    format!("{base}{}", rel.trim_start_matches('/'))
}

fn parent_dir(p: &str) -> String {
    match p.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
        Some(_) => "/".to_string(),
        None => ".".to_string(),
    }
}

fn artifact_links(base: &str, paths: &[PathStatus]) -> (Vec<ArtifactLink>, Vec<ArtifactLink>) {
    let mut kyverno = Vec::new();
    let mut gatekeeper = Vec::new();
    for pe in paths {
        let rel = pe.path.as_str();
        let link = || ArtifactLink {
            path: rel.to_string(),
            url: repo_url(base, rel),
        };
        if (rel.contains("/kyverno/") || rel.starts_with("addons/kyverno"))
            && (rel.ends_with(".yaml") || rel.ends_with(".yml"))
        {
            kyverno.push(link());
        }
        if rel.contains("k8s-gatekeeper")
            || rel.ends_with("policy.rego")
            || rel.contains("/templates/")
            || rel.contains("/constraints/")
        {
            gatekeeper.push(link());
        }
    }
    (kyverno, gatekeeper)
}

pub fn build_packages(
    layout: &Layout,
    idx: &BTreeMap<String, PolicyMeta>,
    policies: &[PolicyIndexEntry],
    labels: &HashMap<String, Vec<String>>,
) -> Vec<Package> {
    let by_id: HashMap<&str, &PolicyIndexEntry> =
        policies.iter().map(|p| (p.id.as_str(), p)).collect();
    let base = layout.repo_url_base();
    let policies_prefix = format!("{}/", layout.rel(&layout.policies));

    idx.iter()
        .map(|(pid, meta)| {
            let (standard, version) =
                derive_standard_version(pid, meta.standard.as_deref(), meta.version.as_deref());
            let name = if is_placeholder(meta.name.as_deref()) {
                humanize_name(pid)
            } else {
                meta.name.clone().unwrap_or_default()
            };
            let description = if is_placeholder(meta.description.as_deref()) {
                format!("Policy: {name}.")
            } else {
                meta.description.clone().unwrap_or_default()
            };
            let owner = meta
                .owner
                .clone()
                .filter(|o| !o.is_empty())
                .unwrap_or_else(|| derive_owner(pid));
            let entry = by_id.get(pid.as_str());
            let paths = entry.map(|p| p.paths.clone()).unwrap_or_default();
            let framework = entry.and_then(|p| p.framework.clone()).filter(|f| !f.is_empty());

            let (repo_path, repo_url_v) = if meta.policy_dir.starts_with(&policies_prefix) {
                (
                    Some(meta.policy_dir.clone()),
                    Some(repo_url(&base, &meta.policy_dir)),
                )
            } else if let Some(first) = paths.first() {
                let dir = parent_dir(&first.path);
                let url = repo_url(&base, &dir);
                (Some(dir), Some(url))
            } else {
                (None, None)
            };
            let (kyverno, gatekeeper) = artifact_links(&base, &paths);

            let tags = match &meta.tags {
                Some(t) if !t.is_empty() => Some(t.clone()),
                _ => Some(derive_tags(pid, framework.as_deref(), Some(&standard)))
                    .filter(|t| !t.is_empty()),
            };

            Package {
                id: pid.clone(),
                name,
                standard,
                version,
                coverage: labels.get(pid).cloned().unwrap_or_default(),
                jurisdiction: meta.jurisdiction.clone().filter(|j| !j.is_empty()),
                description: Some(description).filter(|d| !d.is_empty()),
                owner: Some(owner),
                links: meta.links.clone().filter(truthy),
                framework,
                severity: entry
                    .and_then(|p| p.severity.clone())
                    .filter(|s| !s.is_empty()),
                geo: entry.and_then(|p| p.geo.clone()).filter(truthy),
                paths: Some(paths).filter(|p| !p.is_empty()),
                repo_path,
                repo_url: repo_url_v,
                kyverno: Some(kyverno).filter(|k| !k.is_empty()),
                gatekeeper: Some(gatekeeper).filter(|g| !g.is_empty()),
                tags,
            }
        })
        .collect()
}

/// `schemaVersion` for `dist/index.json`; `None` when disabled through env.
pub fn index_schema_version() -> anyhow::Result<Option<i64>> {
    if env_flag(ENV_DISABLE_SCHEMA_VERSION) {
        return Ok(None);
    }
    Ok(Some(env_int(
        ENV_INDEX_SCHEMA_VERSION,
        INDEX_SCHEMA_VERSION_DEFAULT,
    )?))
}

/// Presence of `policy_test.rego` next to every `policy.rego`.
pub fn presence_coverage(layout: &Layout) -> PresenceCoverage {
    let policies = crate::store::find_named(&layout.policies, POLICY_FILE);
    let total = policies.len();
    let missing: Vec<String> = policies
        .iter()
        .filter(|p| !p.with_file_name(POLICY_TEST_FILE).exists())
        .map(|p| layout.rel(p))
        .collect();
    let tested = total - missing.len();
    let percent = if total > 0 {
        round2(100.0 * tested as f64 / total as f64)
    } else {
        0.0
    };
    PresenceCoverage {
        tested,
        total,
        percent,
        missing,
    }
}

struct Stopwatch {
    timings: Vec<StageTiming>,
}

impl Stopwatch {
    fn stage<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let t = Instant::now();
        let out = f();
        let seconds = t.elapsed().as_secs_f64();
        debug!(stage = name, seconds, "catalog stage");
        self.timings.push(StageTiming {
            stage: name.to_string(),
            seconds,
        });
        out
    }
}

/// Regenerate every catalog artifact under `docs/` and `dist/`.
pub fn run_catalog(layout: &Layout) -> anyhow::Result<CatalogReport> {
    let mut sw = Stopwatch {
        timings: Vec::new(),
    };
    let idx = sw.stage("load_metadata_index", || load_metadata_index(layout));
    let maps = sw.stage("load_mappings", || load_maps(&layout.maps));
    let test_cov = sw.stage("compute_policy_test_coverage", || presence_coverage(layout));
    let status = path_status(layout, &idx);
    let cache = stats();
    debug!(hits = cache.hits, misses = cache.misses, "metadata cache");

    let mut md = sw.stage("build_markdown", || build_markdown(&maps, &idx, &status));
    append_test_presence(&mut md, &test_cov);
    let md_path = layout.docs.join("coverage.md");
    write_text(&md_path, &md)?;

    let mermaid = sw.stage("build_mermaid", || build_mermaid(&maps, &idx));
    let html_path = layout.dist.join("coverage.html");
    write_text(&html_path, &render_html(&mermaid))?;

    let index_path = layout.dist.join("policies-index.json");
    let csv_path = layout.dist.join("policies.csv");
    let coverage_path = layout.dist.join(COVERAGE_JSON_FILE);
    let plugin_path = layout.dist.join(PLUGIN_INDEX_FILE);
    sw.stage("write_json_outputs", || -> anyhow::Result<()> {
        let policies = build_policies_index(layout, &idx, &status);
        write_text(
            &index_path,
            &pretty_json(&PolicyIndex {
                policies: &policies,
            })?,
        )?;
        if let Err(e) = write_policies_csv(&csv_path, &policies) {
            warn!(error = %e, "failed to write CSV");
        }
        let (coverage, labels) = build_coverage(&maps, &idx, &status);
        write_text(&coverage_path, &pretty_json(&coverage)?)?;
        let packages = build_packages(layout, &idx, &policies, &labels);
        let payload = PluginIndex {
            schema_version: index_schema_version()?,
            packages,
        };
        write_text(&plugin_path, &pretty_json(&payload)?)?;
        Ok(())
    })?;
    let test_cov_path = layout.dist.join(TEST_COVERAGE_FILE);
    write_text(&test_cov_path, &pretty_json(&test_cov)?)?;

    let written = [
        &md_path,
        &html_path,
        &index_path,
        &coverage_path,
        &plugin_path,
        &csv_path,
    ]
    .iter()
    .map(|p| layout.rel(p))
    .collect();
    Ok(CatalogReport {
        policies: idx.len(),
        maps: maps.len(),
        written,
        timings: sw.timings,
    })
}

/// Stages taking more than a quarter of the total run time.
pub fn bottlenecks(timings: &[StageTiming]) -> Vec<String> {
    let total: f64 = timings.iter().map(|t| t.seconds).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    timings
        .iter()
        .filter(|t| t.seconds / total > 0.25)
        .map(|t| t.stage.clone())
        .collect()
}

fn export_jurisdiction(meta: &serde_yaml::Mapping) -> Option<Vec<String>> {
    match meta.get("jurisdiction") {
        Some(serde_yaml::Value::Sequence(items)) => {
            let vals: Vec<String> = items.iter().filter_map(scalar_string).collect();
            return (!vals.is_empty()).then_some(vals);
        }
        Some(serde_yaml::Value::String(s)) if !s.trim().is_empty() => return Some(vec![s.clone()]),
        _ => {}
    }
    let geo = meta.get("geo").and_then(|g| g.as_mapping())?;
    if let Some(serde_yaml::Value::Sequence(regions)) = geo.get("regions") {
        let vals: Vec<String> = regions.iter().filter_map(scalar_string).collect();
        if !vals.is_empty() {
            return Some(vals);
        }
    }
    field(geo, "scope").filter(|s| !s.is_empty()).map(|s| vec![s])
}

/// Minimal `{"packages": [...]}` export consumed by the plugin index merge.
pub fn build_metadata_export(layout: &Layout) -> Vec<MetadataPackage> {
    let mut coverage: HashMap<String, BTreeSet<String>> = HashMap::new();
    for m in load_maps(&layout.maps) {
        let Some(reg) = m.regulation.as_deref().filter(|r| !r.is_empty()) else {
            continue;
        };
        let label = match m.version.as_deref() {
            Some(v) if !v.trim().is_empty() => format!("{reg} {v}"),
            _ => reg.to_string(),
        };
        for sec in &m.sections {
            for pid in &sec.policies {
                coverage.entry(pid.clone()).or_default().insert(label.clone());
            }
        }
    }

    let mut pkgs: BTreeMap<String, MetadataPackage> = BTreeMap::new();
    for doc in load_all_metadata(&layout.policies, true) {
        let meta = &doc.data;
        let Some(pid) = field(meta, "id").filter(|p| !p.is_empty()) else {
            continue;
        };
        let (standard, version) = match meta.get("standard") {
            Some(serde_yaml::Value::Mapping(s)) => (field(s, "name"), field(s, "version")),
            Some(serde_yaml::Value::String(s)) => (Some(s.clone()), field(meta, "version")),
            _ => (None, field(meta, "version")),
        };
        let name = field(meta, "name").filter(|n| !n.is_empty() && *n != pid);
        let cov: Vec<String> = coverage
            .get(&pid)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default();
        pkgs.insert(
            pid.clone(),
            MetadataPackage {
                id: pid,
                name,
                standard: standard.filter(|s| !s.is_empty()),
                version: version.filter(|v| !v.is_empty()),
                jurisdiction: export_jurisdiction(meta),
                coverage: (!cov.is_empty()).then_some(cov),
            },
        );
    }
    pkgs.into_values().collect()
}

pub fn export_metadata(layout: &Layout, out: &Path) -> anyhow::Result<WriteOutcome> {
    let packages = build_metadata_export(layout);
    let count = packages.len();
    let body = format!(
        "{}\n",
        sorted_json(&serde_json::json!({ "packages": packages }))?
    );
    let changed = write_if_changed(out, &body)?;
    Ok(WriteOutcome {
        path: layout.rel(out),
        changed,
        packages: count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, paths: &[&str]) -> PolicyMeta {
        PolicyMeta {
            name: Some(name.to_string()),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            ..PolicyMeta::default()
        }
    }

    fn gdpr_map() -> ComplianceMap {
        ComplianceMap {
            file: "gdpr.yml".into(),
            regulation: Some("GDPR".into()),
            version: Some("2016/679".into()),
            sections: vec![
                MapSection {
                    id: "Art.5".into(),
                    title: Some("Principles".into()),
                    policies: vec!["gdpr.a".into(), "gdpr.missing".into()],
                },
                MapSection {
                    id: "Art.32 (1)".into(),
                    title: None,
                    policies: vec!["gdpr.a".into()],
                },
            ],
        }
    }

    #[test]
    fn markdown_marks_partial_sections_as_warn() {
        let mut idx = BTreeMap::new();
        idx.insert("gdpr.a".to_string(), meta("A", &["policies/gdpr/a/policy.rego"]));
        let mut status = PathStatusIndex::new();
        status.insert(
            "gdpr.a".into(),
            vec![PathStatus {
                path: "policies/gdpr/a/policy.rego".into(),
                exists: false,
            }],
        );
        let md = build_markdown(&[gdpr_map()], &idx, &status);
        assert!(md.contains("## GDPR 2016/679"));
        assert!(md.contains("| `Art.5` | Principles | gdpr.a, gdpr.missing | WARN | gdpr.a: MISS policies/gdpr/a/policy.rego; gdpr.missing: — |"));
        assert!(md.contains("| `Art.32 (1)` |  | gdpr.a | OK |"));
        assert!(md.contains("**Coverage**: 2/3 (66%)"));
    }

    #[test]
    fn mermaid_sanitizes_section_ids() {
        let mut idx = BTreeMap::new();
        idx.insert("gdpr.a".to_string(), meta("A", &[]));
        let g = build_mermaid(&[gdpr_map()], &idx);
        assert!(g.starts_with("flowchart LR\n"));
        assert!(g.contains("GDPR_2016/679_Art_32_1[\"Art.32 (1): \"]"));
        assert!(g.contains("class gdpr_a present;"));
        assert!(g.contains("class gdpr_missing missing;"));
        assert!(g.ends_with("classDef missing fill:#ffcccc,stroke:#333,stroke-width:1px;"));
    }

    #[test]
    fn mermaid_node_titles_fall_back_per_entry() {
        let mut idx = BTreeMap::new();
        idx.insert("gdpr.a".to_string(), PolicyMeta::default());
        let g = build_mermaid(&[gdpr_map()], &idx);
        assert!(g.contains("gdpr_a[\"None\n(gdpr.a)\"]:::node"));
        assert!(g.contains("gdpr_missing[\"gdpr.missing\n(gdpr.missing)\"]:::node"));
    }

    #[test]
    fn coverage_labels_include_titles_when_present() {
        let mut idx = BTreeMap::new();
        idx.insert("gdpr.a".to_string(), meta("A", &[]));
        let (cov, labels) = build_coverage(&[gdpr_map()], &idx, &PathStatusIndex::new());
        assert_eq!(cov[0].totals.covered, 2);
        assert_eq!(cov[0].totals.total, 3);
        assert_eq!(
            labels["gdpr.a"],
            vec![
                "GDPR 2016/679 Art.5 — Principles".to_string(),
                "GDPR 2016/679 Art.32 (1)".to_string()
            ]
        );
    }

    #[test]
    fn artifact_links_split_by_engine() {
        let paths = vec![
            PathStatus {
                path: "addons/kyverno/policies/x.yaml".into(),
                exists: true,
            },
            PathStatus {
                path: "policies/k8s/x/policy.rego".into(),
                exists: true,
            },
        ];
        let (k, g) = artifact_links("https://example.test/blob/main", &paths);
        assert_eq!(k.len(), 1);
        assert_eq!(g.len(), 1);
        assert_eq!(
            g[0].url,
            "https://example.test/blob/main/policies/k8s/x/policy.rego"
        );
    }

    #[test]
    fn bottlenecks_flag_dominant_stages() {
        let t = vec![
            StageTiming {
                stage: "a".into(),
                seconds: 0.9,
            },
            StageTiming {
                stage: "b".into(),
                seconds: 0.1,
            },
        ];
        assert_eq!(bottlenecks(&t), vec!["a".to_string()]);
    }

    #[test]
    fn pct_formatting_keeps_one_decimal_for_whole_numbers() {
        assert_eq!(fmt_pct(100.0), "100.0");
        assert_eq!(fmt_pct(66.67), "66.67");
        assert_eq!(round2(200.0 / 3.0), 66.67);
    }
}
