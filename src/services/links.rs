//! Link hygiene for policy metadata.
//!
//! `analyze` classifies every URL found in metadata (and optionally an export
//! file) into suspicious categories and diffs the two sources; `audit` looks at
//! per-policy link quality and can HEAD-check URLs; `baseline_diff` compares two
//! `analyze` reports; `classify_lychee` grades a lychee run.

use crate::domain::constants::VENDOR_POLICY_FILE;
use crate::domain::models::*;
use crate::services::metadata::load_all_metadata;
use crate::store::{scalar_string, Layout};
use rayon::prelude::*;
use regex::Regex;
use reqwest::Url;
use serde_json::Value;
use serde_yaml::Value as Yaml;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Report order for the suspicious categories.
pub const CATEGORIES: [&str; 6] = [
    "non_https",
    "vendor",
    "tracking_query",
    "celex_pdf",
    "long",
    "external_source_code",
];
/// Categories compared by `baseline_diff`.
pub const DRIFT_CATEGORIES: [&str; 5] = ["non_https", "vendor", "tracking_query", "celex_pdf", "long"];
pub const HISTORY_COLUMNS: [&str; 7] = [
    "non_https",
    "vendor",
    "tracking_query",
    "celex_pdf",
    "long",
    "highly_shared",
    "external_source_code",
];

const HIGHLY_SHARED_MIN: usize = 50;
const HIGHLY_SHARED_TOP: usize = 50;
const AUDIT_SHARED_MIN: usize = 5;
const AUDIT_TOP: usize = 25;
const MARKDOWN_LIST_CAP: usize = 200;
const MARKDOWN_TABLE_CAP: usize = 20;
const USER_AGENT: &str = "rulehub-link-audit/1.0";

const EXTERNAL_SOURCE_HOSTS: [&str; 2] = ["raw.githubusercontent.com", "gist.github.com"];
const EXTERNAL_SOURCE_EXTS: [&str; 6] = [".zip", ".tar.gz", ".tgz", ".tar", ".tar.bz2", ".tar.xz"];

static TRACKING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[?&](utm_[a-z]+|gclid)=").expect("tracking regex must compile")
});
static DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://([^/]+)/").expect("domain regex must compile"));
static VERSION_HINTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)pci[-_]?dss[-_]?v?3\.[12]",
        r"(?i)gdpr\b.*2016",
        r"(?i)fatf[-_/]recommendations\b.*2012",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("version hint regex must compile"))
    .collect()
});

impl SuspiciousLinks {
    pub fn get(&self, cat: &str) -> &[String] {
        match cat {
            "non_https" => &self.non_https,
            "vendor" => &self.vendor,
            "long" => &self.long,
            "tracking_query" => &self.tracking_query,
            "celex_pdf" => &self.celex_pdf,
            "external_source_code" => &self.external_source_code,
            _ => &[],
        }
    }

    fn bucket(&mut self, cat: &str) -> &mut Vec<String> {
        match cat {
            "non_https" => &mut self.non_https,
            "vendor" => &mut self.vendor,
            "long" => &mut self.long,
            "tracking_query" => &mut self.tracking_query,
            "celex_pdf" => &mut self.celex_pdf,
            _ => &mut self.external_source_code,
        }
    }

    pub fn total(&self) -> usize {
        CATEGORIES.iter().map(|c| self.get(c).len()).sum()
    }
}

impl LinkReport {
    pub fn discrepancy_total(&self) -> usize {
        self.discrepancies.missing_in_metadata.len() + self.discrepancies.missing_in_export.len()
    }

    fn history_count(&self, col: &str) -> usize {
        if col == "highly_shared" {
            self.highly_shared.len()
        } else {
            self.suspicious.get(col).len()
        }
    }
}

/// String items of a metadata `links` list.
fn link_strings(v: Option<&Yaml>) -> Vec<String> {
    match v {
        Some(Yaml::Sequence(items)) => items
            .iter()
            .filter_map(|i| i.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// `(policy id, links)` for every metadata file, in path order.
pub fn metadata_links(layout: &Layout) -> Vec<(String, Vec<String>)> {
    load_all_metadata(&layout.policies, true)
        .into_iter()
        .map(|doc| {
            let links = link_strings(doc.data.get("links"));
            (doc.id, links)
        })
        .collect()
}

/// `{"policies": [{id, links}]}`; missing or malformed files read as empty.
pub fn load_export(path: Option<&Path>) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    let Some(path) = path.filter(|p| p.is_file()) else {
        return out;
    };
    let data: Value = match std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
    {
        Some(v) => v,
        None => {
            warn!(file = %path.display(), "ignoring unreadable link export");
            return out;
        }
    };
    let Some(policies) = data.get("policies").and_then(Value::as_array) else {
        return out;
    };
    for p in policies {
        let Some(pid) = p.get("id").and_then(Value::as_str) else {
            continue;
        };
        let links = p
            .get("links")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|u| u.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        out.insert(pid.to_string(), links);
    }
    out
}

/// Vendor domains that should be flagged. Domains are flagged unless the
/// policy file marks them `{"allowed": true}`.
pub fn disallowed_vendors(layout: &Layout) -> HashSet<String> {
    let domains = layout.vendor_domains();
    let path = layout.root.join(VENDOR_POLICY_FILE);
    let parsed: Option<serde_json::Map<String, Value>> = std::fs::read_to_string(&path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok());
    let Some(raw) = parsed else {
        return domains.into_iter().collect();
    };
    let mut allowed = HashSet::new();
    let mut disallowed = HashSet::new();
    for (dom, cfg) in &raw {
        if !cfg.is_object() {
            continue;
        }
        if cfg.get("allowed") == Some(&Value::Bool(true)) {
            allowed.insert(dom.to_lowercase());
        } else {
            disallowed.insert(dom.to_lowercase());
        }
    }
    for dom in domains {
        if !allowed.contains(&dom) {
            disallowed.insert(dom);
        }
    }
    disallowed
}

pub fn hostname(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}

fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.to_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// url → ids of the policies referencing it, from both sources.
pub fn build_all_links(
    meta: &[(String, Vec<String>)],
    export: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut all: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let pairs = meta
        .iter()
        .map(|(pid, links)| (pid, links))
        .chain(export.iter());
    for (pid, links) in pairs {
        for u in links {
            all.entry(u.clone()).or_default().insert(pid.clone());
        }
    }
    all
}

pub struct Classifier {
    pub vendor_domains: Vec<String>,
    pub disallowed: HashSet<String>,
    pub long_threshold: usize,
}

impl Classifier {
    pub fn from_layout(layout: &Layout) -> Self {
        Self {
            vendor_domains: layout.vendor_domains(),
            disallowed: disallowed_vendors(layout),
            long_threshold: layout.long_url_threshold(),
        }
    }

    pub fn categories(&self, url: &str) -> Vec<&'static str> {
        let mut out = Vec::new();
        let host = hostname(url);
        if url.starts_with("http://") {
            out.push("non_https");
        }
        let vendor_hit = self
            .vendor_domains
            .iter()
            .filter(|d| host_matches(&host, d))
            .any(|d| self.disallowed.contains(d.as_str()));
        if vendor_hit {
            out.push("vendor");
        }
        if url.chars().count() > self.long_threshold {
            out.push("long");
        }
        if TRACKING_RE.is_match(url) {
            out.push("tracking_query");
        }
        if url.contains("TXT/PDF") {
            out.push("celex_pdf");
        }
        let lower = url.to_lowercase();
        if EXTERNAL_SOURCE_HOSTS.contains(&host.as_str())
            || EXTERNAL_SOURCE_EXTS.iter().any(|e| lower.ends_with(e))
        {
            out.push("external_source_code");
        }
        out
    }

    pub fn suspicious(&self, all: &BTreeMap<String, BTreeSet<String>>) -> SuspiciousLinks {
        let mut s = SuspiciousLinks::default();
        for url in all.keys() {
            for cat in self.categories(url) {
                s.bucket(cat).push(url.clone());
            }
        }
        // keys are already unique and ordered
        s
    }
}

pub fn highly_shared(all: &BTreeMap<String, BTreeSet<String>>) -> Vec<SharedLink> {
    let mut out: Vec<SharedLink> = all
        .iter()
        .filter(|(_, pids)| pids.len() > HIGHLY_SHARED_MIN)
        .map(|(url, pids)| SharedLink {
            url: url.clone(),
            policy_count: pids.len(),
        })
        .collect();
    out.sort_by(|a, b| b.policy_count.cmp(&a.policy_count));
    out.truncate(HIGHLY_SHARED_TOP);
    out
}

pub fn diff_sources(
    meta: &[(String, Vec<String>)],
    export: &BTreeMap<String, Vec<String>>,
) -> Discrepancies {
    let mut d = Discrepancies::default();
    for (pid, links) in meta {
        let m: BTreeSet<&String> = links.iter().collect();
        let e: BTreeSet<&String> = export.get(pid).map(|l| l.iter().collect()).unwrap_or_default();
        let only_export: Vec<String> = e.difference(&m).map(|s| s.to_string()).collect();
        let only_meta: Vec<String> = m.difference(&e).map(|s| s.to_string()).collect();
        if !only_export.is_empty() {
            d.missing_in_metadata.insert(pid.clone(), only_export);
        }
        if !only_meta.is_empty() {
            d.missing_in_export.insert(pid.clone(), only_meta);
        }
    }
    d
}

pub fn analyze(layout: &Layout, export: Option<&Path>) -> LinkReport {
    let meta = metadata_links(layout);
    let export = load_export(export);
    let all = build_all_links(&meta, &export);
    let classifier = Classifier::from_layout(layout);
    debug!(urls = all.len(), policies = meta.len(), "analyzing links");
    LinkReport {
        suspicious: classifier.suspicious(&all),
        highly_shared: highly_shared(&all),
        discrepancies: diff_sources(&meta, &export),
        counts: LinkCounts {
            policies: meta.len(),
            unique_links: all.len(),
        },
    }
}

pub fn render_human(r: &LinkReport) -> String {
    let mut lines = vec!["Link Audit Summary:".to_string()];
    for cat in CATEGORIES {
        lines.push(format!("  {cat}: {}", r.suspicious.get(cat).len()));
    }
    if !r.highly_shared.is_empty() {
        lines.push("  highly_shared (top):".to_string());
        for e in r.highly_shared.iter().take(10) {
            lines.push(format!("    - {} ({} policies)", e.url, e.policy_count));
        }
    }
    lines.push(format!(
        "Discrepancies: missing_in_metadata={} policies, missing_in_export={} policies",
        r.discrepancies.missing_in_metadata.len(),
        r.discrepancies.missing_in_export.len()
    ));
    lines.join("\n")
}

pub fn render_markdown(r: &LinkReport) -> String {
    let mut lines: Vec<String> = vec![
        "# Link Audit Report".into(),
        String::new(),
        "## Summary Counts".into(),
        String::new(),
        "| Category | Count |".into(),
        "|----------|-------|".into(),
    ];
    for cat in CATEGORIES {
        lines.push(format!("| {cat} | {} |", r.suspicious.get(cat).len()));
    }
    lines.push(format!("| highly_shared | {} |", r.highly_shared.len()));
    lines.push(String::new());

    for cat in CATEGORIES {
        let urls = r.suspicious.get(cat);
        if urls.is_empty() {
            continue;
        }
        lines.push(format!("## {cat} ({})", urls.len()));
        lines.extend(urls.iter().take(MARKDOWN_LIST_CAP).map(|u| format!("- {u}")));
        if urls.len() > MARKDOWN_LIST_CAP {
            lines.push(format!("... ({} more omitted)", urls.len() - MARKDOWN_LIST_CAP));
        }
        lines.push(String::new());
    }

    if !r.highly_shared.is_empty() {
        lines.push(format!("## highly_shared (top {})", r.highly_shared.len().min(10)));
        for e in r.highly_shared.iter().take(10) {
            lines.push(format!("- {} ({} policies)", e.url, e.policy_count));
        }
        lines.push(String::new());
    }

    let tables = [
        ("Links Only In Export", &r.discrepancies.missing_in_metadata),
        ("Links Only In Metadata", &r.discrepancies.missing_in_export),
    ];
    for (title, mapping) in tables {
        lines.push(format!("## {title} ({})", mapping.len()));
        if !mapping.is_empty() {
            lines.push("| Policy ID | Links |".into());
            lines.push("|-----------|-------|".into());
            for (pid, links) in mapping {
                let shown: Vec<&str> = links.iter().take(MARKDOWN_TABLE_CAP).map(String::as_str).collect();
                lines.push(format!("| {pid} | {} |", shown.join("<br>")));
                if links.len() > MARKDOWN_TABLE_CAP {
                    lines.push(format!(
                        "| {pid} (continued) | ... {} more |",
                        links.len() - MARKDOWN_TABLE_CAP
                    ));
                }
            }
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Upsert today's row of category counts into the trend CSV, keeping rows
/// ordered by date.
pub fn write_history(report: &LinkReport, path: &Path, today: &str) -> anyhow::Result<()> {
    let header: Vec<String> = std::iter::once("date")
        .chain(HISTORY_COLUMNS)
        .map(str::to_string)
        .collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    if path.is_file() {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;
        let existing: Vec<Vec<String>> = rdr
            .records()
            .filter_map(|r| r.ok())
            .map(|r| r.iter().map(str::to_string).collect())
            .collect();
        if let Some(first) = existing.first() {
            let first_trimmed: Vec<String> = first.iter().map(|h| h.trim().to_string()).collect();
            let first_is_data = first.first().map(|c| c.starts_with("20")).unwrap_or(false);
            rows = if first_trimmed != header && first_is_data {
                existing
            } else {
                existing[1..].to_vec()
            };
        }
    }
    rows.retain(|r| r.first().map(String::as_str) != Some(today));
    rows.push(
        std::iter::once(today.to_string())
            .chain(HISTORY_COLUMNS.iter().map(|c| report.history_count(c).to_string()))
            .collect(),
    );
    rows.sort_by(|a, b| a.first().cmp(&b.first()));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    wtr.write_record(&header)?;
    for r in &rows {
        wtr.write_record(r)?;
    }
    wtr.flush()?;
    Ok(())
}

fn category_sets(report: &Value) -> BTreeMap<&'static str, BTreeSet<String>> {
    let susp = report.get("suspicious");
    DRIFT_CATEGORIES
        .iter()
        .map(|cat| {
            let urls = susp
                .and_then(|s| s.get(*cat))
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|u| u.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            (*cat, urls)
        })
        .collect()
}

fn drift(base: &BTreeSet<String>, cur: &BTreeSet<String>) -> CategoryDrift {
    let added: Vec<String> = cur.difference(base).cloned().collect();
    let removed: Vec<String> = base.difference(cur).cloned().collect();
    CategoryDrift {
        added_count: added.len(),
        removed_count: removed.len(),
        added,
        removed,
    }
}

/// Added/removed URLs per category between two `analyze` reports.
pub fn baseline_diff(baseline: &Value, current: &Value) -> BaselineDiff {
    let base = category_sets(baseline);
    let cur = category_sets(current);
    let empty = BTreeSet::new();
    let d = |cat: &str| drift(base.get(cat).unwrap_or(&empty), cur.get(cat).unwrap_or(&empty));
    let mut out = BaselineDiff {
        non_https: d("non_https"),
        vendor: d("vendor"),
        tracking_query: d("tracking_query"),
        celex_pdf: d("celex_pdf"),
        long: d("long"),
        totals: DriftTotals::default(),
    };
    for c in out.categories() {
        out.totals.added += c.1.added_count;
        out.totals.removed += c.1.removed_count;
    }
    out
}

impl BaselineDiff {
    pub fn categories(&self) -> [(&'static str, CategoryDrift); 5] {
        [
            ("non_https", self.non_https.clone()),
            ("vendor", self.vendor.clone()),
            ("tracking_query", self.tracking_query.clone()),
            ("celex_pdf", self.celex_pdf.clone()),
            ("long", self.long.clone()),
        ]
    }

    pub fn drift(&self) -> usize {
        self.totals.added + self.totals.removed
    }
}

fn sample(urls: &[String]) -> String {
    let mut s = urls.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
    if urls.len() > 5 {
        s.push_str(" ...");
    }
    s
}

pub fn render_diff(diff: &BaselineDiff) -> String {
    let mut lines = vec![
        "Link Audit Baseline Diff:".to_string(),
        "category | added | removed".to_string(),
        "---------|-------|--------".to_string(),
    ];
    let cats = diff.categories();
    for (cat, c) in &cats {
        lines.push(format!("{cat} | {} | {}", c.added_count, c.removed_count));
    }
    lines.push(format!("TOTAL | {} | {}", diff.totals.added, diff.totals.removed));
    for (cat, c) in &cats {
        if c.added_count > 0 {
            lines.push(format!("  {cat} added: {}", sample(&c.added)));
        }
        if c.removed_count > 0 {
            lines.push(format!("  {cat} removed: {}", sample(&c.removed)));
        }
    }
    lines.join("\n")
}

/// Policy ids referenced anywhere in `dist/coverage.json`.
pub fn coverage_ids(data: &Value) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    let Some(regs) = data.as_array() else {
        return ids;
    };
    for reg in regs {
        let sections = reg.get("sections").and_then(Value::as_array);
        for sec in sections.into_iter().flatten() {
            let pols = sec.get("policies").and_then(Value::as_array);
            for pol in pols.into_iter().flatten() {
                if let Some(pid) = pol.get("id").and_then(Value::as_str) {
                    ids.insert(pid.to_string());
                }
            }
        }
    }
    ids
}

/// Links as a flat list; the mapping form `{label: url | [url]}` is flattened.
fn flat_links(v: Option<&Yaml>) -> Vec<String> {
    let raw: Vec<String> = match v {
        Some(Yaml::Sequence(items)) => items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect(),
        Some(Yaml::Mapping(m)) => m
            .values()
            .flat_map(|v| match v {
                Yaml::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
                Yaml::String(s) => vec![s.clone()],
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    };
    raw.into_iter().filter(|l| !l.trim().is_empty()).collect()
}

pub fn find_uncovered(layout: &Layout, covered: &BTreeSet<String>) -> NoCoverageReport {
    let mut missing: Vec<UncoveredPolicy> = load_all_metadata(&layout.policies, true)
        .into_iter()
        .filter_map(|doc| {
            let links = flat_links(doc.data.get("links"));
            (!links.is_empty() && !covered.contains(&doc.id)).then(|| UncoveredPolicy {
                id: doc.id,
                links_count: links.len(),
            })
        })
        .collect();
    missing.sort_by(|a, b| a.id.cmp(&b.id));
    NoCoverageReport {
        count: missing.len(),
        missing_coverage: missing,
    }
}

pub fn render_uncovered(r: &NoCoverageReport) -> anyhow::Result<String> {
    let mut lines = vec![format!(
        "Policies with metadata.links but NO coverage entries: {}",
        r.count
    )];
    if r.missing_coverage.is_empty() {
        lines.push("(none)".into());
        return Ok(lines.join("\n"));
    }
    let width = r.missing_coverage.iter().map(|m| m.id.len()).max().unwrap_or(0);
    lines.push(format!("{:<width$} | links_count", "policy_id"));
    lines.push(format!("{}-+------------", "-".repeat(width)));
    for m in &r.missing_coverage {
        lines.push(format!("{:<width$} | {}", m.id, m.links_count));
    }
    lines.push(String::new());
    lines.push("JSON:".into());
    lines.push(serde_json::to_string_pretty(r)?);
    Ok(lines.join("\n"))
}

pub struct AuditOptions {
    pub live: bool,
    pub timeout: Duration,
    pub workers: usize,
}

fn head_check(client: &reqwest::blocking::Client, url: &str) -> LiveResult {
    match client.head(url).send() {
        Ok(resp) => LiveResult {
            status: Some(resp.status().as_u16()),
            final_url: Some(resp.url().to_string()),
        },
        Err(e) => LiveResult {
            status: None,
            final_url: Some(e.to_string()),
        },
    }
}

/// HEAD every url on a pool of `workers` threads, following redirects.
pub fn live_check(urls: &[String], opts: &AuditOptions) -> anyhow::Result<BTreeMap<String, LiveResult>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(opts.timeout)
        .user_agent(USER_AGENT)
        .build()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers.max(1))
        .build()?;
    let results: Vec<(String, LiveResult)> = pool.install(|| {
        urls.par_iter()
            .map(|u| (u.clone(), head_check(&client, u)))
            .collect()
    });
    Ok(results.into_iter().collect())
}

pub fn audit(layout: &Layout, opts: &AuditOptions) -> anyhow::Result<AuditReport> {
    let docs = load_all_metadata(&layout.policies, true);
    let mut issues: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut global: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut dupes = 0usize;
    let mut empty = 0usize;
    let mut non_https = BTreeSet::new();
    let mut hints = BTreeSet::new();

    for doc in &docs {
        let links = link_strings(doc.data.get("links"));
        let has_any = match doc.data.get("links") {
            Some(Yaml::Sequence(s)) => !s.is_empty(),
            Some(Yaml::Null) | None => false,
            Some(Yaml::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if !has_any {
            empty += 1;
            issues.entry(doc.id.clone()).or_default().push("no_links".into());
            continue;
        }
        let mut seen = HashSet::new();
        for url in links {
            let url = url.trim().to_string();
            if !seen.insert(url.clone()) {
                dupes += 1;
                issues
                    .entry(doc.id.clone())
                    .or_default()
                    .push(format!("duplicate:{url}"));
            }
            global.entry(url.clone()).or_default().insert(doc.id.clone());
            if url.starts_with("http://") {
                non_https.insert(url.clone());
            }
            if VERSION_HINTS.iter().any(|re| re.is_match(&url)) {
                hints.insert(url);
            }
        }
    }

    let mut shared: Vec<SharedUrl> = global
        .iter()
        .filter(|(_, pids)| pids.len() > AUDIT_SHARED_MIN)
        .map(|(url, pids)| SharedUrl {
            url: url.clone(),
            count: pids.len(),
            sample_policies: pids.iter().take(10).cloned().collect(),
        })
        .collect();
    shared.sort_by(|a, b| b.count.cmp(&a.count));
    shared.truncate(AUDIT_TOP);

    let mut domains: HashMap<String, usize> = HashMap::new();
    for url in global.keys() {
        let probe = format!("{url}/");
        if let Some(c) = DOMAIN_RE.captures(&probe) {
            *domains.entry(c[1].to_lowercase()).or_default() += 1;
        }
    }
    let mut top_domains: Vec<(String, usize)> = domains.into_iter().collect();
    top_domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_domains.truncate(AUDIT_TOP);

    let live = if opts.live {
        let urls: Vec<String> = global.keys().cloned().collect();
        let results = live_check(&urls, opts)?;
        for (url, r) in &results {
            if let Some(sc) = r.status.filter(|s| *s >= 400) {
                issues
                    .entry("_live".to_string())
                    .or_default()
                    .push(format!("dead:{url}:{sc}"));
            }
        }
        Some(results)
    } else {
        None
    };

    Ok(AuditReport {
        policy_count: docs.len(),
        policies_without_links: empty,
        per_policy_duplicate_link_occurrences: dupes,
        non_https_urls: non_https.into_iter().collect(),
        outdated_version_hints: hints.into_iter().collect(),
        top_shared_urls: shared,
        top_domains,
        live,
        issues_index: issues,
    })
}

impl AuditReport {
    pub fn has_issues(&self) -> bool {
        self.policies_without_links > 0
            || self.per_policy_duplicate_link_occurrences > 0
            || !self.non_https_urls.is_empty()
    }
}

pub fn render_audit_summary(r: &AuditReport) -> String {
    let mut lines = vec![
        format!("Policies: {}", r.policy_count),
        format!("Policies without links: {}", r.policies_without_links),
        format!(
            "Per-policy duplicate link occurrences: {}",
            r.per_policy_duplicate_link_occurrences
        ),
        format!("Non-HTTPS URLs: {}", r.non_https_urls.len()),
        format!("Outdated version hints: {}", r.outdated_version_hints.len()),
        "Top domains:".to_string(),
    ];
    for (dom, cnt) in r.top_domains.iter().take(10) {
        lines.push(format!("  {dom}: {cnt}"));
    }
    lines.join("\n")
}

fn is_soft(status: Option<&Value>) -> bool {
    matches!(status.and_then(Value::as_i64), Some(429) | Some(500..=599))
}

fn display(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => "None".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn failure_line(f: &LycheeFailure) -> String {
    format!(
        "  {} {} (source: {} line {})",
        display(f.status.as_ref()),
        display(f.link.as_ref()),
        display(f.source.as_ref()),
        display(f.line.as_ref())
    )
}

/// Grade a lychee JSON report. `Err` carries the parse failure.
pub fn classify_lychee(raw: &str) -> Result<LycheeVerdict, String> {
    let data: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let obj = data.as_object().ok_or("top-level value is not an object")?;
    let errors: Vec<LycheeFailure> = match obj.get("errors") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| serde_json::from_value(i.clone()).map_err(|e| e.to_string()))
            .collect::<Result<_, _>>()?,
        Some(_) => return Err("'errors' is not a list".to_string()),
    };
    if errors.is_empty() {
        return Ok(LycheeVerdict {
            soft: 0,
            hard: 0,
            lines: vec![
                "[classify-lychee] No errors remaining (previous attempts likely transient)".into(),
            ],
        });
    }
    let (soft, hard): (Vec<_>, Vec<_>) = errors.iter().partition(|e| is_soft(e.status.as_ref()));
    let mut lines = Vec::new();
    if !hard.is_empty() {
        lines.push("[classify-lychee] Hard link failures detected:".to_string());
        lines.extend(hard.iter().map(|f| failure_line(f)));
        if !soft.is_empty() {
            lines.push(
                "[classify-lychee] Soft/transient failures (ignored for success criteria):"
                    .to_string(),
            );
            lines.extend(soft.iter().map(|f| failure_line(f)));
        }
    } else {
        lines.push(
            "[classify-lychee] Only soft/transient link failures (treated as success):".to_string(),
        );
        lines.extend(soft.iter().map(|f| failure_line(f)));
    }
    Ok(LycheeVerdict {
        soft: soft.len(),
        hard: hard.len(),
        lines,
    })
}
