use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Serialize)]
pub struct JsonOut<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub links: LinkSettings,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PathSettings {
    pub policies: Option<String>,
    pub maps: Option<String>,
    pub dist: Option<String>,
    pub docs: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct CatalogSettings {
    pub repo_url_base: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LinkSettings {
    #[serde(default)]
    pub vendor_domains: Vec<String>,
    pub long_url_threshold: Option<usize>,
}

/// One `metadata.yaml` as returned by the snapshot loader.
#[derive(Debug, Clone)]
pub struct MetadataDoc {
    pub id: String,
    pub file: PathBuf,
    pub data: serde_yaml::Mapping,
}

/// Normalized metadata record keyed by policy id in the catalog index.
#[derive(Debug, Clone, Default)]
pub struct PolicyMeta {
    pub name: Option<String>,
    pub standard: Option<String>,
    pub version: Option<String>,
    pub paths: Vec<String>,
    pub description: Option<String>,
    pub framework: Option<String>,
    pub severity: Option<String>,
    pub owner: Option<String>,
    pub tags: Option<Vec<String>>,
    pub links: Option<Value>,
    pub geo: Option<Value>,
    pub jurisdiction: Option<Vec<String>>,
    pub policy_dir: String,
}

#[derive(Debug, Clone)]
pub struct ComplianceMap {
    pub file: PathBuf,
    pub regulation: Option<String>,
    pub version: Option<String>,
    pub sections: Vec<MapSection>,
}

#[derive(Debug, Clone)]
pub struct MapSection {
    pub id: String,
    pub title: Option<String>,
    pub policies: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PathStatus {
    pub path: String,
    pub exists: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct PolicyIndexEntry {
    pub id: String,
    pub name: Option<String>,
    pub standard: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub framework: Option<String>,
    pub severity: Option<String>,
    pub paths: Vec<PathStatus>,
    pub geo: Option<Value>,
}

#[derive(Serialize)]
pub struct PolicyIndex<'a> {
    pub policies: &'a [PolicyIndexEntry],
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CoverageRegulation {
    pub regulation: Option<String>,
    pub version: Option<String>,
    pub sections: Vec<CoverageSection>,
    pub totals: CoverageTotals,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CoverageSection {
    pub section: String,
    pub title: String,
    pub policies: Vec<CoveragePolicy>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CoveragePolicy {
    pub id: String,
    pub found: bool,
    pub name: Option<String>,
    pub paths: Vec<PathStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CoverageTotals {
    pub covered: usize,
    pub total: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ArtifactLink {
    pub path: String,
    pub url: String,
}

/// Package entry of the Backstage plugin index (`dist/index.json`).
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    pub name: String,
    pub standard: String,
    pub version: String,
    pub coverage: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<PathStatus>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyverno: Option<Vec<ArtifactLink>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gatekeeper: Option<Vec<ArtifactLink>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PluginIndex {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i64>,
    pub packages: Vec<Package>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MetadataPackage {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Vec<String>>,
}

#[derive(Serialize, Debug)]
pub struct PresenceCoverage {
    pub tested: usize,
    pub total: usize,
    pub percent: f64,
    pub missing: Vec<String>,
}

#[derive(Serialize)]
pub struct CatalogReport {
    pub policies: usize,
    pub maps: usize,
    pub written: Vec<String>,
    pub timings: Vec<StageTiming>,
}

#[derive(Serialize, Clone)]
pub struct StageTiming {
    pub stage: String,
    pub seconds: f64,
}

#[derive(Serialize)]
pub struct WriteOutcome {
    pub path: String,
    pub changed: bool,
    pub packages: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PolicyTestDetail {
    pub policy: String,
    pub test: Option<String>,
    pub has_test: bool,
    pub deny_rule_count: usize,
    pub deny_test_assertions: usize,
    pub has_pass_assertion: bool,
    pub dual_direction: bool,
    pub adequate_multi_rule: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InadequatePolicy {
    pub policy: String,
    pub deny_rules: usize,
    pub deny_test_assertions: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DualDirection {
    pub count: usize,
    pub percent: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MultiRule {
    pub policies_with_multi: usize,
    pub adequate: usize,
    pub count_inadequate: usize,
    pub list_inadequate: Vec<InadequatePolicy>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestCoverageReport {
    pub tested: usize,
    pub total: usize,
    pub percent: f64,
    pub dual_direction: DualDirection,
    pub multi_rule: MultiRule,
    pub details: Vec<PolicyTestDetail>,
}

#[derive(Serialize)]
pub struct ThresholdReport {
    pub dual_percent: f64,
    pub required_dual_percent: i64,
    pub multi_inadequate: i64,
    pub allowed_multi_inadequate: i64,
    pub failures: Vec<String>,
}

/// Accumulated findings of a validator run.
#[derive(Serialize, Default, Debug)]
pub struct ValidationReport {
    pub errors: usize,
    pub warnings: usize,
    pub messages: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SchemaViolation {
    pub pointer: String,
    pub message: String,
    pub schema_path: Vec<String>,
    pub instance: Value,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PluginIndexValidation {
    pub valid: bool,
    pub errors: Vec<SchemaViolation>,
}

#[derive(Serialize, Debug)]
pub struct DupeReport {
    pub map: String,
    pub sections: Vec<SectionDupes>,
    pub removed: usize,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct SectionDupes {
    pub section: String,
    pub policies: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct BackfillChange {
    pub file: String,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub jurisdiction: Option<Vec<String>>,
}

#[derive(Serialize, Debug)]
pub struct BackfillReport {
    pub mode: String,
    pub examined: usize,
    pub updated: Vec<BackfillChange>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SuspiciousLinks {
    #[serde(default)]
    pub non_https: Vec<String>,
    #[serde(default)]
    pub vendor: Vec<String>,
    #[serde(default)]
    pub long: Vec<String>,
    #[serde(default)]
    pub tracking_query: Vec<String>,
    #[serde(default)]
    pub celex_pdf: Vec<String>,
    #[serde(default)]
    pub external_source_code: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SharedLink {
    pub url: String,
    pub policy_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Discrepancies {
    pub missing_in_metadata: BTreeMap<String, Vec<String>>,
    pub missing_in_export: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LinkCounts {
    pub policies: usize,
    pub unique_links: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LinkReport {
    pub suspicious: SuspiciousLinks,
    pub highly_shared: Vec<SharedLink>,
    pub discrepancies: Discrepancies,
    pub counts: LinkCounts,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct CategoryDrift {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub added_count: usize,
    pub removed_count: usize,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct DriftTotals {
    pub added: usize,
    pub removed: usize,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct BaselineDiff {
    pub non_https: CategoryDrift,
    pub vendor: CategoryDrift,
    pub tracking_query: CategoryDrift,
    pub celex_pdf: CategoryDrift,
    pub long: CategoryDrift,
    pub totals: DriftTotals,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UncoveredPolicy {
    pub id: String,
    pub links_count: usize,
}

#[derive(Serialize, Debug)]
pub struct NoCoverageReport {
    pub missing_coverage: Vec<UncoveredPolicy>,
    pub count: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct SharedUrl {
    pub url: String,
    pub count: usize,
    pub sample_policies: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct LiveResult {
    pub status: Option<u16>,
    #[serde(rename = "final")]
    pub final_url: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct AuditReport {
    pub policy_count: usize,
    pub policies_without_links: usize,
    pub per_policy_duplicate_link_occurrences: usize,
    pub non_https_urls: Vec<String>,
    pub outdated_version_hints: Vec<String>,
    pub top_shared_urls: Vec<SharedUrl>,
    pub top_domains: Vec<(String, usize)>,
    pub live: Option<BTreeMap<String, LiveResult>>,
    pub issues_index: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LycheeFailure {
    pub status: Option<Value>,
    pub link: Option<Value>,
    pub source: Option<Value>,
    pub line: Option<Value>,
}

#[derive(Serialize, Debug)]
pub struct LycheeVerdict {
    pub soft: usize,
    pub hard: usize,
    pub lines: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct GeneratedTest {
    pub policy: String,
    pub test: String,
    pub flags: Vec<String>,
    pub written: bool,
    pub skipped: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BundleManifest {
    pub schema_version: i64,
    pub build_commit: String,
    pub build_time: String,
    pub policies: Vec<ManifestEntry>,
    pub aggregate_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DistManifest {
    pub schema_version: i64,
    pub build_commit: String,
    pub build_time: String,
    pub artifacts: Vec<ManifestEntry>,
    pub aggregate_hash: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Issue {
    pub level: String,
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct VerifyReport {
    pub manifest: String,
    pub checked: usize,
    pub issues: Vec<Issue>,
}

#[derive(Serialize, Debug)]
pub struct SecretFinding {
    pub path: String,
    pub line: usize,
    pub rule: String,
    pub masked: String,
}

#[derive(Serialize, Debug)]
pub struct SecretScanReport {
    pub findings: Vec<SecretFinding>,
    pub ignored: Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct UnicodeScanReport {
    pub report: String,
    pub scanned: usize,
    pub findings: Vec<String>,
}
