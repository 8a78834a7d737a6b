pub const DEFAULT_POLICIES_DIR: &str = "policies";
pub const DEFAULT_MAPS_DIR: &str = "compliance/maps";
pub const DEFAULT_DIST_DIR: &str = "dist";
pub const DEFAULT_DOCS_DIR: &str = "docs";
pub const SETTINGS_FILE: &str = "rulehub.toml";

pub const METADATA_FILE: &str = "metadata.yaml";
pub const POLICY_FILE: &str = "policy.rego";
pub const POLICY_TEST_FILE: &str = "policy_test.rego";

pub const REPO_URL_BASE_DEFAULT: &str = "https://github.com/rulehub/rulehub/blob/main/";
pub const INDEX_SCHEMA_VERSION_DEFAULT: i64 = 1;
pub const LONG_URL_THRESHOLD_DEFAULT: usize = 180;

pub const ENV_METADATA_CACHE: &str = "RULEHUB_METADATA_CACHE";
pub const ENV_INDEX_SCHEMA_VERSION: &str = "RULEHUB_INDEX_SCHEMA_VERSION";
pub const ENV_DISABLE_SCHEMA_VERSION: &str = "RULEHUB_DISABLE_SCHEMA_VERSION";
pub const ENV_REPO_URL_BASE: &str = "RULEHUB_REPO_URL_BASE";
pub const ENV_STRICT_EMPTY_PATHS: &str = "STRICT_EMPTY_PATHS";
pub const ENV_FAIL_LINK_AUDIT: &str = "FAIL_LINK_AUDIT";
pub const ENV_OUTPUT_FORMAT: &str = "OUTPUT_FORMAT";
pub const ENV_JSON_ONLY: &str = "JSON_ONLY";
pub const ENV_REQUIRED_DUAL_PCT: &str = "REQUIRED_DUAL_PCT";
pub const ENV_ALLOW_MULTI_INADEQUATE: &str = "ALLOW_MULTI_INADEQUATE";
pub const ENV_VERBOSE: &str = "VERBOSE";
pub const ENV_BUILDER_ID: &str = "BUILDER_ID";
pub const ENV_WORKFLOW_REF: &str = "WORKFLOW_REF";
pub const ENV_LOG: &str = "RULEHUB_LOG";

pub const VENDOR_DOMAINS: &[&str] = &["sportradar.com", "emvco.com", "styra.com", "upguard.com"];
pub const VENDOR_POLICY_FILE: &str = "links_vendor_policies.json";

pub const IN_TOTO_STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v0.1";
pub const SLSA_PREDICATE_TYPE: &str = "https://slsa.dev/provenance/v0.2";
pub const DEFAULT_BUILDER_ID: &str = "rulehub/local";
pub const DEFAULT_BUILD_TYPE: &str = "make://opa-bundle";

pub const BUNDLE_FILE: &str = "opa-bundle.tar.gz";
pub const BUNDLE_MANIFEST_FILE: &str = "opa-bundle.manifest.json";
pub const DIST_MANIFEST_FILE: &str = "dist.manifest.json";
pub const PROVENANCE_FILE: &str = "opa-bundle.provenance.json";
pub const MANIFEST_SCHEMA_VERSION_DEFAULT: i64 = 1;

pub const COVERAGE_JSON_FILE: &str = "coverage.json";
pub const PLUGIN_INDEX_FILE: &str = "index.json";
pub const PLUGIN_METADATA_EXPORT_FILE: &str = "plugin-index-metadata.json";
pub const TEST_COVERAGE_FILE: &str = "policy-test-coverage.json";
pub const TEST_PRIORITIES_FILE: &str = "policy-test-priorities.md";
pub const INTEGRITY_DIR: &str = "integrity";
pub const INDEX_VALIDATION_MD: &str = "plugin_index_validation.md";
pub const INDEX_VALIDATION_JSON: &str = "plugin_index_validation.json";
pub const LINKS_BASELINE_FILE: &str = "links_audit_baseline.json";
pub const LINKS_REPORT_FILE: &str = "links_audit_report.json";
