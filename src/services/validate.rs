use crate::domain::constants::{ENV_STRICT_EMPTY_PATHS, METADATA_FILE};
use crate::domain::models::{PluginIndexValidation, SchemaViolation, ValidationReport};
use crate::services::metadata::derived_id;
use crate::store::{field_nonempty, find_named, map_files, normalize_paths, read_yaml, Layout};
use anyhow::anyhow;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

pub const METADATA_SCHEMA: &str = include_str!("../../docs/contracts/policy-metadata.schema.json");
pub const MAP_SCHEMA: &str = include_str!("../../docs/contracts/compliance-map.schema.json");
pub const PLUGIN_INDEX_SCHEMA: &str = include_str!("../../docs/contracts/plugin-index.schema.json");

pub fn compile_schema(schema: &Value) -> anyhow::Result<JSONSchema> {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| anyhow!("invalid JSON schema: {e}"))
}

fn compile_embedded(src: &str) -> anyhow::Result<JSONSchema> {
    compile_schema(&serde_json::from_str(src)?)
}

fn pointer(p: String) -> String {
    if p.is_empty() {
        "/".to_string()
    } else {
        p
    }
}

/// Draft 7 violations of `instance`, ordered by instance pointer.
pub fn schema_violations(validator: &JSONSchema, instance: &Value) -> Vec<SchemaViolation> {
    let mut out: Vec<SchemaViolation> = match validator.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| SchemaViolation {
                pointer: pointer(e.instance_path.to_string()),
                message: e.to_string(),
                schema_path: e
                    .schema_path
                    .to_string()
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                instance: e.instance.clone().into_owned(),
            })
            .collect(),
    };
    out.sort_by(|a, b| a.pointer.cmp(&b.pointer));
    out
}

fn yaml_as_json(doc: &serde_yaml::Value) -> Result<Value, String> {
    match doc {
        serde_yaml::Value::Null => Ok(Value::Object(Default::default())),
        other => serde_json::to_value(other).map_err(|e| e.to_string()),
    }
}

impl ValidationReport {
    fn error(&mut self, msg: String) {
        self.errors += 1;
        self.messages.push(msg);
    }

    fn warning(&mut self, msg: String) {
        self.warnings += 1;
        self.messages.push(msg);
    }
}

pub fn validate_metadata(layout: &Layout) -> anyhow::Result<ValidationReport> {
    let validator = compile_embedded(METADATA_SCHEMA)?;
    let strict = std::env::var(ENV_STRICT_EMPTY_PATHS).as_deref() == Ok("1");
    let mut report = ValidationReport::default();
    let mut ids: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for meta in find_named(&layout.policies, METADATA_FILE) {
        let rel = layout.rel(&meta);
        let doc = match read_yaml(&meta) {
            Ok(d) => d,
            Err(e) => {
                report.error(format!("Schema error in {rel}: YAML parse error: {e}"));
                continue;
            }
        };
        match yaml_as_json(&doc) {
            Ok(json) => {
                for v in schema_violations(&validator, &json) {
                    report.error(format!("Schema error in {rel}: {}", v.message));
                }
            }
            Err(e) => report.error(format!("Schema error in {rel}: {e}")),
        }
        let empty = serde_yaml::Mapping::new();
        let data = doc.as_mapping().unwrap_or(&empty);
        if let Some(pid) = field_nonempty(data, "id") {
            ids.entry(pid).or_default().push(rel.clone());
        }
        if !data.contains_key("path") {
            report.error(format!("Missing required 'path' in {rel}"));
        }
        let paths = normalize_paths(data.get("path"));
        if paths.is_empty() {
            let msg = format!(
                "Warning: Empty path list in {rel}. Replace placeholder path: [] with actual file path(s) when available."
            );
            if strict {
                report.error(msg);
            } else {
                report.warning(msg);
            }
        }
        for p in &paths {
            if !layout.root.join(p).exists() {
                report.error(format!("Path not found in {rel}: {p}"));
            }
        }
    }

    for (pid, files) in &ids {
        if files.len() > 1 {
            report.messages.push(format!(
                "Duplicate policy id '{pid}' found in multiple files: {}",
                files.join(", ")
            ));
            report.errors += files.len() - 1;
        }
    }
    Ok(report)
}

/// Explicit ids plus `<domain>.<short>` for metadata files without one.
pub fn known_policy_ids(layout: &Layout) -> HashSet<String> {
    find_named(&layout.policies, METADATA_FILE)
        .into_iter()
        .filter_map(|meta| {
            let explicit = read_yaml(&meta)
                .ok()
                .and_then(|d| d.as_mapping().and_then(|m| field_nonempty(m, "id")));
            explicit.or_else(|| derived_id(&layout.policies, &meta))
        })
        .collect()
}

fn section_policies(val: &serde_yaml::Value) -> Vec<String> {
    match val.get("policies") {
        Some(serde_yaml::Value::Sequence(items)) => items
            .iter()
            .filter_map(crate::store::scalar_string)
            .collect(),
        _ => Vec::new(),
    }
}

pub fn validate_maps(layout: &Layout) -> anyhow::Result<ValidationReport> {
    let validator = compile_embedded(MAP_SCHEMA)?;
    let known = known_policy_ids(layout);
    let mut report = ValidationReport::default();

    for mp in map_files(&layout.maps) {
        let rel = layout.rel(&mp);
        let doc = match read_yaml(&mp) {
            Ok(d) => d,
            Err(e) => {
                report.error(format!("Schema error in {rel}: YAML parse error: {e}"));
                continue;
            }
        };
        match yaml_as_json(&doc) {
            Ok(json) => {
                for v in schema_violations(&validator, &json) {
                    report.error(format!("Schema error in {rel}: {}", v.message));
                }
            }
            Err(e) => report.error(format!("Schema error in {rel}: {e}")),
        }
        let Some(sections) = doc.get("sections").and_then(|s| s.as_mapping()) else {
            continue;
        };
        let mut seen = HashSet::new();
        let mut dups = BTreeSet::new();
        let mut unknown = BTreeSet::new();
        for (sec, val) in sections {
            let pols = section_policies(val);
            if pols.is_empty() {
                let sec = crate::store::scalar_string(sec).unwrap_or_default();
                report.warning(format!(
                    "Warning: section '{sec}' in {rel} has no policies listed"
                ));
            }
            for pid in pols {
                if !known.contains(&pid) {
                    unknown.insert(pid.clone());
                }
                if !seen.insert(pid.clone()) {
                    dups.insert(pid);
                }
            }
        }
        if !dups.is_empty() {
            report.warning(format!(
                "Warning: duplicate policies in {rel}: {}",
                dups.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        if !unknown.is_empty() {
            report.messages.push(format!(
                "Unknown policy id(s) referenced in {rel}: {}",
                unknown.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
            report.errors += unknown.len();
        }
    }
    Ok(report)
}

/// Why the plugin index could not be validated at all.
#[derive(thiserror::Error, Debug)]
pub enum IndexInputError {
    #[error("{0}")]
    Missing(String),
    #[error("{0}")]
    Parse(String),
}

fn read_json(path: &Path, what: &str) -> Result<Value, IndexInputError> {
    if !path.exists() {
        return Err(IndexInputError::Missing(format!(
            "{what} not found: {}",
            path.display()
        )));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| IndexInputError::Missing(format!("{what} unreadable: {e}")))?;
    serde_json::from_str(&raw).map_err(|e| IndexInputError::Parse(e.to_string()))
}

pub fn validate_plugin_index(
    index: &Path,
    schema: Option<&Path>,
) -> Result<PluginIndexValidation, IndexInputError> {
    let schema_value = match schema {
        Some(p) => read_json(p, "Schema")?,
        None => serde_json::from_str(PLUGIN_INDEX_SCHEMA)
            .map_err(|e| IndexInputError::Parse(e.to_string()))?,
    };
    let data = read_json(index, "Index")?;
    let validator =
        compile_schema(&schema_value).map_err(|e| IndexInputError::Parse(e.to_string()))?;
    let errors = schema_violations(&validator, &data);
    Ok(PluginIndexValidation {
        valid: errors.is_empty(),
        errors,
    })
}

pub fn render_index_report(result: &Result<PluginIndexValidation, IndexInputError>) -> String {
    let mut md = String::from("# Plugin Index Validation Report\n\n");
    match result {
        Ok(v) if v.valid => md.push_str("Schema valid\n"),
        Ok(v) => {
            md.push_str("Schema validation errors:\n\n");
            for e in &v.errors {
                md.push_str(&format!(
                    "- Pointer: `{}`\n  - Message: {}\n",
                    e.pointer, e.message
                ));
            }
        }
        Err(IndexInputError::Missing(m)) => md.push_str(&format!("Missing file: {m}\n")),
        Err(IndexInputError::Parse(m)) => md.push_str(&format!("JSON parse error: {m}\n")),
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_schemas_compile() {
        for src in [METADATA_SCHEMA, MAP_SCHEMA, PLUGIN_INDEX_SCHEMA] {
            assert!(compile_embedded(src).is_ok());
        }
    }

    #[test]
    fn violations_carry_pointer_and_schema_path() {
        let v = compile_embedded(PLUGIN_INDEX_SCHEMA).unwrap();
        let errs = schema_violations(&v, &json!({"packages": [{"id": "a"}]}));
        assert!(!errs.is_empty());
        assert!(errs.iter().all(|e| e.pointer == "/packages/0"));
        assert!(errs[0].schema_path.contains(&"required".to_string()));

        let errs = schema_violations(&v, &json!({}));
        assert_eq!(errs[0].pointer, "/");
    }

    #[test]
    fn metadata_schema_accepts_nested_standard() {
        let v = compile_embedded(METADATA_SCHEMA).unwrap();
        let ok = json!({"id": "gdpr.x", "name": "X", "standard": {"name": "GDPR", "version": 2016}});
        assert!(schema_violations(&v, &ok).is_empty());
        let bad = json!({"id": "gdpr.x", "name": "X", "standard": 5});
        assert!(!schema_violations(&v, &bad).is_empty());
    }

    #[test]
    fn missing_index_is_a_typed_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = tmp.path().join("dist/index.json");
        let err = validate_plugin_index(&index, None).unwrap_err();
        assert!(matches!(err, IndexInputError::Missing(_)));
        let dyn_err: &dyn std::error::Error = &err;
        assert!(dyn_err.to_string().starts_with("Index not found: "));
    }

    #[test]
    fn index_report_lists_each_violation() {
        let result = Ok(PluginIndexValidation {
            valid: false,
            errors: vec![SchemaViolation {
                pointer: "/packages/0".into(),
                message: "\"name\" is a required property".into(),
                schema_path: vec![],
                instance: json!({}),
            }],
        });
        let md = render_index_report(&result);
        assert!(md.contains("- Pointer: `/packages/0`\n  - Message: \"name\" is a required property\n"));
        let md = render_index_report(&Err(IndexInputError::Missing("Index not found: x".into())));
        assert!(md.ends_with("Missing file: Index not found: x\n"));
    }
}
