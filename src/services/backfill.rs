use crate::domain::constants::METADATA_FILE;
use crate::domain::models::{BackfillChange, BackfillReport};
use crate::services::derive::{derive_owner, derive_tags, framework_from_paths};
use crate::services::metadata::invalidate;
use crate::services::storage::write_text;
use crate::store::{field_nonempty, find_named, is_empty_value, normalize_paths, read_yaml, scalar_string};
use serde_yaml::{Mapping, Value};
use std::path::Path;

fn derive_jurisdiction(data: &Mapping) -> Option<Vec<String>> {
    if !is_empty_value(data.get("jurisdiction")) {
        return None;
    }
    let geo = data.get("geo").and_then(Value::as_mapping)?;
    if let Some(scope) = field_nonempty(geo, "scope") {
        return Some(vec![scope.trim().to_string()]);
    }
    let regions: Vec<String> = geo
        .get("regions")
        .and_then(Value::as_sequence)?
        .iter()
        .filter_map(scalar_string)
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    (!regions.is_empty()).then_some(regions)
}

fn seq(items: &[String]) -> Value {
    Value::Sequence(items.iter().cloned().map(Value::String).collect())
}

/// Fill `owner`, `tags` and `jurisdiction` in one metadata mapping when empty.
/// Returns the resulting values when anything changed.
pub fn backfill_mapping(data: &mut Mapping) -> Option<BackfillChange> {
    let pid = data.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())?.to_string();
    let paths = normalize_paths(data.get("path"));
    let framework = framework_from_paths(&paths);
    let std_name = match data.get("standard") {
        Some(Value::Mapping(s)) => s.get("name").and_then(scalar_string),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    let mut changed = false;

    if is_empty_value(data.get("owner")) {
        data.insert("owner".into(), Value::String(derive_owner(&pid)));
        changed = true;
    }
    let has_tags = matches!(data.get("tags"), Some(Value::Sequence(t)) if !t.is_empty());
    if !has_tags {
        let tags = derive_tags(&pid, framework, std_name.as_deref());
        data.insert("tags".into(), seq(&tags));
        changed = true;
    }
    if let Some(j) = derive_jurisdiction(data) {
        data.insert("jurisdiction".into(), seq(&j));
        changed = true;
    }
    if !changed {
        return None;
    }
    let list = |k: &str| match data.get(k) {
        Some(Value::Sequence(items)) => Some(items.iter().filter_map(scalar_string).collect()),
        _ => None,
    };
    Some(BackfillChange {
        file: String::new(),
        owner: data.get("owner").and_then(scalar_string),
        tags: list("tags").unwrap_or_default(),
        jurisdiction: list("jurisdiction"),
    })
}

/// Walk every metadata file below `policies`; rewrite only when `write` is set.
pub fn backfill(policies: &Path, write: bool, rel: impl Fn(&Path) -> String) -> anyhow::Result<BackfillReport> {
    let files = find_named(policies, METADATA_FILE);
    let mut updated = Vec::new();
    for meta in &files {
        let mut doc = read_yaml(meta)?;
        let Some(data) = doc.as_mapping_mut() else {
            continue;
        };
        if let Some(mut change) = backfill_mapping(data) {
            if write {
                write_text(meta, &serde_yaml::to_string(&doc)?)?;
            }
            change.file = rel(meta);
            updated.push(change);
        }
    }
    if write && !updated.is_empty() {
        invalidate(Some(policies));
    }
    Ok(BackfillReport {
        mode: if write { "write" } else { "dry-run" }.to_string(),
        examined: files.len(),
        updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(src: &str) -> Mapping {
        serde_yaml::from_str::<Value>(src)
            .unwrap()
            .as_mapping()
            .unwrap()
            .clone()
    }

    #[test]
    fn fills_empty_fields_from_heuristics() {
        let mut m = mapping(
            "id: gdpr.data_minimization\nstandard: GDPR\npath: policies/gdpr/data_minimization/policy.rego\ngeo:\n  scope: EU\nowner:\ntags: []\n",
        );
        let change = backfill_mapping(&mut m).expect("changed");
        assert_eq!(change.owner.as_deref(), Some("compliance"));
        for t in ["gdpr", "gatekeeper", "rego"] {
            assert!(change.tags.contains(&t.to_string()), "{t}");
        }
        assert_eq!(change.jurisdiction, Some(vec!["EU".to_string()]));
        let keys: Vec<&str> = m.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys.iter().position(|k| *k == "owner"), Some(4));
    }

    #[test]
    fn existing_values_are_preserved() {
        let mut m = mapping(
            "id: k8s.host_network\nowner: platform-security\ntags: [kubernetes, gatekeeper]\njurisdiction: [Global]\ngeo:\n  scope: EU\n",
        );
        assert!(backfill_mapping(&mut m).is_none());
        assert_eq!(
            m.get("jurisdiction").and_then(Value::as_sequence).map(|s| s.len()),
            Some(1)
        );
    }

    #[test]
    fn files_without_id_are_skipped() {
        let mut m = mapping("name: anonymous\n");
        assert!(backfill_mapping(&mut m).is_none());
        assert!(!m.contains_key("owner"));
    }
}
