//! Duplicate policy references in compliance maps.
//!
//! A policy id may appear at most once per map across all sections. The fix
//! keeps the first occurrence in file order and drops the rest.

use crate::domain::models::{DupeReport, SectionDupes};
use crate::services::storage::write_text;
use crate::store::{map_files, read_yaml, scalar_string, StoreError};
use serde_yaml::Value;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::info;

fn sections_mut(doc: &mut Value) -> Option<&mut serde_yaml::Mapping> {
    doc.get_mut("sections").and_then(Value::as_mapping_mut)
}

pub fn collect_duplicates(doc: &Value) -> Vec<SectionDupes> {
    let Some(sections) = doc.get("sections").and_then(Value::as_mapping) else {
        return Vec::new();
    };
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for (name, body) in sections {
        let Some(pols) = body.get("policies").and_then(Value::as_sequence) else {
            continue;
        };
        let mut dupes = Vec::new();
        for pid in pols.iter().filter_map(Value::as_str) {
            if !seen.insert(pid) {
                dupes.push(pid.to_string());
            }
        }
        if !dupes.is_empty() {
            out.push(SectionDupes {
                section: scalar_string(name).unwrap_or_default(),
                policies: dupes,
            });
        }
    }
    out
}

/// Remove later occurrences in place. Returns removed count and ids.
pub fn fix_duplicates(doc: &mut Value) -> (usize, BTreeSet<String>) {
    let mut removed = 0usize;
    let mut ids = BTreeSet::new();
    let Some(sections) = sections_mut(doc) else {
        return (removed, ids);
    };
    let mut seen: HashSet<String> = HashSet::new();
    for (_, body) in sections.iter_mut() {
        let Some(pols) = body.get_mut("policies").and_then(Value::as_sequence_mut) else {
            continue;
        };
        pols.retain(|v| match v.as_str() {
            Some(pid) if !seen.insert(pid.to_string()) => {
                removed += 1;
                ids.insert(pid.to_string());
                false
            }
            _ => true,
        });
    }
    (removed, ids)
}

fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(StoreError::MissingDir {
            what: "Maps directory",
            path: dir.display().to_string(),
        })
    }
}

pub fn check_maps(dir: &Path, rel: impl Fn(&Path) -> String) -> anyhow::Result<Vec<DupeReport>> {
    ensure_dir(dir)?;
    let mut out = Vec::new();
    for mp in map_files(dir) {
        let doc = read_yaml(&mp)?;
        let sections = collect_duplicates(&doc);
        if !sections.is_empty() {
            out.push(DupeReport {
                map: rel(&mp),
                sections,
                removed: 0,
            });
        }
    }
    Ok(out)
}

pub fn fix_maps(dir: &Path, rel: impl Fn(&Path) -> String) -> anyhow::Result<Vec<DupeReport>> {
    ensure_dir(dir)?;
    let mut out = Vec::new();
    for mp in map_files(dir) {
        let mut doc = read_yaml(&mp)?;
        let sections = collect_duplicates(&doc);
        if sections.is_empty() {
            continue;
        }
        let (removed, _) = fix_duplicates(&mut doc);
        if removed > 0 {
            write_text(&mp, &serde_yaml::to_string(&doc)?)?;
            info!(map = %mp.display(), removed, "rewrote compliance map");
            out.push(DupeReport {
                map: rel(&mp),
                sections,
                removed,
            });
        }
    }
    Ok(out)
}

/// Sorted unique ids removed from a map, for the fix summary line.
pub fn removed_ids(report: &DupeReport) -> Vec<String> {
    report
        .sections
        .iter()
        .flat_map(|s| s.policies.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
