use crate::domain::constants::*;
use crate::domain::models::{ComplianceMap, MapSection, Settings};
use crate::services::settings::load_settings;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{what} not found: {path}")]
    MissingDir { what: &'static str, path: String },
    #[error("{what} not found: {path}")]
    MissingInput { what: &'static str, path: String },
    #[error("{name} must be an integer (got {value:?})")]
    InvalidEnvInt { name: &'static str, value: String },
    #[error("policy not found: {0}")]
    UnknownPolicy(String),
}

/// Resolved repository layout. Every relative path handed to a command is
/// anchored at `root`.
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub policies: PathBuf,
    pub maps: PathBuf,
    pub dist: PathBuf,
    pub docs: PathBuf,
    pub settings: Settings,
}

impl Layout {
    pub fn discover(root: &Path) -> anyhow::Result<Self> {
        let settings = load_settings(root)?;
        let pick = |v: &Option<String>, d: &str| root.join(v.as_deref().unwrap_or(d));
        Ok(Self {
            root: root.to_path_buf(),
            policies: pick(&settings.paths.policies, DEFAULT_POLICIES_DIR),
            maps: pick(&settings.paths.maps, DEFAULT_MAPS_DIR),
            dist: pick(&settings.paths.dist, DEFAULT_DIST_DIR),
            docs: pick(&settings.paths.docs, DEFAULT_DOCS_DIR),
            settings,
        })
    }

    pub fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    pub fn resolve_or(&self, p: Option<&Path>, default: PathBuf) -> PathBuf {
        p.map(|p| self.resolve(p)).unwrap_or(default)
    }

    pub fn rel(&self, p: &Path) -> String {
        rel_path(&self.root, p)
    }

    pub fn repo_url_base(&self) -> String {
        std::env::var(ENV_REPO_URL_BASE)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.settings.catalog.repo_url_base.clone())
            .unwrap_or_else(|| REPO_URL_BASE_DEFAULT.to_string())
    }

    pub fn long_url_threshold(&self) -> usize {
        self.settings
            .links
            .long_url_threshold
            .unwrap_or(LONG_URL_THRESHOLD_DEFAULT)
    }

    pub fn vendor_domains(&self) -> Vec<String> {
        let mut out: Vec<String> = VENDOR_DOMAINS.iter().map(|d| d.to_string()).collect();
        for d in &self.settings.links.vendor_domains {
            let d = d.trim().to_ascii_lowercase();
            if !d.is_empty() && !out.contains(&d) {
                out.push(d);
            }
        }
        out
    }
}

pub fn rel_path(root: &Path, p: &Path) -> String {
    let r = p.strip_prefix(root).unwrap_or(p);
    r.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Stringify a YAML scalar. `version: 1` and `version: "1"` read the same.
pub fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn field(map: &Mapping, key: &str) -> Option<String> {
    map.get(key).and_then(scalar_string)
}

/// `field` with blank strings treated as absent.
pub fn field_nonempty(map: &Mapping, key: &str) -> Option<String> {
    field(map, key).filter(|s| !s.trim().is_empty())
}

/// `path: a` and `path: [a, b]` both become a list.
pub fn normalize_paths(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_string).collect(),
        _ => Vec::new(),
    }
}

pub fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(scalar_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

pub fn is_empty_value(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Sequence(s)) => s.is_empty(),
        Some(Value::Mapping(m)) => m.is_empty(),
        _ => false,
    }
}

/// YAML → JSON for passthrough fields (`geo`, `links`). Non-string keys drop the value.
pub fn yaml_to_json(v: &Value) -> Option<serde_json::Value> {
    serde_json::to_value(v).ok()
}

pub fn read_yaml(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

/// The file's top-level mapping. An empty document counts as an empty mapping;
/// other non-mapping documents and parse failures yield `None`.
pub fn read_yaml_mapping(path: &Path) -> Option<Mapping> {
    match read_yaml(path) {
        Ok(Value::Mapping(m)) => Some(m),
        Ok(Value::Null) => Some(Mapping::new()),
        Ok(_) => None,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "skipping unparsable YAML");
            None
        }
    }
}

/// Sorted `*.yml` files of the maps directory; empty when the directory is absent.
pub fn map_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = rd
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|x| x == "yml").unwrap_or(false))
        .collect();
    files.sort();
    files
}

pub fn parse_map(file: &Path, doc: &Mapping) -> ComplianceMap {
    let mut sections = Vec::new();
    if let Some(Value::Mapping(secs)) = doc.get("sections") {
        for (k, v) in secs {
            let Some(id) = scalar_string(k) else {
                continue;
            };
            let (title, policies) = match v {
                Value::Mapping(body) => (field(body, "title"), string_list(body.get("policies"))),
                _ => (None, Vec::new()),
            };
            sections.push(MapSection {
                id,
                title,
                policies,
            });
        }
    }
    ComplianceMap {
        file: file.to_path_buf(),
        regulation: field(doc, "regulation"),
        version: field(doc, "version"),
        sections,
    }
}

pub fn load_maps(dir: &Path) -> Vec<ComplianceMap> {
    map_files(dir)
        .into_iter()
        .filter_map(|f| read_yaml_mapping(&f).map(|doc| parse_map(&f, &doc)))
        .collect()
}

/// Every file named `name` below `dir`, sorted.
pub fn find_named(dir: &Path, name: &str) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == name)
        .map(|e| e.into_path())
        .collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_path_becomes_single_item_list() {
        let v = Value::String("policies/aml/x/policy.rego".into());
        assert_eq!(normalize_paths(Some(&v)), vec!["policies/aml/x/policy.rego"]);
        assert!(normalize_paths(None).is_empty());
    }

    #[test]
    fn numeric_scalars_are_stringified() {
        let doc: Value = serde_yaml::from_str("version: 1\nname: x").unwrap();
        let m = doc.as_mapping().unwrap();
        assert_eq!(field(m, "version").as_deref(), Some("1"));
        assert_eq!(field(m, "missing"), None);
    }

    #[test]
    fn map_sections_keep_file_order() {
        let doc: Value = serde_yaml::from_str(
            "regulation: GDPR\nversion: 2016\nsections:\n  Art.5:\n    title: Principles\n    policies: [gdpr.a]\n  Art.32:\n    policies: [gdpr.b, gdpr.c]\n  Art.1:\n    policies: []\n",
        )
        .unwrap();
        let map = parse_map(Path::new("gdpr.yml"), doc.as_mapping().unwrap());
        let ids: Vec<&str> = map.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["Art.5", "Art.32", "Art.1"]);
        assert_eq!(map.version.as_deref(), Some("2016"));
        assert_eq!(map.sections[1].policies.len(), 2);
    }

    #[test]
    fn rel_path_uses_forward_slashes() {
        let root = Path::new("/repo");
        assert_eq!(
            rel_path(root, Path::new("/repo/policies/a/metadata.yaml")),
            "policies/a/metadata.yaml"
        );
    }
}
