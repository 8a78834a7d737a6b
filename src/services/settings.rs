use crate::domain::constants::{ENV_VERBOSE, SETTINGS_FILE};
use crate::domain::models::Settings;
use crate::store::StoreError;
use anyhow::Context;
use std::path::Path;

pub fn load_settings(root: &Path) -> anyhow::Result<Settings> {
    let path = root.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let raw = std::fs::read_to_string(&path)?;
    toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).ok().as_deref().map(str::trim),
        Some("1") | Some("true") | Some("TRUE") | Some("True")
    )
}

/// Integer env value; unset or blank yields `default`, junk is an error.
pub fn env_int(name: &'static str, default: i64) -> Result<i64, StoreError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => {
            v.trim()
                .parse::<i64>()
                .map_err(|_| StoreError::InvalidEnvInt {
                    name,
                    value: v.clone(),
                })
        }
        _ => Ok(default),
    }
}

pub fn verbose() -> bool {
    std::env::var(ENV_VERBOSE)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|v| v > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::load_settings;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = load_settings(tmp.path()).unwrap();
        assert!(s.paths.policies.is_none());
        assert!(s.links.vendor_domains.is_empty());
    }

    #[test]
    fn settings_sections_are_optional() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("rulehub.toml"),
            "[links]\nvendor_domains = [\"acme.io\"]\nlong_url_threshold = 90\n",
        )
        .unwrap();
        let s = load_settings(tmp.path()).unwrap();
        assert_eq!(s.links.vendor_domains, vec!["acme.io"]);
        assert_eq!(s.links.long_url_threshold, Some(90));
        assert!(s.catalog.repo_url_base.is_none());
    }
}
