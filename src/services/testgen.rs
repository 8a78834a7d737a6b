//! Scaffold `policy_test.rego` for policies with a fixed number of deny rules.
//!
//! Each `deny contains msg if { ... }` block contributes one input flag (the
//! first `input.<path>` it reads). The generated file has one passing case with
//! every flag set and one failing case per flag with only that flag cleared.

use crate::domain::constants::{POLICY_FILE, POLICY_TEST_FILE};
use crate::domain::models::GeneratedTest;
use crate::services::storage::write_text;
use crate::services::test_coverage::count_deny_rules;
use crate::store::{find_named, rel_path, StoreError};
use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;

pub const DEFAULT_DENY_COUNT: usize = 4;

static DENY_BLOCK_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*deny\s+contains\s+msg\s+if\s*\{\s*$").expect("deny block regex must compile")
});
static INPUT_FLAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"input\.([a-zA-Z0-9_.\[\]"]+)"#).expect("input flag regex must compile")
});
static SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\["([^"]*)"\]|([^.\[\]"]+)"#).expect("segment regex must compile")
});

#[derive(thiserror::Error, Debug)]
pub enum TestgenError {
    #[error("Policy {policy} has {found} deny rules (expected {expected}); aborting")]
    DenyCount {
        policy: String,
        found: usize,
        expected: usize,
    },
}

/// An input flag: `label` as written in the policy, `path` as JSON keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Flag {
    pub label: String,
    pub path: Vec<String>,
}

impl Flag {
    /// `controls["gdpr.x"].enabled` → `["controls", "gdpr.x", "enabled"]`.
    pub fn parse(label: &str) -> Self {
        let path = SEGMENT_RE
            .captures_iter(label)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            label: label.trim_end_matches('.').to_string(),
            path,
        }
    }

    pub fn slug(&self) -> String {
        self.label
            .replace('.', "_")
            .replace("[\"", "_")
            .replace("\"]", "")
            .replace(['"', '\''], "")
    }
}

pub struct TestgenOptions {
    pub apply: bool,
    pub force: bool,
    pub deny_count: usize,
}

/// Body lines of every `deny contains msg if {` block.
pub fn extract_rule_blocks(text: &str) -> Vec<Vec<String>> {
    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut in_block = false;
    let mut depth: i64 = 0;
    for line in text.lines() {
        if !in_block {
            if DENY_BLOCK_START.is_match(line) {
                in_block = true;
                current = Vec::new();
                depth = 0;
            }
            continue;
        }
        depth += line.matches('{').count() as i64;
        depth -= line.matches('}').count() as i64;
        if depth < 0 || line.trim() == "}" {
            in_block = false;
            blocks.push(std::mem::take(&mut current));
            continue;
        }
        current.push(line.to_string());
    }
    blocks
}

pub fn flag_of_block(block: &[String]) -> Option<Flag> {
    let joined = block.join(" \n");
    INPUT_FLAG_RE
        .captures(&joined)
        .map(|c| Flag::parse(&c[1]))
        .filter(|f| !f.path.is_empty())
}

/// `controls.<domain>.<pid>`, then `.alt`, `.alt2`, ... as single control keys.
pub fn fallback_flags(ctrl_key: &str, n: usize) -> Vec<Flag> {
    (0..n)
        .map(|i| {
            let key = match i {
                0 => ctrl_key.to_string(),
                1 => format!("{ctrl_key}.alt"),
                _ => format!("{ctrl_key}.alt{i}"),
            };
            Flag {
                label: format!("controls.{key}"),
                path: vec!["controls".to_string(), key],
            }
        })
        .collect()
}

fn assign(obj: &mut Map<String, Value>, path: &[String], value: bool) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cur = obj;
    for seg in parents {
        let slot = cur
            .entry(seg.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        cur = next;
    }
    cur.insert(last.clone(), Value::Bool(value));
}

pub fn allow_input(flags: &[Flag]) -> Value {
    let mut root = Map::new();
    for f in flags {
        assign(&mut root, &f.path, true);
    }
    Value::Object(root)
}

pub fn failing_input(flags: &[Flag], target: &Flag) -> Value {
    let mut root = Map::new();
    root.insert("controls".into(), Value::Object(Map::new()));
    for f in flags {
        if f.path.len() < 2 && f.path.first().map(String::as_str) == Some("controls") {
            continue;
        }
        assign(&mut root, &f.path, f != target);
    }
    Value::Object(root)
}

pub fn render_test(package: &str, flags: &[Flag]) -> anyhow::Result<String> {
    let mut out = format!("package rulehub.{package}\n\n");
    out.push_str("test_allow_when_compliant if {\n");
    out.push_str(&format!(
        "\tallow with input as {}\n",
        serde_json::to_string(&allow_input(flags))?
    ));
    out.push_str("}\n\n");
    for f in flags {
        out.push_str(&format!("# Auto-generated deny test for {}\n", f.label));
        out.push_str(&format!("test_denies_when_{}_failing if {{\n", f.slug()));
        out.push_str(&format!(
            "\tcount(deny) > 0 with input as {}\n",
            serde_json::to_string(&failing_input(flags, f))?
        ));
        out.push_str("}\n\n");
    }
    Ok(out)
}

/// `<domain>.<pid>` from the directory holding the policy.
fn package_of(policies_root: &Path, policy: &Path) -> String {
    let rel = policy.strip_prefix(policies_root).unwrap_or(policy);
    let parts: Vec<String> = rel
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    let tail = if parts.len() >= 2 { &parts[parts.len() - 2..] } else { &parts[..] };
    tail.join(".")
}

pub fn generate_for_policy(
    policies_root: &Path,
    policy: &Path,
    opts: &TestgenOptions,
    rel: &impl Fn(&Path) -> String,
) -> anyhow::Result<GeneratedTest> {
    let text = std::fs::read_to_string(policy)?;
    let found = count_deny_rules(&text);
    if found != opts.deny_count {
        return Err(TestgenError::DenyCount {
            policy: rel(policy),
            found,
            expected: opts.deny_count,
        }
        .into());
    }

    let package = package_of(policies_root, policy);
    let mut flags: Vec<Flag> = Vec::new();
    for f in extract_rule_blocks(&text).iter().filter_map(|b| flag_of_block(b)) {
        if !flags.contains(&f) {
            flags.push(f);
        }
    }
    if flags.len() < opts.deny_count {
        flags = fallback_flags(&package, opts.deny_count);
    }

    let test_path = policy.with_file_name(POLICY_TEST_FILE);
    let mut outcome = GeneratedTest {
        policy: rel(policy),
        test: rel(&test_path),
        flags: flags.iter().map(|f| f.label.clone()).collect(),
        written: false,
        skipped: None,
    };
    if test_path.exists() && !opts.force {
        outcome.skipped = Some(format!(
            "{} exists (use --force to overwrite)",
            outcome.test
        ));
        return Ok(outcome);
    }
    if opts.apply {
        write_text(&test_path, &render_test(&package, &flags)?)?;
        info!(test = %outcome.test, "wrote generated test");
        outcome.written = true;
    }
    Ok(outcome)
}

/// Policies under `root` with exactly `deny_count` deny heads, sorted.
pub fn candidates(root: &Path, deny_count: usize) -> Vec<PathBuf> {
    find_named(root, POLICY_FILE)
        .into_iter()
        .filter(|p| {
            std::fs::read_to_string(p)
                .map(|t| count_deny_rules(&t) == deny_count)
                .unwrap_or(false)
        })
        .collect()
}

pub fn generate(
    root: &Path,
    policy: Option<&Path>,
    limit: Option<usize>,
    opts: &TestgenOptions,
) -> anyhow::Result<Vec<GeneratedTest>> {
    if !root.exists() {
        return Err(StoreError::MissingDir {
            what: "Policies root",
            path: root.display().to_string(),
        }
        .into());
    }
    let base = root.parent().unwrap_or(root).to_path_buf();
    let rel = |p: &Path| rel_path(&base, p);

    if let Some(p) = policy {
        let target = if p.is_absolute() { p.to_path_buf() } else { root.join(p) };
        if !target.exists() {
            return Err(StoreError::UnknownPolicy(target.display().to_string()).into());
        }
        return Ok(vec![generate_for_policy(root, &target, opts, &rel)?]);
    }

    let mut out = Vec::new();
    for pol in candidates(root, opts.deny_count) {
        if limit.is_some_and(|l| l > 0 && out.len() >= l) {
            break;
        }
        out.push(generate_for_policy(root, &pol, opts, &rel)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"package rulehub.gdpr.consent

import rego.v1

deny contains msg if {
	not input.consent.recorded
	msg := "consent not recorded"
}

deny contains msg if {
	input.controls["gdpr.consent_withdrawal"] == false
	msg := "withdrawal missing"
}

deny contains msg if {
	input.consent.age_verified == false
	msg := "age"
}

deny contains msg if {
	some x in input.purposes
	x == ""
	msg := "purpose"
}
"#;

    #[test]
    fn blocks_yield_one_flag_each() {
        let blocks = extract_rule_blocks(POLICY);
        assert_eq!(blocks.len(), 4);
        let flags: Vec<String> = blocks
            .iter()
            .filter_map(|b| flag_of_block(b))
            .map(|f| f.label)
            .collect();
        assert_eq!(
            flags,
            vec![
                "consent.recorded",
                "controls[\"gdpr.consent_withdrawal\"]",
                "consent.age_verified",
                "purposes"
            ]
        );
    }

    #[test]
    fn bracket_keys_stay_single_segments() {
        let f = Flag::parse("controls[\"gdpr.consent_withdrawal\"]");
        assert_eq!(f.path, vec!["controls", "gdpr.consent_withdrawal"]);
        assert_eq!(f.slug(), "controls_gdpr_consent_withdrawal");
    }

    #[test]
    fn failing_input_clears_only_the_target() {
        let flags = vec![Flag::parse("consent.recorded"), Flag::parse("consent.age_verified")];
        let v = failing_input(&flags, &flags[1]);
        assert_eq!(v["consent"]["recorded"], Value::Bool(true));
        assert_eq!(v["consent"]["age_verified"], Value::Bool(false));
        assert!(v["controls"].as_object().unwrap().is_empty());
    }

    #[test]
    fn fallback_flags_do_not_collide() {
        let flags = fallback_flags("gdpr.consent", 4);
        let labels: Vec<&str> = flags.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "controls.gdpr.consent",
                "controls.gdpr.consent.alt",
                "controls.gdpr.consent.alt2",
                "controls.gdpr.consent.alt3"
            ]
        );
        let v = allow_input(&flags);
        assert_eq!(v["controls"].as_object().unwrap().len(), 4);
    }

    #[test]
    fn rendered_test_has_package_and_cases() {
        let flags = vec![Flag::parse("a.b"), Flag::parse("c")];
        let out = render_test("gdpr.consent", &flags).unwrap();
        assert!(out.starts_with("package rulehub.gdpr.consent\n\ntest_allow_when_compliant if {\n"));
        assert!(out.contains("\tallow with input as {\"a\":{\"b\":true},\"c\":true}\n"));
        assert!(out.contains("test_denies_when_a_b_failing if {\n"));
        let deny_c = out
            .lines()
            .skip_while(|l| !l.starts_with("test_denies_when_c_failing"))
            .nth(1)
            .unwrap();
        assert!(deny_c.starts_with("\tcount(deny) > 0 with input as {"));
        assert!(deny_c.contains("\"c\":false") && deny_c.contains("\"controls\":{}"));
    }

    #[test]
    fn wrong_deny_count_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let pol = dir.path().join("gdpr/consent/policy.rego");
        std::fs::create_dir_all(pol.parent().unwrap()).unwrap();
        std::fs::write(&pol, "package x\n\ndeny contains msg if {\n\tinput.a\n}\n").unwrap();
        let opts = TestgenOptions {
            apply: false,
            force: false,
            deny_count: 4,
        };
        let err = generate(dir.path(), Some(Path::new("gdpr/consent/policy.rego")), None, &opts)
            .unwrap_err();
        assert!(err.downcast_ref::<TestgenError>().is_some());
    }
}
