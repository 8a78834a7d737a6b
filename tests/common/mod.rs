#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ENV_TOGGLES: [&str; 12] = [
    "FAIL_LINK_AUDIT",
    "OUTPUT_FORMAT",
    "JSON_ONLY",
    "STRICT_EMPTY_PATHS",
    "REQUIRED_DUAL_PCT",
    "ALLOW_MULTI_INADEQUATE",
    "VERBOSE",
    "BUILDER_ID",
    "WORKFLOW_REF",
    "RULEHUB_REPO_URL_BASE",
    "RULEHUB_INDEX_SCHEMA_VERSION",
    "RULEHUB_DISABLE_SCHEMA_VERSION",
];

pub struct TestEnv {
    _tmp: TempDir,
    pub root: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = make_fixture_repo(tmp.path());
        Self { _tmp: tmp, root }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("rulehub");
        for name in ENV_TOGGLES {
            cmd.env_remove(name);
        }
        cmd.env("RULEHUB_LOG", "error")
            .arg("--root")
            .arg(&self.root);
        cmd
    }

    pub fn run_json(&self, args: &[&str]) -> Value {
        let mut cmd = self.cmd();
        let out = cmd
            .arg("--json")
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, body: &str) {
        write_file(&self.root, rel, body);
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).expect("read fixture file")
    }

    pub fn read_json(&self, rel: &str) -> Value {
        serde_json::from_str(&self.read(rel)).expect("fixture json")
    }
}

fn write_file(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    fs::write(path, body).expect("write fixture file");
}

pub const GDPR_POLICY: &str = r#"package rulehub.gdpr.data_minimization

import rego.v1

deny contains msg if {
	input.controls["gdpr.data_minimization"] == false
	msg := "collect only necessary personal data"
}
"#;

pub const GDPR_TEST: &str = r#"package rulehub.gdpr.data_minimization

import rego.v1

test_allow_when_compliant if {
	count(deny) == 0 with input as {"controls": {"gdpr.data_minimization": true}}
}

test_denies_when_violated if {
	count(deny) > 0 with input as {"controls": {"gdpr.data_minimization": false}}
}
"#;

pub const BETTING_POLICY: &str = r#"package rulehub.betting.odds_feed

import rego.v1

deny contains msg if {
	input.feed.licensed == false
	msg := "odds feed must be licensed"
}

deny contains msg if {
	input.feed.latency_ms > 500
	msg := "odds feed too slow"
}
"#;

/// Two policies with metadata, one compliance map. Every metadata file is
/// schema-valid and every listed path exists.
fn make_fixture_repo(base: &Path) -> PathBuf {
    let root = base.join("repo");
    fs::create_dir_all(&root).expect("create repo root");

    write_file(
        &root,
        "policies/gdpr/data_minimization/metadata.yaml",
        r#"id: gdpr.data_minimization
name: Data minimization
standard:
  name: GDPR
  version: "2016/679"
path:
  - policies/gdpr/data_minimization/policy.rego
  - policies/gdpr/data_minimization/policy_test.rego
links:
  - https://eur-lex.europa.eu/eli/reg/2016/679/oj
geo:
  scope: EU
"#,
    );
    write_file(&root, "policies/gdpr/data_minimization/policy.rego", GDPR_POLICY);
    write_file(&root, "policies/gdpr/data_minimization/policy_test.rego", GDPR_TEST);

    write_file(
        &root,
        "policies/betting/odds_feed/metadata.yaml",
        r#"id: betting.odds_feed
name: Licensed odds feed
standard:
  name: UKGC
  version: "2024"
path: policies/betting/odds_feed/policy.rego
links:
  - https://www.sportradar.com/odds-feed/
owner: betting-compliance
tags: [betting]
jurisdiction: [UK]
"#,
    );
    write_file(&root, "policies/betting/odds_feed/policy.rego", BETTING_POLICY);

    write_file(
        &root,
        "compliance/maps/gdpr.yml",
        r#"regulation: GDPR
version: "2016/679"
sections:
  Art.5:
    title: Principles relating to processing
    policies:
      - gdpr.data_minimization
"#,
    );
    root
}
