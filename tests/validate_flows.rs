mod common;

use common::TestEnv;
use predicates::str::contains;

#[test]
fn fixture_metadata_and_maps_are_valid() {
    let env = TestEnv::new();
    env.cmd()
        .args(["validate", "metadata"])
        .assert()
        .success()
        .stdout(contains("All metadata files are valid."));
    env.cmd()
        .args(["validate", "maps"])
        .assert()
        .success()
        .stdout(contains("All compliance maps are valid."));
}

#[test]
fn duplicate_policy_id_fails_metadata_validation() {
    let env = TestEnv::new();
    env.write(
        "policies/gdpr/data_minimization_copy/metadata.yaml",
        "id: gdpr.data_minimization\nname: Copy\nstandard: GDPR\npath: policies/gdpr/data_minimization/policy.rego\n",
    );
    env.cmd()
        .args(["validate", "metadata"])
        .assert()
        .code(1)
        .stdout(contains("Duplicate policy id 'gdpr.data_minimization'"))
        .stderr(contains("Validation failed with 1 error(s)."));
}

#[test]
fn missing_path_fails_metadata_validation() {
    let env = TestEnv::new();
    env.write(
        "policies/gdpr/erasure/metadata.yaml",
        "id: gdpr.erasure\nname: Right to erasure\nstandard: GDPR\npath:\n  - policies/gdpr/erasure/policy.rego\n",
    );
    env.cmd()
        .args(["validate", "metadata"])
        .assert()
        .code(1)
        .stdout(contains(
            "Path not found in policies/gdpr/erasure/metadata.yaml: policies/gdpr/erasure/policy.rego",
        ));
}

#[test]
fn empty_path_list_is_a_warning_unless_strict() {
    let env = TestEnv::new();
    env.write(
        "policies/gdpr/portability/metadata.yaml",
        "id: gdpr.portability\nname: Portability\nstandard: GDPR\npath: []\n",
    );
    env.cmd()
        .args(["validate", "metadata"])
        .assert()
        .success()
        .stdout(contains("Completed with 1 warning(s)."));
    env.cmd()
        .env("STRICT_EMPTY_PATHS", "1")
        .args(["validate", "metadata"])
        .assert()
        .code(1);
}

#[test]
fn unknown_map_reference_fails_map_validation() {
    let env = TestEnv::new();
    env.write(
        "compliance/maps/pci.yml",
        "regulation: PCI DSS\nversion: \"4.0\"\nsections:\n  \"3.4\":\n    title: Render PAN unreadable\n    policies: [pci.pan_masking]\n",
    );
    env.cmd()
        .args(["validate", "maps"])
        .assert()
        .code(1)
        .stdout(contains("Unknown policy id(s) referenced in"))
        .stdout(contains("pci.pan_masking"));
}

#[test]
fn map_dupes_check_then_fix() {
    let env = TestEnv::new();
    env.write(
        "compliance/maps/gdpr.yml",
        r#"regulation: GDPR
version: "2016/679"
sections:
  Art.5:
    title: Principles
    policies:
      - gdpr.data_minimization
      - gdpr.data_minimization
  Art.25:
    title: Data protection by design
    policies:
      - gdpr.data_minimization
"#,
    );
    env.cmd()
        .args(["maps", "dupes", "--check"])
        .assert()
        .code(1)
        .stdout(contains("Duplicate policies in compliance/maps/gdpr.yml:"))
        .stdout(contains("section 'Art.5': gdpr.data_minimization"));

    env.cmd()
        .args(["maps", "dupes", "--fix"])
        .assert()
        .success()
        .stdout(contains("Fixed 2 duplicate reference(s)"));

    let map: serde_yaml::Value =
        serde_yaml::from_str(&env.read("compliance/maps/gdpr.yml")).unwrap();
    let art5 = map["sections"]["Art.5"]["policies"].as_sequence().unwrap();
    assert_eq!(art5.len(), 1);
    let art25 = map["sections"]["Art.25"]["policies"].as_sequence().unwrap();
    assert!(art25.is_empty(), "first occurrence wins across sections");

    env.cmd()
        .args(["maps", "dupes", "--check"])
        .assert()
        .success()
        .stdout(contains("No duplicate policies found."));
}

#[test]
fn map_dupes_requires_a_mode_and_a_maps_dir() {
    let env = TestEnv::new();
    env.cmd().args(["maps", "dupes"]).assert().code(2);
    env.cmd()
        .args(["maps", "dupes", "--check", "--dir", "nowhere"])
        .assert()
        .code(2);
}

#[test]
fn backfill_dry_run_then_write() {
    let env = TestEnv::new();
    let before = env.read("policies/gdpr/data_minimization/metadata.yaml");
    env.cmd()
        .arg("backfill")
        .assert()
        .success()
        .stdout(contains(
            "Backfill complete (dry-run). Examined 2 file(s); updated 1.",
        ));
    assert_eq!(env.read("policies/gdpr/data_minimization/metadata.yaml"), before);

    env.cmd().args(["backfill", "--write"]).assert().success();
    let meta: serde_yaml::Value =
        serde_yaml::from_str(&env.read("policies/gdpr/data_minimization/metadata.yaml")).unwrap();
    assert_eq!(meta["owner"], "compliance");
    let tags: Vec<&str> = meta["tags"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|t| t.as_str())
        .collect();
    for t in ["gdpr", "gatekeeper", "rego"] {
        assert!(tags.contains(&t), "missing tag {t}");
    }
    assert_eq!(meta["jurisdiction"][0], "EU");

    let betting: serde_yaml::Value =
        serde_yaml::from_str(&env.read("policies/betting/odds_feed/metadata.yaml")).unwrap();
    assert_eq!(betting["owner"], "betting-compliance");
}

#[test]
fn backfill_missing_root_exits_one() {
    let env = TestEnv::new();
    env.cmd()
        .args(["backfill", "--policies", "missing"])
        .assert()
        .code(1)
        .stderr(contains("Policies root not found"));
}

#[test]
fn plugin_index_validation_reports_and_exit_codes() {
    let env = TestEnv::new();
    env.cmd()
        .args(["validate", "plugin-index"])
        .assert()
        .code(3);
    assert!(env
        .read("dist/integrity/plugin_index_validation.md")
        .contains("Missing file:"));

    env.cmd().arg("catalog").assert().success();
    env.cmd()
        .args(["validate", "plugin-index"])
        .assert()
        .success()
        .stdout(contains("Schema valid"));
    let report = env.read_json("dist/integrity/plugin_index_validation.json");
    assert_eq!(report["valid"], true);

    env.write("dist/index.json", r#"{"packages": [{"id": "x.y"}]}"#);
    env.cmd()
        .args(["validate", "plugin-index"])
        .assert()
        .code(2)
        .stdout(contains("- /packages/0:"));

    env.write("dist/index.json", "{not json");
    env.cmd()
        .args(["validate", "plugin-index", "--no-json"])
        .assert()
        .code(3);
}

#[test]
fn test_pairs_flags_policy_without_test() {
    let env = TestEnv::new();
    env.cmd()
        .args(["validate", "test-pairs"])
        .assert()
        .code(1)
        .stdout(contains(
            "Missing test file: policies/betting/odds_feed/policy_test.rego (policy exists)",
        ));
}
