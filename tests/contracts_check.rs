mod common;

use common::TestEnv;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

fn load_schema(name: &str) -> Value {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let raw = fs::read_to_string(root.join("docs/contracts").join(name)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn validate(schema_name: &str, data: &Value) {
    let schema = load_schema(schema_name);
    let validator = JSONSchema::compile(&schema).expect("compile schema");
    let msgs: Vec<String> = match validator.validate(data) {
        Ok(()) => return,
        Err(errors) => errors.map(|e| e.to_string()).collect(),
    };
    panic!("schema validation failed: {}", msgs.join(" | "));
}

fn yaml_as_json(raw: &str) -> Value {
    let y: serde_yaml::Value = serde_yaml::from_str(raw).unwrap();
    serde_json::to_value(y).unwrap()
}

#[test]
fn contracts_check() {
    let env = TestEnv::new();

    for rel in [
        "policies/gdpr/data_minimization/metadata.yaml",
        "policies/betting/odds_feed/metadata.yaml",
    ] {
        validate("policy-metadata.schema.json", &yaml_as_json(&env.read(rel)));
    }
    validate(
        "compliance-map.schema.json",
        &yaml_as_json(&env.read("compliance/maps/gdpr.yml")),
    );

    let out = env.run_json(&["catalog"]);
    assert_eq!(out["ok"], true);
    validate("plugin-index.schema.json", &env.read_json("dist/index.json"));

    env.cmd()
        .env("RULEHUB_INDEX_SCHEMA_VERSION", "3")
        .arg("catalog")
        .assert()
        .success();
    let index = env.read_json("dist/index.json");
    assert_eq!(index["schemaVersion"], 3);
    validate("plugin-index.schema.json", &index);
}
