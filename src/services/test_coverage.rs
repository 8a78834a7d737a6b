//! Heuristic Rego test coverage: presence, dual-direction and multi-rule depth.
//!
//! Deny heads and test assertions are counted per line with regexes. When an
//! `opa` binary is on `PATH` the deny head count is refined from `opa parse`.

use crate::domain::constants::{
    ENV_ALLOW_MULTI_INADEQUATE, ENV_REQUIRED_DUAL_PCT, METADATA_FILE, POLICY_FILE,
    POLICY_TEST_FILE,
};
use crate::domain::models::*;
use crate::services::catalog::{fmt_pct, round2};
use crate::services::settings::env_int;
use crate::store::{find_named, normalize_paths, read_yaml_mapping, Layout};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use tracing::debug;

static DENY_RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*deny\b").expect("deny rule regex must compile"));

static PASS_ASSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(count\(\s*deny\s*\)\s*==\s*0)",
        r"|(?:count\(\s*deny\s*\)\s+with\s+input\s+as\s+\w+\s*==\s*0)",
        r"|(?:not\s+deny\[)",
        r"|(?:deny\s*==\s*\[\])",
        r"|(?:count\(\s*deny\s*\)\s*<=\s*0)",
        r"|(?:\ballow\s+with\s+input\s+as\b)",
    ))
    .expect("pass assertion regex must compile")
});

static DENY_ASSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:deny\[)",
        r"|(?:some\s+deny)",
        r"|(?:some\s+_\s+in\s+deny)",
        r"|(?:count\(\s*deny\s*\)\s*>\s*0)",
        r"|(?:count\(\s*deny\s*\)\s*>=\s*1)",
        r"|(?:count\(\s*deny\s*\)\s*==\s*[1-9])",
        r"|(?:count\(\s*deny\s*\)\s+with\s+input\s+as\s+\w+\s*==\s*[1-9])",
    ))
    .expect("deny assertion regex must compile")
});

pub fn count_deny_rules(policy_text: &str) -> usize {
    policy_text
        .lines()
        .filter(|l| DENY_RULE_RE.is_match(l))
        .count()
}

pub fn count_deny_assertions(test_text: &str) -> usize {
    test_text
        .lines()
        .filter(|l| DENY_ASSERT_RE.is_match(l))
        .count()
}

pub fn has_pass_assertion(test_text: &str) -> bool {
    test_text.lines().any(|l| PASS_ASSERT_RE.is_match(l))
}

fn count_ast_deny(node: &Value) -> usize {
    match node {
        Value::Object(map) => {
            let own = (map.get("type").and_then(Value::as_str) == Some("Rule")
                && map
                    .get("head")
                    .and_then(|h| h.get("name"))
                    .and_then(Value::as_str)
                    == Some("deny")) as usize;
            own + map.values().map(count_ast_deny).sum::<usize>()
        }
        Value::Array(items) => items.iter().map(count_ast_deny).sum(),
        _ => 0,
    }
}

/// Deny head count from `opa parse -f json`; `None` when opa is unavailable or fails.
fn opa_deny_count(policy: &Path) -> Option<usize> {
    let out = Command::new("opa")
        .args(["parse", "-f", "json"])
        .arg(policy)
        .output()
        .ok()?;
    if !out.status.success() {
        debug!(policy = %policy.display(), "opa parse failed");
        return None;
    }
    let ast: Value = serde_json::from_slice(&out.stdout).ok()?;
    Some(count_ast_deny(&ast)).filter(|c| *c > 0)
}

fn opa_available() -> bool {
    Command::new("opa")
        .arg("version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn analyze_policy(layout: &Layout, policy: &Path, use_opa: bool) -> anyhow::Result<PolicyTestDetail> {
    let test_file = policy.with_file_name(POLICY_TEST_FILE);
    let has_test = test_file.exists();
    let mut deny_rule_count = count_deny_rules(&std::fs::read_to_string(policy)?);
    if use_opa {
        if let Some(c) = opa_deny_count(policy) {
            deny_rule_count = c;
        }
    }
    let (deny_test_assertions, has_pass) = if has_test {
        let text = std::fs::read_to_string(&test_file)?;
        (count_deny_assertions(&text), has_pass_assertion(&text))
    } else {
        (0, false)
    };
    let dual = has_test && deny_test_assertions > 0 && has_pass;
    let adequate = deny_rule_count <= 1 || deny_test_assertions >= deny_rule_count + 1;
    Ok(PolicyTestDetail {
        policy: layout.rel(policy),
        test: has_test.then(|| layout.rel(&test_file)),
        has_test,
        deny_rule_count,
        deny_test_assertions,
        has_pass_assertion: has_pass,
        dual_direction: dual,
        adequate_multi_rule: adequate,
    })
}

fn percent(n: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(100.0 * n as f64 / total as f64)
    }
}

/// Aggregate report over every `policy.rego`; `None` when there are none.
pub fn analyze(layout: &Layout, use_opa: bool) -> anyhow::Result<Option<TestCoverageReport>> {
    let policies = find_named(&layout.policies, POLICY_FILE);
    if policies.is_empty() {
        return Ok(None);
    }
    let use_opa = use_opa && opa_available();
    let details = policies
        .iter()
        .map(|p| analyze_policy(layout, p, use_opa))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Some(summarize(details)))
}

pub fn summarize(details: Vec<PolicyTestDetail>) -> TestCoverageReport {
    let total = details.len();
    let tested = details.iter().filter(|d| d.has_test).count();
    let dual = details.iter().filter(|d| d.dual_direction).count();
    let multi: Vec<&PolicyTestDetail> = details.iter().filter(|d| d.deny_rule_count > 1).collect();
    let list_inadequate: Vec<InadequatePolicy> = multi
        .iter()
        .filter(|d| !d.adequate_multi_rule)
        .map(|d| InadequatePolicy {
            policy: d.policy.clone(),
            deny_rules: d.deny_rule_count,
            deny_test_assertions: d.deny_test_assertions,
        })
        .collect();
    TestCoverageReport {
        tested,
        total,
        percent: percent(tested, total),
        dual_direction: DualDirection {
            count: dual,
            percent: percent(dual, total),
        },
        multi_rule: MultiRule {
            policies_with_multi: multi.len(),
            adequate: multi.len() - list_inadequate.len(),
            count_inadequate: list_inadequate.len(),
            list_inadequate,
        },
        details,
    }
}

fn dual_missing(report: &TestCoverageReport) -> Vec<&PolicyTestDetail> {
    report
        .details
        .iter()
        .filter(|d| d.has_test && !d.dual_direction)
        .collect()
}

/// Console summary including the improvement priorities.
pub fn summary_lines(report: &TestCoverageReport) -> Vec<String> {
    let mut out = vec![
        format!(
            "Policy test coverage (presence): {}/{} ({}%)",
            report.tested,
            report.total,
            fmt_pct(report.percent)
        ),
        format!(
            "Dual-direction policies (deny + pass assertion): {}/{} ({}%)",
            report.dual_direction.count,
            report.total,
            fmt_pct(report.dual_direction.percent)
        ),
    ];
    let inadequate = &report.multi_rule.list_inadequate;
    if !inadequate.is_empty() {
        out.push("Policies with inadequate multi-rule test depth:".into());
        for i in inadequate {
            out.push(format!(
                " - {}: deny_rules={} deny_test_assertions={}",
                i.policy, i.deny_rules, i.deny_test_assertions
            ));
        }
    }
    let mut improve_dual = dual_missing(report);
    if improve_dual.is_empty() && inadequate.is_empty() {
        return out;
    }
    out.push(String::new());
    out.push("Test Improvement Priorities:".into());
    if !inadequate.is_empty() {
        out.push("  1. Add additional deny assertions to multi-rule policies:".into());
        for i in inadequate.iter().take(20) {
            out.push(format!("     - {}", i.policy));
        }
        if inadequate.len() > 20 {
            out.push(format!("     ... {} more", inadequate.len() - 20));
        }
    }
    if !improve_dual.is_empty() {
        out.push("  2. Add complementary pass/deny scenarios to achieve dual-direction:".into());
        improve_dual.sort_by(|a, b| b.deny_rule_count.cmp(&a.deny_rule_count));
        for d in improve_dual.iter().take(20) {
            out.push(format!(
                "     - {} (deny_rules={}, deny_tests={}, pass={})",
                d.policy,
                d.deny_rule_count,
                d.deny_test_assertions,
                if d.has_pass_assertion { "yes" } else { "no" }
            ));
        }
        if improve_dual.len() > 20 {
            out.push(format!("     ... {} more", improve_dual.len() - 20));
        }
    }
    out
}

fn issue_for(d: &PolicyTestDetail) -> String {
    let mut parts = Vec::new();
    if d.deny_rule_count > 1 && d.deny_test_assertions < d.deny_rule_count {
        parts.push("add deny assertions");
    }
    if !d.has_pass_assertion {
        parts.push("add pass test");
    }
    if parts.is_empty() {
        "add complementary scenario".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn render_priorities(report: &TestCoverageReport) -> String {
    let mut md = String::from("# Policy Test Improvement Priorities\n\n");
    md.push_str("Generated by `rulehub test-coverage`\n\n");
    md.push_str(&format!(
        "Presence coverage: {}/{} ({}%). Dual-direction: {}/{} ({}%).\n\n",
        report.tested,
        report.total,
        fmt_pct(report.percent),
        report.dual_direction.count,
        report.total,
        fmt_pct(report.dual_direction.percent)
    ));
    let mut rows = dual_missing(report);
    rows.sort_by_key(|d| (std::cmp::Reverse(d.deny_rule_count), d.deny_test_assertions));
    if rows.is_empty() {
        md.push_str("All policies have dual-direction coverage.\n");
    } else {
        md.push_str("| Policy | Deny Rules | Deny Test Assertions | Has Pass | Issue |\n");
        md.push_str("|--------|------------|----------------------|----------|-------|\n");
        for d in rows {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                d.policy,
                d.deny_rule_count,
                d.deny_test_assertions,
                if d.has_pass_assertion { "yes" } else { "no" },
                issue_for(d)
            ));
        }
    }
    let mut inadequate: Vec<&InadequatePolicy> = report.multi_rule.list_inadequate.iter().collect();
    if !inadequate.is_empty() {
        inadequate.sort_by(|a, b| b.deny_rules.cmp(&a.deny_rules).then(a.policy.cmp(&b.policy)));
        md.push_str("\n## Multi-rule Inadequate Details\n\n");
        md.push_str("| Policy | Deny Rules | Deny Test Assertions | Needed |\n");
        md.push_str("|--------|------------|----------------------|--------|\n");
        for i in inadequate {
            let needed = (i.deny_rules + 1).saturating_sub(i.deny_test_assertions);
            md.push_str(&format!(
                "| {} | {} | {} | +{} deny tests |\n",
                i.policy, i.deny_rules, i.deny_test_assertions, needed
            ));
        }
    }
    md
}

/// Compare a coverage summary against `REQUIRED_DUAL_PCT` / `ALLOW_MULTI_INADEQUATE`.
pub fn evaluate_thresholds(data: &Value) -> anyhow::Result<ThresholdReport> {
    let required = env_int(ENV_REQUIRED_DUAL_PCT, 100)?;
    let allowed = env_int(ENV_ALLOW_MULTI_INADEQUATE, 0)?;
    let dual_pct = data
        .pointer("/dual_direction/percent")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let multi = data
        .pointer("/multi_rule/count_inadequate")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let mut failures = Vec::new();
    if dual_pct < required as f64 {
        failures.push(format!(
            "dual-direction percent {}% < required {}%",
            fmt_pct(dual_pct),
            required
        ));
    }
    if multi > allowed {
        failures.push(format!(
            "multi-rule inadequacies {multi} > allowed {allowed}"
        ));
    }
    Ok(ThresholdReport {
        dual_percent: dual_pct,
        required_dual_percent: required,
        multi_inadequate: multi,
        allowed_multi_inadequate: allowed,
        failures,
    })
}

/// Policy/test pairing violations across every metadata directory.
pub fn pair_violations(layout: &Layout) -> Vec<String> {
    let mut violations = Vec::new();
    for meta in find_named(&layout.policies, METADATA_FILE) {
        let Some(dir) = meta.parent() else {
            continue;
        };
        let policy = dir.join(POLICY_FILE);
        let test = dir.join(POLICY_TEST_FILE);
        let (has_policy, has_test) = (policy.exists(), test.exists());
        let (policy_rel, test_rel) = (layout.rel(&policy), layout.rel(&test));
        if has_policy && !has_test {
            violations.push(format!("Missing test file: {test_rel} (policy exists)"));
        }
        if has_test && !has_policy {
            violations.push(format!("Missing policy file: {policy_rel} (test exists)"));
        }
        if has_policy && has_test {
            let paths = read_yaml_mapping(&meta)
                .map(|m| normalize_paths(m.get("path")))
                .unwrap_or_default();
            for needed in [&policy_rel, &test_rel] {
                if !paths.contains(needed) {
                    violations.push(format!(
                        "Metadata {} path missing entry for {needed}",
                        layout.rel(&meta)
                    ));
                }
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "package rulehub.gdpr.x\n\ndeny contains msg if {\n  not input.a\n  msg := \"a\"\n}\n\ndeny contains msg if {\n  not input.b\n  msg := \"b\"\n}\n";

    #[test]
    fn counts_deny_heads_at_line_start() {
        assert_eq!(count_deny_rules(POLICY), 2);
        assert_eq!(count_deny_rules("allow if { true }\n  # deny later\n"), 0);
    }

    #[test]
    fn recognizes_pass_and_deny_assertions() {
        let test = "test_ok if {\n  count(deny) == 0 with input as {}\n}\ntest_bad if {\n  count(deny) > 0 with input as {\"a\": false}\n}\ntest_bad2 if {\n  some _ in deny with input as x\n}\n";
        assert_eq!(count_deny_assertions(test), 2);
        assert!(has_pass_assertion(test));
        assert!(has_pass_assertion("  allow with input as good\n"));
        assert!(!has_pass_assertion("count(deny) > 0\n"));
    }

    #[test]
    fn ast_count_walks_nested_rules() {
        let ast = serde_json::json!({
            "rules": [
                {"type": "Rule", "head": {"name": "deny"}},
                {"type": "Rule", "head": {"name": "allow"}},
                {"nested": [{"type": "Rule", "head": {"name": "deny"}}]}
            ]
        });
        assert_eq!(count_ast_deny(&ast), 2);
    }

    fn detail(policy: &str, rules: usize, tests: usize, pass: bool) -> PolicyTestDetail {
        PolicyTestDetail {
            policy: policy.into(),
            test: Some(format!("{policy}_test")),
            has_test: true,
            deny_rule_count: rules,
            deny_test_assertions: tests,
            has_pass_assertion: pass,
            dual_direction: tests > 0 && pass,
            adequate_multi_rule: rules <= 1 || tests >= rules + 1,
        }
    }

    #[test]
    fn summary_counts_multi_rule_adequacy() {
        let report = summarize(vec![
            detail("a", 3, 4, true),
            detail("b", 3, 1, false),
            detail("c", 1, 1, true),
        ]);
        assert_eq!(report.dual_direction.count, 2);
        assert_eq!(report.dual_direction.percent, 66.67);
        assert_eq!(report.multi_rule.policies_with_multi, 2);
        assert_eq!(report.multi_rule.adequate, 1);
        assert_eq!(report.multi_rule.count_inadequate, 1);
    }

    #[test]
    fn priorities_sort_by_rule_count_and_compute_needed() {
        let report = summarize(vec![
            detail("one", 1, 0, true),
            detail("three", 3, 1, false),
        ]);
        let md = render_priorities(&report);
        let three = md.find("| three | 3 | 1 | no | add deny assertions, add pass test |").unwrap();
        let one = md.find("| one | 1 | 0 | yes | add complementary scenario |").unwrap();
        assert!(three < one);
        assert!(md.contains("| three | 3 | 1 | +3 deny tests |"));
    }

    #[test]
    fn all_dual_reports_clean_table() {
        let report = summarize(vec![detail("a", 1, 1, true)]);
        assert!(render_priorities(&report).contains("All policies have dual-direction coverage."));
    }
}
