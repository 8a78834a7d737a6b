use crate::services::backfill::backfill;
use crate::services::catalog::fmt_pct;
use crate::services::compliance::{check_maps, fix_maps, removed_ids};
use crate::services::settings::verbose;
use crate::services::storage::{pretty_json, write_text};
use crate::services::test_coverage::{
    analyze, evaluate_thresholds, pair_violations, render_priorities, summary_lines,
};
use crate::services::testgen::{generate, TestgenError, TestgenOptions};
use crate::services::validate::{
    render_index_report, validate_maps, validate_metadata, validate_plugin_index,
};
use crate::*;
use anyhow::Context;
use std::path::Path;

fn finish_validation(cli: &Cli, report: &ValidationReport, ok_line: &str) -> anyhow::Result<()> {
    let ok = report.errors == 0;
    print_report(cli.json, ok, report, |r| {
        let mut lines = r.messages.clone();
        if ok {
            if r.warnings > 0 {
                lines.push(format!("Completed with {} warning(s).", r.warnings));
            }
            lines.push(ok_line.to_string());
        }
        lines.join("\n")
    })?;
    if !ok {
        eprintln!("Validation failed with {} error(s).", report.errors);
        std::process::exit(1);
    }
    Ok(())
}

pub fn handle_validate_commands(cli: &Cli, layout: &Layout) -> anyhow::Result<bool> {
    let Commands::Validate { command } = &cli.command else {
        return Ok(false);
    };

    match command {
        ValidateCommands::Metadata => {
            let report = validate_metadata(layout)?;
            finish_validation(cli, &report, "All metadata files are valid.")?;
        }
        ValidateCommands::Maps => {
            let report = validate_maps(layout)?;
            finish_validation(cli, &report, "All compliance maps are valid.")?;
        }
        ValidateCommands::PluginIndex {
            index,
            schema,
            out_md,
            out_json,
            no_json,
        } => {
            let integrity = layout.dist.join(INTEGRITY_DIR);
            let index = layout.resolve_or(index.as_deref(), layout.dist.join(PLUGIN_INDEX_FILE));
            let schema = schema.as_deref().map(|p| layout.resolve(p));
            let out_md = layout.resolve_or(out_md.as_deref(), integrity.join(INDEX_VALIDATION_MD));
            let out_json =
                layout.resolve_or(out_json.as_deref(), integrity.join(INDEX_VALIDATION_JSON));

            let result = validate_plugin_index(&index, schema.as_deref());
            write_text(&out_md, &render_index_report(&result))?;
            let code = match &result {
                Err(e) => {
                    let msg = e.to_string();
                    print_report(cli.json, false, &msg, |m| m.clone())?;
                    3
                }
                Ok(v) => {
                    if !*no_json {
                        write_text(&out_json, &pretty_json(v)?)?;
                    }
                    print_report(cli.json, v.valid, v, |v| {
                        if v.valid {
                            return "Schema valid".to_string();
                        }
                        let mut lines = vec!["Schema validation errors:".to_string()];
                        lines.extend(
                            v.errors
                                .iter()
                                .map(|e| format!("- {}: {}", e.pointer, e.message)),
                        );
                        lines.join("\n")
                    })?;
                    if v.valid {
                        0
                    } else {
                        2
                    }
                }
            };
            if code != 0 {
                std::process::exit(code);
            }
        }
        ValidateCommands::TestPairs => {
            let violations = pair_violations(layout);
            let ok = violations.is_empty();
            print_report(cli.json, ok, &violations, |v| {
                if v.is_empty() {
                    return "Policy test pair enforcement OK".to_string();
                }
                let mut lines = vec!["Policy test pair enforcement FAILED:".to_string()];
                lines.extend(v.iter().map(|m| format!(" - {m}")));
                lines.join("\n")
            })?;
            if !ok {
                std::process::exit(1);
            }
        }
    }

    Ok(true)
}

pub fn handle_quality_commands(cli: &Cli, layout: &Layout) -> anyhow::Result<bool> {
    match &cli.command {
        Commands::TestCoverage { no_opa } => {
            let Some(report) = analyze(layout, !*no_opa)? else {
                print_report(cli.json, true, &Vec::<String>::new(), |_| {
                    "No policy.rego files found".to_string()
                })?;
                return Ok(true);
            };
            let json_path = layout.dist.join(TEST_COVERAGE_FILE);
            let md_path = layout.dist.join(TEST_PRIORITIES_FILE);
            write_text(&json_path, &pretty_json(&report)?)?;
            write_text(&md_path, &render_priorities(&report))?;
            print_one(cli.json, report, |r| {
                let mut lines = summary_lines(r);
                lines.push(format!("Wrote {}", layout.rel(&json_path)));
                lines.push(format!("Wrote {}", layout.rel(&md_path)));
                lines.join("\n")
            })?;
        }
        Commands::TestThresholds { file } => {
            let path = layout.resolve_or(file.as_deref(), layout.dist.join(TEST_COVERAGE_FILE));
            if !path.is_file() {
                eprintln!(
                    "[threshold] Coverage JSON missing. Run 'rulehub test-coverage' first."
                );
                std::process::exit(1);
            }
            let raw = std::fs::read_to_string(&path)?;
            let data: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("parse {}", path.display()))?;
            let report = evaluate_thresholds(&data)?;
            let ok = report.failures.is_empty();
            print_report(cli.json, ok, &report, |r| {
                if !ok {
                    let mut lines = vec!["[threshold] FAILURE: thresholds not met:".to_string()];
                    lines.extend(r.failures.iter().map(|f| format!("  - {f}")));
                    lines.push(
                        "[threshold] Adjust env vars REQUIRED_DUAL_PCT / ALLOW_MULTI_INADEQUATE"
                            .to_string(),
                    );
                    return lines.join("\n");
                }
                format!(
                    "[threshold] OK: dual={}% (min {}%) | multi_inadequate={} (allow {})",
                    fmt_pct(r.dual_percent),
                    r.required_dual_percent,
                    r.multi_inadequate,
                    r.allowed_multi_inadequate
                )
            })?;
            if !ok {
                std::process::exit(2);
            }
            if !cli.json && verbose() {
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
        }
        Commands::Maps {
            command: MapsCommands::Dupes { fix, dir, .. },
        } => {
            let dir = layout.resolve_or(dir.as_deref(), layout.maps.clone());
            let rel = |p: &Path| layout.rel(p);
            if *fix {
                let reports = fix_maps(&dir, rel)?;
                print_out(cli.json, &reports, |r| {
                    format!(
                        "Fixed {} duplicate reference(s) in {}: {}",
                        r.removed,
                        r.map,
                        removed_ids(r).join(", ")
                    )
                })?;
            } else {
                let reports = check_maps(&dir, rel)?;
                let ok = reports.is_empty();
                print_report(cli.json, ok, &reports, |rs| {
                    if rs.is_empty() {
                        return "No duplicate policies found.".to_string();
                    }
                    let mut lines = Vec::new();
                    for r in rs {
                        lines.push(format!("Duplicate policies in {}:", r.map));
                        for s in &r.sections {
                            lines.push(format!("  section '{}': {}", s.section, s.policies.join(", ")));
                        }
                    }
                    lines.join("\n")
                })?;
                if !ok {
                    eprintln!("Duplicate policies detected. Failing.");
                    std::process::exit(1);
                }
            }
        }
        Commands::Backfill { write, policies } => {
            let root = layout.resolve_or(policies.as_deref(), layout.policies.clone());
            if !root.is_dir() {
                eprintln!("Policies root not found: {}", root.display());
                std::process::exit(1);
            }
            let report = backfill(&root, *write, |p| layout.rel(p))?;
            print_one(cli.json, report, |r| {
                let mut lines: Vec<String> = r
                    .updated
                    .iter()
                    .map(|c| {
                        format!(
                            "Updated {}: owner={} tags={} jurisdiction={}",
                            c.file,
                            c.owner.as_deref().unwrap_or("None"),
                            quoted_list(&c.tags),
                            c.jurisdiction
                                .as_deref()
                                .map(quoted_list)
                                .unwrap_or_else(|| "None".into())
                        )
                    })
                    .collect();
                lines.push(format!(
                    "Backfill complete ({}). Examined {} file(s); updated {}.",
                    r.mode,
                    r.examined,
                    r.updated.len()
                ));
                lines.join("\n")
            })?;
        }
        Commands::Testgen {
            apply,
            force,
            policy,
            limit,
            deny_count,
        } => {
            let opts = TestgenOptions {
                apply: *apply,
                force: *force,
                deny_count: *deny_count,
            };
            let target = policy.as_deref().map(|p| layout.resolve(p));
            let results = match generate(&layout.policies, target.as_deref(), *limit, &opts) {
                Ok(r) => r,
                Err(e) => match e.downcast_ref::<TestgenError>() {
                    Some(err) => {
                        eprintln!("{err}");
                        std::process::exit(3);
                    }
                    None => return Err(e),
                },
            };
            let processed = results.iter().filter(|r| r.skipped.is_none()).count();
            print_report(cli.json, true, &results, |rs| {
                let mut lines: Vec<String> = rs
                    .iter()
                    .map(|r| match (&r.skipped, r.written) {
                        (Some(reason), _) => format!("Skipping {}: {reason}", r.policy),
                        (None, true) => format!("Wrote {}", r.test),
                        (None, false) => format!("(dry-run) Would write {}", r.test),
                    })
                    .collect();
                if processed == 0 {
                    lines.push(format!(
                        "No policies with exactly {} deny rules found (or nothing written in dry-run)",
                        opts.deny_count
                    ));
                }
                lines.join("\n")
            })?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}
