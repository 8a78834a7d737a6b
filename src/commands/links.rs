use crate::services::links::{
    analyze, audit, baseline_diff, classify_lychee, coverage_ids, find_uncovered,
    render_audit_summary, render_diff, render_human, render_markdown, render_uncovered,
    write_history, AuditOptions,
};
use crate::services::settings::env_flag;
use crate::services::storage::{pretty_json, utc_today, write_text};
use crate::*;
use anyhow::Context;
use clap::ValueEnum;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

fn fail_link_audit() -> bool {
    std::env::var(ENV_FAIL_LINK_AUDIT).as_deref() == Ok("1")
}

fn env_format() -> Option<LinkFormat> {
    let raw = std::env::var(ENV_OUTPUT_FORMAT).ok()?;
    LinkFormat::from_str(raw.trim(), true).ok()
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn handle_links_commands(cli: &Cli, layout: &Layout) -> anyhow::Result<bool> {
    let Commands::Links { command } = &cli.command else {
        return Ok(false);
    };

    match command {
        LinksCommands::Analyze {
            export,
            format,
            report,
            history,
        } => {
            let export = export.as_deref().map(|p| layout.resolve(p));
            let r = analyze(layout, export.as_deref());
            if let Some(p) = report {
                write_text(&layout.resolve(p), &pretty_json(&r)?)?;
            }
            if let Some(h) = history {
                if let Err(e) = write_history(&r, &layout.resolve(h), &utc_today()) {
                    eprintln!("[history] failed to write history CSV: {e}");
                }
            }
            if cli.json {
                print_report(true, true, &r, |_| String::new())?;
            } else {
                match format.or_else(env_format).unwrap_or(LinkFormat::Human) {
                    LinkFormat::Json => println!("{}", pretty_json(&r)?),
                    LinkFormat::Markdown => println!("{}", render_markdown(&r)),
                    LinkFormat::Human => println!("{}", render_human(&r)),
                }
            }
            if fail_link_audit() {
                let suspicious = r.suspicious.total();
                let discrepancies = r.discrepancy_total();
                if suspicious > 0 || discrepancies > 0 {
                    eprintln!(
                        "[link-audit] FAIL: suspicious_total={suspicious} discrepancies_policies={discrepancies}"
                    );
                    std::process::exit(5);
                }
                if !cli.json {
                    println!("[link-audit] OK (no suspicious links or discrepancies)");
                }
            }
        }
        LinksCommands::BaselineDiff {
            baseline,
            current,
            report,
        } => {
            let baseline =
                layout.resolve_or(baseline.as_deref(), layout.root.join(LINKS_BASELINE_FILE));
            let current = layout.resolve_or(current.as_deref(), layout.root.join(LINKS_REPORT_FILE));
            if !baseline.is_file() {
                println!(
                    "[links-baseline-diff] baseline file '{}' not found; nothing to compare (establish baseline).",
                    layout.rel(&baseline)
                );
                return Ok(true);
            }
            if !current.is_file() {
                eprintln!(
                    "[links-baseline-diff] current report '{}' not found; run `rulehub links analyze --report` first.",
                    layout.rel(&current)
                );
                return Ok(true);
            }
            let diff = baseline_diff(&read_json(&baseline)?, &read_json(&current)?);
            if let Some(p) = report {
                write_text(&layout.resolve(p), &pretty_json(&diff)?)?;
            }
            let failing = fail_link_audit() && diff.drift() > 0;
            print_report(cli.json, !failing, &diff, render_diff)?;
            if failing {
                eprintln!(
                    "[links-baseline-diff] FAIL (drift detected: added={} removed={})",
                    diff.totals.added, diff.totals.removed
                );
                std::process::exit(6);
            }
        }
        LinksCommands::NoCoverage => {
            let cov_path = layout.dist.join(COVERAGE_JSON_FILE);
            if !cov_path.is_file() {
                eprintln!("[links-no-coverage] coverage.json missing. Run 'rulehub catalog' first.");
                std::process::exit(1);
            }
            let covered = coverage_ids(&read_json(&cov_path)?);
            let r = find_uncovered(layout, &covered);
            if cli.json {
                print_report(true, true, &r, |_| String::new())?;
            } else if env_flag(ENV_JSON_ONLY) {
                println!("{}", pretty_json(&r)?);
            } else {
                println!("{}", render_uncovered(&r)?);
            }
        }
        LinksCommands::Audit {
            live,
            timeout,
            workers,
            report,
            summary,
            strict,
        } => {
            let opts = AuditOptions {
                live: *live,
                timeout: Duration::from_secs_f64(timeout.max(0.1)),
                workers: *workers,
            };
            let r = audit(layout, &opts)?;
            if let Some(p) = report {
                write_text(&layout.resolve(p), &pretty_json(&r)?)?;
            }
            let failing = *strict && r.has_issues();
            if cli.json {
                print_report(true, !failing, &r, |_| String::new())?;
            } else if *summary {
                println!("{}", render_audit_summary(&r));
            }
            if failing {
                std::process::exit(1);
            }
        }
        LinksCommands::ClassifyLychee { file } => {
            let path = layout.resolve(file);
            let verdict = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| classify_lychee(&raw));
            let v = match verdict {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("[classify-lychee] Failed to read/parse JSON: {e}");
                    std::process::exit(2);
                }
            };
            let ok = v.hard == 0;
            print_report(cli.json, ok, &v, |v| v.lines.join("\n"))?;
            if !ok {
                std::process::exit(1);
            }
        }
    }

    Ok(true)
}
