use crate::services::hygiene::{render_secrets, scan_secrets, scan_unicode};
use crate::services::release::{
    build_provenance, bundle_manifest, dist_manifest, render_verify, verify, write_sorted,
    ManifestKind, ProvenanceInput, VerifyOptions,
};
use crate::*;
use serde_json::Value;
use std::path::Path;

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn finish_verify(cli: &Cli, kind: ManifestKind, report: VerifyReport) -> anyhow::Result<()> {
    let ok = report.error_count() == 0;
    print_report(cli.json, ok, &report, |r| render_verify(r, kind))?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

pub fn handle_release_commands(cli: &Cli, layout: &Layout) -> anyhow::Result<bool> {
    let Commands::Release { command } = &cli.command else {
        return Ok(false);
    };

    match command {
        ReleaseCommands::BundleManifest {
            policies,
            output,
            schema_version,
            exclude_tests,
        } => {
            let policies = layout.resolve_or(policies.as_deref(), layout.policies.clone());
            let out = layout.resolve_or(output.as_deref(), layout.dist.join(BUNDLE_MANIFEST_FILE));
            let manifest = bundle_manifest(
                &layout.root,
                &policies,
                schema_version.unwrap_or(MANIFEST_SCHEMA_VERSION_DEFAULT),
                *exclude_tests,
            )?;
            write_sorted(&out, &manifest)?;
            print_report(cli.json, true, &manifest, |m| {
                format!("Wrote {} (policies={})", layout.rel(&out), m.policies.len())
            })?;
        }
        ReleaseCommands::DistManifest {
            dist,
            output,
            schema_version,
        } => {
            let dist = layout.resolve_or(dist.as_deref(), layout.dist.clone());
            let out = layout.resolve_or(output.as_deref(), dist.join(DIST_MANIFEST_FILE));
            let manifest = dist_manifest(
                &layout.root,
                &dist,
                &out,
                schema_version.unwrap_or(MANIFEST_SCHEMA_VERSION_DEFAULT),
            )?;
            write_sorted(&out, &manifest)?;
            print_report(cli.json, true, &manifest, |m| {
                format!("Wrote {} (artifacts={})", layout.rel(&out), m.artifacts.len())
            })?;
        }
        ReleaseCommands::VerifyDist {
            manifest,
            dist,
            allow_extra,
            all,
        } => {
            let dist = layout.resolve_or(dist.as_deref(), layout.dist.clone());
            let manifest = layout.resolve_or(manifest.as_deref(), dist.join(DIST_MANIFEST_FILE));
            let opts = VerifyOptions {
                allow_extra: *allow_extra,
                all: *all,
                ..VerifyOptions::default()
            };
            let report = verify(ManifestKind::Dist, &layout.root, &manifest, &dist, &opts)?;
            finish_verify(cli, ManifestKind::Dist, report)?;
        }
        ReleaseCommands::VerifyBundle {
            manifest,
            policies,
            allow_extra,
            all,
            skip_git,
            exclude_tests,
        } => {
            let manifest =
                layout.resolve_or(manifest.as_deref(), layout.dist.join(BUNDLE_MANIFEST_FILE));
            let policies = layout.resolve_or(policies.as_deref(), layout.policies.clone());
            let opts = VerifyOptions {
                allow_extra: *allow_extra,
                all: *all,
                skip_git: *skip_git,
                exclude_tests: *exclude_tests,
            };
            let report = verify(ManifestKind::Bundle, &layout.root, &manifest, &policies, &opts)?;
            finish_verify(cli, ManifestKind::Bundle, report)?;
        }
        ReleaseCommands::Provenance {
            bundle,
            manifest,
            output,
        } => {
            let bundle = layout.resolve_or(bundle.as_deref(), layout.dist.join(BUNDLE_FILE));
            let manifest =
                layout.resolve_or(manifest.as_deref(), layout.dist.join(BUNDLE_MANIFEST_FILE));
            let out = layout.resolve_or(output.as_deref(), layout.dist.join(PROVENANCE_FILE));
            let input = ProvenanceInput {
                bundle_name: file_name(&bundle),
                manifest_name: file_name(&manifest),
                bundle,
                manifest,
                builder_id: env_nonempty(ENV_BUILDER_ID),
                workflow_ref: env_nonempty(ENV_WORKFLOW_REF),
            };
            let statement = build_provenance(&layout.root, &input)?;
            write_sorted(&out, &statement)?;
            print_report(cli.json, true, &statement, |s| {
                let digest = s
                    .pointer("/subject/0/digest/sha256")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                format!("Wrote {} (subject sha256={digest})", layout.rel(&out))
            })?;
        }
    }

    Ok(true)
}

pub fn handle_scan_commands(cli: &Cli, layout: &Layout) -> anyhow::Result<bool> {
    let Commands::Scan { command } = &cli.command else {
        return Ok(false);
    };

    match command {
        ScanCommands::Secrets => {
            let report = scan_secrets(&layout.root)?;
            let ok = report.findings.is_empty();
            if cli.json {
                print_report(true, ok, &report, |_| String::new())?;
            } else {
                let (out, err) = render_secrets(&report);
                for line in out {
                    println!("{line}");
                }
                for line in err {
                    eprintln!("{line}");
                }
            }
            if !ok {
                std::process::exit(2);
            }
        }
        ScanCommands::Unicode => {
            let report = scan_unicode(&layout.root, &layout.dist)?;
            print_report(cli.json, true, &report, |r| {
                let mut lines = r.findings.clone();
                lines.push(format!("Wrote {}", layout.rel(Path::new(&r.report))));
                lines.join("\n")
            })?;
        }
    }

    Ok(true)
}
