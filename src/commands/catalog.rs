use crate::services::catalog::{bottlenecks, export_metadata, run_catalog};
use crate::*;

pub fn handle_catalog_commands(cli: &Cli, layout: &Layout) -> anyhow::Result<bool> {
    match &cli.command {
        Commands::Catalog { profile } => {
            let report = run_catalog(layout)?;
            let slow = bottlenecks(&report.timings);
            print_one(cli.json, report, |r| {
                let mut lines: Vec<String> = r
                    .written
                    .iter()
                    .map(|p| format!("Generated {p}"))
                    .collect();
                if *profile {
                    let total: f64 = r.timings.iter().map(|t| t.seconds).sum();
                    lines.push(String::new());
                    lines.push("Stage timings:".into());
                    for t in &r.timings {
                        lines.push(format!("  {:<30} {:>8.4}s", t.stage, t.seconds));
                    }
                    lines.push(format!("  {:<30} {:>8.4}s", "total", total));
                    if !slow.is_empty() {
                        lines.push(format!("Bottleneck candidates (>25%): {}", slow.join(", ")));
                    }
                }
                lines.join("\n")
            })?;
        }
        Commands::ExportMetadata { out } => {
            let path = layout.resolve_or(out.as_deref(), layout.dist.join(PLUGIN_METADATA_EXPORT_FILE));
            let outcome = export_metadata(layout, &path)?;
            print_one(cli.json, outcome, |o| {
                if o.changed {
                    format!("Wrote {} ({} packages)", o.path, o.packages)
                } else {
                    format!("{} unchanged ({} packages)", o.path, o.packages)
                }
            })?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}
