use clap::Parser;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod domain;
mod services;
mod store;

pub use cli::*;
pub use domain::constants::*;
pub use domain::models::*;
pub use services::output::*;
pub use store::*;

use commands::{
    handle_catalog_commands, handle_links_commands, handle_quality_commands,
    handle_release_commands, handle_scan_commands, handle_validate_commands,
};

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(ChronoUtc::rfc_3339())
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let layout = Layout::discover(&cli.root)?;
    tracing::debug!(root = %layout.root.display(), "repository layout resolved");

    if handle_catalog_commands(cli, &layout)? {
        return Ok(());
    }
    if handle_validate_commands(cli, &layout)? {
        return Ok(());
    }
    if handle_quality_commands(cli, &layout)? {
        return Ok(());
    }
    if handle_links_commands(cli, &layout)? {
        return Ok(());
    }
    if handle_release_commands(cli, &layout)? {
        return Ok(());
    }
    if handle_scan_commands(cli, &layout)? {
        return Ok(());
    }
    anyhow::bail!("no handler for this command")
}

/// Usage errors exit 2; an invalid integer in the environment is a plain failure.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::InvalidEnvInt { .. }) => 1,
        Some(_) => 2,
        None => 1,
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        let code = exit_code(&e);
        if cli.json {
            let out = JsonOut {
                ok: false,
                data: format!("{e:#}"),
            };
            match serde_json::to_string_pretty(&out) {
                Ok(body) => println!("{body}"),
                Err(_) => eprintln!("error: {e:#}"),
            }
        } else {
            eprintln!("error: {e:#}");
        }
        std::process::exit(code);
    }
}
