use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rulehub",
    version,
    about = "RuleHub compliance content-store toolkit"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Repository root (policies/, compliance/maps/, dist/, docs/)"
    )]
    pub root: PathBuf,
    #[arg(long, short = 'v', global = true, help = "Debug logging on stderr")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Regenerate coverage docs, policies index/CSV, coverage.json and index.json.
    Catalog {
        #[arg(long, help = "Print stage timings and bottleneck candidates")]
        profile: bool,
    },
    /// Write dist/plugin-index-metadata.json.
    ExportMetadata {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Analyze Rego test depth and write coverage + priorities under dist/.
    TestCoverage {
        #[arg(long, help = "Skip the optional `opa parse` refinement")]
        no_opa: bool,
    },
    /// Gate on dist/policy-test-coverage.json thresholds.
    TestThresholds {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    Validate {
        #[command(subcommand)]
        command: ValidateCommands,
    },
    Maps {
        #[command(subcommand)]
        command: MapsCommands,
    },
    /// Fill empty owner/tags/jurisdiction in metadata files.
    Backfill {
        #[arg(long, help = "Rewrite files (default: dry-run)")]
        write: bool,
        #[arg(long)]
        policies: Option<PathBuf>,
    },
    Links {
        #[command(subcommand)]
        command: LinksCommands,
    },
    /// Scaffold policy_test.rego for policies with a fixed deny-rule count.
    Testgen {
        #[arg(long, help = "Write files (default: dry-run)")]
        apply: bool,
        #[arg(long, help = "Overwrite existing tests")]
        force: bool,
        #[arg(long, help = "Single policy.rego to process")]
        policy: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 4)]
        deny_count: usize,
    },
    Release {
        #[command(subcommand)]
        command: ReleaseCommands,
    },
    Scan {
        #[command(subcommand)]
        command: ScanCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ValidateCommands {
    Metadata,
    Maps,
    PluginIndex {
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long)]
        schema: Option<PathBuf>,
        #[arg(long)]
        out_md: Option<PathBuf>,
        #[arg(long)]
        out_json: Option<PathBuf>,
        #[arg(long, help = "Skip the JSON report")]
        no_json: bool,
    },
    TestPairs,
}

#[derive(Subcommand, Debug)]
pub enum MapsCommands {
    #[command(group(ArgGroup::new("mode").required(true).args(["check", "fix"])))]
    Dupes {
        #[arg(long)]
        check: bool,
        #[arg(long)]
        fix: bool,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkFormat {
    Human,
    Json,
    Markdown,
}

#[derive(Subcommand, Debug)]
pub enum LinksCommands {
    Analyze {
        #[arg(long, help = "Plugin metadata export to compare against")]
        export: Option<PathBuf>,
        #[arg(long, value_enum, help = "Overrides OUTPUT_FORMAT")]
        format: Option<LinkFormat>,
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long, help = "Append/update a dated row in this CSV")]
        history: Option<PathBuf>,
    },
    BaselineDiff {
        #[arg(long)]
        baseline: Option<PathBuf>,
        #[arg(long)]
        current: Option<PathBuf>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    NoCoverage,
    Audit {
        #[arg(long, help = "HEAD-check every URL")]
        live: bool,
        #[arg(long, default_value_t = 5.0)]
        timeout: f64,
        #[arg(long, default_value_t = 16)]
        workers: usize,
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long)]
        summary: bool,
        #[arg(long, help = "Exit 1 when any issue is found")]
        strict: bool,
    },
    /// Classify a lychee JSON report into soft/hard failures.
    ClassifyLychee { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum ReleaseCommands {
    BundleManifest {
        #[arg(long)]
        policies: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        schema_version: Option<i64>,
        #[arg(long)]
        exclude_tests: bool,
    },
    DistManifest {
        #[arg(long)]
        dist: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        schema_version: Option<i64>,
    },
    VerifyDist {
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[arg(long)]
        dist: Option<PathBuf>,
        #[arg(long)]
        allow_extra: bool,
        #[arg(long, help = "Collect every issue instead of stopping at the first")]
        all: bool,
    },
    VerifyBundle {
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[arg(long)]
        policies: Option<PathBuf>,
        #[arg(long)]
        allow_extra: bool,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        skip_git: bool,
        #[arg(long)]
        exclude_tests: bool,
    },
    /// Write an in-toto/SLSA provenance statement for the bundle.
    Provenance {
        #[arg(long)]
        bundle: Option<PathBuf>,
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScanCommands {
    Secrets,
    Unicode,
}
