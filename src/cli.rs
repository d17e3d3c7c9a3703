use clap::Parser;
use std::path::PathBuf;

use crate::config::CONFIG_DIR_ENV;
use crate::report::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "resource-validator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate Kubernetes workload resources against pluggable policies")]
#[command(long_about = "Fetches a snapshot of workload resources from a cluster (or from YAML manifests), \
runs the built-in policy checks (allowed pods, readiness, freshness, privileged pods) against it and \
reports the violations found.")]
pub struct Cli {
    /// Directory holding config.yaml, allowlist.yaml, readinesslist.yaml and
    /// additionalResourceTypes.yaml
    #[arg(long, env = CONFIG_DIR_ENV, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Evaluate YAML manifests from a directory instead of a live cluster
    #[arg(long, value_name = "DIR", conflicts_with = "context")]
    pub manifests: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Deadline in seconds for fetching resources
    #[arg(long, value_name = "SECONDS")]
    pub fetch_timeout: Option<u64>,

    /// Run validators in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Report every violation instead of one aggregated violation per resource
    #[arg(long)]
    pub no_aggregate: bool,

    /// Violations at or below this level are reported as errors
    #[arg(long, default_value_t = 0, value_name = "LEVEL")]
    pub error_threshold: u32,

    /// Output format for the violation report
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,

    /// Exit with code 1 when a violation at or below the error threshold
    /// remains, or a validator failed
    #[arg(long)]
    pub fail_on_violations: bool,

    /// Print the effective settings and exit
    #[arg(long)]
    pub show_config: bool,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
