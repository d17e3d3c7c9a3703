use clap::Parser;
use kube_resource_validator::{
    aggregate::{EscalatingAggregator, PostProcessor},
    cli::Cli,
    config,
    provider::{ClusterProvider, ManifestProvider},
    report,
    validation::{ExecutionMode, RunOptions, Validation, ValidationReport},
    validators::{Validator, builtin_validators},
};
use std::process;
use std::time::Duration;

/// Exit code for violations or validator failures with `--fail-on-violations`.
const EXIT_VIOLATIONS: i32 = 1;
/// Exit code for a run that could not be carried out.
const EXIT_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => process::exit(EXIT_VIOLATIONS),
        Ok(false) => {}
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_ERROR);
        }
    }
}

/// Returns whether the process should report failure.
async fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    // Initialize logging
    cli.init_logging();

    let config_dir = config::resolve_config_dir(cli.config_dir.as_deref());
    let settings = config::load_settings(&config_dir);
    log::debug!("Using config directory {}", config_dir.display());

    if cli.show_config {
        println!("configDir: {}", config_dir.display());
        for (key, value) in config::types::describe(&settings) {
            println!("{}: {}", key, value);
        }
        return Ok(false);
    }

    let mut options = RunOptions::from_settings(&config_dir, &settings);
    if let Some(seconds) = cli.fetch_timeout {
        options = options.with_fetch_timeout(Duration::from_secs(seconds));
    }
    if cli.parallel {
        options = options.with_mode(ExecutionMode::Parallel);
    }

    let validators = builtin_validators(&config_dir, &settings);
    let report = execute(&cli, options, &validators).await?;

    if let Some(errors) = report.combined_error() {
        log::error!("Validators failed:\n{}", errors);
    }

    let violations = if cli.no_aggregate {
        report.violations.clone()
    } else {
        EscalatingAggregator::new().process(report.violations.clone())
    };

    if !report.aborted {
        report::log_violations(&violations, cli.error_threshold);
    }
    print!("{}", report::format(&report, &violations, cli.format));

    let (errors, _) = report::partition(&violations, cli.error_threshold);
    let failed = !errors.is_empty() || !report.failures.is_empty();
    Ok(cli.fail_on_violations && failed)
}

async fn execute(
    cli: &Cli,
    options: RunOptions,
    validators: &[Box<dyn Validator>],
) -> kube_resource_validator::Result<ValidationReport> {
    let report = if let Some(dir) = &cli.manifests {
        let provider = ManifestProvider::from_dir(dir)?;
        Validation::with_provider(options, provider)
            .validate(validators)
            .await?
    } else if let Some(context) = &cli.context {
        let provider = ClusterProvider::with_context(context).await?;
        Validation::with_provider(options, provider)
            .validate(validators)
            .await?
    } else {
        Validation::new(options).validate(validators).await?
    };
    Ok(report)
}
