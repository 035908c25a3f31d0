pub mod export;
pub mod import;

pub use export::run_export;
pub use import::run_import;

use anyhow::{Context, Result};
use cirrus::config::{EnvironmentConfig, Environments};
use cirrus::{MigrationConfig, RunReport};
use cirrus_storage::{LocalAccount, StorageClient};
use std::path::Path;
use std::sync::Arc;

/// Everything a command needs: the profile, the environment and a client
/// bound to it.
pub struct RunContext {
    pub config: MigrationConfig,
    pub environment: EnvironmentConfig,
    pub client: StorageClient,
}

impl RunContext {
    pub fn load(
        config_dir: &Path,
        profile: &str,
        environments_file: &Path,
        env: &str,
    ) -> Result<Self> {
        let config = MigrationConfig::load_profile(config_dir, profile)
            .with_context(|| format!("Failed to load profile '{}'", profile))?;

        let environments = Environments::load(environments_file).with_context(|| {
            format!(
                "Failed to load environments from {}",
                environments_file.display()
            )
        })?;
        let environment = environments.get(env)?.clone();

        let account = LocalAccount::new(environment.root.clone())
            .with_visibility_timeout(environment.visibility_timeout());
        let client = StorageClient::from_account(Arc::new(account));

        tracing::info!(
            env = %env,
            account = %environment.account,
            profile = %profile,
            "Using environment"
        );

        Ok(Self {
            config,
            environment,
            client,
        })
    }
}

/// Print a per-kind summary of a run.
pub fn print_summary(report: &RunReport) {
    println!();
    println!("{} summary:", report.direction);
    for kind in &report.kinds {
        match &kind.result {
            Ok(outcomes) => {
                let totals = kind.totals();
                let failed = kind.failures();
                println!(
                    "  {:<7} {} resources, {} items transferred, {} skipped, {} failed",
                    kind.kind.to_string(),
                    outcomes.len(),
                    totals.transferred,
                    totals.skipped,
                    failed.len()
                );
                for outcome in failed {
                    if let Err(e) = &outcome.result {
                        println!("    {}: {}", outcome.selector, e);
                    }
                }
            }
            Err(e) => println!("  {:<7} failed: {}", kind.kind.to_string(), e),
        }
    }
}

/// Turn a finished run into the process outcome.
pub fn finish(report: &RunReport) -> Result<()> {
    print_summary(report);
    if !report.is_success() {
        anyhow::bail!("{} finished with errors", report.direction);
    }
    println!();
    println!("{} complete", report.direction);
    Ok(())
}
