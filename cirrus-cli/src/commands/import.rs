//! Import command implementation.

use anyhow::{Context, Result};
use cirrus::ResourceKind;

use super::export::describe;
use super::{finish, RunContext};

/// Run the import command.
pub async fn run_import(ctx: &RunContext, kinds: &[ResourceKind]) -> Result<()> {
    println!(
        "Importing {} from {} into '{}' ({} mode)",
        describe(kinds),
        ctx.config.options.root.display(),
        ctx.environment.account,
        if ctx.config.import.overwrite_records {
            "overwrite"
        } else {
            "strict"
        }
    );

    let report = cirrus::import(&ctx.client, &ctx.config, kinds)
        .await
        .with_context(|| {
            format!(
                "Snapshot at {} cannot be imported",
                ctx.config.options.root.display()
            )
        })?;

    finish(&report)
}
