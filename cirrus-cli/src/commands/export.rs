//! Export command implementation.

use anyhow::{Context, Result};
use cirrus::ResourceKind;

use super::{finish, RunContext};

/// Run the export command.
pub async fn run_export(ctx: &RunContext, kinds: &[ResourceKind]) -> Result<()> {
    println!(
        "Exporting {} from '{}' to {}",
        describe(kinds),
        ctx.environment.account,
        ctx.config.options.root.display()
    );

    let report = cirrus::export(&ctx.client, &ctx.config, kinds)
        .await
        .context("Export failed")?;

    finish(&report)
}

pub(crate) fn describe(kinds: &[ResourceKind]) -> String {
    kinds
        .iter()
        .map(ResourceKind::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
