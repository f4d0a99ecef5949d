use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cli::Opts;
use barge::derivation::Derivation;

/// Parse a derivation file and print it as JSON.
#[derive(Debug, Parser)]
pub struct ShowDerivation {
    /// The `.drv` file to show.
    drv: PathBuf,
}

pub async fn run(opts: Opts) -> Result<()> {
    let sub = opts.command.as_show_derivation().unwrap();

    let contents = tokio::fs::read_to_string(&sub.drv)
        .await
        .with_context(|| format!("Failed to read {}", sub.drv.display()))?;

    let derivation = Derivation::parse(&contents)
        .with_context(|| format!("Failed to parse {}", sub.drv.display()))?;

    println!("{}", serde_json::to_string_pretty(&derivation)?);

    Ok(())
}
