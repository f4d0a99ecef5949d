//! Global CLI Setup.

use std::env;

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use enum_as_inner::EnumAsInner;

use crate::command::cache_info::{self, CacheInfo};
use crate::command::fetch::{self, Fetch};
use crate::command::get_closure::{self, GetClosure};
use crate::command::nar_dump::{self, NarDump};
use crate::command::push::{self, Push};
use crate::command::query_missing::{self, QueryMissing};
use crate::command::show_derivation::{self, ShowDerivation};

/// Barge binary cache uploader.
#[derive(Debug, Parser)]
#[clap(version)]
#[clap(propagate_version = true)]
pub struct Opts {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, EnumAsInner)]
pub enum Command {
    Push(Push),
    QueryMissing(QueryMissing),
    Fetch(Fetch),
    CacheInfo(CacheInfo),
    ShowDerivation(ShowDerivation),

    #[clap(hide = true)]
    GetClosure(GetClosure),

    #[clap(hide = true)]
    NarDump(NarDump),
}

/// Generate shell autocompletion files.
#[derive(Debug, Parser)]
pub struct GenCompletions {
    /// The shell to generate autocompletion files for.
    shell: Shell,
}

pub async fn run() -> Result<()> {
    // https://github.com/clap-rs/clap/issues/1335
    if let Some("gen-completions") = env::args().nth(1).as_deref() {
        return gen_completions(env::args().nth(2)).await;
    }

    let opts = Opts::parse();

    match opts.command {
        Command::Push(_) => push::run(opts).await,
        Command::QueryMissing(_) => query_missing::run(opts).await,
        Command::Fetch(_) => fetch::run(opts).await,
        Command::CacheInfo(_) => cache_info::run(opts).await,
        Command::ShowDerivation(_) => show_derivation::run(opts).await,
        Command::GetClosure(_) => get_closure::run(opts).await,
        Command::NarDump(_) => nar_dump::run(opts).await,
    }
}

async fn gen_completions(shell: Option<String>) -> Result<()> {
    let shell: Shell = shell
        .ok_or_else(|| anyhow!("Must specify a shell."))?
        .parse()
        .unwrap();

    clap_complete::generate(shell, &mut Opts::command(), "barge", &mut std::io::stdout());

    Ok(())
}
