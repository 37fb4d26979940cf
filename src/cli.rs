//! CLI struct definitions for the effectsync command-line interface.
//!
//! Top-level clap types live here; each subsystem owns its own subcommand
//! tree next to the code it drives.

use crate::plugins::{catalog::CatalogCli, toggle::EffectCli};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "effectsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Authority-relayed status effects for shared tabletop character records."
)]
pub(crate) struct Cli {
    /// World store directory. Defaults to `./.effectsync`.
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create the world store, seed and back up the catalog, run migrations.
    Init,
    Catalog(CatalogCli),
    Actor(ActorCli),
    Effect(EffectCli),
    Migrate(MigrateCli),
    /// Print the broker audit log.
    Audit {
        /// Only the most recent N events.
        #[clap(long)]
        tail: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ActorCli {
    #[clap(subcommand)]
    pub command: ActorCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum ActorCommand {
    /// Create a character record.
    Add {
        name: String,
        /// Walking speed in feet.
        #[clap(long, default_value = "30")]
        walk: i64,
        /// Full system data as JSON; overrides --walk.
        #[clap(long)]
        data: Option<String>,
    },
    /// Show a character record with its applied effects.
    Show { uuid: String },
}

#[derive(clap::Args, Debug)]
pub(crate) struct MigrateCli {
    #[clap(subcommand)]
    pub command: MigrateCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum MigrateCommand {
    /// Applied and pending migrations, in run order.
    Status,
}
