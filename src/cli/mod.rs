//! CLI interface for binance-collector
//!
//! Provides subcommands for:
//! - `collect`: Run the trade and order book collectors until Ctrl-C
//! - `update`: Run a single collection cycle
//! - `sync`: Copy new rows from another store
//! - `info`: Show stored datasets

mod collect;
mod info;
mod sync;
mod update;

pub use collect::CollectArgs;
pub use info::InfoArgs;
pub use sync::SyncArgs;
pub use update::UpdateArgs;

use crate::config::Config;
use crate::data::DatasetStore;
use crate::schema::DataKind;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "binance-collector")]
#[command(about = "Incremental Binance trades and order book collector")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run both collectors until interrupted
    Collect(CollectArgs),
    /// Run one collection cycle and print the report
    Update(UpdateArgs),
    /// Sync datasets from another store
    Sync(SyncArgs),
    /// Show stored datasets
    Info(InfoArgs),
}

fn open_store(config: &Config) -> DatasetStore {
    DatasetStore::new(config.storage.base_path.clone(), config.storage.compression)
}

fn selected_kinds(kind: Option<DataKind>) -> Vec<DataKind> {
    kind.map_or_else(|| DataKind::ALL.to_vec(), |k| vec![k])
}
