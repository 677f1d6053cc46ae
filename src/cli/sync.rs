//! Sync command implementation

use super::{open_store, selected_kinds};
use crate::config::Config;
use crate::data::DatasetStore;
use crate::schema::DataKind;
use crate::sync::{DatasetSource, HotWindows, HttpSource, SyncEngine};
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source store: a directory or an http(s) base URL
    #[arg(short, long)]
    pub from: String,

    /// Only sync this kind (trades or orderbook)
    #[arg(short, long)]
    pub kind: Option<DataKind>,

    /// Only sync this symbol
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Copy the hot files instead of the full datasets
    #[arg(long)]
    pub hot: bool,
}

impl SyncArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let local = open_store(config);
        let hot = HotWindows::from_config(config);

        if self.from.starts_with("http://") || self.from.starts_with("https://") {
            let remote = HttpSource::new(&self.from, Duration::from_secs(config.source.timeout_secs))?;
            let engine = SyncEngine::new(remote, local, hot);
            self.run(&engine, |_| Ok(config.symbols.clone())).await
        } else {
            let remote = DatasetStore::new(&self.from, config.storage.compression);
            let listing = remote.clone();
            let engine = SyncEngine::new(remote, local, hot);
            self.run(&engine, |kind| Ok(listing.symbols(kind)?)).await
        }
    }

    async fn run<S, F>(&self, engine: &SyncEngine<S>, symbols_for: F) -> anyhow::Result<()>
    where
        S: DatasetSource,
        F: Fn(DataKind) -> anyhow::Result<Vec<String>>,
    {
        let mut total = 0;
        for kind in selected_kinds(self.kind) {
            let symbols = match &self.symbol {
                Some(symbol) => vec![symbol.to_uppercase()],
                None => symbols_for(kind)?,
            };

            for symbol in symbols {
                let rows = engine.sync_dataset(kind, &symbol, self.hot).await?;
                println!("{:<10} {:<10} {:>8} rows", kind.as_str(), symbol, rows);
                total += rows;
            }
        }

        tracing::info!(rows = total, hot = self.hot, "Sync finished");
        Ok(())
    }
}
