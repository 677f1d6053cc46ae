//! Collect command implementation

use super::{open_store, selected_kinds};
use crate::collector::{
    Collector, OrderBookCollector, OrderBookSettings, TradeCollector, TradeSettings,
};
use crate::config::Config;
use crate::feed::{BinanceRestClient, MarketSource};
use crate::schema::DataKind;
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Only collect this kind (trades or orderbook)
    #[arg(short, long)]
    pub kind: Option<DataKind>,
}

impl CollectArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = open_store(config);
        let source: Arc<dyn MarketSource> =
            Arc::new(BinanceRestClient::with_config(config.source.binance_config())?);

        let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
        for kind in selected_kinds(self.kind) {
            let collector: Arc<dyn Collector> = match kind {
                DataKind::Trades => Arc::new(TradeCollector::new(
                    source.clone(),
                    store.clone(),
                    TradeSettings::from_config(config),
                )),
                DataKind::OrderBook => Arc::new(OrderBookCollector::new(
                    source.clone(),
                    store.clone(),
                    OrderBookSettings::from_config(config),
                )),
            };
            collectors.push(collector);
        }

        tracing::info!(
            symbols = ?config.symbols,
            base_path = %config.storage.base_path.display(),
            "Starting collection"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles: Vec<_> = collectors
            .into_iter()
            .map(|collector| {
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { collector.run(shutdown).await })
            })
            .collect();

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown requested, finishing in-flight writes");
        shutdown_tx.send(true)?;

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Collector task failed");
            }
        }

        Ok(())
    }
}
