//! Update command implementation

use super::{open_store, selected_kinds};
use crate::collector::{
    Collector, CycleOutcome, CycleReport, OrderBookCollector, OrderBookSettings, TradeCollector,
    TradeSettings,
};
use crate::config::Config;
use crate::feed::{BinanceRestClient, MarketSource};
use crate::schema::DataKind;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Only update this kind (trades or orderbook)
    #[arg(short, long)]
    pub kind: Option<DataKind>,

    /// Print reports as JSON
    #[arg(long)]
    pub json: bool,
}

impl UpdateArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = open_store(config);
        let source: Arc<dyn MarketSource> =
            Arc::new(BinanceRestClient::with_config(config.source.binance_config())?);

        let mut reports: Vec<CycleReport> = Vec::new();
        for kind in selected_kinds(self.kind) {
            let batch = match kind {
                DataKind::Trades => {
                    TradeCollector::new(source.clone(), store.clone(), TradeSettings::from_config(config))
                        .update()
                        .await
                }
                DataKind::OrderBook => {
                    OrderBookCollector::new(
                        source.clone(),
                        store.clone(),
                        OrderBookSettings::from_config(config),
                    )
                    .update()
                    .await
                }
            };
            reports.extend(batch.into_values());
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            print_reports(&reports);
        }

        let failed = reports.iter().filter(|r| r.is_failed()).count();
        if failed > 0 {
            anyhow::bail!("{} of {} cycles failed", failed, reports.len());
        }
        Ok(())
    }
}

fn print_reports(reports: &[CycleReport]) {
    println!(
        "{:<10} {:<10} {:>8} {:>8} {:>8} {:>8}  outcome",
        "kind", "symbol", "fetched", "written", "skipped", "rejected"
    );
    for r in reports {
        let outcome = match &r.outcome {
            CycleOutcome::Completed => "ok".to_string(),
            CycleOutcome::Skipped => "skipped".to_string(),
            CycleOutcome::Interrupted => "interrupted".to_string(),
            CycleOutcome::Failed(reason) => format!("failed: {reason}"),
        };
        println!(
            "{:<10} {:<10} {:>8} {:>8} {:>8} {:>8}  {}",
            r.kind.as_str(),
            r.symbol,
            r.rows_fetched,
            r.rows_written,
            r.rows_skipped,
            r.rows_rejected,
            outcome
        );
    }
}
