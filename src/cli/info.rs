//! Info command implementation

use super::open_store;
use crate::config::Config;
use crate::data::FileInfo;
use crate::schema::DataKind;
use clap::Args;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl InfoArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = open_store(config);

        let infos = tokio::task::spawn_blocking(move || {
            let mut infos: Vec<FileInfo> = Vec::new();
            for kind in DataKind::ALL {
                for symbol in store.symbols(kind)? {
                    if let Some(info) = store.file_info(kind, &symbol)? {
                        infos.push(info);
                    }
                }
            }
            Ok::<_, crate::data::StoreError>(infos)
        })
        .await??;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&infos)?);
            return Ok(());
        }

        if infos.is_empty() {
            println!("No datasets under {}", config.storage.base_path.display());
            return Ok(());
        }

        println!(
            "{:<10} {:<10} {:>10} {:>8} {:>12}  range",
            "kind", "symbol", "rows", "hot", "size"
        );
        for info in &infos {
            let range = match (info.start_time, info.end_time) {
                (Some(start), Some(end)) => format!("{} .. {}", start.to_rfc3339(), end.to_rfc3339()),
                _ => "-".to_string(),
            };
            println!(
                "{:<10} {:<10} {:>10} {:>8} {:>9.1} KB  {}",
                info.kind.as_str(),
                info.symbol,
                info.rows,
                info.hot_rows,
                info.bytes as f64 / 1024.0,
                range
            );
        }
        Ok(())
    }
}
