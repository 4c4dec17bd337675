use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use crate::analysis::forecast::ForecastSource;
use crate::dashboard::SearchView;
use crate::data::types::AssetKind;

const HEADER: &str =
    "timestamp,query,kind,status,symbol,name,currency,price,change_percent,forecast_source,forecast_final,confidence,message";

/// Append-only CSV record of completed searches
pub struct SearchLogger {
    log_path: String,
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl SearchLogger {
    pub fn new(log_path: String) -> Result<Self> {
        if let Some(parent) = Path::new(&log_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }

        // Create CSV file with headers if it doesn't exist
        if !Path::new(&log_path).exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)
                .with_context(|| format!("Failed to create search log: {}", log_path))?;

            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self { log_path })
    }

    pub fn log_search(&self, query: &str, kind: AssetKind, view: &SearchView) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)?;

        let timestamp = Utc::now().to_rfc3339();

        let row = match view {
            SearchView::Ready(outcome) => {
                let snapshot = &outcome.snapshot;
                let forecast = &outcome.forecast;
                let source = match forecast.source {
                    ForecastSource::Llm => "llm",
                    ForecastSource::Fallback => "fallback",
                };
                let final_price = forecast
                    .predictions
                    .last()
                    .map(|p| format!("{:.4}", p.price))
                    .unwrap_or_default();

                format!(
                    "{},{},{},ok,{},{},{},{:.4},{:.2},{},{},{:?},",
                    timestamp,
                    csv_field(query),
                    kind,
                    csv_field(&snapshot.symbol),
                    csv_field(&snapshot.name),
                    snapshot.currency,
                    snapshot.price,
                    snapshot.change_percent,
                    source,
                    final_price,
                    forecast.confidence,
                )
            }
            SearchView::Failed(message) => format!(
                "{},{},{},failed,,,,,,,,,{}",
                timestamp,
                csv_field(query),
                kind,
                csv_field(message)
            ),
        };

        writeln!(file, "{}", row)?;
        Ok(())
    }
}
