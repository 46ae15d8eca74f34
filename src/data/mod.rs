//! Local CSV storage for price histories and backtest output
//!
//! Price files follow the FRED download layout: a date column followed by one
//! value column, with missing observations left blank or written as ".".

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use csv::{Reader, Writer};

use crate::backtest::EquityPoint;
use crate::models::{PricePoint, PriceSeries, Trade};

/// Date column names used by FRED exports, newest layout first
const FRED_DATE_COLUMNS: [&str; 2] = ["observation_date", "DATE"];

/// Load one FRED series (e.g. `DEXMAUS`) from a downloaded CSV
pub fn load_fred_csv(path: &Path, value_column: &str) -> Result<PriceSeries> {
    let headers = Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .headers()?
        .clone();

    let date_column = FRED_DATE_COLUMNS
        .iter()
        .find(|name| headers.iter().any(|h| h == **name))
        .ok_or_else(|| anyhow!("{} has no FRED date column", path.display()))?;

    load_price_csv(path, date_column, value_column, value_column)
}

/// Load a dated price column from any headed CSV
pub fn load_price_csv(
    path: &Path,
    date_column: &str,
    value_column: &str,
    name: &str,
) -> Result<PriceSeries> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = Reader::from_reader(file);

    let headers = reader.headers()?.clone();
    let column = |wanted: &str| {
        headers
            .iter()
            .position(|h| h.trim() == wanted)
            .ok_or_else(|| anyhow!("Column `{}` not found in {}", wanted, path.display()))
    };
    let date_idx = column(date_column)?;
    let value_idx = column(value_column)?;

    let mut points = Vec::new();
    let mut skipped = 0;

    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Bad CSV row {}", row + 2))?;
        let raw_value = record.get(value_idx).unwrap_or("").trim();

        // FRED marks holidays with "." or an empty cell
        if raw_value.is_empty() || raw_value == "." {
            skipped += 1;
            continue;
        }

        let raw_date = record.get(date_idx).unwrap_or("").trim();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .with_context(|| format!("Failed to parse date `{}` on row {}", raw_date, row + 2))?;
        let value: f64 = raw_value
            .parse()
            .with_context(|| format!("Failed to parse value `{}` on row {}", raw_value, row + 2))?;

        points.push(PricePoint::new(date, value));
    }

    tracing::info!(
        "Loaded {} observations of {} from {} ({} missing skipped)",
        points.len(),
        name,
        path.display(),
        skipped
    );

    let series = PriceSeries::new(name, points)?;
    Ok(series)
}

/// Write a trade log, one row per closed trade
pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = Writer::from_writer(file);

    for trade in trades {
        writer.serialize(trade)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write an equity curve as `date,equity`
pub fn write_equity_csv(path: &Path, curve: &[EquityPoint]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(["date", "equity"])?;
    for point in curve {
        writer.write_record([point.date.to_string(), point.equity.to_string()])?;
    }

    writer.flush()?;
    Ok(())
}
