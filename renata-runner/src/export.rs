//! Export — JSON and CSV artifacts for scan results.
//!
//! JSON is a full round-trip serialization carrying `schema_version`;
//! unknown versions are rejected on load. CSV is a flat signal tape for
//! spreadsheets: one row per signal, one column per triggering value.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use renata_core::domain::Signal;

use crate::aggregate::{ExecutionResult, SkippedEvaluation, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &ExecutionResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize ExecutionResult to JSON")
}

pub fn import_json(json: &str) -> Result<ExecutionResult> {
    let result: ExecutionResult =
        serde_json::from_str(json).context("failed to deserialize ExecutionResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Signals as CSV.
///
/// Columns: date, ticker, one column per value key (sorted union across
/// all signals, blank where a signal lacks it), params.
pub fn export_signals_csv(signals: &[Signal]) -> Result<String> {
    let keys: BTreeSet<&str> = signals
        .iter()
        .flat_map(|s| s.values.keys().map(String::as_str))
        .collect();

    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["date", "ticker"];
    header.extend(keys.iter().copied());
    header.push("params");
    wtr.write_record(&header)?;

    for s in signals {
        let mut row = vec![s.date.to_string(), s.ticker.clone()];
        for key in &keys {
            row.push(
                s.values
                    .get(*key)
                    .map(|v| format!("{v:.6}"))
                    .unwrap_or_default(),
            );
        }
        row.push(
            s.params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(";"),
        );
        wtr.write_record(&row)?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Skipped evaluations as CSV: ticker, date (blank for whole-ticker skips), reason.
pub fn export_skips_csv(skipped: &[SkippedEvaluation]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["ticker", "date", "reason"])?;
    for s in skipped {
        wtr.write_record([
            s.ticker.as_str(),
            &s.date.map(|d| d.to_string()).unwrap_or_default(),
            s.reason.as_str(),
        ])?;
    }
    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

// ─── File output ────────────────────────────────────────────────────

pub fn write_json(result: &ExecutionResult, path: &Path) -> Result<()> {
    std::fs::write(path, export_json(result)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_signals_csv(result: &ExecutionResult, path: &Path) -> Result<()> {
    std::fs::write(path, export_signals_csv(&result.signals)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ResultAggregator;
    use chrono::NaiveDate;
    use renata_core::domain::ParameterSet;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn sample_result() -> ExecutionResult {
        let params = ParameterSet::new()
            .with("gap_over_atr", 0.8)
            .with("vol_mult", 1.2);
        let mut agg = ResultAggregator::new("OS D1", "f00d", d(2), d(5), 2);
        agg.record_signals([
            Signal {
                ticker: "TSLA".into(),
                date: d(5),
                values: [("gap_over_atr".to_string(), 2.0), ("vol_mult".to_string(), 2.0)]
                    .into_iter()
                    .collect(),
                params: params.clone(),
            },
            Signal {
                ticker: "AAPL".into(),
                date: d(3),
                values: [("gap_over_atr".to_string(), 0.85)].into_iter().collect(),
                params,
            },
        ]);
        agg.record_skip(SkippedEvaluation {
            ticker: "GHOST".into(),
            date: None,
            reason: "data unavailable, with comma".into(),
        });
        agg.finish()
    }

    #[test]
    fn json_round_trip() {
        let result = sample_result();
        let json = export_json(&result).unwrap();
        assert_eq!(import_json(&json).unwrap(), result);
    }

    #[test]
    fn rejects_future_schema_version() {
        let mut result = sample_result();
        result.schema_version = SCHEMA_VERSION + 1;
        let json = export_json(&result).unwrap();
        assert!(import_json(&json).is_err());
    }

    #[test]
    fn signals_csv_has_union_of_value_columns() {
        let csv = export_signals_csv(&sample_result().signals).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,ticker,gap_over_atr,vol_mult,params");
        assert_eq!(
            lines[1],
            "2024-01-03,AAPL,0.850000,,gap_over_atr=0.8;vol_mult=1.2"
        );
        assert!(lines[2].starts_with("2024-01-05,TSLA,2.000000,2.000000,"));
    }

    #[test]
    fn skips_csv_quotes_reasons() {
        let csv = export_skips_csv(&sample_result().skipped).unwrap();
        assert_eq!(
            csv.lines().nth(1).unwrap(),
            "GHOST,,\"data unavailable, with comma\""
        );
    }

    #[test]
    fn writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample_result();
        write_json(&result, &dir.path().join("scan.json")).unwrap();
        write_signals_csv(&result, &dir.path().join("scan.csv")).unwrap();
        let json = std::fs::read_to_string(dir.path().join("scan.json")).unwrap();
        assert_eq!(import_json(&json).unwrap().summary.total_signals, 2);
    }
}
