//! Parquet bar cache with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/ticker={TICKER}/{year}.parquet` plus a `meta.json`
//! sidecar per ticker. Writes are atomic (write `.tmp`, rename into place);
//! partitions that fail validation on load are quarantined.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::memory::InMemoryProvider;
use super::provider::DataError;
use crate::domain::Bar;

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// Metadata sidecar for a cached ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
    pub source: String,
    pub cached_at: chrono::NaiveDateTime,
}

pub struct ParquetCache {
    cache_dir: PathBuf,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn ticker_dir(&self, ticker: &str) -> PathBuf {
        self.cache_dir.join(format!("ticker={ticker}"))
    }

    fn year_path(&self, ticker: &str, year: i32) -> PathBuf {
        self.ticker_dir(ticker).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, ticker: &str) -> PathBuf {
        self.ticker_dir(ticker).join("meta.json")
    }

    /// Write a ticker's bars, one Parquet file per calendar year.
    pub fn write(&self, ticker: &str, bars: &[Bar], source: &str) -> Result<(), DataError> {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Err(DataError::CacheError("no bars to cache".into()));
        };

        let dir = self.ticker_dir(ticker);
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut by_year: BTreeMap<i32, Vec<&Bar>> = BTreeMap::new();
        for bar in bars {
            by_year.entry(bar.date.year()).or_default().push(bar);
        }

        for (year, year_bars) in &by_year {
            let mut df = bars_to_dataframe(year_bars)?;
            let path = self.year_path(ticker, *year);
            let tmp_path = path.with_extension("parquet.tmp");

            write_parquet(&mut df, &tmp_path)?;
            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::CacheError(format!("atomic rename failed: {e}"))
            })?;
        }

        let hash_input = serde_json::to_vec(bars)
            .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
        let meta = CacheMeta {
            ticker: ticker.to_string(),
            start_date: first.date,
            end_date: last.date,
            bar_count: bars.len(),
            data_hash: blake3::hash(&hash_input).to_hex().to_string(),
            source: source.to_string(),
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(ticker), meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;

        tracing::debug!(ticker, bars = bars.len(), "cached bars");
        Ok(())
    }

    /// All cached bars for a ticker, sorted by date.
    pub fn load(&self, ticker: &str) -> Result<Vec<Bar>, DataError> {
        let dir = self.ticker_dir(ticker);
        if !dir.exists() {
            return Err(DataError::unavailable(ticker, "not cached"));
        }

        let entries =
            fs::read_dir(&dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;

        let mut bars = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            match load_and_validate_parquet(&path, ticker) {
                Ok(year_bars) => bars.extend(year_bars),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                    let _ = fs::rename(&path, path.with_extension("parquet.quarantined"));
                }
            }
        }

        if bars.is_empty() {
            return Err(DataError::unavailable(ticker, "cache holds no valid partitions"));
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    pub fn get_meta(&self, ticker: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(ticker)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Tickers with a partition directory, sorted.
    pub fn cached_tickers(&self) -> Result<Vec<String>, DataError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;
        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            if let Some(t) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("ticker="))
            {
                tickers.push(t.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    /// Load cached tickers into an in-memory provider.
    ///
    /// With `tickers = None` every cached ticker is loaded. Requested tickers
    /// missing from the cache are left out; the provider then reports them
    /// as unavailable.
    pub fn load_provider(&self, tickers: Option<&[String]>) -> Result<InMemoryProvider, DataError> {
        let wanted = match tickers {
            Some(t) => t.to_vec(),
            None => self.cached_tickers()?,
        };
        let mut provider = InMemoryProvider::new().with_name("parquet_cache");
        for ticker in &wanted {
            match self.load(ticker) {
                Ok(bars) => provider.insert(ticker.clone(), bars),
                Err(DataError::DataUnavailable { .. }) => {
                    tracing::warn!(ticker, "ticker not in cache");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(provider)
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn bars_to_dataframe(bars: &[&Bar]) -> Result<DataFrame, DataError> {
    let dates: Vec<i32> = bars
        .iter()
        .map(|b| (b.date - epoch()).num_days() as i32)
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path, ticker: &str) -> Result<Vec<Bar>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::CacheError("empty parquet file".into()));
    }
    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(DataError::CacheError(format!("missing column '{name}'")));
        }
    }
    dataframe_to_bars(&df, ticker)
}

fn dataframe_to_bars(df: &DataFrame, ticker: &str) -> Result<Vec<Bar>, DataError> {
    let column = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::ParquetError(format!("column {name}: {e}")))
    };
    let typed = |name: &str, e: PolarsError| DataError::ParquetError(format!("{name} column type: {e}"));

    let date_ca = column("date")?.date().map_err(|e| typed("date", e))?;
    let open_ca = column("open")?.f64().map_err(|e| typed("open", e))?;
    let high_ca = column("high")?.f64().map_err(|e| typed("high", e))?;
    let low_ca = column("low")?.f64().map_err(|e| typed("low", e))?;
    let close_ca = column("close")?.f64().map_err(|e| typed("close", e))?;
    let vol_ca = column("volume")?.u64().map_err(|e| typed("volume", e))?;

    (0..df.height())
        .map(|i| {
            let days = date_ca
                .get(i)
                .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
            Ok(Bar {
                ticker: ticker.to_string(),
                date: epoch() + chrono::Duration::days(days as i64),
                open: open_ca.get(i).unwrap_or(f64::NAN),
                high: high_ca.get(i).unwrap_or(f64::NAN),
                low: low_ca.get(i).unwrap_or(f64::NAN),
                close: close_ca.get(i).unwrap_or(f64::NAN),
                volume: vol_ca.get(i).unwrap_or(0),
            })
        })
        .collect()
}
