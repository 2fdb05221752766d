//! Renata CLI — scanner generation, validation, scanning and cache commands.
//!
//! Commands:
//! - `setups` — list the setups in the catalog
//! - `generate` — build a rule definition and print it as JSON
//! - `validate` — run the compliance validator over a rule (file or generated)
//! - `scan` — execute a scan from a TOML config file
//! - `cache download` / `cache status` — fill and inspect the Parquet cache

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use renata_core::data::{
    generate_bars, CircuitBreaker, MarketDataProvider, ParquetCache, PolygonConfig,
    PolygonProvider, SyntheticConfig,
};
use renata_core::domain::{ParamValue, ParameterSet, Timeframe};
use renata_core::scanner::{validate, ComplianceReport, RuleDefinition, ScannerGenerator, SetupCatalog};
use renata_runner::export::{export_skips_csv, write_json, write_signals_csv};
use renata_runner::{run_scan, CancelToken, ScanConfig, ScanReport};

#[derive(Parser)]
#[command(name = "renata", about = "Renata — scanner generation and validation")]
struct Cli {
    /// Log at DEBUG instead of INFO.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum TimeframeArg {
    Daily,
    Hourly,
}

impl From<TimeframeArg> for Timeframe {
    fn from(arg: TimeframeArg) -> Self {
        match arg {
            TimeframeArg::Daily => Timeframe::Daily,
            TimeframeArg::Hourly => Timeframe::Hourly,
        }
    }
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Setup name as listed by `renata setups` (e.g. "OS D1").
    #[arg(long)]
    setup: String,

    /// Parameter as name=value; repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    #[arg(long, value_enum, default_value = "daily")]
    timeframe: TimeframeArg,

    /// Curated catalog (TOML). Defaults to the built-in catalog.
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List setups with their required parameters and defaults.
    Setups {
        /// Curated catalog (TOML). Defaults to the built-in catalog.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Generate a rule definition and print it as JSON.
    Generate {
        #[command(flatten)]
        args: GenerateArgs,

        /// Also write the JSON to this file.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a rule definition for compliance.
    Validate {
        /// Rule definition JSON (as written by `generate --out`).
        #[arg(long, conflicts_with = "setup")]
        rule: Option<PathBuf>,

        #[arg(long)]
        setup: Option<String>,

        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        #[arg(long, value_enum, default_value = "daily")]
        timeframe: TimeframeArg,

        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Execute a scan from a TOML config file.
    Scan {
        #[arg(long)]
        config: PathBuf,

        /// Write the signal tape as CSV.
        #[arg(long)]
        out_csv: Option<PathBuf>,

        /// Write the full result as JSON.
        #[arg(long)]
        out_json: Option<PathBuf>,

        /// Write skipped evaluations as CSV.
        #[arg(long)]
        skips_csv: Option<PathBuf>,
    },
    /// Parquet cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Fetch daily history and store it in the cache.
    Download {
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Generate seeded synthetic bars instead of calling the HTTP API.
        #[arg(long)]
        synthetic_seed: Option<u64>,

        /// Environment variable holding the API key.
        #[arg(long, default_value = "POLYGON_API_KEY")]
        api_key_env: String,

        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Report cached tickers and their date ranges.
    Status {
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Setups { catalog } => run_setups(catalog.as_deref()),
        Commands::Generate { args, out } => run_generate(&args, out.as_deref()),
        Commands::Validate {
            rule,
            setup,
            params,
            timeframe,
            catalog,
        } => run_validate(rule, setup, params, timeframe, catalog),
        Commands::Scan {
            config,
            out_csv,
            out_json,
            skips_csv,
        } => run_scan_cmd(&config, out_csv, out_json, skips_csv),
        Commands::Cache { action } => match action {
            CacheAction::Download {
                tickers,
                start,
                end,
                synthetic_seed,
                api_key_env,
                cache_dir,
            } => run_cache_download(
                &tickers,
                &start,
                &end,
                synthetic_seed,
                &api_key_env,
                &cache_dir,
            ),
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn load_catalog(path: Option<&Path>) -> Result<SetupCatalog> {
    match path {
        None => Ok(SetupCatalog::builtin()),
        Some(p) => {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read catalog {}", p.display()))?;
            Ok(SetupCatalog::from_toml_str(&content)?)
        }
    }
}

/// Parse `name=value` pairs; numeric values become numbers, anything else text.
fn parse_params(pairs: &[String]) -> Result<ParameterSet> {
    let mut params = ParameterSet::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("parameter '{pair}' is not NAME=VALUE");
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("parameter '{pair}' has an empty name");
        }
        let value = value.trim();
        let value = match value.parse::<f64>() {
            Ok(n) => ParamValue::Number(n),
            Err(_) => ParamValue::Text(value.to_string()),
        };
        params.insert(name, value);
    }
    Ok(params)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn generate_rule(args: &GenerateArgs) -> Result<RuleDefinition> {
    let generator = ScannerGenerator::new(load_catalog(args.catalog.as_deref())?);
    let params = parse_params(&args.params)?;
    Ok(generator.generate_by_name(&args.setup, &params, args.timeframe.into())?)
}

fn print_report(report: &ComplianceReport) {
    if report.compliant {
        println!("COMPLIANT");
        return;
    }
    println!("NON-COMPLIANT ({} violation(s))", report.violations.len());
    for v in &report.violations {
        println!("  - {v}");
    }
}

// ── Commands ─────────────────────────────────────────────────────────

fn run_setups(catalog: Option<&Path>) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    if catalog.is_empty() {
        println!("Catalog is empty.");
        return Ok(());
    }
    for setup in catalog.iter() {
        println!("{}", setup.name);
        if !setup.description.is_empty() {
            println!("  {}", setup.description);
        }
        println!("  required:   {}", setup.required_parameters.join(", "));
        let defaults: Vec<String> = setup
            .defaults
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!("  defaults:   {}", defaults.join(", "));
        let timeframes: Vec<String> = setup.timeframes.iter().map(ToString::to_string).collect();
        println!("  timeframes: {}", timeframes.join(", "));
    }
    Ok(())
}

fn run_generate(args: &GenerateArgs, out: Option<&Path>) -> Result<()> {
    let rule = generate_rule(args)?;
    let json = serde_json::to_string_pretty(&rule).context("failed to serialize rule")?;
    println!("{json}");
    if let Some(path) = out {
        std::fs::write(path, &json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), fingerprint = %rule.fingerprint(), "rule written");
    }
    Ok(())
}

fn run_validate(
    rule_path: Option<PathBuf>,
    setup: Option<String>,
    params: Vec<String>,
    timeframe: TimeframeArg,
    catalog: Option<PathBuf>,
) -> Result<()> {
    let rule = match (rule_path, setup) {
        (Some(path), _) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<RuleDefinition>(&content)
                .with_context(|| format!("{} is not a rule definition", path.display()))?
        }
        (None, Some(setup)) => generate_rule(&GenerateArgs {
            setup,
            params,
            timeframe,
            catalog,
        })?,
        (None, None) => bail!("one of --rule or --setup is required"),
    };

    let report = validate(&rule);
    println!("{} ({}) fingerprint {}", rule.setup(), rule.timeframe(), rule.fingerprint());
    print_report(&report);
    if !report.compliant {
        std::process::exit(1);
    }
    Ok(())
}

fn run_scan_cmd(
    config_path: &Path,
    out_csv: Option<PathBuf>,
    out_json: Option<PathBuf>,
    skips_csv: Option<PathBuf>,
) -> Result<()> {
    let config = ScanConfig::from_file(config_path)?;
    let report = run_scan(&config, &CancelToken::new())?;
    print_summary(&report);

    if let Some(path) = out_json {
        write_json(&report.result, &path)?;
        println!("Result JSON: {}", path.display());
    }
    if let Some(path) = out_csv {
        write_signals_csv(&report.result, &path)?;
        println!("Signals CSV: {}", path.display());
    }
    if let Some(path) = skips_csv {
        std::fs::write(&path, export_skips_csv(&report.result.skipped)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Skips CSV:   {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &ScanReport) {
    let result = &report.result;
    let summary = &result.summary;
    println!();
    println!("=== Scan Result ===");
    println!("Setup:        {}", result.setup);
    println!("Rule:         {}", result.rule_fingerprint);
    println!("Run:          {}", report.run_id);
    println!("Period:       {} to {}", summary.start, summary.end);
    println!(
        "Dates:        {} evaluated, {} unavailable",
        summary.dates_evaluated, summary.dates_unavailable
    );
    println!("Tickers:      {} scanned", summary.tickers_scanned);
    println!();
    if result.signals.is_empty() {
        println!("No signals.");
    } else {
        println!("{:<12} {:<8} Values", "Date", "Ticker");
        println!("{}", "-".repeat(58));
        for s in &result.signals {
            let values: Vec<String> = s.values.iter().map(|(k, v)| format!("{k}={v:.3}")).collect();
            println!("{:<12} {:<8} {}", s.date, s.ticker, values.join(" "));
        }
    }
    println!();
    println!("{summary}");
    if summary.cancelled {
        println!("WARNING: scan was cancelled before the end date");
    }
}

fn run_cache_download(
    tickers: &[String],
    start: &str,
    end: &str,
    synthetic_seed: Option<u64>,
    api_key_env: &str,
    cache_dir: &Path,
) -> Result<()> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    if end < start {
        bail!("end date {end} precedes start date {start}");
    }
    let cache = ParquetCache::new(cache_dir);

    let mut errors: Vec<(String, String)> = Vec::new();
    match synthetic_seed {
        Some(seed) => {
            let config = SyntheticConfig::new(seed, start, end);
            for ticker in tickers {
                let bars = generate_bars(&config, ticker);
                if let Err(e) = cache.write(ticker, &bars, "synthetic") {
                    errors.push((ticker.clone(), e.to_string()));
                } else {
                    println!("{ticker}: {} bars (synthetic)", bars.len());
                }
            }
        }
        None => {
            let api_key = std::env::var(api_key_env)
                .with_context(|| format!("environment variable {api_key_env} is not set"))?;
            let provider = PolygonProvider::new(
                PolygonConfig::new(api_key),
                Arc::new(CircuitBreaker::default_provider()),
            )?;
            for ticker in tickers {
                let outcome = provider
                    .fetch_ticker_history(ticker, start, end)
                    .and_then(|bars| cache.write(ticker, &bars, provider.name()).map(|_| bars.len()));
                match outcome {
                    Ok(n) => println!("{ticker}: {n} bars"),
                    Err(e) => errors.push((ticker.clone(), e.to_string())),
                }
            }
        }
    }

    if !errors.is_empty() {
        for (ticker, err) in &errors {
            eprintln!("Error for {ticker}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    let cache = ParquetCache::new(cache_dir);
    let tickers = cache.cached_tickers()?;
    if tickers.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache:   {}", cache_dir.display());
    println!("Tickers: {}", tickers.len());
    println!();
    println!(
        "{:<8} {:<25} {:>8} {:<10}",
        "Ticker", "Date Range", "Bars", "Source"
    );
    println!("{}", "-".repeat(54));
    for ticker in &tickers {
        match cache.get_meta(ticker) {
            Some(meta) => println!(
                "{:<8} {:<25} {:>8} {:<10}",
                ticker,
                format!("{} to {}", meta.start_date, meta.end_date),
                meta.bar_count,
                meta.source
            ),
            None => println!("{ticker:<8} (no meta)"),
        }
    }
    Ok(())
}
