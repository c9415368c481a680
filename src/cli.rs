//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvPriceFeed, CsvSignalFeed};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::config_validation::{
    catalog_from_config, reference_data_from_config, request_from_config, simulation_config_from,
    validate_backtest_config,
};
use crate::domain::error::SigtraderError;
use crate::domain::signal::{SignalCatalog, SignalDescriptor};
use crate::domain::simulation::{BacktestRequest, BacktestResponse, Backtester};
use crate::domain::universe::ReferenceData;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceFeed;
use crate::ports::report_port::ReportPort;
use crate::ports::signal_port::SignalFeed;

#[derive(Parser, Debug)]
#[command(name = "sigtrader", about = "Signal-driven portfolio backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// JSON report path (default: report.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also export the trade ledger as CSV
        #[arg(long)]
        trades_csv: Option<PathBuf>,
        #[arg(long)]
        signal: Option<String>,
        #[arg(long)]
        threshold: Option<f64>,
        /// equal, signal_weighted or volatility
        #[arg(long)]
        sizing: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        start: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List known signals and their polarity
    Signals {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show price coverage for the universe or one ticker
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
    },
}

/// CLI flags that override `[backtest]` keys.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub signal: Option<String>,
    pub threshold: Option<f64>,
    pub sizing: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut FileConfigAdapter) {
        let pairs = [
            ("signal", self.signal.clone()),
            ("threshold", self.threshold.map(|t| t.to_string())),
            ("position_sizing", self.sizing.clone()),
            ("start_date", self.start.clone()),
            ("end_date", self.end.clone()),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                config.set_override("backtest", key, &value);
            }
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            trades_csv,
            signal,
            threshold,
            sizing,
            start,
            end,
            dry_run,
        } => {
            let overrides = Overrides {
                signal,
                threshold,
                sizing,
                start,
                end,
            };
            if dry_run {
                run_dry_run(&config, &overrides)
            } else {
                run_backtest(&config, &overrides, output.as_ref(), trades_csv.as_ref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Signals { config } => run_signals(config.as_ref()),
        Command::Info { config, ticker } => run_info(&config, ticker.as_deref()),
    }
}

fn fail(err: &SigtraderError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SigtraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        fail(&err)
    })
}

/// Where prices and signal history come from, per `[data] source`.
pub enum DataSource {
    Csv {
        prices: CsvPriceFeed,
        signals: CsvSignalFeed,
    },
    #[cfg(feature = "sqlite")]
    Sqlite(crate::adapters::sqlite_adapter::SqliteStore),
}

impl DataSource {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SigtraderError> {
        let source = config
            .get_string("data", "source")
            .unwrap_or_else(|| "csv".to_string())
            .trim()
            .to_lowercase();

        match source.as_str() {
            "csv" => {
                let dir = |key: &str| {
                    config
                        .get_string("data", key)
                        .map(PathBuf::from)
                        .ok_or_else(|| SigtraderError::ConfigMissing {
                            section: "data".into(),
                            key: key.into(),
                        })
                };
                Ok(DataSource::Csv {
                    prices: CsvPriceFeed::new(dir("prices_dir")?),
                    signals: CsvSignalFeed::new(dir("signals_dir")?),
                })
            }
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let store = crate::adapters::sqlite_adapter::SqliteStore::from_config(config)?;
                store.initialize_schema()?;
                Ok(DataSource::Sqlite(store))
            }
            other => Err(SigtraderError::ConfigInvalid {
                section: "data".into(),
                key: "source".into(),
                reason: format!("data source '{other}' is not available in this build"),
            }),
        }
    }

    pub fn price_feed(&self) -> &dyn PriceFeed {
        match self {
            DataSource::Csv { prices, .. } => prices,
            #[cfg(feature = "sqlite")]
            DataSource::Sqlite(store) => store,
        }
    }

    pub fn signal_feed(&self) -> &dyn SignalFeed {
        match self {
            DataSource::Csv { signals, .. } => signals,
            #[cfg(feature = "sqlite")]
            DataSource::Sqlite(store) => store,
        }
    }
}

fn load_validated(config_path: &PathBuf, overrides: &Overrides) -> Result<FileConfigAdapter, ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let mut adapter = load_config(config_path)?;
    overrides.apply(&mut adapter);
    validate_backtest_config(&adapter).map_err(|e| fail(&e))?;
    Ok(adapter)
}

fn run_backtest(
    config_path: &PathBuf,
    overrides: &Overrides,
    output_path: Option<&PathBuf>,
    trades_csv: Option<&PathBuf>,
) -> ExitCode {
    let adapter = match load_validated(config_path, overrides) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match execute_backtest(&adapter) {
        Ok((request, response)) => {
            print_summary(&request, &response);
            write_outputs(&request, &response, output_path, trades_csv)
        }
        Err(e) => fail(&e),
    }
}

/// Build every run input from a validated config and run it.
pub fn execute_backtest(
    config: &dyn ConfigPort,
) -> Result<(BacktestRequest, BacktestResponse), SigtraderError> {
    let catalog = catalog_from_config(config)?;
    let reference = reference_data_from_config(config)?;
    let request = request_from_config(config)?;
    let data = DataSource::from_config(config)?;

    eprintln!(
        "Running backtest: '{}' threshold {} over {} tickers, {} to {}",
        request.signal_name,
        request.threshold,
        reference.count(),
        request.start_date,
        request.end_date
    );

    let backtester = Backtester {
        catalog: &catalog,
        signal_feed: data.signal_feed(),
        price_feed: data.price_feed(),
        reference: &reference,
        config: simulation_config_from(config),
    };
    let response = backtester.run(&request)?;
    Ok((request, response))
}

fn print_summary(request: &BacktestRequest, response: &BacktestResponse) {
    let stats = &response.stats;
    let tm = &response.trade_metrics;

    eprintln!("\n=== Results: {} ({}) ===", request.signal_name, request.position_sizing);
    eprintln!("Final Value:      {:.2}", stats.final_value);
    eprintln!("Total Return:     {:.2}%", stats.total_return);
    eprintln!("Annualized:       {:.2}%", stats.annualized_return);
    eprintln!("Sharpe Ratio:     {:.2}", stats.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", stats.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", stats.max_drawdown);
    eprintln!("Trading Days:     {}", stats.trading_days);
    eprintln!("Round Trips:      {}", tm.total_trades);
    eprintln!("Win Rate:         {:.1}%", tm.win_rate);
    match tm.profit_factor {
        Some(pf) => eprintln!("Profit Factor:    {pf:.2}"),
        None => eprintln!("Profit Factor:    n/a"),
    }
    eprintln!("Open at End:      {}", response.active_positions.len());

    if !response.ticker_results.is_empty() {
        eprintln!("\n=== Per-Ticker Summary ===");
        for tr in &response.ticker_results {
            let pnl_sign = if tr.total_pnl >= 0.0 { "+" } else { "" };
            eprintln!(
                "  {}:  {} trades, {:.1}% win rate, {}${:.0}",
                tr.ticker, tr.total_trades, tr.win_rate, pnl_sign, tr.total_pnl,
            );
        }
    }

    let diag = &response.diagnostics;
    if !diag.tickers_without_data.is_empty() {
        eprintln!(
            "\nwarning: no price data for {}",
            diag.tickers_without_data.join(", ")
        );
    }
    if diag.deferred_exits > 0 || diag.cash_skips > 0 {
        eprintln!(
            "note: {} deferred exits, {} entries skipped for cash",
            diag.deferred_exits, diag.cash_skips
        );
    }
}

fn write_outputs(
    request: &BacktestRequest,
    response: &BacktestResponse,
    output_path: Option<&PathBuf>,
    trades_csv: Option<&PathBuf>,
) -> ExitCode {
    let report = JsonReportAdapter::default();
    let output = output_path
        .cloned()
        .unwrap_or_else(|| PathBuf::from("report.json"));

    if let Err(e) = report.write(response, request, &output.to_string_lossy()) {
        return fail(&e);
    }
    eprintln!("\nReport written to: {}", output.display());

    if let Some(path) = trades_csv {
        if let Err(e) = report.write_trades_csv(&response.trades, &path.to_string_lossy()) {
            return fail(&e);
        }
        eprintln!("Trades written to: {}", path.display());
    }
    ExitCode::SUCCESS
}

fn plan_from_config(
    config: &dyn ConfigPort,
) -> Result<(BacktestRequest, ReferenceData, SignalDescriptor), SigtraderError> {
    let catalog = catalog_from_config(config)?;
    let request = request_from_config(config)?;
    let reference = reference_data_from_config(config)?;
    let descriptor = catalog.resolve(&request.signal_name)?.clone();
    Ok((request, reference, descriptor))
}

pub fn run_dry_run(config_path: &PathBuf, overrides: &Overrides) -> ExitCode {
    let adapter = match load_validated(config_path, overrides) {
        Ok(a) => a,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");

    let (request, reference, descriptor) = match plan_from_config(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let sim = simulation_config_from(&adapter);

    eprintln!("\nSignal:");
    eprintln!("  {} ({}), threshold {}", descriptor.name, descriptor.polarity, request.threshold);
    eprintln!("\nPortfolio:");
    eprintln!("  initial capital: {:.2}", request.initial_capital);
    eprintln!("  max positions:   {}", request.max_positions);
    eprintln!("  holding period:  {} trading days", request.holding_period);
    eprintln!("  sizing:          {}", request.position_sizing);
    eprintln!("  range:           {} to {}", request.start_date, request.end_date);
    if !sim.execution.is_frictionless() {
        eprintln!(
            "  costs:           {} per trade + {}%, slippage {}%",
            sim.execution.commission_per_trade,
            sim.execution.commission_pct,
            sim.execution.slippage_pct
        );
    }
    eprintln!("\nUniverse:");
    eprintln!("  tickers: {}", reference.tickers.join(", "));
    if !reference.categories.is_empty() {
        let cats: Vec<String> = reference.categories.iter().map(|c| c.to_string()).collect();
        eprintln!("  categories: {}", cats.join(", "));
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&adapter) {
        return fail(&e);
    }

    eprintln!("Configuration is valid.");
    ExitCode::SUCCESS
}

fn run_signals(config_path: Option<&PathBuf>) -> ExitCode {
    let adapter = match config_path.map(load_config).transpose() {
        Ok(a) => a,
        Err(code) => return code,
    };

    let catalog = match &adapter {
        Some(config) => match catalog_from_config(config) {
            Ok(c) => c,
            Err(e) => return fail(&e),
        },
        None => SignalCatalog::builtin(),
    };

    let stored = adapter
        .as_ref()
        .and_then(|config| DataSource::from_config(config).ok())
        .and_then(|data| data.signal_feed().list_signals().ok());

    for descriptor in catalog.iter() {
        let marker = match &stored {
            Some(names) if names.iter().any(|n| n.eq_ignore_ascii_case(&descriptor.name)) => " *",
            _ => "",
        };
        println!(
            "{:<24} {:<9} {}{}",
            descriptor.name, descriptor.polarity, descriptor.description, marker
        );
    }
    if stored.is_some() {
        eprintln!("(* = history available in the configured data source)");
    }
    ExitCode::SUCCESS
}

fn run_info(config_path: &PathBuf, ticker: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let tickers = match ticker {
        Some(t) => vec![t.trim().to_uppercase()],
        None => match reference_data_from_config(&config) {
            Ok(reference) => reference.tickers,
            Err(e) => return fail(&e),
        },
    };

    let data = match DataSource::from_config(&config) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    for t in &tickers {
        match data.price_feed().get_data_range(t) {
            Ok(Some((min_date, max_date, count))) => {
                println!("{t}: {count} bars, {min_date} to {max_date}");
            }
            Ok(None) => eprintln!("{t}: no data found"),
            Err(e) => eprintln!("error querying {t}: {e}"),
        }
    }
    ExitCode::SUCCESS
}
