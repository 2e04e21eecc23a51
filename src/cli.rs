//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{run_multi_code, BacktestConfig, MultiCodeResult};
use crate::domain::candle::Candle;
use crate::domain::config_validation::{
    parse_optional_time, unknown_sections, validate_backtest_config, validate_optimize_config,
    validate_strategy_config,
};
use crate::domain::error::StratError;
use crate::domain::execution::Emulator;
use crate::domain::optimize::{build_grid, run_optimization, OptimizeMetric, OptimizeRun};
use crate::domain::security::Security;
use crate::domain::strategy::Strategy;
use crate::domain::timeframe::{CandleAggregator, Timeframe};
use crate::domain::universe::{parse_codes, validate_universe};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;
use crate::strategies;

#[derive(Parser, Debug)]
#[command(name = "stratbook", about = "Candle-driven strategy catalogue and backtester")]
pub struct Cli {
    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the strategy catalogue
    List,
    /// Show a strategy's parameters
    Describe { id: String },
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Grid-search the parameters named in [optimize]
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
    /// Validate a configuration without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for code(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
}

/// Install the stderr subscriber. `RUST_LOG` wins over the verbose flag.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::List => run_list(),
        Command::Describe { id } => run_describe(&id),
        Command::Backtest {
            config,
            code,
            output,
        } => run_backtest(&config, code.as_deref(), output.as_deref()),
        Command::Optimize { config, code } => run_optimize(&config, code.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, code } => run_info(&config, code.as_deref()),
    }
}

fn fail(e: &StratError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn run_list() -> ExitCode {
    for (id, title) in strategies::available() {
        println!("{id:<24} {title}");
    }
    ExitCode::SUCCESS
}

fn run_describe(id: &str) -> ExitCode {
    let strategy = match strategies::create(id) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    println!("{} ({})", strategy.title(), strategy.id());
    println!("Timeframe: {}", strategy.timeframe());

    let params = strategy.params();
    let mut groups: Vec<&str> = Vec::new();
    for p in &params {
        if !groups.contains(&p.group()) {
            groups.push(p.group());
        }
    }
    for group in groups {
        println!("\n[{group}]");
        for p in params.iter().filter(|p| p.group() == group) {
            println!(
                "  {:<22} {:<18} default {}",
                p.name(),
                p.display_name(),
                p.default_string()
            );
            if !p.description().is_empty() {
                println!("      {}", p.description());
            }
            if p.can_optimize() {
                println!("      optimize: {}", p.optimize_values().join(", "));
            }
        }
    }
    ExitCode::SUCCESS
}

fn run_backtest(config_path: &Path, code_override: Option<&str>, output: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&adapter) {
        return fail(&e);
    }
    if let Err(e) = validate_strategy_config(&adapter) {
        return fail(&e);
    }

    match run_backtest_pipeline(&adapter, code_override, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn run_backtest_pipeline(
    config: &dyn ConfigPort,
    code_override: Option<&str>,
    output: Option<&Path>,
) -> Result<(), StratError> {
    let bt_config = build_backtest_config(config)?;
    let strategy = build_strategy(config)?;
    eprintln!("Strategy: {} ({})", strategy.title(), strategy.id());

    let inputs = load_inputs(config, code_override, &bt_config)?;
    eprintln!("Running backtest on {} code(s)...", inputs.len());
    let result = run_multi_code(&inputs, || build_strategy(config), &bt_config)?;

    print_summary(&result);

    let trades_path = output
        .map(|p| p.display().to_string())
        .or_else(|| config.get_string("report", "trades_path"));
    if let Some(path) = trades_path {
        CsvReportAdapter.write_multi(&result, strategy.id(), &path)?;
        eprintln!("Trades written to {path}");
    }
    Ok(())
}

fn print_summary(result: &MultiCodeResult) {
    let metrics = &result.aggregate;
    eprintln!("\n=== Aggregate Results ===");
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!(
        "Annualized:       {:.2}%",
        metrics.annualized_return * 100.0
    );
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);

    if !result.per_code.is_empty() {
        eprintln!("\n=== Per-Code Summary ===");
        for cr in &result.per_code {
            let pnl_sign = if cr.total_pnl >= 0.0 { "+" } else { "" };
            eprintln!(
                "  {}:  {} trades, {:.1}% win rate, {}{:.2}",
                cr.code,
                cr.total_trades,
                cr.win_rate * 100.0,
                pnl_sign,
                cr.total_pnl,
            );
        }
    }
}

fn run_optimize(config_path: &Path, code_override: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let checks: [fn(&dyn ConfigPort) -> Result<(), StratError>; 3] = [
        validate_backtest_config,
        validate_strategy_config,
        validate_optimize_config,
    ];
    for check in checks {
        if let Err(e) = check(&adapter) {
            return fail(&e);
        }
    }

    match run_optimize_pipeline(&adapter, code_override) {
        Ok(runs) => {
            print_ranking(&runs);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_optimize_pipeline(
    config: &dyn ConfigPort,
    code_override: Option<&str>,
) -> Result<Vec<OptimizeRun>, StratError> {
    let bt_config = build_backtest_config(config)?;
    let names = optimize_params(config);
    let metric = optimize_metric(config)?;

    let inputs = load_inputs(config, code_override, &bt_config)?;
    eprintln!(
        "Optimising {} over {} code(s), ranked by {metric}...",
        names.join(", "),
        inputs.len()
    );
    let runs = run_optimization(&inputs, || build_strategy(config), &names, metric, &bt_config)?;
    if runs.is_empty() {
        return Err(StratError::invalid_state(
            "every parameter combination was rejected",
        ));
    }
    Ok(runs)
}

fn print_ranking(runs: &[OptimizeRun]) {
    println!(
        "{:>4}  {:>10}  {:>9}  {:>7}  params",
        "rank", "score", "return", "trades"
    );
    for (i, run) in runs.iter().enumerate() {
        let params: Vec<String> = run.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!(
            "{:>4}  {:>10.4}  {:>8.2}%  {:>7}  {}",
            i + 1,
            run.score,
            run.metrics.total_return * 100.0,
            run.metrics.total_trades,
            params.join(" ")
        );
    }
}

fn optimize_params(config: &dyn ConfigPort) -> Vec<String> {
    config
        .get_string("optimize", "params")
        .unwrap_or_default()
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn optimize_metric(config: &dyn ConfigPort) -> Result<OptimizeMetric, StratError> {
    config
        .get_string("optimize", "metric")
        .unwrap_or_else(|| "total_return".to_string())
        .parse()
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match validate_all(&adapter) {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Everything a backtest would check before touching data, plus a dry
/// `on_started` per code.
fn validate_all(config: &dyn ConfigPort) -> Result<String, StratError> {
    validate_backtest_config(config)?;
    validate_strategy_config(config)?;
    for section in unknown_sections(config) {
        warn!(section = %section, "unknown config section ignored");
        eprintln!("warning: unknown section [{section}] is ignored");
    }
    let bt_config = build_backtest_config(config)?;
    let mut strategy = build_strategy(config)?;
    CandleAggregator::new(bt_config.timeframe, strategy.timeframe())?;

    if !config.section_entries("optimize").is_empty() {
        validate_optimize_config(config)?;
        optimize_metric(config)?;
        let grid = build_grid(strategy.as_ref(), &optimize_params(config))?;
        eprintln!("Optimisation grid: {} combinations", grid.len());
    }

    let codes = resolve_codes(None, config)?;
    for code in &codes {
        let security = build_security(config, code)?;
        let mut emulator = Emulator::new(security, bt_config.execution(), bt_config.initial_capital);
        strategy.on_started(&mut emulator)?;
        strategy = build_strategy(config)?;
    }

    Ok(format!(
        "OK: {} on {} code(s), {} candles from {} source bars",
        strategy.id(),
        codes.len(),
        strategy.timeframe(),
        bt_config.timeframe
    ))
}

fn run_info(config_path: &Path, code_override: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let data = match data_adapter(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };

    let codes = match resolve_codes(code_override, &adapter) {
        Ok(codes) => codes,
        Err(StratError::ConfigMissing { .. }) => match data.list_codes() {
            Ok(codes) => codes,
            Err(e) => return fail(&e),
        },
        Err(e) => return fail(&e),
    };

    for code in &codes {
        match data.get_data_range(code) {
            Ok(Some((first, last, bars))) => {
                println!("{code}: {bars} bars, {first} to {last}");
            }
            Ok(None) => eprintln!("{code}: no data found"),
            Err(e) => eprintln!("{code}: {e}"),
        }
    }
    ExitCode::SUCCESS
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, StratError> {
    let defaults = BacktestConfig::default();
    let timeframe = match config.get_string("backtest", "timeframe") {
        Some(raw) => raw
            .parse::<Timeframe>()
            .map_err(|e| StratError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "timeframe".to_string(),
                reason: e.to_string(),
            })?,
        None => defaults.timeframe,
    };

    Ok(BacktestConfig {
        initial_capital: config.get_double("backtest", "initial_capital", defaults.initial_capital),
        commission_per_trade: config.get_double("backtest", "commission_per_trade", 0.0),
        commission_pct: config.get_double("backtest", "commission_pct", 0.0),
        slippage_pct: config.get_double("backtest", "slippage_pct", 0.0),
        risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.0),
        timeframe,
        start: parse_optional_time(config, "start_date")?,
        end: parse_optional_time(config, "end_date")?,
    })
}

/// `[security]` defaults overridden by `[security.CODE]`.
pub fn build_security(config: &dyn ConfigPort, code: &str) -> Result<Security, StratError> {
    let defaults = Security::new(code);
    let section = format!("security.{}", code.to_lowercase());
    let double = |key: &str, fallback: f64| {
        let base = config.get_double("security", key, fallback);
        config.get_double(&section, key, base)
    };

    let decimals = config.get_int(
        &section,
        "decimals",
        config.get_int("security", "decimals", i64::from(defaults.decimals)),
    );
    let decimals = u32::try_from(decimals).map_err(|_| StratError::ConfigInvalid {
        section: section.clone(),
        key: "decimals".to_string(),
        reason: "decimals must be non-negative".to_string(),
    })?;

    let security = Security {
        price_step: double("price_step", defaults.price_step),
        decimals,
        volume_step: double("volume_step", defaults.volume_step),
        min_volume: double("min_volume", defaults.min_volume),
        max_volume: double("max_volume", defaults.max_volume),
        ..defaults
    };
    security.validate()?;
    Ok(security)
}

/// `--code` wins, then `codes`, then `code`. Codes are upper-cased.
pub fn resolve_codes(
    code_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, StratError> {
    if let Some(raw) = code_override {
        return Ok(parse_codes(raw)?);
    }
    if let Some(raw) = config.get_string("backtest", "codes") {
        if !raw.trim().is_empty() {
            return Ok(parse_codes(&raw)?);
        }
    }
    match config.get_string("backtest", "code") {
        Some(code) if !code.trim().is_empty() => Ok(vec![code.trim().to_uppercase()]),
        _ => Err(StratError::ConfigMissing {
            section: "backtest".to_string(),
            key: "code".to_string(),
        }),
    }
}

/// Create the configured strategy and apply its `[strategy]` keys.
pub fn build_strategy(config: &dyn ConfigPort) -> Result<Box<dyn Strategy>, StratError> {
    let name = config
        .get_string("strategy", "name")
        .ok_or_else(|| StratError::ConfigMissing {
            section: "strategy".to_string(),
            key: "name".to_string(),
        })?;
    let mut strategy = strategies::create(&name)?;
    strategies::configure(strategy.as_mut(), config)?;
    Ok(strategy)
}

fn data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, StratError> {
    match config.get_string("backtest", "data_dir") {
        Some(dir) if !dir.trim().is_empty() => Ok(CsvAdapter::new(PathBuf::from(dir.trim()))),
        _ => Err(StratError::ConfigMissing {
            section: "backtest".to_string(),
            key: "data_dir".to_string(),
        }),
    }
}

/// Resolve, validate and load every usable code with its security.
fn load_inputs(
    config: &dyn ConfigPort,
    code_override: Option<&str>,
    bt_config: &BacktestConfig,
) -> Result<Vec<(Security, Vec<Candle>)>, StratError> {
    let data = data_adapter(config)?;
    let codes = resolve_codes(code_override, config)?;

    eprintln!("Loading data for {} code(s)...", codes.len());
    let validated = validate_universe(&data, codes, bt_config.start, bt_config.end)?;
    for skipped in &validated.skipped {
        eprintln!("  skipped {}: {:?}", skipped.code, skipped.reason);
    }

    let mut inputs = Vec::with_capacity(validated.universe.count());
    for code in validated.universe.codes {
        let security = build_security(config, &code)?;
        let candles = data.fetch_candles(&code, bt_config.start, bt_config.end)?;
        eprintln!("  {}: {} bars", code, candles.len());
        inputs.push((security, candles));
    }
    Ok(inputs)
}
