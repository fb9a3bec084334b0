//! Turtle Trading engine — CLI entry point (spec §6).
//!
//! Four subcommands: `setup-db` applies schema migrations, `daily-run`
//! invokes the Scanner once, `monitor` runs the continuous position loop,
//! and `backtest` replays the scanner+monitor pair over historical bars.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::collections::HashMap;
use turtle_engine::adapters::{CsvDataFeed, PaperBroker, ResilientBroker, ResilientDataFeed};
use turtle_engine::backtest::Backtester;
use turtle_engine::config::Config;
use turtle_engine::domain::market::MarketSpec;
use turtle_engine::domain::{Bar, EventSource, Portfolio, Symbol};
use turtle_engine::drawdown::DrawdownTracker;
use turtle_engine::event_emitter::EventEmitter;
use turtle_engine::monitor_loop::MonitorLoop;
use turtle_engine::money::{Money, NotionalEquity};
use turtle_engine::reconcile;
use turtle_engine::repository::sqlite::SqliteRepositories;
use turtle_engine::scanner::Scanner;

#[derive(Parser, Debug)]
#[command(name = "turtle-engine")]
#[command(about = "Mechanical Turtle Trading rules engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Rules/process configuration file
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Debug-level tracing
    #[arg(long, global = true)]
    verbose: bool,

    /// SQLite database file location (overrides the config file's database.url)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply schema migrations, creating the database if needed
    SetupDb,

    /// Run one scanner pass over the universe
    DailyRun {
        /// Restrict the scan to these symbols (default: the whole universe)
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,

        /// Compute and log decisions without placing orders
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the continuous monitor loop over open positions
    Monitor {
        /// Run a single cycle and exit instead of looping
        #[arg(long)]
        once: bool,

        /// Seconds between cycles (overrides rules.check_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Replay the scanner+monitor pair over historical bars
    Backtest {
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        #[arg(long)]
        equity: f64,

        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, console: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    if console {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);
        tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).init();
        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    } else {
        // `monitor` reserves the console for interactive cycle output.
        tracing_subscriber::registry().with(env_filter).with(file_layer).init();
    }

    Ok(())
}

fn load_universe(path: &str, filter: &Option<Vec<String>>) -> Result<Vec<MarketSpec>> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading universe file {path}"))?;
    let mut universe: Vec<MarketSpec> = serde_json::from_str(&contents).context("parsing universe file")?;
    if let Some(symbols) = filter {
        universe.retain(|m| symbols.iter().any(|s| s == m.symbol.as_str()));
    }
    Ok(universe)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::SetupDb => "setup-db",
        Commands::DailyRun { .. } => "daily-run",
        Commands::Monitor { .. } => "monitor",
        Commands::Backtest { .. } => "backtest",
    };
    setup_logging(cli.verbose, command_name, !matches!(cli.command, Commands::Monitor { .. }))?;

    let config = Config::from_file(&cli.config).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "no config file found, using defaults");
        Config::default()
    });
    let db_path = cli.db.map(|p| p.to_string_lossy().into_owned()).unwrap_or(config.database.url.clone());

    let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;

    match cli.command {
        Commands::SetupDb => {
            let repo = SqliteRepositories::open(&db_path)?;
            repo.apply_migrations()?;
            info!(db = %db_path, "database schema ready");
            Ok(())
        }

        Commands::DailyRun { symbols, dry_run } => runtime.block_on(async {
            let repo = SqliteRepositories::open(&db_path)?;
            let universe = load_universe(&config.universe_file, &symbols)?;
            let raw_feed = CsvDataFeed::new(&config.data_dir);
            let raw_broker = PaperBroker::new(config.broker.commission_per_contract);
            let feed = ResilientDataFeed::new(&raw_feed);
            let broker = ResilientBroker::new(&raw_broker);
            let events = EventEmitter::new(&repo, run_id(), EventSource::Scanner, dry_run);

            let mut portfolio = Portfolio::new("default".to_string(), Money::from_f64(config_equity(&config)), config.rules.clone());
            let blocked = reconcile::reconcile(&portfolio, &broker, &repo).await;
            if !blocked.is_empty() {
                tracing::warn!(count = blocked.len(), "entries blocked this run pending reconciliation");
            }
            let scanner = Scanner { data_feed: &feed, broker: &broker, n_repo: &repo, trade_repo: &repo, events: &events, blocked_symbols: &blocked };

            let notional_equity = NotionalEquity(portfolio.actual_equity);
            let report = scanner.run(&universe, &mut portfolio, &config.rules, notional_equity).await?;
            info!(?report, "daily run complete");
            if report.errors > 0 {
                std::process::exit(1);
            }
            Ok(())
        }),

        Commands::Monitor { once, interval } => runtime.block_on(async {
            let repo = SqliteRepositories::open(&db_path)?;
            let raw_feed = CsvDataFeed::new(&config.data_dir);
            let raw_broker = PaperBroker::new(config.broker.commission_per_contract);
            let feed = ResilientDataFeed::new(&raw_feed);
            let broker = ResilientBroker::new(&raw_broker);
            let events = EventEmitter::new(&repo, run_id(), EventSource::Monitor, false);
            let monitor = MonitorLoop::new(&feed, &broker, &repo, &repo, &events);

            let mut rules = config.rules.clone();
            if let Some(secs) = interval {
                rules.check_interval_secs = secs;
            }
            let initial_equity = Money::from_f64(config_equity(&config));
            let mut portfolio = Portfolio::new("default".to_string(), initial_equity, rules.clone());
            let drawdown = std::sync::Mutex::new(DrawdownTracker::new(initial_equity));

            let blocked = reconcile::reconcile(&portfolio, &broker, &repo).await;
            if !blocked.is_empty() {
                tracing::warn!(count = blocked.len(), "positions require reconciliation before monitoring resumes");
            }

            if once {
                let notional_equity = drawdown.lock().unwrap().notional(&rules);
                let report = monitor.run_cycle(&mut portfolio, &rules, notional_equity).await?;
                info!(?report, "monitor cycle complete");
            } else {
                let stop = tokio_util::sync::CancellationToken::new();
                let signal_stop = stop.clone();
                tokio::spawn(async move {
                    let _ = tokio::signal::ctrl_c().await;
                    signal_stop.cancel();
                });
                monitor
                    .run(&mut portfolio, &rules, || drawdown.lock().unwrap().notional(&rules), stop)
                    .await;
            }
            Ok(())
        }),

        Commands::Backtest { start, end, equity, symbols } => {
            let universe = load_universe(&config.universe_file, &symbols)?;
            let start_date = start.parse().with_context(|| format!("parsing --start {start}"))?;
            let end_date = end.parse().with_context(|| format!("parsing --end {end}"))?;

            let mut data = HashMap::new();
            for spec in &universe {
                let bars = load_csv_bars(&config.data_dir, &spec.symbol)?;
                data.insert(spec.symbol.clone(), bars);
            }

            let backtester = Backtester::new(config.rules.clone(), config.broker.commission_per_contract);
            let result = backtester.run(&universe, data, start_date, end_date, Money::from_f64(equity));

            info!(
                trades = result.trades.len(),
                total_return_pct = %result.metrics.total_return_pct,
                win_rate_pct = %result.metrics.win_rate_pct,
                max_drawdown_pct = %result.metrics.max_drawdown_pct,
                sharpe_ratio = %result.metrics.sharpe_ratio,
                "backtest complete"
            );
            Ok(())
        }
    }
}

fn load_csv_bars(data_dir: &str, symbol: &Symbol) -> Result<Vec<Bar>> {
    let path = std::path::Path::new(data_dir).join(format!("{}.csv", symbol.as_str()));
    let mut reader = csv::Reader::from_path(&path).with_context(|| format!("opening {path:?}"))?;
    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("reading row from {path:?}"))?;
        let parse_money = |i: usize| -> Result<Money> {
            Ok(Money::from_decimal(record.get(i).context("missing column")?.parse()?))
        };
        bars.push(Bar::new(
            symbol.clone(),
            record.get(0).context("missing date column")?.parse()?,
            parse_money(1)?,
            parse_money(2)?,
            parse_money(3)?,
            parse_money(4)?,
            parse_money(5)?,
        ));
    }
    Ok(bars)
}

/// Paper-trading starting equity. A real broker adapter would source this
/// from `Broker::get_account_summary` instead (spec §4.R); `PaperBroker`
/// has no account of its own to report.
fn config_equity(_config: &Config) -> f64 {
    100_000.0
}

fn run_id() -> String {
    format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.f"))
}
