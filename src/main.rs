use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use barsim::config::Config;
use barsim::data::load_bars;
use barsim::engine::batch::{simulate_batch, BatchParams};
use barsim::engine::indicators::compute_rsi_and_flags;
use barsim::engine::output;
use barsim::engine::simulator::run_simulation;
use barsim::strategy::load_strategy;

#[derive(Parser)]
#[command(name = "barsim", about = "Deterministic OHLC-bar backtesting engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Single-run backtest over a CSV bar series.
    RunCpu {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        run_id: String,
        /// Bar CSV path; defaults to the config's data_path.
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long, default_value = "rsi_reversal")]
        strategy: String,
        #[arg(long, default_value = "info")]
        log_level: String,
    },
    /// Batched backtest over (SL, TP) parameter variants.
    RunBatch {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        run_id: String,
        /// Number of parameter variants; defaults to the config's batch_size.
        #[arg(long)]
        runs: Option<usize>,
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

impl Command {
    fn run_id(&self) -> &str {
        match self {
            Command::RunCpu { run_id, .. } | Command::RunBatch { run_id, .. } => run_id,
        }
    }

    fn log_level(&self) -> &str {
        match self {
            Command::RunCpu { log_level, .. } | Command::RunBatch { log_level, .. } => log_level,
        }
    }
}

fn init_logging(run_id: &str, level: &str) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all("logs")?;
    let file = tracing_appender::rolling::never("logs", format!("run_{run_id}.log"));
    let (file_writer, guard) = tracing_appender::non_blocking(file);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    Ok(guard)
}

fn run_cpu(
    config: &Path,
    run_id: &str,
    data: Option<&Path>,
    strategy_name: &str,
) -> Result<()> {
    let cfg = Config::from_yaml(config)?;
    let mut strategy = load_strategy(strategy_name)?;
    let data_path = data.map_or_else(|| PathBuf::from(&cfg.data_path), Path::to_path_buf);
    let bars = load_bars(&data_path)?;
    tracing::info!(
        symbol = %cfg.symbol,
        bars = bars.len(),
        strategy = strategy_name,
        "starting single-run backtest"
    );

    let result = run_simulation(&bars, &cfg, strategy.as_mut())?;

    let out_dir = Path::new("outputs");
    output::write_trade_history(out_dir, run_id, &result.trades)?;
    output::write_run_manifest(out_dir, run_id, result.trades.len(), result.final_balance)?;
    tracing::info!(trades = result.trades.len(), "artifacts written");
    Ok(())
}

fn run_batch(config: &Path, run_id: &str, runs: Option<usize>) -> Result<()> {
    let cfg = Config::from_yaml(config)?;
    let bars = load_bars(&cfg.data_path)?;
    let n_runs = runs.unwrap_or(cfg.batch_size as usize);
    let n_minutes = bars.len();
    tracing::info!(
        symbol = %cfg.symbol,
        runs = n_runs,
        minutes = n_minutes,
        "starting batched backtest"
    );

    // Entry sides come from the M15 RSI flags; every run replays the same
    // series with its own (SL, TP) pair.
    let indicators = compute_rsi_and_flags(&bars, &cfg)?;
    let entry_side_one: Vec<i8> = indicators
        .flags
        .iter()
        .map(|f| {
            if f.oversold {
                1
            } else if f.overbought {
                -1
            } else {
                0
            }
        })
        .collect();

    let mut open = Vec::with_capacity(n_runs * n_minutes);
    let mut high = Vec::with_capacity(n_runs * n_minutes);
    let mut low = Vec::with_capacity(n_runs * n_minutes);
    let mut close = Vec::with_capacity(n_runs * n_minutes);
    let mut entry_side = Vec::with_capacity(n_runs * n_minutes);
    for _ in 0..n_runs {
        open.extend(bars.iter().map(|b| b.open));
        high.extend(bars.iter().map(|b| b.high));
        low.extend(bars.iter().map(|b| b.low));
        close.extend(bars.iter().map(|b| b.close));
        entry_side.extend_from_slice(&entry_side_one);
    }
    let sl_points: Vec<i32> = (0..n_runs)
        .map(|i| cfg.stoploss_points + i as i32)
        .collect();
    let tp_points: Vec<i32> = sl_points
        .iter()
        .map(|&sl| (cfg.rr * f64::from(sl)).round() as i32)
        .collect();

    let params = BatchParams {
        open: &open,
        high: &high,
        low: &low,
        close: &close,
        entry_side: &entry_side,
        sl_points: &sl_points,
        tp_points: &tp_points,
        point: cfg.point,
        ohlc_order: cfg.ohlc_order,
        spread_points: cfg.fixed_spread_point,
        spread_policy: cfg.spread_policy,
        n_minutes,
    };
    let result = simulate_batch(&params)?;

    let out_dir = Path::new("outputs");
    let progress = ProgressBar::new(n_runs as u64);
    for index in 0..n_runs {
        let metrics =
            output::metrics_for_run(result.entry_price[index], result.pnl_points[index]);
        output::write_batch_run(
            out_dir,
            run_id,
            index,
            sl_points[index],
            tp_points[index],
            &metrics,
            &cfg,
        )?;
        progress.inc(1);
    }
    progress.finish_and_clear();
    tracing::info!(runs = n_runs, "batch artifacts written");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.command.run_id(), cli.command.log_level())?;

    let outcome = match &cli.command {
        Command::RunCpu {
            config,
            run_id,
            data,
            strategy,
            ..
        } => run_cpu(config, run_id, data.as_deref(), strategy),
        Command::RunBatch {
            config,
            run_id,
            runs,
            ..
        } => run_batch(config, run_id, *runs),
    };

    if let Err(err) = outcome {
        tracing::error!("run failed: {err}");
        output::write_error_artifact(Path::new("outputs"), cli.command.run_id(), &err.to_string());
        std::process::exit(1);
    }
    Ok(())
}
