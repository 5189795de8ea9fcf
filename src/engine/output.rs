use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::warn;

use crate::config::Config;
use crate::error::Result;

use super::types::TradeRecord;

/// Cap used instead of `f64::INFINITY` for the profit factor of an
/// all-winning run; infinity is not valid JSON.
const MAX_PROFIT_FACTOR: f64 = 999.99;

/// Aggregate metrics for one batch run.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BatchRunMetrics {
    pub total_trades: u32,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub net_profit_pts: f64,
}

/// Metrics of a batch run from its exit tuple. A run that never entered has
/// no trades; an entered run counts as one, whatever closed it.
pub fn metrics_for_run(entry_price: f64, pnl_points: f64) -> BatchRunMetrics {
    let entered = entry_price != 0.0;
    if !entered {
        return BatchRunMetrics {
            total_trades: 0,
            win_rate: 0.0,
            profit_factor: 0.0,
            net_profit_pts: 0.0,
        };
    }
    let won = pnl_points > 0.0;
    BatchRunMetrics {
        total_trades: 1,
        win_rate: if won { 1.0 } else { 0.0 },
        profit_factor: if won { MAX_PROFIT_FACTOR } else { 0.0 },
        net_profit_pts: pnl_points,
    }
}

/// Write the per-trade history CSV: `outputs/TH_<run-id>.csv`.
pub fn write_trade_history(out_dir: &Path, run_id: &str, trades: &[TradeRecord]) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("TH_{run_id}.csv"));
    let mut file = fs::File::create(&path)?;
    writeln!(file, "time,result,pnl_points,pnl_currency")?;
    for trade in trades {
        writeln!(
            file,
            "{},{},{},{}",
            trade.time.format("%Y-%m-%d %H:%M:%S"),
            trade.outcome.as_str(),
            trade.pnl_points,
            trade.pnl_currency,
        )?;
    }
    Ok(path)
}

/// Write the single-run manifest: `outputs/Manifest_<run-id>.json`.
pub fn write_run_manifest(
    out_dir: &Path,
    run_id: &str,
    trades: usize,
    final_balance: f64,
) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("Manifest_{run_id}.json"));
    let manifest = json!({
        "run_id": run_id,
        "trades": trades,
        "balance": final_balance,
    });
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(path)
}

/// Write one batch run's `Manifest.json` and `Summary.csv` under
/// `<out_dir>/batch/Run_<run-id>/<index>/`.
#[allow(clippy::too_many_arguments)]
pub fn write_batch_run(
    out_dir: &Path,
    run_id: &str,
    index: usize,
    sl_points: i32,
    tp_points: i32,
    metrics: &BatchRunMetrics,
    cfg: &Config,
) -> Result<()> {
    let run_dir = out_dir
        .join("batch")
        .join(format!("Run_{run_id}"))
        .join(index.to_string());
    fs::create_dir_all(&run_dir)?;

    let manifest = json!({
        "run_id": run_id,
        "index": index,
        "metrics": metrics,
        "params": {
            "index": index,
            "sl_points": sl_points,
            "tp_points": tp_points,
        },
        "cfg": {
            "symbol": cfg.symbol,
            "point": cfg.point,
        },
    });
    fs::write(
        run_dir.join("Manifest.json"),
        serde_json::to_string_pretty(&manifest)?,
    )?;

    let mut summary = fs::File::create(run_dir.join("Summary.csv"))?;
    writeln!(
        summary,
        "run_id,index,total_trades,win_rate,profit_factor,net_profit_pts"
    )?;
    writeln!(
        summary,
        "{},{},{},{},{},{}",
        run_id,
        index,
        metrics.total_trades,
        metrics.win_rate,
        metrics.profit_factor,
        metrics.net_profit_pts,
    )?;
    Ok(())
}

/// Best-effort error artifact: `outputs/<run-id>_error.json`. Failures to
/// write it are logged, never propagated, so the original error survives.
pub fn write_error_artifact(out_dir: &Path, run_id: &str, message: &str) {
    let attempt = || -> Result<()> {
        fs::create_dir_all(out_dir)?;
        let body = json!({ "error": message });
        fs::write(
            out_dir.join(format!("{run_id}_error.json")),
            serde_json::to_string(&body)?,
        )?;
        Ok(())
    };
    if let Err(err) = attempt() {
        warn!("failed to write error artifact: {err}");
    }
}
