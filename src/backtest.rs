//! Backtest engine — spec §4.U (expansion). An event-driven harness that
//! replays the same decision components (A-M) bar-by-bar over historical
//! data instead of wall-clock time, following the reference crate's
//! `Backtester::run` T+1 execution and multi-symbol date-alignment pattern
//! (`align_data`, `calculate_metrics`): signals detected on bar *i* fill at
//! bar *i+1*'s open; exits/pyramids fire intraday off the same bar's H/L,
//! matching the live monitor's own rule.
//!
//! Unlike the live `Scanner`/`MonitorLoop` orchestrators, this harness is
//! synchronous: there are no broker/data-feed collaborators to await, only
//! an in-memory bar series, so it drives components A-M directly instead
//! of going through the async `DataFeed`/`Broker` traits.

use crate::domain::market::MarketData;
use crate::domain::position::PyramidLevel;
use crate::domain::{Bar, Direction, ExitReason, MarketSpec, Portfolio, Position, Signal, Symbol, System, Trade};
use crate::drawdown::DrawdownTracker;
use crate::exit::{calculate_realized_pnl, finalize_trade};
use crate::indicators::donchian::calculate_donchian;
use crate::indicators::volatility::calculate_n;
use crate::limits::{check_limits, LimitVerdict};
use crate::monitor::{evaluate, PositionAction};
use crate::money::Money;
use crate::pyramid::{build_pyramid_opportunity, PyramidOutcome};
use crate::rules::Rules;
use crate::signal_detector::detect_all;
use crate::sizing::calculate_unit_size;
use crate::stop::calculate_stop;
use crate::validation::validate_bar;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Bars needed before the longest lookback window (55-day entry channel or
/// the N seed window, whichever is larger) is valid.
fn warmup_bars(rules: &Rules) -> usize {
    rules.periods.s2_entry.max(rules.atr_period + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceMetrics {
    pub total_return_pct: Decimal,
    pub win_rate_pct: Decimal,
    pub profit_factor: Decimal,
    pub max_drawdown_pct: Decimal,
    pub sharpe_ratio: Decimal,
    pub calmar_ratio: Decimal,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<(NaiveDate, Money)>,
    pub metrics: PerformanceMetrics,
}

/// A signal detected on bar *i*, waiting to fill at bar *i+1*'s open.
struct PendingEntry {
    signal: Signal,
    spec: MarketSpec,
    n_value: Money,
}

/// Drives the Scanner/Monitor decision chain over historical bars for a
/// fixed universe.
pub struct Backtester {
    pub rules: Rules,
    pub commission_per_contract: Decimal,
}

impl Backtester {
    pub fn new(rules: Rules, commission_per_contract: Decimal) -> Self {
        Backtester { rules, commission_per_contract }
    }

    pub fn run(
        &self,
        universe: &[MarketSpec],
        data: HashMap<Symbol, Vec<Bar>>,
        start: NaiveDate,
        end: NaiveDate,
        initial_equity: Money,
    ) -> BacktestResult {
        let (dates, aligned) = align_data(&data);
        if dates.is_empty() {
            warn!("no aligned data available for backtesting");
            return BacktestResult::default();
        }

        let specs: HashMap<Symbol, MarketSpec> = universe.iter().map(|s| (s.symbol.clone(), s.clone())).collect();
        let warmup = warmup_bars(&self.rules);

        let mut portfolio = Portfolio::new("backtest".to_string(), initial_equity, self.rules.clone());
        let mut drawdown = DrawdownTracker::new(initial_equity);
        let mut trades: Vec<Trade> = Vec::new();
        let mut open_trades: HashMap<Symbol, Trade> = HashMap::new();
        let mut s1_history: HashMap<Symbol, Trade> = HashMap::new();
        let mut pending: Vec<PendingEntry> = Vec::new();
        let mut equity_curve: Vec<(NaiveDate, Money)> = Vec::new();

        for i in 0..dates.len() {
            let date = dates[i];
            if i < warmup {
                continue;
            }

            // Step 1: fill yesterday's entry signals at today's open (T+1).
            let todays_pending = std::mem::take(&mut pending);
            for entry in todays_pending {
                let symbol = entry.signal.symbol.clone();
                if portfolio.positions.contains_key(&symbol) {
                    continue;
                }
                let Some(bars) = aligned.get(&symbol) else { continue };
                let bar = bars[i].clone();
                self.try_enter(&entry, &bar, &mut portfolio, &mut drawdown, &mut open_trades);
            }

            if date < start || date > end {
                continue;
            }

            // Step 2: monitor every open position against today's bar.
            // Process all exits before any pyramid across the whole cycle
            // (spec §5 cycle-ordering guarantee).
            let mut exits: Vec<(Symbol, Bar, ExitReason, Money)> = Vec::new();
            let mut pyramids: Vec<(Symbol, MarketData, Money)> = Vec::new();

            let open_symbols: Vec<Symbol> = portfolio.positions.keys().cloned().collect();
            for symbol in &open_symbols {
                let (Some(bars), Some(spec)) = (aligned.get(symbol), specs.get(symbol)) else { continue };
                let bar = &bars[i];
                let market = match self.market_data(spec, &bars[..=i]) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "skipping position, insufficient indicator history");
                        continue;
                    }
                };

                let position = &portfolio.positions[symbol];
                match evaluate(position, &market, self.rules.pyramid_interval, self.rules.max_units_per_market) {
                    PositionAction::ExitStop { fill_price } => exits.push((symbol.clone(), bar.clone(), ExitReason::StopHit, fill_price)),
                    PositionAction::ExitBreakout { trigger_price } => exits.push((symbol.clone(), bar.clone(), ExitReason::BreakoutExit, trigger_price)),
                    PositionAction::Pyramid { trigger_price } => pyramids.push((symbol.clone(), market, trigger_price)),
                    PositionAction::Hold => {}
                }
            }

            for (symbol, bar, reason, fill_price) in exits {
                self.process_exit(&symbol, &bar, reason, fill_price, &mut portfolio, &mut open_trades, &mut trades, &mut s1_history);
            }

            for (symbol, market, trigger_price) in pyramids {
                self.process_pyramid(&symbol, &market, trigger_price, &mut portfolio, &mut drawdown, &mut open_trades);
            }

            // Step 3: detect today's signals for symbols with no position;
            // survivors of the S1 loser-filter queue for tomorrow's open.
            for spec in universe {
                if portfolio.positions.contains_key(&spec.symbol) {
                    continue;
                }
                let Some(bars) = aligned.get(&spec.symbol) else { continue };
                let market = match self.market_data(spec, &bars[..=i]) {
                    Ok(m) => m,
                    Err(_) => continue,
                };

                for signal in detect_all(&market) {
                    if signal.system == System::S1 {
                        if let Some(last) = s1_history.get(&signal.symbol) {
                            if last.was_winner() == Some(true) {
                                continue;
                            }
                        }
                    }
                    pending.push(PendingEntry { signal, spec: spec.clone(), n_value: market.n_value.value });
                }
            }

            // Mark to market and record today's equity.
            let unrealized: Money = portfolio
                .positions
                .values()
                .filter_map(|p| aligned.get(&p.symbol).map(|bars| mark_to_market(p, bars[i].close)))
                .sum();
            let total_equity = initial_equity + realized_pnl_total(&trades) + unrealized;
            drawdown.update_equity(total_equity);
            equity_curve.push((date, total_equity));
        }

        // Close anything still open at the end of the replay window.
        let remaining: Vec<Symbol> = portfolio.positions.keys().cloned().collect();
        for symbol in remaining {
            if let Some(bars) = aligned.get(&symbol) {
                let last = bars[bars.len() - 1].clone();
                self.process_exit(&symbol, &last, ExitReason::Manual, last.close, &mut portfolio, &mut open_trades, &mut trades, &mut s1_history);
            }
        }

        let metrics = calculate_metrics(&trades, &equity_curve, initial_equity);
        BacktestResult { trades, equity_curve, metrics }
    }

    fn market_data(&self, spec: &MarketSpec, history: &[Bar]) -> crate::errors::TurtleResult<MarketData> {
        if history.len() >= 2 {
            let previous_close = history[history.len() - 2].close;
            validate_bar(&history[history.len() - 1], Some(previous_close)).map_err(|e| crate::errors::TurtleError::BarValidation {
                symbol: spec.symbol.clone(),
                date: history[history.len() - 1].date,
                reason: e.to_string(),
            })?;
        }

        let n_value = calculate_n(history, self.rules.atr_period)?;
        let donchian_10 = calculate_donchian(history, self.rules.periods.s1_exit)?;
        let donchian_20 = calculate_donchian(history, self.rules.periods.s2_exit)?;
        let donchian_55 = calculate_donchian(history, self.rules.periods.s2_entry)?;
        let bar = &history[history.len() - 1];

        Ok(MarketData {
            spec: spec.clone(),
            current_price: bar.close,
            bar_open: bar.open,
            bar_high: bar.high,
            bar_low: bar.low,
            n_value,
            donchian_10,
            donchian_20,
            donchian_55,
            updated_at: Utc::now(),
        })
    }

    fn commission(&self, contracts: i64) -> Money {
        Money::from_decimal(self.commission_per_contract * Decimal::from(contracts.unsigned_abs()))
    }

    fn try_enter(
        &self,
        entry: &PendingEntry,
        bar: &Bar,
        portfolio: &mut Portfolio,
        drawdown: &mut DrawdownTracker,
        open_trades: &mut HashMap<Symbol, Trade>,
    ) {
        let signal = &entry.signal;
        let spec = &entry.spec;
        let notional_equity = drawdown.notional(&self.rules);

        let size = calculate_unit_size(notional_equity, entry.n_value, spec.point_value, self.rules.risk_factor, self.rules.stop_multiplier);
        if size.is_zero() {
            return;
        }

        let verdict = check_limits(portfolio, &signal.symbol, &spec.correlation_group, 1, size.stop_risk, notional_equity);
        if let LimitVerdict::Deny(_) = verdict {
            return;
        }

        let entry_price = bar.open;
        let stop = calculate_stop(entry_price, entry.n_value, signal.direction, self.rules.stop_multiplier);
        let timestamp = midnight(bar.date);

        let level = PyramidLevel {
            unit_number: 1,
            entry_price,
            entry_timestamp: timestamp,
            n_at_entry: entry.n_value,
            contracts: size.contracts,
            original_stop: stop,
        };
        let position = Position::open(
            signal.symbol.clone(),
            signal.direction,
            signal.system,
            spec.correlation_group.clone(),
            spec.point_value,
            level,
            stop,
            timestamp,
        );

        let trade = Trade {
            id: 0,
            symbol: signal.symbol.clone(),
            system: signal.system,
            direction: signal.direction,
            point_value: spec.point_value,
            entry_date: timestamp,
            entry_price,
            n_at_entry: entry.n_value,
            initial_stop: stop,
            pyramid_levels: vec![level],
            max_units: self.rules.max_units_per_market,
            exit_date: None,
            exit_price: None,
            exit_reason: None,
            realized_pnl: None,
            commission_total: self.commission(size.contracts),
            net_pnl: None,
        };

        open_trades.insert(signal.symbol.clone(), trade);
        portfolio.positions.insert(signal.symbol.clone(), position);
    }

    fn process_exit(
        &self,
        symbol: &Symbol,
        bar: &Bar,
        reason: ExitReason,
        fill_price: Money,
        portfolio: &mut Portfolio,
        open_trades: &mut HashMap<Symbol, Trade>,
        trades: &mut Vec<Trade>,
        s1_history: &mut HashMap<Symbol, Trade>,
    ) {
        let Some(position) = portfolio.positions.get(symbol) else { return };
        let commission = self.commission(position.total_contracts());
        let timestamp = midnight(bar.date);

        if let Some(open_trade) = open_trades.remove(symbol) {
            let system = open_trade.system;
            let finalized = finalize_trade(open_trade, timestamp, fill_price, reason, commission);
            if system == System::S1 && reason != ExitReason::Rollover {
                s1_history.insert(symbol.clone(), finalized.clone());
            }
            trades.push(finalized);
        } else {
            // No matching Trade record (closed at the end of the replay
            // window without ever going through try_enter's bookkeeping
            // path in this run); fall back to the position-level P&L.
            let _ = calculate_realized_pnl(position, fill_price, commission);
        }

        if let Some(position) = portfolio.positions.get_mut(symbol) {
            position.close();
        }
        portfolio.positions.remove(symbol);
    }

    fn process_pyramid(
        &self,
        symbol: &Symbol,
        market: &MarketData,
        trigger_price: Money,
        portfolio: &mut Portfolio,
        drawdown: &mut DrawdownTracker,
        open_trades: &mut HashMap<Symbol, Trade>,
    ) {
        let notional_equity = drawdown.notional(&self.rules);
        let position = match portfolio.positions.get(symbol) {
            Some(p) => p.clone(),
            None => return,
        };
        let outcome = build_pyramid_opportunity(&position, market, portfolio, &self.rules, notional_equity, trigger_price);
        let PyramidOutcome::Ready(opportunity) = outcome else { return };

        let level = opportunity.new_level;
        if let Some(position) = portfolio.positions.get_mut(symbol) {
            if position.append_pyramid(level, opportunity.new_stop).is_err() {
                return;
            }
        }
        if let Some(trade) = open_trades.get_mut(symbol) {
            trade.pyramid_levels.push(level);
            trade.commission_total += self.commission(level.contracts);
        }
    }
}

fn mark_to_market(position: &Position, current_price: Money) -> Money {
    let price_delta = current_price - position.average_entry();
    let signed = match position.direction {
        Direction::Long => price_delta,
        Direction::Short => -price_delta,
    };
    signed * position.point_value * position.total_contracts()
}

fn realized_pnl_total(trades: &[Trade]) -> Money {
    trades.iter().filter_map(|t| t.net_pnl).sum()
}

fn midnight(date: NaiveDate) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
}

/// Forward-fills every symbol's bar series onto the union of all observed
/// dates, following the reference crate's `Backtester::align_data` (same
/// forward-fill shape, rewritten against `Bar`/`Money`). Every returned
/// series has exactly `dates.len()` entries so callers can index every
/// symbol's series by the same `i` as the shared `dates` axis; a symbol
/// whose history starts after the global first date is back-filled with
/// its own first bar for the leading gap (those synthetic zero-range days
/// fall inside the warmup window in practice, same as any other
/// insufficient-history stretch).
fn align_data(data: &HashMap<Symbol, Vec<Bar>>) -> (Vec<NaiveDate>, HashMap<Symbol, Vec<Bar>>) {
    let mut all_dates: HashSet<NaiveDate> = HashSet::new();
    for bars in data.values() {
        for bar in bars {
            all_dates.insert(bar.date);
        }
    }
    let mut dates: Vec<NaiveDate> = all_dates.into_iter().collect();
    dates.sort();

    let mut aligned = HashMap::new();
    for (symbol, bars) in data {
        if bars.is_empty() {
            continue;
        }
        let mut series: Vec<Bar> = Vec::with_capacity(dates.len());
        let mut cursor = 0usize;
        let mut last: Option<Bar> = None;
        for &date in &dates {
            while cursor < bars.len() && bars[cursor].date <= date {
                last = Some(bars[cursor].clone());
                cursor += 1;
            }
            match &last {
                Some(bar) if bar.date == date => series.push(bar.clone()),
                Some(bar) => {
                    let mut filled = bar.clone();
                    filled.date = date;
                    series.push(filled);
                }
                None => {
                    let mut filled = bars[0].clone();
                    filled.date = date;
                    series.push(filled);
                }
            }
        }
        aligned.insert(symbol.clone(), series);
    }
    (dates, aligned)
}

fn calculate_metrics(trades: &[Trade], equity_curve: &[(NaiveDate, Money)], initial_equity: Money) -> PerformanceMetrics {
    if equity_curve.is_empty() {
        return PerformanceMetrics::default();
    }

    let final_equity = equity_curve.last().unwrap().1;
    let total_return_pct = if initial_equity.is_zero() {
        Decimal::ZERO
    } else {
        ((final_equity - initial_equity) / initial_equity) * Decimal::from(100)
    };

    let closed: Vec<&Trade> = trades.iter().filter(|t| t.net_pnl.is_some()).collect();
    let winners: Vec<&Trade> = closed.iter().filter(|t| t.was_winner() == Some(true)).copied().collect();
    let losers: Vec<&Trade> = closed.iter().filter(|t| t.was_winner() == Some(false)).copied().collect();

    let win_rate_pct = if closed.is_empty() {
        Decimal::ZERO
    } else {
        Decimal::from(winners.len()) / Decimal::from(closed.len()) * Decimal::from(100)
    };

    let gross_profit: Money = winners.iter().filter_map(|t| t.net_pnl).sum();
    let gross_loss: Money = losers.iter().filter_map(|t| t.net_pnl).map(|m| m.abs()).sum();
    let profit_factor = if gross_loss.is_zero() { Decimal::ZERO } else { gross_profit.inner() / gross_loss.inner() };

    let mut peak = initial_equity;
    let mut max_dd = Decimal::ZERO;
    for &(_, equity) in equity_curve {
        peak = peak.max(equity);
        if !peak.is_zero() {
            let dd = ((peak - equity) / peak).max(Decimal::ZERO);
            max_dd = max_dd.max(dd);
        }
    }

    let daily_returns: Vec<Decimal> = equity_curve
        .windows(2)
        .filter_map(|w| {
            let (_, prev) = w[0];
            let (_, curr) = w[1];
            if prev.is_zero() || curr == prev {
                None
            } else {
                Some((curr - prev) / prev)
            }
        })
        .collect();

    let sharpe_ratio = if daily_returns.is_empty() {
        Decimal::ZERO
    } else {
        let mean = daily_returns.iter().sum::<Decimal>() / Decimal::from(daily_returns.len());
        let variance = daily_returns.iter().map(|r| (*r - mean) * (*r - mean)).sum::<Decimal>() / Decimal::from(daily_returns.len());
        let std_dev = sqrt_decimal(variance);
        if std_dev.is_zero() {
            Decimal::ZERO
        } else {
            mean / std_dev * sqrt_decimal(Decimal::from(252))
        }
    };

    let calmar_ratio = if max_dd.is_zero() { Decimal::ZERO } else { (total_return_pct / Decimal::from(100)) / max_dd };

    PerformanceMetrics {
        total_return_pct,
        win_rate_pct,
        profit_factor,
        max_drawdown_pct: max_dd * Decimal::from(100),
        sharpe_ratio,
        calmar_ratio,
        total_trades: closed.len(),
        winning_trades: winners.len(),
        losing_trades: losers.len(),
    }
}

/// Newton's method; `Decimal` has no native `sqrt`, and the reference
/// crate's metrics only ever run over `f64` — this keeps backtest output on
/// the same `Decimal` type as the rest of the engine instead of round-
/// tripping through floats.
fn sqrt_decimal(value: Decimal) -> Decimal {
    if value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let mut x = value;
    for _ in 0..50 {
        x = (x + value / x) / Decimal::from(2);
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(symbol: &str, date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(Symbol::new(symbol), date, Money::from_f64(open), Money::from_f64(high), Money::from_f64(low), Money::from_f64(close), Money::ZERO)
    }

    fn flat_series(symbol: &str, start: NaiveDate, days: usize, price: f64) -> Vec<Bar> {
        (0..days)
            .map(|i| bar(symbol, start + chrono::Duration::days(i as i64), price, price + 1.0, price - 1.0, price))
            .collect()
    }

    #[test]
    fn align_data_forward_fills_missing_symbol_days() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut data = HashMap::new();
        data.insert(Symbol::new("ZW"), flat_series("ZW", start, 5, 800.0));
        data.insert(
            Symbol::new("CL"),
            vec![bar("CL", start, 80.0, 81.0, 79.0, 80.0), bar("CL", start + chrono::Duration::days(4), 82.0, 83.0, 81.0, 82.0)],
        );

        let (dates, aligned) = align_data(&data);
        assert_eq!(dates.len(), 5);
        assert_eq!(aligned[&Symbol::new("CL")].len(), 5);
        // day 2 is forward-filled from day 0's close
        assert_eq!(aligned[&Symbol::new("CL")][2].close, Money::from_f64(80.0));
    }

    #[test]
    fn flat_market_produces_no_trades() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = start + chrono::Duration::days(120);
        let mut data = HashMap::new();
        data.insert(Symbol::new("ZW"), flat_series("ZW", start, 130, 800.0));

        let universe = vec![MarketSpec {
            symbol: Symbol::new("ZW"),
            point_value: dec!(50),
            tick_size: dec!(0.25),
            correlation_group: "grains".to_string(),
            asset_class: "futures".to_string(),
        }];

        let backtester = Backtester::new(Rules::default(), dec!(2.5));
        let result = backtester.run(&universe, data, start, end, Money::from_f64(100_000.0));
        assert!(result.trades.is_empty());
    }
}
