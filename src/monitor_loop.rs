//! Monitor orchestrator — spec §4.O. The continuous per-interval loop:
//! snapshot the portfolio, evaluate every open position (§4.K), process all
//! EXITs before any PYRAMID (§4.L/§5 ordering guarantee), and upsert a
//! position snapshot only on significant change. Grounded in the reference
//! crate's `main_live_cmd.rs` cooperative `loop { ... sleep(interval) }`
//! shape with a `CancellationToken` stop signal, per the Design Notes'
//! "cooperative async loop with sleep" guidance.

use crate::domain::market::MarketData;
use crate::domain::{Direction, Event, EventOutcome, EventSource, EventType, Portfolio, Symbol};
use crate::errors::TurtleResult;
use crate::event_emitter::EventEmitter;
use crate::exit::{calculate_realized_pnl, finalize_trade};
use crate::indicators::donchian::calculate_donchian;
use crate::indicators::volatility::{true_range, wilder_step};
use crate::interfaces::{Broker, DataFeed};
use crate::money::{Money, NotionalEquity};
use crate::monitor::{evaluate, PositionAction};
use crate::pyramid::{build_pyramid_opportunity, PyramidOutcome};
use crate::repository::{EventRepository, OpenPositionRepository, TradeRepository};
use crate::rules::Rules;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const HISTORY_DAYS: usize = 70;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub exits: usize,
    pub pyramids: usize,
    pub snapshots_written: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy)]
struct PositionSnapshot {
    price: Money,
    unrealized_pnl: Money,
    stop: Money,
}

enum Action {
    Exit { symbol: Symbol, market: MarketData, reason: crate::domain::ExitReason },
    Pyramid { symbol: Symbol, market: MarketData, trigger_price: Money },
    Hold { symbol: Symbol, market: MarketData },
}

pub struct MonitorLoop<'a> {
    pub data_feed: &'a dyn DataFeed,
    pub broker: &'a dyn Broker,
    pub trade_repo: &'a dyn TradeRepository,
    pub open_position_repo: &'a dyn OpenPositionRepository,
    pub events: &'a EventEmitter<'a>,
    last_snapshot: Mutex<HashMap<Symbol, PositionSnapshot>>,
}

impl<'a> MonitorLoop<'a> {
    pub fn new(
        data_feed: &'a dyn DataFeed,
        broker: &'a dyn Broker,
        trade_repo: &'a dyn TradeRepository,
        open_position_repo: &'a dyn OpenPositionRepository,
        events: &'a EventEmitter<'a>,
    ) -> Self {
        MonitorLoop { data_feed, broker, trade_repo, open_position_repo, events, last_snapshot: Mutex::new(HashMap::new()) }
    }

    /// Runs cycles every `rules.check_interval_secs` until `stop` is
    /// cancelled; cancellation is observed between cycles, never mid-cycle
    /// (spec §5: "stops the loop after the current cycle completes").
    pub async fn run(&self, portfolio: &mut Portfolio, rules: &Rules, notional_equity: impl Fn() -> NotionalEquity, stop: CancellationToken) {
        loop {
            match self.run_cycle(portfolio, rules, notional_equity()).await {
                Ok(report) => info!(?report, "monitor cycle complete"),
                Err(e) => warn!(error = %e, "monitor cycle failed"),
            }
            if stop.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(rules.check_interval_secs)) => {}
                _ = stop.cancelled() => break,
            }
        }
    }

    /// One pass over every open position. Errors on one symbol are logged
    /// and the cycle continues with the rest (spec §4.K "Failure handling").
    pub async fn run_cycle(&self, portfolio: &mut Portfolio, rules: &Rules, notional_equity: NotionalEquity) -> TurtleResult<CycleReport> {
        let mut report = CycleReport::default();
        let symbols: Vec<Symbol> = portfolio.positions.keys().cloned().collect();

        let mut actions = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            report.checked += 1;
            let position = portfolio.positions.get(symbol).expect("symbol collected from this portfolio");
            match self.build_market_data(position, rules).await {
                Ok(market) => {
                    let action = evaluate(position, &market, rules.pyramid_interval, rules.max_units_per_market);
                    actions.push(match action {
                        PositionAction::ExitStop { .. } => Action::Exit { symbol: symbol.clone(), market, reason: crate::domain::ExitReason::StopHit },
                        PositionAction::ExitBreakout { .. } => {
                            Action::Exit { symbol: symbol.clone(), market, reason: crate::domain::ExitReason::BreakoutExit }
                        }
                        PositionAction::Pyramid { trigger_price } => Action::Pyramid { symbol: symbol.clone(), market, trigger_price },
                        PositionAction::Hold => Action::Hold { symbol: symbol.clone(), market },
                    });
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(symbol = %symbol, error = %e, "monitor: symbol skipped this cycle");
                    self.events.emit(EventType::Error, EventOutcome::Error, Some(symbol.clone()), serde_json::json!({ "reason": e.to_string() })).await.ok();
                }
            }
        }

        // Exits before pyramids, globally, across the whole cycle (spec
        // §4.L ordering guarantee / §5).
        let (exits, rest): (Vec<Action>, Vec<Action>) = actions.into_iter().partition(|a| matches!(a, Action::Exit { .. }));
        for action in exits {
            if let Action::Exit { symbol, market, reason } = action {
                if let Err(e) = self.process_exit(&symbol, &market, reason, portfolio, rules).await {
                    report.errors += 1;
                    warn!(symbol = %symbol, error = %e, "monitor: exit failed");
                    continue;
                }
                self.last_snapshot.lock().unwrap().remove(&symbol);
                report.exits += 1;
            }
        }

        let (pyramids, holds): (Vec<Action>, Vec<Action>) = rest.into_iter().partition(|a| matches!(a, Action::Pyramid { .. }));
        for action in pyramids {
            if let Action::Pyramid { symbol, market, trigger_price } = action {
                match self.process_pyramid(&symbol, &market, trigger_price, portfolio, rules, notional_equity).await {
                    Ok(true) => report.pyramids += 1,
                    Ok(false) => {}
                    Err(e) => {
                        report.errors += 1;
                        warn!(symbol = %symbol, error = %e, "monitor: pyramid failed");
                    }
                }
            }
        }

        for action in holds {
            if let Action::Hold { symbol, market } = action {
                if self.maybe_snapshot(&symbol, &market, portfolio).await? {
                    report.snapshots_written += 1;
                }
            }
        }

        Ok(report)
    }

    async fn build_market_data(&self, position: &crate::domain::Position, rules: &Rules) -> TurtleResult<MarketData> {
        let bars = self.data_feed.get_bars(&position.symbol, HISTORY_DAYS).await?;
        for window in bars.windows(2) {
            crate::validation::validate_bar(&window[1], Some(window[0].close)).map_err(|e| crate::errors::TurtleError::BarValidation {
                symbol: position.symbol.clone(),
                date: window[1].date,
                reason: e.to_string(),
            })?;
        }

        let last = bars.last().ok_or_else(|| crate::errors::TurtleError::InsufficientHistory { symbol: position.symbol.clone(), needed: 1, available: 0 })?;
        let prev_close = bars.get(bars.len().saturating_sub(2)).map(|b| b.close).unwrap_or(last.close);
        let tr = true_range(last, prev_close);
        let n_value = crate::domain::NValue {
            value: wilder_step(position.latest_entry().n_at_entry, tr, rules.atr_period),
            period: rules.atr_period,
            method: crate::domain::NMethod::Wilders,
            calculated_at: Utc::now(),
        };

        let donchian_10 = calculate_donchian(&bars, rules.periods.s1_exit)?;
        let donchian_20 = calculate_donchian(&bars, rules.periods.s2_exit)?;
        let donchian_55 = calculate_donchian(&bars, rules.periods.s2_entry)?;
        let current_price = self.data_feed.get_current_price(&position.symbol).await?;

        Ok(MarketData {
            spec: crate::domain::MarketSpec {
                symbol: position.symbol.clone(),
                point_value: position.point_value,
                tick_size: dec!(0.01),
                correlation_group: position.correlation_group.clone(),
                asset_class: String::new(),
            },
            current_price,
            bar_open: last.open,
            bar_high: last.high,
            bar_low: last.low,
            n_value,
            donchian_10,
            donchian_20,
            donchian_55,
            updated_at: Utc::now(),
        })
    }

    async fn process_exit(
        &self,
        symbol: &Symbol,
        market: &MarketData,
        reason: crate::domain::ExitReason,
        portfolio: &mut Portfolio,
        _rules: &Rules,
    ) -> TurtleResult<()> {
        let position = portfolio.positions.get(symbol).expect("exit action only built for open positions");
        let fill = self.broker.close_position(position.id, position.total_contracts()).await?;
        let exit_result = calculate_realized_pnl(position, fill.price, fill.commission);

        if let Ok(Some(trade)) = self.trade_repo.open_by_symbol(symbol).await {
            let finalized = finalize_trade(trade, Utc::now(), fill.price, reason, fill.commission);
            self.trade_repo.update_exit(&finalized).await.ok();
        }

        self.events
            .emit(
                EventType::ExitExecuted,
                EventOutcome::Success,
                Some(symbol.clone()),
                serde_json::json!({
                    "reason": format!("{reason:?}"), "fill_price": fill.price.to_string(),
                    "realized_pnl": exit_result.realized_pnl.to_string(), "net_pnl": exit_result.net_pnl.to_string(),
                }),
            )
            .await
            .ok();

        let position = portfolio.positions.get_mut(symbol).expect("exit action only built for open positions");
        position.close();
        portfolio.positions.remove(symbol);
        self.open_position_repo.delete(symbol).await.ok();
        info!(symbol = %symbol, price = %market.current_price, pnl = %exit_result.net_pnl, "position closed");
        Ok(())
    }

    async fn process_pyramid(
        &self,
        symbol: &Symbol,
        market: &MarketData,
        trigger_price: Money,
        portfolio: &mut Portfolio,
        rules: &Rules,
        notional_equity: NotionalEquity,
    ) -> TurtleResult<bool> {
        let position = portfolio.positions.get(symbol).expect("pyramid action only built for open positions");
        let outcome = build_pyramid_opportunity(position, market, portfolio, rules, notional_equity, trigger_price);

        let opportunity = match outcome {
            PyramidOutcome::Ready(opp) => opp,
            PyramidOutcome::ZeroSize => {
                self.events.emit(EventType::SizingComputed, EventOutcome::Skipped, Some(symbol.clone()), serde_json::json!({ "reason": "zero_size" })).await.ok();
                return Ok(false);
            }
            PyramidOutcome::Denied(reason) => {
                self.events
                    .emit(EventType::LimitVerdict, EventOutcome::Denied, Some(symbol.clone()), serde_json::json!({ "reason": format!("{reason:?}") }))
                    .await
                    .ok();
                return Ok(false);
            }
        };

        let order = crate::interfaces::BracketOrder {
            symbol: symbol.clone(),
            direction: match position.direction {
                Direction::Long => crate::interfaces::OrderDirection::Buy,
                Direction::Short => crate::interfaces::OrderDirection::Sell,
            },
            contracts: opportunity.new_level.contracts,
            stop_price: opportunity.new_stop,
        };
        let fill = self.broker.place_bracket_order(order).await?;
        self.broker.modify_stop(position.id, opportunity.new_stop).await?;

        let mut level = opportunity.new_level;
        level.entry_price = fill.price;
        level.contracts = fill.contracts;

        let position = portfolio.positions.get_mut(symbol).expect("pyramid action only built for open positions");
        position.append_pyramid(level, opportunity.new_stop).map_err(|e| crate::errors::TurtleError::BrokerRejected { symbol: symbol.clone(), reason: e.to_string() })?;
        self.trade_repo.record_pyramid(symbol, level).await.ok();

        self.events
            .emit(
                EventType::PyramidExecuted,
                EventOutcome::Success,
                Some(symbol.clone()),
                serde_json::json!({ "unit_number": level.unit_number, "new_stop": opportunity.new_stop.to_string(), "contracts": level.contracts }),
            )
            .await
            .ok();
        info!(symbol = %symbol, unit = level.unit_number, new_stop = %opportunity.new_stop, "pyramid executed");
        Ok(true)
    }

    /// Upserts a position snapshot only on significant change: Δprice >
    /// 0.5%, Δunrealized_pnl > $50, or the stop changed (spec §4.O step 4).
    async fn maybe_snapshot(&self, symbol: &Symbol, market: &MarketData, portfolio: &Portfolio) -> TurtleResult<bool> {
        let position = match portfolio.positions.get(symbol) {
            Some(p) => p,
            None => return Ok(false),
        };

        let price_delta = match position.direction {
            Direction::Long => market.current_price - position.average_entry(),
            Direction::Short => position.average_entry() - market.current_price,
        };
        let unrealized_pnl = price_delta * position.point_value * position.total_contracts();

        let significant = {
            let mut last = self.last_snapshot.lock().unwrap();
            let is_significant = match last.get(symbol) {
                None => true,
                Some(prev) => {
                    let price_pct = if prev.price.is_zero() { Decimal::MAX } else { (market.current_price - prev.price).abs() / prev.price };
                    let pnl_delta = (unrealized_pnl - prev.unrealized_pnl).abs();
                    price_pct > dec!(0.005) || pnl_delta > Money::from_f64(50.0) || position.current_stop() != prev.stop
                }
            };
            last.insert(symbol.clone(), PositionSnapshot { price: market.current_price, unrealized_pnl, stop: position.current_stop() });
            is_significant
        };

        if significant {
            self.open_position_repo.upsert(position, Some(market.current_price)).await?;
        }
        Ok(significant)
    }
}
