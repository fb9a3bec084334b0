//! Scanner orchestrator — spec §4.N. Daily scan of the universe: fetch
//! history, compute indicators, detect signals, apply the S1 filter, rank
//! by strength, size, check limits, and place entry orders. Sequential
//! per-symbol work, following §5's "fold back to a single ordered sequence
//! before Broker calls" ordering guarantee; grounded in the reference
//! crate's `backtest.rs::Backtest::run` per-symbol-then-aggregate loop
//! shape, generalized to the scan→filter→rank→size→enter pipeline this
//! spec defines.

use crate::domain::market::MarketData;
use crate::domain::position::PyramidLevel;
use crate::domain::{Direction, Event, EventOutcome, EventSource, EventType, MarketSpec, Portfolio, Position, Signal, Symbol, System, Trade};
use crate::errors::TurtleResult;
use crate::event_emitter::EventEmitter;
use crate::filters::{apply_s1_filter, FilterVerdict};
use crate::indicators::donchian::calculate_donchian;
use crate::indicators::volatility::{calculate_n, true_range, wilder_step};
use crate::interfaces::{BracketOrder, Broker, DataFeed, OrderDirection};
use crate::limits::{check_limits, LimitDenialReason, LimitVerdict};
use crate::money::{Money, NotionalEquity};
use crate::repository::{NRepository, TradeRepository};
use crate::rules::Rules;
use crate::signal_detector::detect_all;
use crate::stop::calculate_stop;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{info, warn};

/// Minimum history fetched per symbol: enough for the 55-day entry channel
/// plus the N seed window, with margin (spec §4.N step 2: "≥ 70 bars").
const HISTORY_DAYS: usize = 70;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub scanned: usize,
    pub signaled: usize,
    pub entered: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    Filtered,
    ZeroSize,
    LimitDenied(LimitDenialReason),
    AlreadyInPosition,
    ReconciliationRequired,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            SkipReason::Filtered => "filtered",
            SkipReason::ZeroSize => "zero_size",
            SkipReason::LimitDenied(LimitDenialReason::PerMarket) => "limit_denied_per_market",
            SkipReason::LimitDenied(LimitDenialReason::Correlation) => "limit_denied_correlation",
            SkipReason::LimitDenied(LimitDenialReason::TotalExposure) => "limit_denied_total_exposure",
            SkipReason::AlreadyInPosition => "already_in_position",
            SkipReason::ReconciliationRequired => "reconciliation_required",
        }
    }
}

struct Candidate {
    signal: Signal,
    market: MarketData,
    spec: MarketSpec,
}

pub struct Scanner<'a> {
    pub data_feed: &'a dyn DataFeed,
    pub broker: &'a dyn Broker,
    pub n_repo: &'a dyn NRepository,
    pub trade_repo: &'a dyn TradeRepository,
    pub events: &'a EventEmitter<'a>,
    /// Symbols flagged by `reconcile::reconcile` as drifted between the
    /// in-memory `Portfolio` and the broker; no new entry is placed for
    /// these until a fresh reconciliation clears them (spec §7
    /// `ReconciliationRequired`). Empty in the common case.
    pub blocked_symbols: &'a HashSet<Symbol>,
}

impl<'a> Scanner<'a> {
    /// Runs one full daily scan over `universe` against the given
    /// `portfolio` (mutated in place as positions open) and returns the
    /// scanned/signaled/entered/skipped/errors counts spec §7 requires.
    pub async fn run(
        &self,
        universe: &[MarketSpec],
        portfolio: &mut Portfolio,
        rules: &Rules,
        notional_equity: NotionalEquity,
    ) -> TurtleResult<ScanReport> {
        let mut report = ScanReport::default();
        self.events
            .emit(EventType::ScanStarted, EventOutcome::Success, None, serde_json::json!({ "universe_size": universe.len() }))
            .await
            .ok();

        let mut candidates = Vec::new();
        for spec in universe {
            report.scanned += 1;
            match self.build_market_data(spec, rules).await {
                Ok(market) => {
                    for signal in detect_all(&market) {
                        report.signaled += 1;
                        self.events
                            .emit(
                                EventType::EntrySignal,
                                EventOutcome::Success,
                                Some(spec.symbol.clone()),
                                serde_json::json!({
                                    "system": format!("{}", signal.system),
                                    "direction": format!("{}", signal.direction),
                                    "breakout_price": signal.breakout_price.to_string(),
                                }),
                            )
                            .await
                            .ok();
                        candidates.push(Candidate { signal, market: market.clone(), spec: spec.clone() });
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(symbol = %spec.symbol, error = %e, "scan: symbol skipped");
                    self.events
                        .emit(EventType::Error, EventOutcome::Error, Some(spec.symbol.clone()), serde_json::json!({ "reason": e.to_string() }))
                        .await
                        .ok();
                }
            }
        }

        // S1 filter, independently per candidate (pure detector already ran;
        // this is the collaborator lookup the Design Notes keep out of it).
        let mut filtered = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match apply_s1_filter(&candidate.signal, self.trade_repo).await {
                FilterVerdict::Take => filtered.push(candidate),
                FilterVerdict::Skip => {
                    report.skipped += 1;
                    self.emit_skip(&candidate.signal, SkipReason::Filtered).await;
                }
            }
        }

        // Ranking key = (current_price - breakout_price)/N for both
        // directions (spec §4.N step 3); for SHORT this is naturally
        // negative, so LONGs sort descending and SHORTs sort ascending to
        // put the strongest breakout of each direction first.
        let (mut longs, mut shorts): (Vec<Candidate>, Vec<Candidate>) =
            filtered.into_iter().partition(|c| c.signal.direction == Direction::Long);
        longs.sort_by(|a, b| ranking_key(b).cmp(&ranking_key(a)));
        shorts.sort_by(|a, b| ranking_key(a).cmp(&ranking_key(b)));

        for candidate in longs.into_iter().chain(shorts) {
            self.try_enter(candidate, portfolio, rules, notional_equity, &mut report).await;
        }

        self.events
            .emit(
                EventType::ScanCompleted,
                EventOutcome::Success,
                None,
                serde_json::json!({
                    "scanned": report.scanned, "signaled": report.signaled,
                    "entered": report.entered, "skipped": report.skipped, "errors": report.errors,
                }),
            )
            .await
            .ok();

        Ok(report)
    }

    async fn build_market_data(&self, spec: &MarketSpec, rules: &Rules) -> TurtleResult<MarketData> {
        let bars = self.data_feed.get_bars(&spec.symbol, HISTORY_DAYS).await?;
        for window in bars.windows(2) {
            crate::validation::validate_bar(&window[1], Some(window[0].close)).map_err(|e| crate::errors::TurtleError::BarValidation {
                symbol: spec.symbol.clone(),
                date: window[1].date,
                reason: e.to_string(),
            })?;
        }

        let n_value = self.compute_n(spec, &bars, rules).await?;
        self.n_repo.upsert(&spec.symbol, bars.last().map(|b| b.date).unwrap_or_default(), n_value).await.ok();

        let donchian_10 = calculate_donchian(&bars, rules.periods.s1_exit)?;
        let donchian_20 = calculate_donchian(&bars, rules.periods.s2_exit)?;
        let donchian_55 = calculate_donchian(&bars, rules.periods.s2_entry)?;
        let current_price = self.data_feed.get_current_price(&spec.symbol).await?;

        Ok(MarketData {
            spec: spec.clone(),
            current_price,
            bar_open: current_price,
            bar_high: current_price,
            bar_low: current_price,
            n_value,
            donchian_10,
            donchian_20,
            donchian_55,
            updated_at: Utc::now(),
        })
    }

    /// Stateful recurrence when a persisted previous N exists; from-scratch
    /// Wilder calculation otherwise (spec §4.A).
    async fn compute_n(&self, spec: &MarketSpec, bars: &[crate::domain::Bar], rules: &Rules) -> TurtleResult<crate::domain::NValue> {
        if let Some(previous) = self.n_repo.last(&spec.symbol).await? {
            if bars.len() >= 2 {
                let last = &bars[bars.len() - 1];
                let prev_close = bars[bars.len() - 2].close;
                let tr = true_range(last, prev_close);
                let value = wilder_step(previous.value, tr, rules.atr_period);
                return Ok(crate::domain::NValue {
                    value,
                    period: rules.atr_period,
                    method: crate::domain::NMethod::Wilders,
                    calculated_at: Utc::now(),
                });
            }
        }
        calculate_n(bars, rules.atr_period)
    }

    async fn try_enter(&self, candidate: Candidate, portfolio: &mut Portfolio, rules: &Rules, notional_equity: NotionalEquity, report: &mut ScanReport) {
        let Candidate { signal, market, spec } = candidate;

        if self.blocked_symbols.contains(&signal.symbol) {
            report.skipped += 1;
            self.emit_skip(&signal, SkipReason::ReconciliationRequired).await;
            return;
        }

        if portfolio.positions.contains_key(&signal.symbol) {
            report.skipped += 1;
            self.emit_skip(&signal, SkipReason::AlreadyInPosition).await;
            return;
        }

        let size = crate::sizing::calculate_unit_size(notional_equity, market.n_value.value, spec.point_value, rules.risk_factor, rules.stop_multiplier);
        if size.is_zero() {
            report.skipped += 1;
            self.emit_skip(&signal, SkipReason::ZeroSize).await;
            return;
        }

        let verdict = check_limits(portfolio, &signal.symbol, &spec.correlation_group, 1, size.stop_risk, notional_equity);
        if let LimitVerdict::Deny(reason) = verdict {
            report.skipped += 1;
            self.emit_skip(&signal, SkipReason::LimitDenied(reason)).await;
            return;
        }

        let stop = calculate_stop(market.current_price, market.n_value.value, signal.direction, rules.stop_multiplier);
        let order = BracketOrder {
            symbol: signal.symbol.clone(),
            direction: match signal.direction {
                Direction::Long => OrderDirection::Buy,
                Direction::Short => OrderDirection::Sell,
            },
            contracts: size.contracts,
            stop_price: stop,
        };

        match self.broker.place_bracket_order(order).await {
            Ok(fill) => {
                let level = PyramidLevel {
                    unit_number: 1,
                    entry_price: fill.price,
                    entry_timestamp: fill.filled_at,
                    n_at_entry: market.n_value.value,
                    contracts: fill.contracts,
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
                    fill.filled_at,
                );
                self.trade_repo
                    .append(&Trade {
                        id: 0,
                        symbol: signal.symbol.clone(),
                        system: signal.system,
                        direction: signal.direction,
                        point_value: spec.point_value,
                        entry_date: fill.filled_at,
                        entry_price: fill.price,
                        n_at_entry: market.n_value.value,
                        initial_stop: stop,
                        pyramid_levels: vec![level],
                        max_units: rules.max_units_per_market,
                        exit_date: None,
                        exit_price: None,
                        exit_reason: None,
                        realized_pnl: None,
                        commission_total: fill.commission,
                        net_pnl: None,
                    })
                    .await
                    .ok();

                portfolio.positions.insert(signal.symbol.clone(), position);
                report.entered += 1;
                info!(symbol = %signal.symbol, system = %signal.system, contracts = fill.contracts, "position opened");
                self.events
                    .emit(
                        EventType::PositionOpened,
                        EventOutcome::Success,
                        Some(signal.symbol.clone()),
                        serde_json::json!({
                            "system": format!("{}", signal.system), "direction": format!("{}", signal.direction),
                            "contracts": fill.contracts, "entry_price": fill.price.to_string(), "stop": stop.to_string(),
                        }),
                    )
                    .await
                    .ok();
            }
            Err(e) => {
                report.errors += 1;
                self.events
                    .emit(EventType::Error, EventOutcome::Error, Some(signal.symbol.clone()), serde_json::json!({ "reason": e.to_string() }))
                    .await
                    .ok();
            }
        }
    }

    async fn emit_skip(&self, signal: &Signal, reason: SkipReason) {
        self.events
            .emit(
                EventType::TradeSkipped,
                EventOutcome::Skipped,
                Some(signal.symbol.clone()),
                serde_json::json!({ "reason": reason.as_str(), "system": format!("{}", signal.system) }),
            )
            .await
            .ok();
    }
}

fn ranking_key(candidate: &Candidate) -> Decimal {
    let n = candidate.market.n_value.value;
    if n.is_zero() {
        return Decimal::ZERO;
    }
    (candidate.market.current_price - candidate.signal.breakout_price) / n
}
