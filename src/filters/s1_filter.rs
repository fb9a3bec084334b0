//! S1 filter — spec §4.E. Pushed out of the pure signal detector and into
//! its own collaborator (Design Notes "filter-history lookup in a pure
//! detector"); invoked by the orchestrator between detection and sizing.

use crate::domain::{Signal, System};
use crate::repository::TradeRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Take,
    Skip,
}

/// S2 signals pass unconditionally (failsafe). For S1: take if no prior
/// trade, or if the last closed S1 trade for the symbol was a loser; skip
/// if it was a winner.
pub async fn apply(signal: &Signal, trades: &dyn TradeRepository) -> FilterVerdict {
    if signal.system == System::S2 {
        return FilterVerdict::Take;
    }

    match trades.last_closed_s1(&signal.symbol).await {
        Ok(None) => FilterVerdict::Take,
        Ok(Some(trade)) => match trade.was_winner() {
            Some(true) => FilterVerdict::Skip,
            _ => FilterVerdict::Take,
        },
        Err(_) => FilterVerdict::Take,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, Symbol};
    use crate::errors::TurtleResult;
    use crate::money::Money;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FakeTrades(Option<bool>);

    #[async_trait]
    impl TradeRepository for FakeTrades {
        async fn append(&self, _trade: &crate::domain::Trade) -> TurtleResult<i64> {
            Ok(1)
        }
        async fn last_closed_s1(&self, symbol: &Symbol) -> TurtleResult<Option<crate::domain::Trade>> {
            Ok(self.0.map(|was_winner| crate::domain::Trade {
                id: 1,
                symbol: symbol.clone(),
                system: System::S1,
                direction: Direction::Long,
                point_value: rust_decimal_macros::dec!(50),
                entry_date: Utc::now(),
                entry_price: Money::from_f64(100.0),
                n_at_entry: Money::from_f64(2.0),
                initial_stop: Money::from_f64(96.0),
                pyramid_levels: vec![],
                max_units: 4,
                exit_date: Some(Utc::now()),
                exit_price: Some(Money::from_f64(if was_winner { 110.0 } else { 90.0 })),
                exit_reason: Some(crate::domain::ExitReason::StopHit),
                realized_pnl: Some(Money::from_f64(if was_winner { 10.0 } else { -10.0 })),
                commission_total: Money::ZERO,
                net_pnl: Some(Money::from_f64(if was_winner { 10.0 } else { -10.0 })),
            }))
        }
        async fn open_by_symbol(&self, _symbol: &Symbol) -> TurtleResult<Option<crate::domain::Trade>> {
            Ok(None)
        }
        async fn record_pyramid(&self, _symbol: &Symbol, _level: crate::domain::position::PyramidLevel) -> TurtleResult<()> {
            Ok(())
        }
        async fn update_exit(&self, _trade: &crate::domain::Trade) -> TurtleResult<()> {
            Ok(())
        }
    }

    fn signal(system: System) -> Signal {
        Signal {
            symbol: Symbol::new("ZW"),
            system,
            direction: Direction::Long,
            breakout_price: Money::from_f64(100.0),
            triggered_at: Utc::now(),
            donchian_period: 20,
        }
    }

    #[tokio::test]
    async fn s2_always_passes() {
        let trades = FakeTrades(Some(true));
        assert_eq!(apply(&signal(System::S2), &trades).await, FilterVerdict::Take);
    }

    #[tokio::test]
    async fn s1_skips_after_a_winner() {
        let trades = FakeTrades(Some(true));
        assert_eq!(apply(&signal(System::S1), &trades).await, FilterVerdict::Skip);
    }

    #[tokio::test]
    async fn s1_takes_after_a_loser() {
        let trades = FakeTrades(Some(false));
        assert_eq!(apply(&signal(System::S1), &trades).await, FilterVerdict::Take);
    }

    #[tokio::test]
    async fn s1_takes_when_no_history() {
        let trades = FakeTrades(None);
        assert_eq!(apply(&signal(System::S1), &trades).await, FilterVerdict::Take);
    }
}
