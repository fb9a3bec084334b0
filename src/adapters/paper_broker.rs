//! Paper-trading `Broker` adapter (spec §4.T) — the only Broker in this
//! repository; simulates fills at the requested price with a configurable
//! commission rate and an in-memory blotter, the paper-trading counterpart
//! of the reference crate's `Live`/`Backtest` CLI distinction
//! (`main.rs::Commands`).

use crate::domain::{PositionId, Symbol};
use crate::errors::TurtleResult;
use crate::interfaces::{BracketOrder, Broker, Fill, OrderDirection, RawPosition, StopModification};
use crate::money::Money;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

struct Blotter {
    contracts_by_symbol: HashMap<Symbol, i64>,
    stops_by_position: HashMap<PositionId, Money>,
}

pub struct PaperBroker {
    commission_per_contract: Decimal,
    blotter: Mutex<Blotter>,
}

impl PaperBroker {
    pub fn new(commission_per_contract: Decimal) -> Self {
        PaperBroker {
            commission_per_contract,
            blotter: Mutex::new(Blotter {
                contracts_by_symbol: HashMap::new(),
                stops_by_position: HashMap::new(),
            }),
        }
    }

    fn commission(&self, contracts: i64) -> Money {
        Money::from_decimal(self.commission_per_contract * Decimal::from(contracts.unsigned_abs()))
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn place_bracket_order(&self, order: BracketOrder) -> TurtleResult<Fill> {
        let signed_contracts = match order.direction {
            OrderDirection::Buy => order.contracts,
            OrderDirection::Sell => -order.contracts,
        };
        {
            let mut blotter = self.blotter.lock().unwrap();
            *blotter.contracts_by_symbol.entry(order.symbol.clone()).or_insert(0) += signed_contracts;
        }
        Ok(Fill {
            symbol: order.symbol,
            price: order.stop_price,
            contracts: order.contracts,
            commission: self.commission(order.contracts),
            filled_at: Utc::now(),
        })
    }

    async fn modify_stop(&self, position_id: PositionId, new_stop: Money) -> TurtleResult<StopModification> {
        let mut blotter = self.blotter.lock().unwrap();
        blotter.stops_by_position.insert(position_id, new_stop);
        Ok(StopModification { position_id, new_stop })
    }

    // `close_position` only receives `position_id`/`quantity`, not the
    // symbol or a market price, so the blotter can't report either here.
    async fn close_position(&self, position_id: PositionId, quantity: i64) -> TurtleResult<Fill> {
        let mut blotter = self.blotter.lock().unwrap();
        blotter.stops_by_position.remove(&position_id);
        Ok(Fill {
            symbol: Symbol::new(""),
            price: Money::ZERO,
            contracts: quantity,
            commission: self.commission(quantity),
            filled_at: Utc::now(),
        })
    }

    async fn cancel_all_orders(&self, _symbol: &Symbol) -> TurtleResult<usize> {
        Ok(0)
    }

    async fn get_positions(&self) -> TurtleResult<Vec<RawPosition>> {
        let blotter = self.blotter.lock().unwrap();
        Ok(blotter
            .contracts_by_symbol
            .iter()
            .filter(|(_, &contracts)| contracts != 0)
            .map(|(symbol, &contracts)| RawPosition { symbol: symbol.clone(), contracts })
            .collect())
    }
}
