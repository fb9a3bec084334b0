//! SQLite-backed repository implementation (spec §6 persistent schema),
//! grounded in the reference crate's `state_manager.rs::SqliteStateManager`
//! (`Arc<Mutex<Connection>>`, WAL mode, `INSERT OR REPLACE` upserts),
//! generalized from its ad hoc Position/Checkpoint/Trade tables to the
//! repository traits this engine's decision components actually depend on.

use crate::domain::market::{NMethod, NValue};
use crate::domain::position::PyramidLevel;
use crate::domain::{Direction, Event, ExitReason, Position, Symbol, System, Trade};
use crate::errors::{TurtleError, TurtleResult};
use crate::money::Money;
use crate::repository::{Alert, AlertRepository, AlertType, EventRepository, NRepository, OpenPositionRepository, TradeRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteRepositories {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepositories {
    pub fn open<P: AsRef<Path>>(db_path: P) -> TurtleResult<Self> {
        let conn = Connection::open(db_path).map_err(|e| TurtleError::FatalConfig(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| TurtleError::FatalConfig(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| TurtleError::FatalConfig(e.to_string()))?;
        let repo = SqliteRepositories {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.apply_migrations()?;
        Ok(repo)
    }

    /// Applies schema migrations in order; exit 0 on success — the `setup-db`
    /// CLI command (spec §6) is a thin wrapper over this.
    pub fn apply_migrations(&self) -> TurtleResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS markets (
                symbol TEXT PRIMARY KEY,
                point_value TEXT NOT NULL,
                tick_size TEXT NOT NULL,
                correlation_group TEXT NOT NULL,
                asset_class TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )
        .map_err(sql_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS calculated_indicators (
                symbol TEXT NOT NULL,
                calc_date TEXT NOT NULL,
                n_value TEXT NOT NULL,
                dc10_high TEXT, dc10_low TEXT,
                dc20_high TEXT, dc20_low TEXT,
                dc55_high TEXT, dc55_low TEXT,
                UNIQUE(symbol, calc_date)
            )",
            [],
        )
        .map_err(sql_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                system TEXT NOT NULL,
                direction TEXT NOT NULL,
                point_value TEXT NOT NULL,
                entry_date TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                n_at_entry TEXT NOT NULL,
                initial_stop TEXT NOT NULL,
                pyramid_levels TEXT NOT NULL,
                max_units INTEGER NOT NULL,
                exit_date TEXT,
                exit_price TEXT,
                exit_reason TEXT,
                realized_pnl TEXT,
                commission_total TEXT NOT NULL,
                net_pnl TEXT
            )",
            [],
        )
        .map_err(sql_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS s1_filter_history (
                symbol TEXT NOT NULL,
                trade_id INTEGER NOT NULL REFERENCES trades(id),
                was_winner INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(sql_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                direction TEXT,
                system TEXT,
                price TEXT,
                details TEXT NOT NULL,
                acknowledged INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(sql_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS open_positions (
                symbol TEXT PRIMARY KEY,
                direction TEXT NOT NULL,
                system TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                entry_date TEXT NOT NULL,
                contracts INTEGER NOT NULL,
                units INTEGER NOT NULL,
                current_price TEXT,
                stop_price TEXT,
                unrealized_pnl TEXT,
                n_value TEXT,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(sql_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                outcome TEXT NOT NULL,
                run_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                symbol TEXT,
                context TEXT NOT NULL,
                source TEXT NOT NULL,
                dry_run INTEGER NOT NULL,
                UNIQUE(run_id, sequence)
            )",
            [],
        )
        .map_err(sql_err)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_symbol_system ON trades(symbol, system)",
            [],
        )
        .map_err(sql_err)?;

        Ok(())
    }
}

fn sql_err(e: rusqlite::Error) -> TurtleError {
    TurtleError::FatalConfig(format!("sqlite error: {e}"))
}

fn parse_money(s: String) -> Money {
    Money::from_decimal(s.parse().unwrap_or_default())
}

fn parse_direction(s: &str) -> Direction {
    if s == "LONG" {
        Direction::Long
    } else {
        Direction::Short
    }
}

fn parse_system(s: &str) -> System {
    if s == "S1" {
        System::S1
    } else {
        System::S2
    }
}

fn parse_exit_reason(s: &str) -> ExitReason {
    match s {
        "StopHit" => ExitReason::StopHit,
        "BreakoutExit" => ExitReason::BreakoutExit,
        "Rollover" => ExitReason::Rollover,
        _ => ExitReason::Manual,
    }
}

#[async_trait]
impl NRepository for SqliteRepositories {
    async fn last(&self, symbol: &Symbol) -> TurtleResult<Option<NValue>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT n_value FROM calculated_indicators WHERE symbol = ?1 ORDER BY calc_date DESC LIMIT 1",
            )
            .map_err(sql_err)?;
        let result = stmt
            .query_row(params![symbol.as_str()], |row| row.get::<_, String>(0))
            .map(|n| NValue {
                value: parse_money(n),
                period: 20,
                method: NMethod::Wilders,
                calculated_at: Utc::now(),
            });
        match result {
            Ok(n) => Ok(Some(n)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(sql_err(e)),
        }
    }

    async fn upsert(&self, symbol: &Symbol, date: NaiveDate, value: NValue) -> TurtleResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO calculated_indicators (symbol, calc_date, n_value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(symbol, calc_date) DO UPDATE SET n_value = excluded.n_value",
            params![symbol.as_str(), date.to_string(), value.value.to_string()],
        )
        .map_err(sql_err)?;
        Ok(())
    }
}

#[async_trait]
impl TradeRepository for SqliteRepositories {
    async fn append(&self, trade: &Trade) -> TurtleResult<i64> {
        let conn = self.conn.lock().unwrap();
        let levels_json = serde_json::to_string(&trade.pyramid_levels).map_err(|e| TurtleError::FatalConfig(e.to_string()))?;
        conn.execute(
            "INSERT INTO trades (symbol, system, direction, point_value, entry_date, entry_price,
                n_at_entry, initial_stop, pyramid_levels, max_units, commission_total)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                trade.symbol.as_str(),
                trade.system.to_string(),
                trade.direction.to_string(),
                trade.point_value.to_string(),
                trade.entry_date.to_rfc3339(),
                trade.entry_price.to_string(),
                trade.n_at_entry.to_string(),
                trade.initial_stop.to_string(),
                levels_json,
                trade.max_units,
                trade.commission_total.to_string(),
            ],
        )
        .map_err(sql_err)?;
        Ok(conn.last_insert_rowid())
    }

    async fn last_closed_s1(&self, symbol: &Symbol) -> TurtleResult<Option<Trade>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, symbol, system, direction, point_value, entry_date, entry_price, n_at_entry,
                        initial_stop, pyramid_levels, max_units, exit_date, exit_price,
                        exit_reason, realized_pnl, commission_total, net_pnl
                 FROM trades
                 WHERE symbol = ?1 AND system = 'S1' AND exit_date IS NOT NULL AND exit_reason != 'Rollover'
                 ORDER BY exit_date DESC LIMIT 1",
            )
            .map_err(sql_err)?;

        let result = stmt.query_row(params![symbol.as_str()], |row| {
            let levels_json: String = row.get(9)?;
            let pyramid_levels: Vec<PyramidLevel> = serde_json::from_str(&levels_json).unwrap_or_default();
            let net_pnl: Option<String> = row.get(16)?;
            Ok(Trade {
                id: row.get(0)?,
                symbol: Symbol::new(row.get::<_, String>(1)?),
                system: parse_system(&row.get::<_, String>(2)?),
                direction: parse_direction(&row.get::<_, String>(3)?),
                point_value: row.get::<_, String>(4)?.parse().unwrap_or_default(),
                entry_date: DateTime::parse_from_rfc3339(&row.get::<_, String>(5)?)
                    .unwrap()
                    .with_timezone(&Utc),
                entry_price: parse_money(row.get::<_, String>(6)?),
                n_at_entry: parse_money(row.get::<_, String>(7)?),
                initial_stop: parse_money(row.get::<_, String>(8)?),
                pyramid_levels,
                max_units: row.get(10)?,
                exit_date: row
                    .get::<_, Option<String>>(11)?
                    .map(|s| DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)),
                exit_price: row.get::<_, Option<String>>(12)?.map(parse_money),
                exit_reason: row.get::<_, Option<String>>(13)?.as_deref().map(parse_exit_reason),
                realized_pnl: row.get::<_, Option<String>>(14)?.map(parse_money),
                commission_total: parse_money(row.get::<_, String>(15)?),
                net_pnl: net_pnl.map(parse_money),
            })
        });

        match result {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(sql_err(e)),
        }
    }

    async fn open_by_symbol(&self, symbol: &Symbol) -> TurtleResult<Option<Trade>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, symbol, system, direction, point_value, entry_date, entry_price, n_at_entry,
                        initial_stop, pyramid_levels, max_units, exit_date, exit_price,
                        exit_reason, realized_pnl, commission_total, net_pnl
                 FROM trades
                 WHERE symbol = ?1 AND exit_date IS NULL
                 ORDER BY entry_date DESC LIMIT 1",
            )
            .map_err(sql_err)?;

        let result = stmt.query_row(params![symbol.as_str()], |row| {
            let levels_json: String = row.get(9)?;
            let pyramid_levels: Vec<PyramidLevel> = serde_json::from_str(&levels_json).unwrap_or_default();
            let net_pnl: Option<String> = row.get(16)?;
            Ok(Trade {
                id: row.get(0)?,
                symbol: Symbol::new(row.get::<_, String>(1)?),
                system: parse_system(&row.get::<_, String>(2)?),
                direction: parse_direction(&row.get::<_, String>(3)?),
                point_value: row.get::<_, String>(4)?.parse().unwrap_or_default(),
                entry_date: DateTime::parse_from_rfc3339(&row.get::<_, String>(5)?)
                    .unwrap()
                    .with_timezone(&Utc),
                entry_price: parse_money(row.get::<_, String>(6)?),
                n_at_entry: parse_money(row.get::<_, String>(7)?),
                initial_stop: parse_money(row.get::<_, String>(8)?),
                pyramid_levels,
                max_units: row.get(10)?,
                exit_date: row
                    .get::<_, Option<String>>(11)?
                    .map(|s| DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)),
                exit_price: row.get::<_, Option<String>>(12)?.map(parse_money),
                exit_reason: row.get::<_, Option<String>>(13)?.as_deref().map(parse_exit_reason),
                realized_pnl: row.get::<_, Option<String>>(14)?.map(parse_money),
                commission_total: parse_money(row.get::<_, String>(15)?),
                net_pnl: net_pnl.map(parse_money),
            })
        });

        match result {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(sql_err(e)),
        }
    }

    async fn record_pyramid(&self, symbol: &Symbol, level: PyramidLevel) -> TurtleResult<()> {
        let conn = self.conn.lock().unwrap();
        let existing: String = conn
            .query_row(
                "SELECT pyramid_levels FROM trades WHERE symbol = ?1 AND exit_date IS NULL ORDER BY entry_date DESC LIMIT 1",
                params![symbol.as_str()],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        let mut levels: Vec<PyramidLevel> = serde_json::from_str(&existing).unwrap_or_default();
        levels.push(level);
        let levels_json = serde_json::to_string(&levels).map_err(|e| TurtleError::FatalConfig(e.to_string()))?;
        conn.execute(
            "UPDATE trades SET pyramid_levels = ?1 WHERE symbol = ?2 AND exit_date IS NULL",
            params![levels_json, symbol.as_str()],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    async fn update_exit(&self, trade: &Trade) -> TurtleResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE trades SET exit_date = ?1, exit_price = ?2, exit_reason = ?3,
                realized_pnl = ?4, net_pnl = ?5 WHERE id = ?6",
            params![
                trade.exit_date.map(|d| d.to_rfc3339()),
                trade.exit_price.map(|p| p.to_string()),
                trade.exit_reason.map(|r| format!("{r:?}")),
                trade.realized_pnl.map(|p| p.to_string()),
                trade.net_pnl.map(|p| p.to_string()),
                trade.id,
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }
}

#[async_trait]
impl AlertRepository for SqliteRepositories {
    async fn insert(&self, alert: &Alert) -> TurtleResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts (timestamp, symbol, alert_type, details, acknowledged)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                alert.timestamp.to_rfc3339(),
                alert.symbol.as_str(),
                format!("{:?}", alert.alert_type),
                alert.details.to_string(),
                alert.acknowledged as i64,
            ],
        )
        .map_err(sql_err)?;
        Ok(conn.last_insert_rowid())
    }

    async fn acknowledge(&self, id: i64) -> TurtleResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE alerts SET acknowledged = 1 WHERE id = ?1", params![id])
            .map_err(sql_err)?;
        Ok(())
    }
}

#[async_trait]
impl OpenPositionRepository for SqliteRepositories {
    async fn upsert(&self, position: &Position, current_price: Option<Money>) -> TurtleResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO open_positions (symbol, direction, system, entry_price, entry_date,
                contracts, units, current_price, stop_price, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(symbol) DO UPDATE SET
                contracts = excluded.contracts, units = excluded.units,
                current_price = excluded.current_price, stop_price = excluded.stop_price,
                updated_at = excluded.updated_at",
            params![
                position.symbol.as_str(),
                position.direction.to_string(),
                position.system.to_string(),
                position.average_entry().to_string(),
                position.opened_at.to_rfc3339(),
                position.total_contracts(),
                position.total_units(),
                current_price.map(|p| p.to_string()),
                position.current_stop().to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    async fn delete(&self, symbol: &Symbol) -> TurtleResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM open_positions WHERE symbol = ?1", params![symbol.as_str()])
            .map_err(sql_err)?;
        Ok(())
    }

    async fn all(&self) -> TurtleResult<Vec<Symbol>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT symbol FROM open_positions").map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(rows.into_iter().map(Symbol::new).collect())
    }
}

#[async_trait]
impl EventRepository for SqliteRepositories {
    async fn append(&self, event: &Event) -> TurtleResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO events (timestamp, event_type, outcome, run_id, sequence, symbol, context, source, dry_run)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.timestamp.to_rfc3339(),
                format!("{:?}", event.event_type),
                format!("{:?}", event.outcome),
                event.run_id,
                event.sequence as i64,
                event.symbol.as_ref().map(|s| s.as_str().to_string()),
                event.context.to_string(),
                format!("{:?}", event.source),
                event.dry_run as i64,
            ],
        )
        .map_err(sql_err)?;
        Ok(conn.last_insert_rowid())
    }
}
