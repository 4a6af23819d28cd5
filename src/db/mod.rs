//! SQLite persistence for the portfolio record, the trade ledger, and
//! report bookkeeping.
//!
//! Stores everything a run needs to resume:
//! - The single versioned portfolio record
//! - One ledger row per executed asset leg
//! - Report metadata (message ids, monthly PnL, last inactivity notice)

mod state;

use state::{decode_document, decode_state, encode_state, STATE_SCHEMA_VERSION};

use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, info};

use crate::models::{Asset, LedgerEntry, PortfolioState, Sentiment, Tier, TradeAction, TradeSide};
use crate::trading::LadderEngine;

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Stored portfolio record.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredState {
    schema_version: i64,
    payload: String,
}

/// Stored ledger row. Decimals are kept as TEXT to survive the round trip.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredTrade {
    pub id: i64,
    pub run_id: String,
    pub executed_at: String,
    pub asset: String,
    pub side: String,
    pub tier: i64,
    pub sentiment: i64,
    pub price: String,
    pub usd_amount: String,
    pub asset_delta: String,
    pub cash_after: String,
    pub asset_after: String,
    pub avg_entry_price: Option<String>,
    pub realized_pnl: Option<String>,
}

impl TryFrom<StoredTrade> for LedgerEntry {
    type Error = anyhow::Error;

    fn try_from(row: StoredTrade) -> Result<Self> {
        let id = row.id;
        let tier = u8::try_from(row.tier).with_context(|| format!("trade {}: bad tier", id))?;
        let sentiment = Sentiment::new(row.sentiment)
            .ok_or_else(|| anyhow!("trade {}: bad sentiment {}", id, row.sentiment))?;

        Ok(LedgerEntry {
            id,
            executed_at: parse_time(&row.executed_at)?,
            asset: Asset::from_symbol(&row.asset)
                .ok_or_else(|| anyhow!("trade {}: unknown asset {}", id, row.asset))?,
            side: TradeSide::from_str(&row.side)
                .ok_or_else(|| anyhow!("trade {}: unknown side {}", id, row.side))?,
            tier: Tier(tier),
            sentiment,
            price: parse_decimal(&row.price)?,
            usd_amount: parse_decimal(&row.usd_amount)?,
            asset_delta: parse_decimal(&row.asset_delta)?,
            cash_after: parse_decimal(&row.cash_after)?,
            asset_after: parse_decimal(&row.asset_after)?,
            avg_entry_price: row.avg_entry_price.as_deref().map(parse_decimal).transpose()?,
            realized_pnl: row.realized_pnl.as_deref().map(parse_decimal).transpose()?,
            run_id: row.run_id,
        })
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("Invalid decimal '{}' in database", raw))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{}' in database", raw))
}

/// Fixed-width UTC form, so TEXT comparison orders chronologically.
fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Database {
    /// Create a new database connection and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to database {}", database_url))?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        // Portfolio record
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                schema_version INTEGER NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Trade ledger
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                executed_at TEXT NOT NULL,
                asset TEXT NOT NULL,
                side TEXT NOT NULL,
                tier INTEGER NOT NULL,
                sentiment INTEGER NOT NULL,
                price TEXT NOT NULL,
                usd_amount TEXT NOT NULL,
                asset_delta TEXT NOT NULL,
                cash_after TEXT NOT NULL,
                asset_after TEXT NOT NULL,
                avg_entry_price TEXT,
                realized_pnl TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Report bookkeeping
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS report_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_executed_at ON trades(executed_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Portfolio State ====================

    /// The stored record, decoded through the versioned loader.
    pub async fn stored_state(&self, engine: &LadderEngine) -> Result<Option<PortfolioState>> {
        let row = sqlx::query_as::<_, StoredState>(
            "SELECT schema_version, payload FROM portfolio_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read portfolio state")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let version = u32::try_from(row.schema_version)
            .with_context(|| format!("Invalid schema version {}", row.schema_version))?;

        decode_state(version, &row.payload, engine).map(Some)
    }

    /// The stored record, or a bootstrap record on first run.
    pub async fn load_state(&self, engine: &LadderEngine) -> Result<PortfolioState> {
        match self.stored_state(engine).await? {
            Some(state) => Ok(state),
            None => {
                debug!("No stored portfolio, starting from bootstrap state");
                Ok(engine.bootstrap_state())
            }
        }
    }

    /// Replace the stored record with a state document read from disk.
    ///
    /// Refuses to overwrite an existing record unless `force` is set. No
    /// ledger rows are written.
    pub async fn import_state_file(
        &self,
        path: impl AsRef<Path>,
        engine: &LadderEngine,
        force: bool,
    ) -> Result<PortfolioState> {
        let path = path.as_ref();
        if !force && self.stored_state(engine).await?.is_some() {
            anyhow::bail!("A portfolio record already exists; pass --force to replace it");
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        let state = decode_document(&raw, engine)
            .with_context(|| format!("Failed to decode state file {}", path.display()))?;

        let run_id = format!("import-{}", uuid::Uuid::new_v4());
        self.commit_run(&state, &[], Utc::now(), &run_id).await?;
        info!(path = %path.display(), cash = %state.cash, "Imported portfolio state");

        Ok(state)
    }

    /// Overwrite the state and append ledger rows in one transaction.
    pub async fn commit_run(
        &self,
        state: &PortfolioState,
        actions: &[TradeAction],
        executed_at: DateTime<Utc>,
        run_id: &str,
    ) -> Result<()> {
        let payload = encode_state(state)?;
        let at = format_time(executed_at);

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO portfolio_state (id, schema_version, payload, updated_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                schema_version = excluded.schema_version,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(STATE_SCHEMA_VERSION as i64)
        .bind(&payload)
        .bind(&at)
        .execute(&mut *tx)
        .await
        .context("Failed to save portfolio state")?;

        for action in actions {
            sqlx::query(
                r#"
                INSERT INTO trades (
                    run_id, executed_at, asset, side, tier, sentiment, price, usd_amount,
                    asset_delta, cash_after, asset_after, avg_entry_price, realized_pnl
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(&at)
            .bind(action.asset.symbol())
            .bind(action.side.as_str())
            .bind(action.tier.level() as i64)
            .bind(action.sentiment.value() as i64)
            .bind(action.price.to_string())
            .bind(action.usd_amount.to_string())
            .bind(action.signed_quantity().to_string())
            .bind(action.cash_after.to_string())
            .bind(action.holding_after.to_string())
            .bind(action.avg_entry_after.map(|d| d.to_string()))
            .bind(action.realized_pnl.map(|d| d.to_string()))
            .execute(&mut *tx)
            .await
            .context("Failed to append ledger row")?;
        }

        tx.commit().await.context("Failed to commit run")?;
        debug!(run_id = %run_id, legs = actions.len(), "Run committed");

        Ok(())
    }

    // ==================== Ledger ====================

    /// Most recent ledger rows, newest first.
    pub async fn recent_trades(&self, limit: i64) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, StoredTrade>(
            "SELECT * FROM trades ORDER BY executed_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch trades")?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    /// Ledger rows with `start <= executed_at < end`, oldest first.
    pub async fn trades_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, StoredTrade>(
            "SELECT * FROM trades WHERE executed_at >= ? AND executed_at < ? ORDER BY executed_at, id",
        )
        .bind(format_time(start))
        .bind(format_time(end))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch trades")?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    /// Time of the newest ledger row.
    pub async fn last_trade_at(&self) -> Result<Option<DateTime<Utc>>> {
        let (latest,): (Option<String>,) = sqlx::query_as("SELECT MAX(executed_at) FROM trades")
            .fetch_one(&self.pool)
            .await?;

        latest.as_deref().map(parse_time).transpose()
    }

    pub async fn trade_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ==================== Report Metadata ====================

    pub async fn get_meta<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM report_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(raw,)| {
            serde_json::from_str(&raw).with_context(|| format!("Invalid report metadata '{}'", key))
        })
        .transpose()
    }

    pub async fn put_meta<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).context("Failed to serialize report metadata")?;
        sqlx::query(
            r#"
            INSERT INTO report_meta (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(raw)
        .bind(format_time(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All entries whose key starts with `prefix`, ordered by key.
    pub async fn meta_with_prefix<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(String, T)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM report_meta WHERE substr(key, 1, length(?)) = ? ORDER BY key",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(key, raw)| {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid report metadata '{}'", key))?;
                Ok((key, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PerAsset;
    use crate::trading::StrategyConfig;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde::Deserialize;

    async fn memory_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn engine() -> LadderEngine {
        LadderEngine::new(StrategyConfig::default()).unwrap()
    }

    fn sell_action() -> TradeAction {
        TradeAction {
            side: TradeSide::Sell,
            tier: Tier(60),
            asset: Asset::Eth,
            sentiment: Sentiment::new(62).unwrap(),
            price: dec!(3000.5),
            usd_amount: dec!(150.025),
            quantity: dec!(0.05),
            cash_after: dec!(1234.56),
            holding_after: dec!(0.1),
            avg_entry_after: Some(dec!(2500)),
            realized_pnl: Some(dec!(25.025)),
        }
    }

    #[tokio::test]
    async fn test_load_state_bootstraps_when_empty() {
        let db = memory_db().await;
        let engine = engine();

        assert!(db.stored_state(&engine).await.unwrap().is_none());
        assert_eq!(db.load_state(&engine).await.unwrap(), engine.bootstrap_state());
    }

    #[tokio::test]
    async fn test_commit_run_persists_state_and_ledger() {
        let db = memory_db().await;
        let engine = engine();
        let mut state = engine.bootstrap_state();
        state.cash = dec!(1234.56);
        state.holdings = PerAsset::new(dec!(0.01), dec!(0.1));

        let at = Utc.with_ymd_and_hms(2024, 6, 13, 9, 0, 0).unwrap();
        db.commit_run(&state, &[sell_action()], at, "run-1").await.unwrap();

        assert_eq!(db.load_state(&engine).await.unwrap(), state);

        let trades = db.recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 1);
        let row = &trades[0];
        assert_eq!(row.run_id, "run-1");
        assert_eq!(row.executed_at, at);
        assert_eq!(row.asset, Asset::Eth);
        assert!(row.is_sell());
        assert_eq!(row.asset_delta, dec!(-0.05));
        assert_eq!(row.price, dec!(3000.5));
        assert_eq!(row.realized_pnl, Some(dec!(25.025)));
        assert_eq!(db.last_trade_at().await.unwrap(), Some(at));
    }

    #[tokio::test]
    async fn test_noop_commit_overwrites_state_only() {
        let db = memory_db().await;
        let engine = engine();
        let at = Utc::now();

        let mut state = engine.bootstrap_state();
        db.commit_run(&state, &[], at, "a").await.unwrap();
        state.cash = dec!(9000);
        db.commit_run(&state, &[], at, "b").await.unwrap();

        assert_eq!(db.load_state(&engine).await.unwrap().cash, dec!(9000));
        assert_eq!(db.trade_count().await.unwrap(), 0);
        assert_eq!(db.last_trade_at().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_trades_between_is_half_open() {
        let db = memory_db().await;
        let state = engine().bootstrap_state();
        let may = Utc.with_ymd_and_hms(2024, 5, 31, 23, 59, 59).unwrap();
        let june = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        db.commit_run(&state, &[sell_action()], may, "may").await.unwrap();
        db.commit_run(&state, &[sell_action()], june, "june").await.unwrap();

        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let rows = db.trades_between(start, june).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].run_id, "may");
    }

    #[tokio::test]
    async fn test_unsupported_version_in_db() {
        let db = memory_db().await;
        sqlx::query("INSERT INTO portfolio_state (id, schema_version, payload, updated_at) VALUES (1, 9, '{}', '')")
            .execute(&db.pool)
            .await
            .unwrap();

        let err = db.load_state(&engine()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::RunError>(),
            Some(crate::error::RunError::UnsupportedStateVersion { found: 9, .. })
        ));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sent {
        message_id: i64,
    }

    #[tokio::test]
    async fn test_report_meta() {
        let db = memory_db().await;
        assert_eq!(db.get_meta::<Sent>("monthly:2024-05").await.unwrap(), None);

        db.put_meta("monthly:2024-05", &Sent { message_id: 7 }).await.unwrap();
        db.put_meta("monthly:2024-04", &Sent { message_id: 3 }).await.unwrap();
        db.put_meta("monthly:2023-12", &Sent { message_id: 1 }).await.unwrap();
        db.put_meta("monthly:2024-05", &Sent { message_id: 8 }).await.unwrap();

        assert_eq!(
            db.get_meta::<Sent>("monthly:2024-05").await.unwrap(),
            Some(Sent { message_id: 8 })
        );
        let year: Vec<_> = db
            .meta_with_prefix::<Sent>("monthly:2024-")
            .await
            .unwrap()
            .into_iter()
            .map(|(key, sent)| (key, sent.message_id))
            .collect();
        assert_eq!(
            year,
            vec![("monthly:2024-04".to_string(), 3), ("monthly:2024-05".to_string(), 8)]
        );
    }

    #[tokio::test]
    async fn test_import_state_file() {
        use std::io::Write;

        let db = memory_db().await;
        let engine = engine();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cash_usd": 8900.0, "btc_amount": 0.011, "eth_amount": 0.22,
                "avg_entry_btc": 50000.0, "avg_entry_eth": 2500.0,
                "buckets": {{"40": {{"invested_usd": 1100.0, "btc_amount": 0.011, "eth_amount": 0.22}}}}}}"#
        )
        .unwrap();

        let imported = db.import_state_file(file.path(), &engine, false).await.unwrap();
        assert_eq!(imported.cash, dec!(8900));
        assert_eq!(db.load_state(&engine).await.unwrap(), imported);
        assert_eq!(db.trade_count().await.unwrap(), 0);

        // A second import needs --force
        assert!(db.import_state_file(file.path(), &engine, false).await.is_err());
        assert!(db.import_state_file(file.path(), &engine, true).await.is_ok());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("ladder.db").display());
        let engine = engine();
        let mut state = engine.bootstrap_state();
        state.cash = dec!(7777);

        tokio_test::block_on(async {
            let db = Database::new(&url).await.unwrap();
            db.commit_run(&state, &[sell_action()], Utc::now(), "first").await.unwrap();
        });

        // Migrations rerun against the existing file
        tokio_test::block_on(async {
            let db = Database::new(&url).await.unwrap();
            assert_eq!(db.load_state(&engine).await.unwrap(), state);
            assert_eq!(db.trade_count().await.unwrap(), 1);
        });
    }
}
