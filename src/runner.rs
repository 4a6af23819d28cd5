//! Single-run orchestration: load, fetch, evaluate, persist, notify.
//!
//! A run is all-or-nothing up to the commit: a failed fetch leaves the stored
//! state untouched. Notification happens after the commit and never undoes it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::{fetch_snapshot, PriceClient, SentimentClient};
use crate::config::AppConfig;
use crate::db::Database;
use crate::models::{MarketSnapshot, PortfolioState, TradeAction};
use crate::notify::{render_run_summary, TelegramNotifier};
use crate::trading::LadderEngine;

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub executed_at: DateTime<Utc>,
    pub snapshot: MarketSnapshot,
    pub actions: Vec<TradeAction>,
    pub state: PortfolioState,
    pub cycle_completed: bool,
    pub recovered_empty: bool,

    /// Telegram message id, when a summary was delivered
    pub message_id: Option<i64>,

    /// Delivery error, when a summary was due but could not be sent
    pub notification_error: Option<String>,
}

/// Wires the engine to its collaborators.
pub struct Runner {
    engine: LadderEngine,
    db: Database,
    sentiment: SentimentClient,
    prices: PriceClient,
    notifier: TelegramNotifier,
}

impl Runner {
    pub fn new(engine: LadderEngine, db: Database, config: &AppConfig) -> Result<Self> {
        Ok(Self::from_parts(
            engine,
            db,
            config.sentiment_client()?,
            config.price_client()?,
            config.notifier()?,
        ))
    }

    pub fn from_parts(
        engine: LadderEngine,
        db: Database,
        sentiment: SentimentClient,
        prices: PriceClient,
        notifier: TelegramNotifier,
    ) -> Self {
        Self {
            engine,
            db,
            sentiment,
            prices,
            notifier,
        }
    }

    /// Execute one scheduled invocation.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let executed_at = Utc::now();

        let prior = self.db.load_state(&self.engine).await?;

        let snapshot = match fetch_snapshot(&self.sentiment, &self.prices).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Market data unavailable, state left untouched");
                return Err(e.into());
            }
        };

        info!(
            sentiment = %snapshot.sentiment,
            published_at = %snapshot.sentiment_at,
            btc = %snapshot.prices.btc,
            eth = %snapshot.prices.eth,
            "Market snapshot"
        );

        let evaluation = self.engine.evaluate(&prior, &snapshot);
        let noop = evaluation.is_noop();
        self.db
            .commit_run(&evaluation.state, &evaluation.actions, executed_at, &run_id)
            .await?;

        let mut outcome = RunOutcome {
            run_id,
            executed_at,
            snapshot,
            actions: evaluation.actions,
            state: evaluation.state,
            cycle_completed: evaluation.cycle_completed,
            recovered_empty: evaluation.recovered_empty,
            message_id: None,
            notification_error: None,
        };

        if noop {
            info!(
                sentiment = %outcome.snapshot.sentiment,
                btc = %outcome.snapshot.prices.btc,
                eth = %outcome.snapshot.prices.eth,
                "No tier triggered"
            );
            return Ok(outcome);
        }

        info!(legs = outcome.actions.len(), cash = %outcome.state.cash, "Run executed trades");

        let text = render_run_summary(&outcome.actions, &outcome.state, &outcome.snapshot);
        match self.notifier.send(&text).await {
            Ok(message_id) => {
                info!(message_id, "Summary sent");
                outcome.message_id = Some(message_id);
            }
            Err(e) => {
                warn!(error = %e, "Summary not delivered; state and ledger are saved");
                outcome.notification_error = Some(e.to_string());
            }
        }

        Ok(outcome)
    }
}
