//! Calculator for report figures: index statistics and ledger aggregates.

use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::models::{IndexReading, IndexStats, LedgerEntry, LedgerSummary};

/// Stateless helpers behind the periodic reports.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Statistics over readings sorted oldest first.
    ///
    /// Returns `None` for an empty window. Ties on min or max resolve to the
    /// earliest reading.
    pub fn index_stats(readings: &[IndexReading]) -> Option<IndexStats> {
        let first = readings.first()?;
        let last = readings.last()?;

        let mut min = first;
        let mut max = first;
        for reading in readings {
            if reading.value < min.value {
                min = reading;
            }
            if reading.value > max.value {
                max = reading;
            }
        }

        let mean = readings
            .iter()
            .map(|r| f64::from(r.value.value()))
            .collect::<Vec<_>>()
            .mean();

        Some(IndexStats {
            samples: readings.len(),
            first: first.value.value(),
            last: last.value.value(),
            min: min.value.value(),
            min_at: min.at,
            max: max.value.value(),
            max_at: max.at,
            mean,
        })
    }

    /// Counts, volumes, and realized PnL over ledger rows.
    pub fn ledger_summary(entries: &[LedgerEntry]) -> LedgerSummary {
        let mut summary = LedgerSummary {
            total_legs: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            if entry.is_buy() {
                summary.buy_legs += 1;
                summary.bought_usd += entry.usd_amount;
            } else {
                summary.sell_legs += 1;
                summary.sold_usd += entry.usd_amount;
                summary.realized_pnl += Self::realized_pnl(entry).unwrap_or(Decimal::ZERO);
            }
        }

        summary
    }

    /// PnL of a sell leg; rows without a recorded figure fall back to the
    /// stored entry price.
    pub fn realized_pnl(entry: &LedgerEntry) -> Option<Decimal> {
        if !entry.is_sell() {
            return None;
        }
        entry.realized_pnl.or_else(|| {
            entry
                .avg_entry_price
                .map(|avg| entry.usd_amount - entry.asset_delta.abs() * avg)
        })
    }
}
