//! Versioned encoding of the persisted portfolio record.
//!
//! Version 1 is the flat JSON file written by the earlier script: string
//! keyed maps, float amounts, and optional `buckets` / `sell_used` entries.
//! Version 2 is [`PortfolioState`] serialized as-is.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::error::RunError;
use crate::models::{Bucket, PerAsset, PortfolioState, Tier};
use crate::trading::LadderEngine;

/// Schema version written by this build.
pub const STATE_SCHEMA_VERSION: u32 = 2;

const LEGACY_SCHEMA_VERSION: u32 = 1;

/// Flat record of schema version 1.
#[derive(Debug, Clone, Deserialize)]
struct LegacyStateV1 {
    #[serde(default)]
    pub base_capital: Option<Decimal>,
    pub cash_usd: Decimal,
    #[serde(default)]
    pub btc_amount: Decimal,
    #[serde(default)]
    pub eth_amount: Decimal,
    #[serde(default)]
    pub avg_entry_btc: Option<Decimal>,
    #[serde(default)]
    pub avg_entry_eth: Option<Decimal>,
    #[serde(default)]
    pub buckets: Option<BTreeMap<String, LegacyBucket>>,
    #[serde(default)]
    pub sell_used: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LegacyBucket {
    #[serde(default)]
    pub invested_usd: Decimal,
    #[serde(default)]
    pub btc_amount: Decimal,
    #[serde(default)]
    pub eth_amount: Decimal,
}

/// Upgrade a version 1 record.
///
/// Missing maps are filled from the strategy, as the script did on load.
fn upgrade_v1(legacy: LegacyStateV1, engine: &LadderEngine) -> Result<PortfolioState> {
    let mut state = engine.bootstrap_state();

    state.base_capital = legacy.base_capital.unwrap_or(engine.config().base_capital);
    state.cash = legacy.cash_usd;
    state.holdings = PerAsset::new(legacy.btc_amount, legacy.eth_amount);
    state.avg_entry = PerAsset::new(legacy.avg_entry_btc, legacy.avg_entry_eth);

    if let Some(buckets) = legacy.buckets {
        for (key, bucket) in buckets {
            let tier = parse_tier(&key)?;
            state.buckets.insert(
                tier,
                Bucket {
                    invested_usd: bucket.invested_usd,
                    holdings: PerAsset::new(bucket.btc_amount, bucket.eth_amount),
                },
            );
        }
    }

    if let Some(flags) = legacy.sell_used {
        for (key, fired) in flags {
            state.sell_fired.insert(parse_tier(&key)?, fired);
        }
    }

    Ok(state)
}

fn parse_tier(key: &str) -> Result<Tier> {
    let level: u8 = key
        .trim()
        .parse()
        .with_context(|| format!("Invalid tier key '{}' in legacy state", key))?;
    Ok(Tier(level))
}

/// Decode a stored payload of the given schema version.
pub fn decode_state(version: u32, payload: &str, engine: &LadderEngine) -> Result<PortfolioState> {
    match version {
        STATE_SCHEMA_VERSION => {
            serde_json::from_str(payload).context("Failed to parse portfolio state")
        }
        LEGACY_SCHEMA_VERSION => {
            let legacy: LegacyStateV1 =
                serde_json::from_str(payload).context("Failed to parse legacy portfolio state")?;
            upgrade_v1(legacy, engine)
        }
        found => Err(RunError::UnsupportedStateVersion {
            found,
            supported: STATE_SCHEMA_VERSION,
        }
        .into()),
    }
}

/// Decode a standalone document: an envelope or an untagged legacy record.
pub fn decode_document(json: &str, engine: &LadderEngine) -> Result<PortfolioState> {
    let value: Value = serde_json::from_str(json).context("State document is not valid JSON")?;

    match value.get("schema_version") {
        Some(version) => {
            let version = version
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .context("schema_version must be a non-negative integer")?;
            let payload = value
                .get("state")
                .context("Versioned state document has no 'state' field")?;
            decode_state(version, &payload.to_string(), engine)
        }
        None if value.get("cash_usd").is_some() => decode_state(LEGACY_SCHEMA_VERSION, json, engine),
        None => anyhow::bail!("Unrecognized state document: no schema_version and no cash_usd"),
    }
}

/// Serialize at the current schema version.
pub fn encode_state(state: &PortfolioState) -> Result<String> {
    serde_json::to_string(state).context("Failed to serialize portfolio state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::StrategyConfig;
    use rust_decimal_macros::dec;
    use serde::Serialize;

    /// Standalone document layout accepted by `decode_document`.
    #[derive(Serialize)]
    struct StateEnvelope {
        schema_version: u32,
        state: PortfolioState,
    }

    fn engine() -> LadderEngine {
        LadderEngine::new(StrategyConfig::default()).unwrap()
    }

    const LEGACY: &str = r#"{
        "base_capital": 10000,
        "cash_usd": 8400.0,
        "btc_amount": 0.011,
        "eth_amount": 0.22,
        "avg_entry_btc": 50000.0,
        "avg_entry_eth": 2500.0,
        "buckets": {
            "40": {"invested_usd": 1100.0, "btc_amount": 0.011, "eth_amount": 0.22},
            "35": {"invested_usd": 500.0, "btc_amount": 0.0, "eth_amount": 0.0}
        },
        "sell_used": {"60": true}
    }"#;

    #[test]
    fn test_upgrade_v1() {
        let state = decode_document(LEGACY, &engine()).unwrap();

        assert_eq!(state.cash, dec!(8400));
        assert_eq!(state.holdings.btc, dec!(0.011));
        assert_eq!(state.avg_entry.eth, Some(dec!(2500)));
        assert_eq!(state.buckets[&Tier(40)].invested_usd, dec!(1100));
        assert_eq!(state.buckets[&Tier(40)].holdings.eth, dec!(0.22));
        // Tiers absent from the file come from the strategy
        assert_eq!(state.buckets[&Tier(15)], Bucket::default());
        assert!(state.is_sell_fired(Tier(60)));
        assert!(!state.is_sell_fired(Tier(75)));
    }

    #[test]
    fn test_legacy_without_maps() {
        let state = decode_document(r#"{"cash_usd": 10000.0}"#, &engine()).unwrap();
        assert_eq!(state, engine().bootstrap_state());
    }

    #[test]
    fn test_current_round_trip_through_envelope() {
        let mut state = engine().bootstrap_state();
        state.cash = dec!(4321.5);
        state.sell_fired.insert(Tier(65), true);

        let doc = serde_json::to_string(&StateEnvelope {
            schema_version: STATE_SCHEMA_VERSION,
            state: state.clone(),
        }).unwrap();
        assert_eq!(decode_document(&doc, &engine()).unwrap(), state);
        assert_eq!(
            decode_state(STATE_SCHEMA_VERSION, &encode_state(&state).unwrap(), &engine()).unwrap(),
            state
        );
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let err = decode_state(7, "{}", &engine()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RunError>(),
            Some(RunError::UnsupportedStateVersion { found: 7, supported: 2 })
        ));

        let doc = r#"{"schema_version": 3, "state": {}}"#;
        assert!(decode_document(doc, &engine()).is_err());
    }

    #[test]
    fn test_bad_legacy_tier_key() {
        let doc = r#"{"cash_usd": 1.0, "buckets": {"forty": {}}}"#;
        assert!(decode_document(doc, &engine()).is_err());
    }
}
