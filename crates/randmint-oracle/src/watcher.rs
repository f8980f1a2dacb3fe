//! The fulfillment watcher capability and helpers shared by its variants.

use std::sync::Arc;

use async_trait::async_trait;
use randmint_core::{
    FulfillmentRecord, MintError, MintRequest, NetworkProfile, OrchestratorConfig, RequestId,
    Result,
};
use randmint_deploy::Confirmer;
use randmint_ledger::program::{events, fields};
use randmint_ledger::{LedgerClient, LogEntry, LogFilter};
use serde_json::json;

use crate::passive::PassiveWatcher;
use crate::synthetic::SyntheticWatcher;

/// Produces the fulfillment of an outstanding randomness request.
#[async_trait]
pub trait FulfillmentWatcher: Send + Sync {
    /// Block until `request` is fulfilled and the fulfillment is confirmed.
    async fn await_fulfillment(&self, request: &MintRequest) -> Result<FulfillmentRecord>;

    /// Short name for logs.
    fn kind(&self) -> &'static str;
}

/// Filter matching the fulfillment log of `request`.
pub fn fulfillment_filter(request: &MintRequest) -> LogFilter {
    LogFilter::event(request.minting_program.clone(), events::RANDOMNESS_FULFILLED)
        .with_field(fields::REQUEST_ID, json!(request.request_id.as_str()))
        .from_block(request.block_number)
}

/// Read a `RandomnessFulfilled` log into a record.
pub fn fulfillment_from_log(log: &LogEntry) -> Result<FulfillmentRecord> {
    let event = events::RANDOMNESS_FULFILLED;
    let request_id = log
        .str_field(fields::REQUEST_ID)
        .ok_or_else(|| MintError::extraction(event, fields::REQUEST_ID, "field absent"))?;
    let token_id = log
        .uint_field(fields::TOKEN_ID)
        .ok_or_else(|| MintError::extraction(event, fields::TOKEN_ID, "field absent or not an integer"))?;
    let token_id = u64::try_from(token_id)
        .map_err(|_| MintError::extraction(event, fields::TOKEN_ID, "does not fit in 64 bits"))?;
    let random_value = log
        .uint_field(fields::RANDOM_VALUE)
        .ok_or_else(|| MintError::extraction(event, fields::RANDOM_VALUE, "field absent or not an integer"))?;

    Ok(FulfillmentRecord {
        request_id: RequestId::new(request_id),
        token_id,
        random_value,
        tx_hash: log.tx_hash.clone(),
        block_number: log.block_number,
    })
}

/// Read a fulfillment log and wait until its transaction reaches the
/// confirmation depth.
pub async fn confirmed_fulfillment(
    ledger: &dyn LedgerClient,
    confirmer: &Confirmer,
    log: &LogEntry,
) -> Result<FulfillmentRecord> {
    let record = fulfillment_from_log(log)?;
    confirmer.wait(ledger, &record.tx_hash).await?;
    Ok(record)
}

/// Pick the watcher for the profile's network: synthetic fulfillment
/// through the mock oracle on the local network, passive observation
/// everywhere else.
pub fn watcher_for(
    profile: &NetworkProfile,
    ledger: Arc<dyn LedgerClient>,
    config: &OrchestratorConfig,
    confirmer: Confirmer,
) -> Box<dyn FulfillmentWatcher> {
    let watcher: Box<dyn FulfillmentWatcher> = if profile.network.is_local() {
        let mut watcher = SyntheticWatcher::new(ledger, profile.oracle.clone(), confirmer);
        if let Some(seed) = config.seed {
            watcher = watcher.with_seed(seed);
        }
        Box::new(watcher)
    } else {
        Box::new(PassiveWatcher::new(ledger, confirmer, config.fulfillment_timeout()))
    };

    tracing::info!(network = %profile.network, watcher = watcher.kind(), "Selected fulfillment watcher");
    watcher
}

#[cfg(test)]
mod tests {
    use super::*;
    use randmint_core::{Address, NetworkId, NetworkTable, TxHash};
    use randmint_ledger::{LogField, SimulatedLedger};

    fn log(fields: Vec<(&str, serde_json::Value)>) -> LogEntry {
        LogEntry {
            address: Address::new("0x03"),
            event: events::RANDOMNESS_FULFILLED.to_string(),
            fields: fields
                .into_iter()
                .map(|(name, value)| LogField {
                    name: name.to_string(),
                    value,
                })
                .collect(),
            tx_hash: TxHash::new("0xf1"),
            block_number: 12,
            log_index: 0,
        }
    }

    #[test]
    fn test_fulfillment_from_log() {
        let record = fulfillment_from_log(&log(vec![
            (fields::REQUEST_ID, json!("0xbeef")),
            (fields::TOKEN_ID, json!(7)),
            (fields::RANDOM_VALUE, json!("77777")),
        ]))
        .unwrap();
        assert_eq!(record.request_id, RequestId::new("0xbeef"));
        assert_eq!(record.token_id, 7);
        assert_eq!(record.random_value, 77777);
        assert_eq!(record.block_number, 12);
    }

    #[test]
    fn test_missing_random_value_is_extraction_error() {
        let err = fulfillment_from_log(&log(vec![
            (fields::REQUEST_ID, json!("0xbeef")),
            (fields::TOKEN_ID, json!(7)),
        ]))
        .unwrap_err();
        assert!(matches!(err, MintError::Extraction { ref field, .. } if field == fields::RANDOM_VALUE));
    }

    #[test]
    fn test_watcher_selection() {
        let table = NetworkTable::builtin();
        let config = OrchestratorConfig::default();

        let local = table
            .params(NetworkId::LOCAL)
            .unwrap()
            .into_profile(Address::new("0x01"), Address::new("0x02"))
            .unwrap();
        let ledger = Arc::new(SimulatedLedger::new(NetworkId::LOCAL));
        assert_eq!(
            watcher_for(&local, ledger, &config, Confirmer::default()).kind(),
            "synthetic"
        );

        let rinkeby = table
            .params(NetworkId(4))
            .unwrap()
            .into_profile(Address::new("0x01"), Address::new("0x02"))
            .unwrap();
        let ledger = Arc::new(SimulatedLedger::new(NetworkId(4)));
        assert_eq!(
            watcher_for(&rinkeby, ledger, &config, Confirmer::default()).kind(),
            "passive"
        );
    }
}
