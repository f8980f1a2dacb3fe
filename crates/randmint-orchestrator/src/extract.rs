//! Reading the mint request out of a confirmed "create".
//!
//! The `MintRequested` log is looked up by event name and its fields by
//! name. When the ledger reports logs without names, the log at
//! [`MINT_REQUESTED_LOG_INDEX`] and its fields at their documented
//! positions are used instead. Nothing is ever defaulted: if neither
//! lookup yields a value the result is an extraction error.

use randmint_core::{Address, MintError, MintRequest, RequestId, Result};
use randmint_ledger::program::{
    events, fields, MINT_REQUESTED_LOG_INDEX, MINT_REQUESTED_REQUEST_ID_POSITION,
    MINT_REQUESTED_TOKEN_ID_POSITION,
};
use randmint_ledger::{value_as_u128, LogEntry, TxReceipt};

/// Build the [`MintRequest`] for a "create" on `minting` sent by
/// `requester`.
pub fn mint_request_from_receipt(
    receipt: &TxReceipt,
    minting: &Address,
    requester: &Address,
) -> Result<MintRequest> {
    let event = events::MINT_REQUESTED;

    let named = receipt
        .logs
        .iter()
        .find(|log| &log.address == minting && log.event == event);

    let log = match named {
        Some(log) => log,
        None => {
            let positional = receipt
                .logs
                .get(MINT_REQUESTED_LOG_INDEX)
                .filter(|log| &log.address == minting)
                .ok_or_else(|| {
                    MintError::extraction(
                        event,
                        fields::REQUEST_ID,
                        format!(
                            "no log from {} by name or at index {} of {}",
                            minting,
                            MINT_REQUESTED_LOG_INDEX,
                            receipt.tx_hash
                        ),
                    )
                })?;
            tracing::debug!(
                tx = %receipt.tx_hash,
                index = MINT_REQUESTED_LOG_INDEX,
                "Using positional MintRequested log"
            );
            positional
        }
    };

    let request_id = request_id_of(log)?;
    let token_id = token_id_of(log)?;

    Ok(MintRequest {
        token_id,
        requester: requester.clone(),
        request_id,
        minting_program: minting.clone(),
        create_tx: receipt.tx_hash.clone(),
        block_number: receipt.block_number,
    })
}

fn request_id_of(log: &LogEntry) -> Result<RequestId> {
    let value = log
        .field(fields::REQUEST_ID)
        .or_else(|| log.field_at(MINT_REQUESTED_REQUEST_ID_POSITION))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            MintError::extraction(events::MINT_REQUESTED, fields::REQUEST_ID, "absent or not a string")
        })?;
    Ok(RequestId::new(value))
}

fn token_id_of(log: &LogEntry) -> Result<u64> {
    let value = log
        .field(fields::TOKEN_ID)
        .or_else(|| log.field_at(MINT_REQUESTED_TOKEN_ID_POSITION))
        .and_then(value_as_u128)
        .ok_or_else(|| {
            MintError::extraction(events::MINT_REQUESTED, fields::TOKEN_ID, "absent or not an integer")
        })?;
    u64::try_from(value).map_err(|_| {
        MintError::extraction(events::MINT_REQUESTED, fields::TOKEN_ID, "does not fit in 64 bits")
    })
}
