//! Log entries emitted by ledger programs and filters over them.

use std::pin::Pin;

use futures::Stream;
use randmint_core::{Address, TxHash};
use serde::{Deserialize, Serialize};

/// A named field of a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogField {
    pub name: String,
    pub value: serde_json::Value,
}

/// A log emitted by a program during a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Program that emitted the log.
    pub address: Address,

    /// Event name (e.g., "MintRequested").
    pub event: String,

    /// Fields in emission order.
    pub fields: Vec<LogField>,

    /// Transaction that produced the log.
    pub tx_hash: TxHash,

    /// Block the transaction was included in.
    pub block_number: u64,

    /// Position of the log within its transaction.
    pub log_index: u64,
}

impl LogEntry {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    /// Look up a field by position.
    pub fn field_at(&self, position: usize) -> Option<&serde_json::Value> {
        self.fields.get(position).map(|f| &f.value)
    }

    /// A field read as an unsigned integer. Accepts JSON numbers and
    /// decimal or `0x` strings.
    pub fn uint_field(&self, name: &str) -> Option<u128> {
        self.field(name).and_then(value_as_u128)
    }

    /// A field read as a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(|v| v.as_str())
    }
}

/// Interpret a JSON value as an unsigned integer.
pub fn value_as_u128(value: &serde_json::Value) -> Option<u128> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(u128::from),
        serde_json::Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex) => u128::from_str_radix(hex, 16).ok(),
                None => s.parse::<u128>().ok(),
            }
        }
        _ => None,
    }
}

/// Filter for log queries and subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Emitting program.
    pub address: Option<Address>,

    /// Event name.
    pub event: Option<String>,

    /// Fields that must be present with exactly these values.
    pub fields: Vec<LogField>,

    /// Earliest block to include.
    pub from_block: Option<u64>,
}

impl LogFilter {
    /// Create a filter for one event of one program.
    pub fn event(address: Address, event: impl Into<String>) -> Self {
        Self {
            address: Some(address),
            event: Some(event.into()),
            ..Default::default()
        }
    }

    /// Additionally require a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.push(LogField {
            name: name.into(),
            value,
        });
        self
    }

    /// Only include logs at or after `block`.
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    /// Check if a log matches this filter.
    pub fn matches(&self, log: &LogEntry) -> bool {
        if let Some(ref address) = self.address {
            if &log.address != address {
                return false;
            }
        }

        if let Some(ref event) = self.event {
            if &log.event != event {
                return false;
            }
        }

        if let Some(from) = self.from_block {
            if log.block_number < from {
                return false;
            }
        }

        self.fields
            .iter()
            .all(|wanted| log.field(&wanted.name) == Some(&wanted.value))
    }
}

/// Stream of logs matching a subscription filter.
pub type LogStream = Pin<Box<dyn Stream<Item = LogEntry> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(event: &str, fields: Vec<(&str, serde_json::Value)>) -> LogEntry {
        LogEntry {
            address: Address::new("0x01"),
            event: event.to_string(),
            fields: fields
                .into_iter()
                .map(|(name, value)| LogField {
                    name: name.to_string(),
                    value,
                })
                .collect(),
            tx_hash: TxHash::new("0xaa"),
            block_number: 10,
            log_index: 0,
        }
    }

    #[test]
    fn test_field_access() {
        let log = entry(
            "MintRequested",
            vec![("request_id", json!("0xbeef")), ("token_id", json!(7))],
        );
        assert_eq!(log.str_field("request_id"), Some("0xbeef"));
        assert_eq!(log.uint_field("token_id"), Some(7));
        assert_eq!(log.field_at(1), Some(&json!(7)));
        assert!(log.field("missing").is_none());
    }

    #[test]
    fn test_value_as_u128() {
        assert_eq!(value_as_u128(&json!("77777")), Some(77777));
        assert_eq!(value_as_u128(&json!("0x10")), Some(16));
        assert_eq!(value_as_u128(&json!(3)), Some(3));
        assert_eq!(value_as_u128(&json!(true)), None);
    }

    #[test]
    fn test_filter_matches() {
        let log = entry("RandomnessFulfilled", vec![("request_id", json!("0xbeef"))]);

        let filter = LogFilter::event(Address::new("0x01"), "RandomnessFulfilled")
            .with_field("request_id", json!("0xbeef"));
        assert!(filter.matches(&log));

        let other_request = LogFilter::event(Address::new("0x01"), "RandomnessFulfilled")
            .with_field("request_id", json!("0xcafe"));
        assert!(!other_request.matches(&log));

        let later = LogFilter::default().from_block(11);
        assert!(!later.matches(&log));
    }
}
