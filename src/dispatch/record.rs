//! Dispatch records and the sinks that receive their transitions.
//!
//! The relay does not own record storage. It emits every transition
//! (created, broadcast, settled) to a [`DispatchSink`]; persistence is the
//! sink's concern.

use alloy::primitives::TxHash;
use dashmap::DashMap;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Lifecycle status of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Success,
    Failed,
}

impl RecordStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RecordStatus::Pending)
    }
}

/// One dispatch as seen by external persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRecord {
    pub id: Uuid,
    pub tx_hash: Option<TxHash>,
    pub status: RecordStatus,
    pub method: String,
    pub chain_id: u64,
    pub parameters: serde_json::Value,
    pub metadata: serde_json::Value,
    pub error: Option<String>,
    /// Unix milliseconds of the last transition.
    pub updated_at_ms: u64,
}

impl DispatchRecord {
    pub fn new(method: impl Into<String>, chain_id: u64, parameters: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_hash: None,
            status: RecordStatus::Pending,
            method: method.into(),
            chain_id,
            parameters,
            metadata: serde_json::Value::Null,
            error: None,
            updated_at_ms: now_millis(),
        }
    }

    pub fn broadcast(&mut self, tx_hash: TxHash, metadata: serde_json::Value) {
        self.tx_hash = Some(tx_hash);
        self.metadata = metadata;
        self.updated_at_ms = now_millis();
    }

    /// Move to a terminal status. Terminal records do not change again.
    pub fn settle(&mut self, status: RecordStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.updated_at_ms = now_millis();
        true
    }
}

/// Receives dispatch record transitions.
pub trait DispatchSink: Send + Sync + 'static {
    fn record(&self, record: &DispatchRecord);
}

/// Sink that writes transitions to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DispatchSink for TracingSink {
    fn record(&self, record: &DispatchRecord) {
        match record.status {
            RecordStatus::Failed => tracing::error!(
                record_id = %record.id,
                method = %record.method,
                tx_hash = ?record.tx_hash,
                error = record.error.as_deref().unwrap_or_default(),
                "Dispatch failed"
            ),
            status => tracing::info!(
                record_id = %record.id,
                method = %record.method,
                tx_hash = ?record.tx_hash,
                status = ?status,
                "Dispatch record"
            ),
        }
    }
}

/// In-memory sink keeping the latest state of every record.
#[derive(Debug, Default)]
pub struct MemoryRecords {
    records: DashMap<Uuid, DispatchRecord>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<DispatchRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn by_tx_hash(&self, tx_hash: &TxHash) -> Option<DispatchRecord> {
        self.records
            .iter()
            .find(|r| r.tx_hash.as_ref() == Some(tx_hash))
            .map(|r| r.clone())
    }

    pub fn all(&self) -> Vec<DispatchRecord> {
        self.records.iter().map(|r| r.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DispatchSink for MemoryRecords {
    fn record(&self, record: &DispatchRecord) {
        self.records.insert(record.id, record.clone());
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_transitions() {
        let mut record = DispatchRecord::new("requestReward", 1337, json!({"fileId": 7}));
        assert_eq!(record.status, RecordStatus::Pending);
        assert!(record.tx_hash.is_none());

        let hash = TxHash::repeat_byte(3);
        record.broadcast(hash, json!({"nonce": 4}));
        assert_eq!(record.tx_hash, Some(hash));

        assert!(!record.settle(RecordStatus::Pending, None));
        assert!(record.settle(RecordStatus::Failed, Some("INSUFFICIENT_BALANCE".into())));
        // terminal is final
        assert!(!record.settle(RecordStatus::Success, None));
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("INSUFFICIENT_BALANCE"));
    }

    #[test]
    fn test_memory_records() {
        let sink = MemoryRecords::new();
        let mut record = DispatchRecord::new("addFileWithPermissions", 1, json!([]));
        sink.record(&record);
        assert_eq!(sink.len(), 1);

        let hash = TxHash::repeat_byte(9);
        record.broadcast(hash, serde_json::Value::Null);
        sink.record(&record);

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.by_tx_hash(&hash).map(|r| r.id), Some(record.id));
        assert_eq!(sink.get(&record.id).unwrap().tx_hash, Some(hash));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RecordStatus::Success).unwrap(),
            "\"success\""
        );
    }
}
