//! Vote ledger
//!
//! Durable map from proposal (thread) id to its in-flight vote. Every
//! mutation rewrites the snapshot file while the ledger lock is held, so a
//! publish-insert and a sweep-delete can never lose each other's update.

use crate::error::AppError;
use crate::governance::models::{Draft, VoteCounts, VoteRecord};
use crate::governance::persist;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// On-disk shape of one vote, keyed by the string-encoded proposal id
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerEntry {
    draft: Draft,
    /// Epoch seconds; older snapshots may hold an integer
    end_time: f64,
    yes_count: u64,
    #[serde(default)]
    no_count: u64,
    #[serde(default)]
    abstain_count: u64,
    title: String,
    channel_id: String,
    #[serde(default)]
    channel_name: String,
}

impl From<&VoteRecord> for LedgerEntry {
    fn from(record: &VoteRecord) -> Self {
        Self {
            draft: record.draft.clone(),
            end_time: record.end_time.timestamp_millis() as f64 / 1000.0,
            yes_count: record.counts.yes,
            no_count: record.counts.no,
            abstain_count: record.counts.abstain,
            title: record.title.clone(),
            channel_id: record.channel_id.to_string(),
            channel_name: record.channel_name.clone(),
        }
    }
}

impl LedgerEntry {
    fn into_record(self, key: &str) -> Result<VoteRecord, AppError> {
        let proposal_id = key
            .parse()
            .map_err(|_| AppError::Persistence(format!("Invalid proposal id '{}' in ledger", key)))?;
        let channel_id = self.channel_id.parse().map_err(|_| {
            AppError::Persistence(format!("Invalid channel id '{}' for proposal {}", self.channel_id, key))
        })?;
        let end_time = DateTime::<Utc>::from_timestamp_millis((self.end_time * 1000.0).round() as i64)
            .ok_or_else(|| AppError::Persistence(format!("Invalid end_time for proposal {}", key)))?;

        Ok(VoteRecord {
            proposal_id,
            draft: self.draft,
            title: self.title,
            channel_name: self.channel_name,
            channel_id,
            end_time,
            counts: VoteCounts {
                yes: self.yes_count,
                no: self.no_count,
                abstain: self.abstain_count,
            },
        })
    }
}

/// Owner of every in-flight vote record
pub struct VoteLedger {
    path: PathBuf,
    records: Mutex<BTreeMap<u64, VoteRecord>>,
    /// Entries that failed to parse on load, written back untouched
    unreadable: BTreeMap<String, Value>,
}

impl VoteLedger {
    /// Restore the ledger from its snapshot file (empty if absent)
    ///
    /// An entry that cannot be parsed is logged and set aside rather than
    /// failing the load; it stays in the file for an operator to repair.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let entries: BTreeMap<String, Value> = persist::read_json(&path).await?.unwrap_or_default();

        let mut records = BTreeMap::new();
        let mut unreadable = BTreeMap::new();
        for (key, raw) in entries {
            let parsed = serde_json::from_value::<LedgerEntry>(raw.clone())
                .map_err(AppError::from)
                .and_then(|entry| entry.into_record(&key));
            match parsed {
                Ok(record) => {
                    records.insert(record.proposal_id, record);
                }
                Err(e) => {
                    error!(key = %key, "Skipping unreadable ledger entry: {}", e);
                    unreadable.insert(key, raw);
                }
            }
        }

        info!("Restored {} ongoing vote(s) from {}", records.len(), path.display());
        if !unreadable.is_empty() {
            warn!("Skipped {} unreadable ledger entries; they will not be tallied", unreadable.len());
        }
        Ok(Self {
            path,
            records: Mutex::new(records),
            unreadable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a new vote and persist it before returning
    ///
    /// If the snapshot cannot be written the record is taken back out, so
    /// memory never holds a vote the file does not.
    pub async fn insert(&self, record: VoteRecord) -> Result<(), AppError> {
        let mut records = self.records.lock().await;
        let id = record.proposal_id;
        let previous = records.insert(id, record);

        if let Err(e) = self.write_snapshot(&records).await {
            match previous {
                Some(prev) => records.insert(id, prev),
                None => records.remove(&id),
            };
            return Err(e);
        }

        info!(proposal_id = id, active = records.len(), "Vote recorded in ledger");
        Ok(())
    }

    pub async fn get(&self, proposal_id: u64) -> Option<VoteRecord> {
        self.records.lock().await.get(&proposal_id).cloned()
    }

    /// Point-in-time copy of every active record, ordered by id
    pub async fn entries(&self) -> Vec<VoteRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    /// Stable copy of the active ids to iterate while the ledger changes
    pub async fn ids(&self) -> Vec<u64> {
        self.records.lock().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Overwrite the live counts of an active vote; returns false if it is gone
    pub async fn update_counts(&self, proposal_id: u64, counts: VoteCounts) -> bool {
        let mut records = self.records.lock().await;
        match records.get_mut(&proposal_id) {
            Some(record) => {
                record.counts = counts;
                true
            }
            None => false,
        }
    }

    /// Drop a vote for good and persist the remaining set
    ///
    /// The record stays removed from memory even if the write fails; the
    /// error is returned for the caller to log.
    pub async fn remove(&self, proposal_id: u64) -> Result<Option<VoteRecord>, AppError> {
        let mut records = self.records.lock().await;
        let removed = records.remove(&proposal_id);
        if removed.is_some() {
            self.write_snapshot(&records).await?;
        }
        Ok(removed)
    }

    /// Write the current state to disk
    pub async fn flush(&self) -> Result<(), AppError> {
        let records = self.records.lock().await;
        self.write_snapshot(&records).await
    }

    /// Final flush at process exit
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.flush().await?;
        let remaining = self.len().await;
        if remaining > 0 {
            warn!("Shutting down with {} vote(s) still open; they resume on next start", remaining);
        }
        Ok(())
    }

    async fn write_snapshot(&self, records: &BTreeMap<u64, VoteRecord>) -> Result<(), AppError> {
        let mut entries = self.unreadable.clone();
        for (id, record) in records {
            entries.insert(id.to_string(), serde_json::to_value(LedgerEntry::from(record))?);
        }
        persist::write_json(&self.path, &entries).await
    }
}
