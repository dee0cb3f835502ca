//! Proposal identifier allocation
//!
//! Budget and governance proposals are numbered in separate sequences. The
//! next number is written to disk before it is handed out, so a number is
//! never reused after a restart.

use crate::error::AppError;
use crate::governance::models::{Draft, ProposalKind};
use crate::governance::persist;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::info;

/// Last issued number per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalCounters {
    #[serde(default)]
    pub budget: u64,
    #[serde(default)]
    pub governance: u64,
}

impl ProposalCounters {
    fn bump(&mut self, kind: ProposalKind) -> u64 {
        let slot = match kind {
            ProposalKind::Budget => &mut self.budget,
            ProposalKind::Governance => &mut self.governance,
        };
        *slot += 1;
        *slot
    }
}

/// Forum names proposals are published to
#[derive(Debug, Clone)]
pub struct ForumChannels {
    pub governance: String,
    pub budget: String,
}

impl ForumChannels {
    pub fn for_kind(&self, kind: ProposalKind) -> &str {
        match kind {
            ProposalKind::Budget => &self.budget,
            ProposalKind::Governance => &self.governance,
        }
    }
}

/// Result of numbering a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub kind: ProposalKind,
    pub id_type: &'static str,
    pub sequence: u64,
    pub channel_name: String,
    pub title: String,
}

pub struct IdentifierAllocator {
    path: PathBuf,
    channels: ForumChannels,
    counters: Mutex<ProposalCounters>,
}

impl IdentifierAllocator {
    /// Open the counter file, starting from zero if it does not exist
    pub async fn load(path: impl Into<PathBuf>, channels: ForumChannels) -> Result<Self, AppError> {
        let path = path.into();
        let counters: ProposalCounters = persist::read_json(&path).await?.unwrap_or_default();
        info!(
            budget = counters.budget,
            governance = counters.governance,
            "Loaded proposal counters from {}",
            path.display()
        );

        Ok(Self {
            path,
            channels,
            counters: Mutex::new(counters),
        })
    }

    pub fn channels(&self) -> &ForumChannels {
        &self.channels
    }

    /// Issue the next number for the draft's kind and render its title
    pub async fn allocate(&self, draft: &Draft) -> Result<Allocation, AppError> {
        let mut counters = self.counters.lock().await;

        let mut next = *counters;
        let sequence = next.bump(draft.kind);
        persist::write_json(&self.path, &next).await?;
        *counters = next;

        let title = format!("{} #{}: {}", draft.kind.title_prefix(), sequence, draft.title);
        info!(kind = %draft.kind, sequence, "Allocated proposal identifier");

        Ok(Allocation {
            kind: draft.kind,
            id_type: draft.kind.id_type(),
            sequence,
            channel_name: self.channels.for_kind(draft.kind).to_string(),
            title,
        })
    }

    pub async fn current(&self) -> ProposalCounters {
        *self.counters.lock().await
    }
}
