//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::{DiscordConfig, GovernanceConfig};
use crate::error::AppError;
use crate::governance::{
    ChatPlatform, DraftStore, ForumChannels, IdentifierAllocator, Publisher, SubmissionBridge,
    TallyScheduler, VoteLedger,
};
use std::sync::Arc;
use tracing::info;

/// Application state shared across all handlers
pub struct AppState {
    /// Unpublished drafts (has internal locking)
    pub drafts: DraftStore,

    /// Open votes, persisted to disk
    pub ledger: Arc<VoteLedger>,

    /// Turns drafts into live votes
    pub publisher: Publisher,

    /// Closes votes whose window has elapsed
    pub tally: Arc<TallyScheduler>,

    /// JWT secret key for token validation
    pub jwt_secret: String,
}

impl AppState {
    /// Load persisted state and wire the governance services together
    pub async fn initialize(
        governance: &GovernanceConfig,
        discord: &DiscordConfig,
        platform: Arc<dyn ChatPlatform>,
        bridge: Arc<dyn SubmissionBridge>,
        jwt_secret: String,
    ) -> Result<Self, AppError> {
        let allocator = Arc::new(
            IdentifierAllocator::load(
                governance.counters_path.clone(),
                ForumChannels {
                    governance: governance.governance_channel.clone(),
                    budget: governance.budget_channel.clone(),
                },
            )
            .await?,
        );
        let counters = allocator.current().await;
        info!(
            budget = counters.budget,
            governance = counters.governance,
            "Proposal counters loaded"
        );
        let ledger = Arc::new(VoteLedger::load(governance.ongoing_votes_path.clone()).await?);
        info!(
            open_votes = ledger.len().await,
            path = %ledger.path().display(),
            "Vote ledger loaded"
        );

        let publisher = Publisher::new(
            platform.clone(),
            allocator,
            ledger.clone(),
            discord.guild_id,
            governance.voting_window,
        );
        let tally = Arc::new(TallyScheduler::new(
            ledger.clone(),
            platform,
            bridge,
            governance.quorum,
        ));

        Ok(Self {
            drafts: DraftStore::new(),
            ledger,
            publisher,
            tally,
            jwt_secret,
        })
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
