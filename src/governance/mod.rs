//! Governance module - proposal voting lifecycle
//!
//! Drafts are numbered and published as forum threads, tracked in a
//! persisted ledger while the vote is open, and tallied once the window
//! closes. Passed proposals are forwarded to the submission bridge.

pub mod allocator;
pub mod bridge;
pub mod discord;
pub mod drafts;
pub mod ledger;
pub mod models;
pub mod persist;
pub mod platform;
pub mod publisher;
pub mod tally;

pub use allocator::{ForumChannels, IdentifierAllocator};
pub use bridge::{ScriptBridge, SubmissionBridge};
pub use discord::DiscordClient;
pub use drafts::{DraftInput, DraftStore, StoredDraft};
pub use ledger::VoteLedger;
pub use models::VoteRecord;
pub use platform::ChatPlatform;
pub use publisher::Publisher;
pub use tally::{SweepReport, TallyScheduler};
