//! Proposal publisher
//!
//! Turns a draft into a live vote: numbers it, opens the discussion thread,
//! records the vote in the ledger and seeds the three voting reactions.

use crate::error::AppError;
use crate::governance::allocator::IdentifierAllocator;
use crate::governance::ledger::VoteLedger;
use crate::governance::models::{Draft, VoteCounts, VoteMarker, VoteRecord};
use crate::governance::platform::{ChatPlatform, Thread};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub struct Publisher {
    platform: Arc<dyn ChatPlatform>,
    allocator: Arc<IdentifierAllocator>,
    ledger: Arc<VoteLedger>,
    guild_id: u64,
    voting_window: Duration,
}

impl Publisher {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        allocator: Arc<IdentifierAllocator>,
        ledger: Arc<VoteLedger>,
        guild_id: u64,
        voting_window: Duration,
    ) -> Self {
        Self {
            platform,
            allocator,
            ledger,
            guild_id,
            voting_window,
        }
    }

    /// Publish a draft and open its vote
    pub async fn publish(&self, draft: Draft) -> Result<VoteRecord, AppError> {
        self.publish_at(draft, Utc::now()).await
    }

    pub(crate) async fn publish_at(&self, draft: Draft, now: DateTime<Utc>) -> Result<VoteRecord, AppError> {
        let end_time = self.deadline(now)?;

        // The forum is checked before numbering so a misconfigured guild
        // does not burn a proposal number.
        let channel_name = self.allocator.channels().for_kind(draft.kind).to_string();
        let forum = self
            .platform
            .resolve_channel_by_name(self.guild_id, &channel_name)
            .await?
            .ok_or_else(|| AppError::ChannelNotFound(channel_name.clone()))?;

        let allocation = self.allocator.allocate(&draft).await?;
        debug!(
            kind = %allocation.kind,
            id_type = allocation.id_type,
            sequence = allocation.sequence,
            "Allocated proposal number"
        );
        let content = render_content(&allocation.title, &draft, self.voting_window);

        let thread = self
            .platform
            .create_thread(&forum, &allocation.title, &content)
            .await
            .map_err(|e| {
                error!("Failed to create thread for '{}': {}", allocation.title, e);
                e
            })?;

        let record = VoteRecord {
            proposal_id: thread.id,
            draft,
            title: allocation.title,
            channel_name: allocation.channel_name,
            channel_id: forum.id,
            end_time,
            counts: VoteCounts::default(),
        };
        self.ledger.insert(record.clone()).await?;

        info!(
            proposal_id = record.proposal_id,
            end_time = %record.end_time,
            "Published '{}' to #{}",
            record.title,
            record.channel_name
        );

        // The vote is live from here on; a reaction failure is logged and
        // leaves the record in place for the tally.
        if let Err(e) = self.add_vote_reactions(&thread).await {
            error!(proposal_id = record.proposal_id, "Failed to add vote reactions: {}", e);
        }

        Ok(record)
    }

    /// Close of the voting window, at the millisecond precision the ledger stores
    fn deadline(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        chrono::Duration::from_std(self.voting_window)
            .ok()
            .and_then(|window| now.checked_add_signed(window))
            .and_then(|end| DateTime::<Utc>::from_timestamp_millis(end.timestamp_millis()))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "Voting window of {}s is out of range",
                    self.voting_window.as_secs()
                ))
            })
    }

    async fn add_vote_reactions(&self, thread: &Thread) -> Result<(), AppError> {
        let message = self
            .platform
            .fetch_message(thread, thread.id)
            .await?
            .ok_or_else(|| {
                AppError::ThreadOrMessageNotFound(format!("Root message of thread {} not found", thread.id))
            })?;

        for marker in VoteMarker::ALL {
            self.platform.add_reaction(&message, marker).await?;
        }
        Ok(())
    }
}

/// Body of the proposal's root message
pub fn render_content(title: &str, draft: &Draft, voting_window: Duration) -> String {
    let [yes, no, abstain] = VoteMarker::ALL;
    format!(
        "**{title}**\n\
         \n\
         __**Abstract**__\n\
         {abstract_text}\n\
         \n\
         **__Background__**\n\
         {background}\n\
         \n\
         **{yes_symbol} {yes_heading}**\n\
         \n\
         **{no_symbol} {no_heading}**\n\
         \n\
         **{abstain_symbol} {abstain_heading}**\n\
         \n\
         Vote will conclude in {window} from now.\n",
        title = title,
        abstract_text = draft.abstract_text,
        background = draft.background,
        yes_symbol = yes.symbol(),
        yes_heading = yes.heading(),
        no_symbol = no.symbol(),
        no_heading = no.heading(),
        abstain_symbol = abstain.symbol(),
        abstain_heading = abstain.heading(),
        window = format_window(voting_window),
    )
}

/// Largest whole unit: "48h", "90m", "30s"
fn format_window(window: Duration) -> String {
    let secs = window.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::allocator::ForumChannels;
    use crate::governance::models::ProposalKind;
    use crate::governance::platform::testing::InMemoryPlatform;
    use pretty_assertions::assert_eq;
    use tempfile::{tempdir, TempDir};

    const GUILD: u64 = 846911453839228938;

    struct Fixture {
        _dir: TempDir,
        platform: Arc<InMemoryPlatform>,
        allocator: Arc<IdentifierAllocator>,
        ledger: Arc<VoteLedger>,
        publisher: Publisher,
    }

    async fn fixture() -> Fixture {
        fixture_with_window(Duration::from_secs(48 * 3600)).await
    }

    async fn fixture_with_window(window: Duration) -> Fixture {
        let dir = tempdir().unwrap();
        let platform = Arc::new(InMemoryPlatform::new());
        let allocator = Arc::new(
            IdentifierAllocator::load(
                dir.path().join("ids.json"),
                ForumChannels {
                    governance: "improvement-props".to_string(),
                    budget: "budgetary-props".to_string(),
                },
            )
            .await
            .unwrap(),
        );
        let ledger = Arc::new(VoteLedger::load(dir.path().join("votes.json")).await.unwrap());
        let publisher = Publisher::new(
            platform.clone(),
            allocator.clone(),
            ledger.clone(),
            GUILD,
            window,
        );
        Fixture {
            _dir: dir,
            platform,
            allocator,
            ledger,
            publisher,
        }
    }

    fn draft(kind: ProposalKind) -> Draft {
        Draft {
            kind,
            title: "Community garden".to_string(),
            abstract_text: "Plant a garden".to_string(),
            background: "Members asked for one".to_string(),
        }
    }

    #[test]
    fn test_render_content_template() {
        let content = render_content(
            "Bloom Governance Proposal (BGP) #1: Community garden",
            &draft(ProposalKind::Governance),
            Duration::from_secs(48 * 3600),
        );
        assert_eq!(
            content,
            "**Bloom Governance Proposal (BGP) #1: Community garden**\n\n\
             __**Abstract**__\nPlant a garden\n\n\
             **__Background__**\nMembers asked for one\n\n\
             **✅ Yes**\n\n**❌ Reassess**\n\n**➖ Abstain**\n\n\
             Vote will conclude in 48h from now.\n"
        );
    }

    #[test]
    fn test_format_window_units() {
        assert_eq!(format_window(Duration::from_secs(172_800)), "48h");
        assert_eq!(format_window(Duration::from_secs(5_400)), "90m");
        assert_eq!(format_window(Duration::from_secs(45)), "45s");
    }

    #[tokio::test]
    async fn test_publish_creates_thread_record_and_reactions() {
        let fx = fixture().await;
        let forum = fx.platform.add_forum(GUILD, "improvement-props");
        let now = Utc::now();

        let record = fx.publisher.publish_at(draft(ProposalKind::Governance), now).await.unwrap();

        assert_eq!(record.title, "Bloom Governance Proposal (BGP) #1: Community garden");
        assert_eq!(record.channel_id, forum);
        assert_eq!(record.channel_name, "improvement-props");
        assert_eq!(
            record.end_time.timestamp_millis(),
            (now + chrono::Duration::hours(48)).timestamp_millis()
        );
        assert_eq!(fx.ledger.get(record.proposal_id).await, Some(record.clone()));

        let content = fx.platform.thread_content(record.proposal_id).unwrap();
        assert!(content.contains("Plant a garden"));

        let emojis: Vec<String> = fx
            .platform
            .reactions(record.proposal_id)
            .into_iter()
            .map(|r| r.emoji)
            .collect();
        assert_eq!(emojis, vec!["✅", "❌", "➖"]);
    }

    #[tokio::test]
    async fn test_missing_forum_aborts_before_any_side_effect() {
        let fx = fixture().await;
        fx.platform.add_forum(GUILD, "improvement-props");

        let result = fx.publisher.publish(draft(ProposalKind::Budget)).await;

        assert!(matches!(result, Err(AppError::ChannelNotFound(name)) if name == "budgetary-props"));
        assert_eq!(fx.platform.thread_count(), 0);
        assert_eq!(fx.ledger.len().await, 0);
        assert_eq!(fx.allocator.current().await.budget, 0);
    }

    #[tokio::test]
    async fn test_forum_in_other_guild_is_not_used() {
        let fx = fixture().await;
        fx.platform.add_forum(GUILD + 1, "improvement-props");

        let result = fx.publisher.publish(draft(ProposalKind::Governance)).await;
        assert!(matches!(result, Err(AppError::ChannelNotFound(_))));
    }

    #[tokio::test]
    async fn test_thread_failure_leaves_ledger_untouched() {
        let fx = fixture().await;
        fx.platform.add_forum(GUILD, "budgetary-props");
        fx.platform.fail_create_thread(true);

        let result = fx.publisher.publish(draft(ProposalKind::Budget)).await;

        assert!(matches!(result, Err(AppError::Platform(_))));
        assert_eq!(fx.ledger.len().await, 0);
    }

    #[tokio::test]
    async fn test_sequential_publishes_number_per_kind() {
        let fx = fixture().await;
        fx.platform.add_forum(GUILD, "improvement-props");
        fx.platform.add_forum(GUILD, "budgetary-props");

        let first = fx.publisher.publish(draft(ProposalKind::Governance)).await.unwrap();
        let budget = fx.publisher.publish(draft(ProposalKind::Budget)).await.unwrap();
        let second = fx.publisher.publish(draft(ProposalKind::Governance)).await.unwrap();

        assert!(first.title.contains("(BGP) #1"));
        assert!(budget.title.contains("(BBP) #1"));
        assert!(second.title.contains("(BGP) #2"));
        assert_eq!(fx.ledger.len().await, 3);
    }

    #[tokio::test]
    async fn test_out_of_range_window_fails_before_any_side_effect() {
        for window in [Duration::from_secs(u64::MAX), Duration::from_secs(10_000_000_000_000)] {
            let fx = fixture_with_window(window).await;
            fx.platform.add_forum(GUILD, "improvement-props");

            let result = fx.publisher.publish(draft(ProposalKind::Governance)).await;

            assert!(matches!(result, Err(AppError::Config(_))));
            assert_eq!(fx.platform.thread_count(), 0);
            assert_eq!(fx.allocator.current().await.governance, 0);
            assert_eq!(fx.ledger.len().await, 0);
        }
    }

    #[tokio::test]
    async fn test_record_is_on_disk_before_reactions_are_added() {
        let fx = fixture().await;
        fx.platform.add_forum(GUILD, "improvement-props");
        fx.platform.watch_ledger_file(fx.ledger.path());

        let record = fx.publisher.publish(draft(ProposalKind::Governance)).await.unwrap();

        // One observation per reaction, each taken as the reaction is added.
        assert_eq!(fx.platform.ledger_had_message_at_reactions(), vec![true; 3]);
        assert_eq!(fx.platform.reactions(record.proposal_id).len(), 3);
    }
}
