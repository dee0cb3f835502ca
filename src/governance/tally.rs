//! Tally scheduler
//!
//! A recurring sweep over the vote ledger. Votes whose deadline has passed
//! are counted from the live reactions on their root message, decided,
//! optionally handed to the submission bridge, announced in their thread and
//! removed from the ledger.
//!
//! ```text
//! Active --deadline--> Tallying --counted--> Passed | Failed --posted--> Resolved
//! ```

use crate::error::AppError;
use crate::governance::bridge::SubmissionBridge;
use crate::governance::ledger::VoteLedger;
use crate::governance::models::{VoteCounts, VoteMarker, VoteRecord, Verdict};
use crate::governance::platform::{ChatPlatform, Reaction};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pass iff yes beats no and reaches quorum. Abstentions never count.
pub fn decide(counts: &VoteCounts, quorum: u64) -> Verdict {
    if counts.yes > counts.no && counts.yes >= quorum {
        Verdict::Passed
    } else {
        Verdict::Failed
    }
}

/// Refresh counts from reactions, discounting the bot's own reaction
///
/// Markers without a reaction keep their previous value; unrelated emoji are
/// ignored.
pub fn apply_reactions(previous: VoteCounts, reactions: &[Reaction]) -> VoteCounts {
    let mut counts = previous;
    for reaction in reactions {
        if let Some(marker) = VoteMarker::from_symbol(&reaction.emoji) {
            counts.set(marker, reaction.count.saturating_sub(1));
        }
    }
    counts
}

pub fn result_message(title: &str, verdict: Verdict, counts: &VoteCounts) -> String {
    let outcome = match verdict {
        Verdict::Passed => "The vote passes! :tada: Snapshot proposal will now be created.",
        Verdict::Failed => "The vote fails. :disappointed:",
    };
    format!(
        "Vote for '{}' has concluded:\n\n{}\n\nYes: {}\nNo: {}\nAbstain: {}",
        title, outcome, counts.yes, counts.no, counts.abstain
    )
}

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Still before their deadline
    pub skipped_active: usize,
    /// Due, but their thread or message could not be reached
    pub deferred: usize,
    pub passed: usize,
    pub failed: usize,
}

pub struct TallyScheduler {
    ledger: Arc<VoteLedger>,
    platform: Arc<dyn ChatPlatform>,
    bridge: Arc<dyn SubmissionBridge>,
    quorum: u64,
    /// One sweep at a time, whether periodic or operator-triggered
    sweep_lock: Mutex<()>,
}

impl TallyScheduler {
    pub fn new(
        ledger: Arc<VoteLedger>,
        platform: Arc<dyn ChatPlatform>,
        bridge: Arc<dyn SubmissionBridge>,
        quorum: u64,
    ) -> Self {
        Self {
            ledger,
            platform,
            bridge,
            quorum,
            sweep_lock: Mutex::new(()),
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Resolve every vote due at `now`; per-record failures are logged only
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let _guard = self.sweep_lock.lock().await;
        info!("Checking to see if proposals have ended");

        let mut report = SweepReport::default();
        for id in self.ledger.ids().await {
            // Cancelled by an operator since the snapshot was taken
            let Some(record) = self.ledger.get(id).await else {
                continue;
            };
            if !record.is_due(now) {
                report.skipped_active += 1;
                continue;
            }

            match self.resolve(&record).await {
                Ok(Verdict::Passed) => report.passed += 1,
                Ok(Verdict::Failed) => report.failed += 1,
                Err(e) => {
                    error!(proposal_id = record.proposal_id, "Deferring tally of '{}': {}", record.title, e);
                    report.deferred += 1;
                }
            }
        }

        debug!(?report, "Sweep finished");
        report
    }

    /// Count, decide, announce and retire one due vote
    ///
    /// Returns `Err` only while the record is still untouched in the ledger.
    async fn resolve(&self, record: &VoteRecord) -> Result<Verdict, AppError> {
        let id = record.proposal_id;

        let channel = self.platform.get_channel(record.channel_id).await?.ok_or_else(|| {
            AppError::ThreadOrMessageNotFound(format!("Unable to find the channel with id: {}", record.channel_id))
        })?;
        let thread = self.platform.get_thread(&channel, id).await?.ok_or_else(|| {
            AppError::ThreadOrMessageNotFound(format!(
                "Unable to find the thread with id: {} in the channel: {}",
                id, channel.name
            ))
        })?;
        let message = self.platform.fetch_message(&thread, id).await?.ok_or_else(|| {
            AppError::ThreadOrMessageNotFound(format!(
                "Unable to find the message with id: {} in the thread: {}",
                id, thread.name
            ))
        })?;

        let counts = apply_reactions(record.counts, &message.reactions);
        self.ledger.update_counts(id, counts).await;
        let verdict = decide(&counts, self.quorum);
        info!(
            proposal_id = id,
            yes = counts.yes,
            no = counts.no,
            abstain = counts.abstain,
            ?verdict,
            "Vote for '{}' concluded",
            record.title
        );

        if verdict == Verdict::Passed {
            if let Err(e) = self
                .bridge
                .submit(&record.title, &record.draft.abstract_text, &record.draft.background)
                .await
            {
                error!(proposal_id = id, "Snapshot submission failed for '{}': {}", record.title, e);
            }
        }

        let text = result_message(&record.title, verdict, &counts);
        if let Err(e) = self.platform.send(&thread, &text).await {
            error!(proposal_id = id, "An error occurred while posting the result message: {}", e);
        }

        match self.ledger.remove(id).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(proposal_id = id, "Vote was already removed from the ledger"),
            Err(e) => error!(proposal_id = id, "Failed to persist ledger after resolving vote: {}", e),
        }

        Ok(verdict)
    }

    /// Start the recurring sweep on the runtime
    pub fn spawn(self: Arc<Self>, interval: Duration) -> TallyHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Tally scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Tally scheduler stopped");
        });

        TallyHandle { shutdown: shutdown_tx, task }
    }
}

/// Cancellation handle for the recurring sweep
pub struct TallyHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TallyHandle {
    /// Stop after the in-flight sweep (if any) and wait for the task
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Tally scheduler task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::bridge::testing::RecordingBridge;
    use crate::governance::models::{Draft, ProposalKind};
    use crate::governance::platform::testing::InMemoryPlatform;
    use crate::governance::platform::Channel;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use pretty_assertions::assert_eq;
    use tempfile::{tempdir, TempDir};

    const QUORUM: u64 = 5;

    fn counts(yes: u64, no: u64, abstain: u64) -> VoteCounts {
        VoteCounts { yes, no, abstain }
    }

    #[test]
    fn test_decision_rule() {
        assert_eq!(decide(&counts(5, 0, 0), QUORUM), Verdict::Passed);
        assert_eq!(decide(&counts(5, 5, 0), QUORUM), Verdict::Failed);
        assert_eq!(decide(&counts(4, 0, 0), QUORUM), Verdict::Failed);
        assert_eq!(decide(&counts(6, 6, 0), QUORUM), Verdict::Failed);
        assert_eq!(decide(&counts(6, 5, 40), QUORUM), Verdict::Passed);
        assert_eq!(decide(&counts(0, 0, 9), QUORUM), Verdict::Failed);
    }

    #[test]
    fn test_bot_reaction_is_subtracted() {
        let reactions = vec![
            Reaction { emoji: "✅".to_string(), count: 6 },
            Reaction { emoji: "❌".to_string(), count: 1 },
            Reaction { emoji: "🎉".to_string(), count: 12 },
        ];
        assert_eq!(apply_reactions(VoteCounts::default(), &reactions), counts(5, 0, 0));
    }

    #[test]
    fn test_missing_marker_keeps_previous_count() {
        let reactions = vec![Reaction { emoji: "✅".to_string(), count: 3 }];
        assert_eq!(apply_reactions(counts(1, 4, 2), &reactions), counts(2, 4, 2));
    }

    #[test]
    fn test_zero_count_does_not_underflow() {
        let reactions = vec![Reaction { emoji: "➖".to_string(), count: 0 }];
        assert_eq!(apply_reactions(VoteCounts::default(), &reactions).abstain, 0);
    }

    #[test]
    fn test_result_message_format() {
        assert_eq!(
            result_message("BGP #1: Garden", Verdict::Passed, &counts(5, 1, 2)),
            "Vote for 'BGP #1: Garden' has concluded:\n\n\
             The vote passes! :tada: Snapshot proposal will now be created.\n\n\
             Yes: 5\nNo: 1\nAbstain: 2"
        );
        assert!(result_message("t", Verdict::Failed, &counts(0, 0, 0)).contains("The vote fails. :disappointed:"));
    }

    struct Fixture {
        _dir: TempDir,
        platform: Arc<InMemoryPlatform>,
        bridge: Arc<RecordingBridge>,
        ledger: Arc<VoteLedger>,
        scheduler: Arc<TallyScheduler>,
        forum: Channel,
    }

    async fn fixture_with(bridge: RecordingBridge) -> Fixture {
        let dir = tempdir().unwrap();
        let platform = Arc::new(InMemoryPlatform::new());
        let bridge = Arc::new(bridge);
        let ledger = Arc::new(VoteLedger::load(dir.path().join("votes.json")).await.unwrap());
        let forum_id = platform.add_forum(1, "improvement-props");
        let forum = Channel { id: forum_id, name: "improvement-props".to_string() };
        let scheduler = Arc::new(TallyScheduler::new(ledger.clone(), platform.clone(), bridge.clone(), QUORUM));
        Fixture { _dir: dir, platform, bridge, ledger, scheduler, forum }
    }

    async fn fixture() -> Fixture {
        fixture_with(RecordingBridge::default()).await
    }

    fn deadline() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    async fn open_vote(fx: &Fixture, title: &str) -> u64 {
        open_vote_ending(fx, title, deadline()).await
    }

    /// Open a thread with the bot's three reactions and record its vote
    async fn open_vote_ending(fx: &Fixture, title: &str, end_time: DateTime<Utc>) -> u64 {
        let thread = fx.platform.create_thread(&fx.forum, title, "body").await.unwrap();
        for marker in VoteMarker::ALL {
            fx.platform.set_reaction(thread.id, marker.symbol(), 1);
        }
        fx.ledger
            .insert(VoteRecord {
                proposal_id: thread.id,
                draft: Draft {
                    kind: ProposalKind::Governance,
                    title: title.to_string(),
                    abstract_text: "Plant a garden".to_string(),
                    background: "Members asked".to_string(),
                },
                title: format!("Bloom Governance Proposal (BGP) #1: {}", title),
                channel_name: fx.forum.name.clone(),
                channel_id: fx.forum.id,
                end_time,
                counts: VoteCounts::default(),
            })
            .await
            .unwrap();
        thread.id
    }

    #[tokio::test]
    async fn test_sweep_before_deadline_leaves_record_untouched() {
        let fx = fixture().await;
        let id = open_vote(&fx, "Garden").await;
        fx.platform.set_reaction(id, "✅", 9);
        let before = fx.ledger.get(id).await.unwrap();

        for offset in [3600, 60, 1] {
            let report = fx.scheduler.sweep_at(deadline() - ChronoDuration::seconds(offset)).await;
            assert_eq!(report, SweepReport { skipped_active: 1, ..Default::default() });
        }

        assert_eq!(fx.ledger.get(id).await, Some(before));
        assert!(fx.platform.sent_to(id).is_empty());
    }

    #[tokio::test]
    async fn test_passing_vote_submits_posts_and_resolves() {
        let fx = fixture().await;
        let id = open_vote(&fx, "Garden").await;
        fx.platform.set_reaction(id, "✅", 6);
        fx.platform.set_reaction(id, "❌", 2);
        fx.platform.set_reaction(id, "➖", 4);

        let report = fx.scheduler.sweep_at(deadline()).await;

        assert_eq!(report, SweepReport { passed: 1, ..Default::default() });
        assert_eq!(
            fx.bridge.calls.lock().unwrap().clone(),
            vec![(
                "Bloom Governance Proposal (BGP) #1: Garden".to_string(),
                "Plant a garden".to_string(),
                "Members asked".to_string()
            )]
        );
        let posts = fx.platform.sent_to(id);
        assert_eq!(posts.len(), 1);
        assert!(posts[0].contains("The vote passes!"));
        assert!(posts[0].ends_with("Yes: 5\nNo: 1\nAbstain: 3"));
        assert!(fx.ledger.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_failing_vote_skips_bridge() {
        let fx = fixture().await;
        let id = open_vote(&fx, "Garden").await;
        fx.platform.set_reaction(id, "✅", 5); // 4 after the bot's own

        let report = fx.scheduler.sweep_at(deadline()).await;

        assert_eq!(report.failed, 1);
        assert_eq!(fx.bridge.call_count(), 0);
        assert!(fx.platform.sent_to(id)[0].contains("The vote fails."));
        assert_eq!(fx.ledger.len().await, 0);
    }

    #[tokio::test]
    async fn test_bridge_failure_still_resolves_as_passed() {
        let fx = fixture_with(RecordingBridge::failing()).await;
        let id = open_vote(&fx, "Garden").await;
        fx.platform.set_reaction(id, "✅", 8);

        let report = fx.scheduler.sweep_at(deadline()).await;

        assert_eq!(report.passed, 1);
        assert_eq!(fx.bridge.call_count(), 1);
        assert!(fx.platform.sent_to(id)[0].contains("The vote passes!"));
        assert!(fx.ledger.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_thread_defers_until_it_returns() {
        let fx = fixture().await;
        let gone = open_vote(&fx, "Deleted").await;
        let healthy = open_vote(&fx, "Healthy").await;
        fx.platform.delete_thread(gone);

        let report = fx.scheduler.sweep_at(deadline()).await;

        assert_eq!(report, SweepReport { deferred: 1, failed: 1, ..Default::default() });
        assert!(fx.ledger.get(gone).await.is_some());
        assert!(fx.ledger.get(healthy).await.is_none());

        // Still retried on later sweeps
        let report = fx.scheduler.sweep_at(deadline() + ChronoDuration::minutes(1)).await;
        assert_eq!(report.deferred, 1);
    }

    #[tokio::test]
    async fn test_platform_outage_defers_every_due_vote() {
        let fx = fixture().await;
        open_vote(&fx, "One").await;
        open_vote(&fx, "Two").await;
        fx.platform.fail_lookups(true);

        let report = fx.scheduler.sweep_at(deadline()).await;
        assert_eq!(report.deferred, 2);
        assert_eq!(fx.ledger.len().await, 2);

        fx.platform.fail_lookups(false);
        let report = fx.scheduler.sweep_at(deadline()).await;
        assert_eq!(report.failed, 2);
        assert_eq!(fx.ledger.len().await, 0);
    }

    #[tokio::test]
    async fn test_post_failure_still_removes_record() {
        let fx = fixture().await;
        let id = open_vote(&fx, "Garden").await;
        fx.platform.fail_send(true);

        let report = fx.scheduler.sweep_at(deadline()).await;

        assert_eq!(report.failed, 1);
        assert!(fx.ledger.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_resolved_vote_is_never_reprocessed() {
        let fx = fixture().await;
        let id = open_vote(&fx, "Garden").await;
        fx.platform.set_reaction(id, "✅", 6);

        fx.scheduler.sweep_at(deadline()).await;
        let report = fx.scheduler.sweep_at(deadline() + ChronoDuration::hours(1)).await;

        assert_eq!(report, SweepReport::default());
        assert_eq!(fx.platform.sent_to(id).len(), 1);
        assert_eq!(fx.bridge.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_post_once() {
        let fx = fixture().await;
        let id = open_vote(&fx, "Garden").await;

        let a = {
            let scheduler = fx.scheduler.clone();
            tokio::spawn(async move { scheduler.sweep_at(deadline()).await })
        };
        let b = {
            let scheduler = fx.scheduler.clone();
            tokio::spawn(async move { scheduler.sweep_at(deadline()).await })
        };
        let total = a.await.unwrap().failed + b.await.unwrap().failed;

        assert_eq!(total, 1);
        assert_eq!(fx.platform.sent_to(id).len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_scheduler_resolves_and_shuts_down() {
        let fx = fixture().await;
        let id = open_vote_ending(&fx, "Garden", Utc::now() - ChronoDuration::hours(1)).await;

        let handle = fx.scheduler.clone().spawn(Duration::from_millis(10));
        for _ in 0..100 {
            if fx.ledger.get(id).await.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;

        assert!(fx.ledger.get(id).await.is_none());
        assert_eq!(fx.platform.sent_to(id).len(), 1);
    }
}
