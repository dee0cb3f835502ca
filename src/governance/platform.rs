//! Chat platform capability surface
//!
//! The governance core only needs a handful of primitives from the chat
//! platform. They are collected in [`ChatPlatform`] so the publisher and the
//! tally scheduler can run against Discord or against a test double.

use crate::error::AppError;
use crate::governance::models::VoteMarker;
use async_trait::async_trait;
use serde::Serialize;

/// A guild channel (forum) proposals are posted in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: u64,
    pub name: String,
}

/// A discussion thread inside a forum channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub id: u64,
    pub channel_id: u64,
    pub name: String,
}

/// One emoji reaction and how many members (bot included) used it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: u64,
    pub channel_id: u64,
    pub reactions: Vec<Reaction>,
}

/// Everything the governance core asks of the chat platform
///
/// Lookups return `Ok(None)` when the target does not exist and `Err` when
/// the platform could not be asked.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn resolve_channel_by_name(&self, guild_id: u64, name: &str) -> Result<Option<Channel>, AppError>;

    async fn get_channel(&self, channel_id: u64) -> Result<Option<Channel>, AppError>;

    /// Open a thread whose root message carries `content`
    async fn create_thread(&self, channel: &Channel, name: &str, content: &str) -> Result<Thread, AppError>;

    async fn get_thread(&self, channel: &Channel, thread_id: u64) -> Result<Option<Thread>, AppError>;

    async fn fetch_message(&self, thread: &Thread, message_id: u64) -> Result<Option<Message>, AppError>;

    async fn add_reaction(&self, message: &Message, marker: VoteMarker) -> Result<(), AppError>;

    async fn send(&self, thread: &Thread, text: &str) -> Result<(), AppError>;
}
