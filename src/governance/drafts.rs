//! Draft storage
//!
//! In-memory workspace for proposals that have not been published yet.

use crate::error::{validation_error, AppError};
use crate::governance::models::{Draft, ProposalKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use validator::Validate;

/// Request body for creating or editing a draft
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DraftInput {
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "Draft type is required"))]
    pub kind: String,
    #[validate(length(min = 1, max = 60, message = "Title must be between 1 and 60 characters"))]
    pub title: String,
    #[serde(rename = "abstract")]
    #[validate(length(min = 1, max = 800, message = "Abstract must be between 1 and 800 characters"))]
    pub abstract_text: String,
    #[validate(length(min = 1, max = 800, message = "Background must be between 1 and 800 characters"))]
    pub background: String,
}

impl DraftInput {
    /// Trim, then validate field lengths and the proposal kind
    pub fn into_draft(self) -> Result<Draft, AppError> {
        let trimmed = DraftInput {
            kind: self.kind.trim().to_string(),
            title: self.title.trim().to_string(),
            abstract_text: self.abstract_text.trim().to_string(),
            background: self.background.trim().to_string(),
        };
        trimmed.validate().map_err(|e| validation_error(e.to_string()))?;
        let kind: ProposalKind = trimmed.kind.parse()?;
        Ok(Draft {
            kind,
            title: trimmed.title,
            abstract_text: trimmed.abstract_text,
            background: trimmed.background,
        })
    }
}

/// A draft plus bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDraft {
    pub id: Uuid,
    pub author: String,
    pub draft: Draft,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Thread-safe draft store
pub struct DraftStore {
    drafts: Arc<RwLock<HashMap<Uuid, StoredDraft>>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self {
            drafts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a new draft
    pub async fn create(&self, author: &str, input: DraftInput) -> Result<StoredDraft, AppError> {
        let draft = input.into_draft()?;
        let now = Utc::now();
        let stored = StoredDraft {
            id: Uuid::new_v4(),
            author: author.to_string(),
            draft,
            created_at: now,
            updated_at: now,
        };

        let mut drafts = self.drafts.write().await;
        drafts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    /// Get a draft by ID
    pub async fn get(&self, id: Uuid) -> Result<StoredDraft, AppError> {
        let drafts = self.drafts.read().await;
        drafts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Draft {} not found", id)))
    }

    /// List all drafts, oldest first
    pub async fn list(&self) -> Vec<StoredDraft> {
        let drafts = self.drafts.read().await;
        let mut list: Vec<StoredDraft> = drafts.values().cloned().collect();
        list.sort_by_key(|d| d.created_at);
        list
    }

    /// Replace a draft's content
    pub async fn update(&self, id: Uuid, input: DraftInput) -> Result<StoredDraft, AppError> {
        let draft = input.into_draft()?;
        let mut drafts = self.drafts.write().await;
        let stored = drafts
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Draft {} not found", id)))?;

        stored.draft = draft;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    /// Delete a draft
    pub async fn delete(&self, id: Uuid) -> Result<StoredDraft, AppError> {
        let mut drafts = self.drafts.write().await;
        drafts
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Draft {} not found", id)))
    }

    /// Remove a draft for publishing; pair with `restore` on failure
    pub async fn take(&self, id: Uuid) -> Result<StoredDraft, AppError> {
        self.delete(id).await
    }

    /// Put back a draft whose publish failed
    pub async fn restore(&self, stored: StoredDraft) {
        let mut drafts = self.drafts.write().await;
        drafts.insert(stored.id, stored);
    }

    /// Get draft count
    pub async fn count(&self) -> usize {
        let drafts = self.drafts.read().await;
        drafts.len()
    }
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::new()
    }
}
