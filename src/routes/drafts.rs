//! Draft route handlers
//!
//! Stewards write and publish drafts; any member may read them.

use crate::auth::{require_role, Claims, Role};
use crate::error::ApiResult;
use crate::governance::{DraftInput, StoredDraft, VoteRecord};
use crate::models::{MessageResponse, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Serialize)]
pub struct DraftData {
    pub draft: StoredDraft,
}

#[derive(Serialize)]
pub struct DraftListData {
    pub drafts: Vec<StoredDraft>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct PublishedData {
    pub vote: VoteRecord,
}

/// Create a new draft
pub async fn create_draft(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<DraftInput>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<DraftData>>)> {
    require_role(&claims, Role::Steward)?;
    debug!("Creating draft: {}", payload.title);

    let draft = state.drafts.create(&claims.sub, payload).await?;
    info!(draft_id = %draft.id, author = %draft.author, "Draft created");

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Draft created successfully.", DraftData { draft })),
    ))
}

/// List drafts, oldest first
pub async fn list_drafts(State(state): State<SharedState>) -> Json<SuccessResponse<DraftListData>> {
    let drafts = state.drafts.list().await;
    let count = drafts.len();
    Json(SuccessResponse::with_data(
        format!("{} draft(s) found.", count),
        DraftListData { drafts, count },
    ))
}

pub async fn get_draft(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<DraftData>>> {
    let draft = state.drafts.get(id).await?;
    Ok(Json(SuccessResponse::with_data("Draft found.", DraftData { draft })))
}

pub async fn update_draft(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DraftInput>,
) -> ApiResult<Json<SuccessResponse<DraftData>>> {
    require_role(&claims, Role::Steward)?;

    let draft = state.drafts.update(id, payload).await?;
    info!(draft_id = %id, "Draft updated by {}", claims.sub);

    Ok(Json(SuccessResponse::with_data("Draft updated successfully.", DraftData { draft })))
}

pub async fn delete_draft(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    require_role(&claims, Role::Steward)?;

    let draft = state.drafts.delete(id).await?;
    info!(draft_id = %id, "Draft '{}' deleted by {}", draft.draft.title, claims.sub);

    Ok(Json(MessageResponse::new("Draft deleted successfully.")))
}

/// Publish a draft and open its vote
///
/// The draft leaves the store for the duration of the publish and comes back
/// if publishing fails.
pub async fn publish_draft(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<PublishedData>>)> {
    require_role(&claims, Role::Steward)?;

    let stored = state.drafts.take(id).await?;
    match state.publisher.publish(stored.draft.clone()).await {
        Ok(vote) => {
            info!(draft_id = %id, proposal_id = vote.proposal_id, "Draft published by {}", claims.sub);
            Ok((
                StatusCode::CREATED,
                Json(SuccessResponse::with_data(
                    format!("Published '{}'.", vote.title),
                    PublishedData { vote },
                )),
            ))
        }
        Err(e) => {
            warn!(draft_id = %id, "Publish failed, restoring draft: {}", e);
            state.drafts.restore(stored).await;
            Err(e)
        }
    }
}
