//! Vote route handlers

use crate::auth::{require_role, Claims, Role};
use crate::error::{not_found_error, ApiResult};
use crate::governance::{SweepReport, VoteRecord};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
pub struct VoteData {
    pub vote: VoteRecord,
}

#[derive(Serialize)]
pub struct VoteListData {
    pub votes: Vec<VoteRecord>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct SweepData {
    pub report: SweepReport,
}

/// List open votes
pub async fn list_votes(State(state): State<SharedState>) -> Json<SuccessResponse<VoteListData>> {
    let votes = state.ledger.entries().await;
    let count = votes.len();
    Json(SuccessResponse::with_data(
        format!("{} open vote(s).", count),
        VoteListData { votes, count },
    ))
}

pub async fn get_vote(
    State(state): State<SharedState>,
    Path(proposal_id): Path<u64>,
) -> ApiResult<Json<SuccessResponse<VoteData>>> {
    let vote = state
        .ledger
        .get(proposal_id)
        .await
        .ok_or_else(|| not_found_error(format!("No open vote for proposal {}", proposal_id)))?;
    Ok(Json(SuccessResponse::with_data("Vote found.", VoteData { vote })))
}

/// Drop an open vote without tallying it
pub async fn cancel_vote(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(proposal_id): Path<u64>,
) -> ApiResult<Json<SuccessResponse<VoteData>>> {
    require_role(&claims, Role::Admin)?;

    let vote = state
        .ledger
        .remove(proposal_id)
        .await?
        .ok_or_else(|| not_found_error(format!("No open vote for proposal {}", proposal_id)))?;
    info!(proposal_id, "Vote '{}' cancelled by {}", vote.title, claims.sub);

    Ok(Json(SuccessResponse::with_data("Vote cancelled.", VoteData { vote })))
}

/// Run one tally sweep now
pub async fn sweep_votes(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<SuccessResponse<SweepData>>> {
    require_role(&claims, Role::Admin)?;

    info!("Manual tally sweep requested by {}", claims.sub);
    let report = state.tally.sweep().await;

    Ok(Json(SuccessResponse::with_data(
        format!("Resolved {} vote(s).", report.passed + report.failed),
        SweepData { report },
    )))
}
