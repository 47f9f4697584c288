use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use yappy_types::api::{ToggleReactionRequest, ToggleReactionResponse};
use yappy_types::models::Reaction;

use crate::error::ApiError;
use crate::passcode::AppState;
use crate::policy::{self, Viewer};
use crate::{parse_uuid_lossy, run_blocking};

/// Toggle a (user, emoji) pair: removes it if present, adds it otherwise.
/// Two toggles in a row are a no-op.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<Json<ToggleReactionResponse>, ApiError> {
    if req.emoji.trim().is_empty() {
        return Err(ApiError::Validation("emoji is required".to_string()));
    }

    run_blocking(state.db.clone(), move |db| {
        let viewer = Viewer::from_user(db.get_user(&req.user_id.to_string())?);
        let member =
            policy::member(&viewer).ok_or(ApiError::Forbidden("Only known users can react"))?;

        let (_added, rows) = db
            .toggle_reaction(&id.to_string(), &member.id, &req.emoji)?
            .ok_or(ApiError::NotFound("Message"))?;

        let reactions = rows
            .into_iter()
            .map(|r| Reaction {
                user_id: parse_uuid_lossy(&r.user_id, "reactor id"),
                emoji: r.emoji,
            })
            .collect();

        Ok(ToggleReactionResponse {
            success: true,
            reactions,
        })
    })
    .await
    .map(Json)
}
