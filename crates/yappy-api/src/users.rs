use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use uuid::Uuid;

use yappy_db::models::UserRow;
use yappy_db::queries::DeleteUserOutcome;
use yappy_types::api::{CreateUserRequest, DeleteUserRequest, SetAdminRequest, SuccessResponse};
use yappy_types::models::User;

use crate::error::ApiError;
use crate::passcode::AppState;
use crate::policy::{self, Viewer};
use crate::{parse_time_lossy, parse_uuid_lossy, run_blocking};

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    run_blocking(state.db.clone(), move |db| {
        let users = db.list_users()?.into_iter().map(to_model).collect();
        Ok(users)
    })
    .await
    .map(Json)
}

/// Idempotent by name: posting an existing name returns that user
/// unchanged. The first user ever created becomes admin.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("Name is required".to_string()));
    }

    run_blocking(state.db.clone(), move |db| {
        let id = Uuid::new_v4().to_string();
        let (row, _created) = db.create_or_get_user(&id, &name)?;
        Ok(to_model(row))
    })
    .await
    .map(Json)
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    // DELETE bodies are optional; an absent or malformed one simply means
    // no requester, which the admin check rejects below.
    let requested_by = requester_from_body(&body);

    run_blocking(state.db.clone(), move |db| {
        let target_id = id.to_string();
        if db.get_user(&target_id)?.is_none() {
            return Err(ApiError::NotFound("User"));
        }

        let viewer = Viewer::from_user(match requested_by {
            Some(rid) => db.get_user(&rid.to_string())?,
            None => None,
        });
        policy::admin(&viewer).ok_or(ApiError::Forbidden("Only the admin can delete users"))?;

        match db.delete_user(&target_id)? {
            DeleteUserOutcome::Deleted => Ok(SuccessResponse::ok()),
            DeleteUserOutcome::NotFound => Err(ApiError::NotFound("User")),
            DeleteUserOutcome::SoleUser => Err(ApiError::Validation(
                "Cannot delete the only user. Assign another admin first or reset the app."
                    .to_string(),
            )),
        }
    })
    .await
    .map(Json)
}

pub async fn set_admin(
    State(state): State<AppState>,
    Json(req): Json<SetAdminRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    run_blocking(state.db.clone(), move |db| {
        let has_admin = db.has_admin()?;
        let viewer = Viewer::from_user(match req.requested_by_user_id {
            Some(rid) => db.get_user(&rid.to_string())?,
            None => None,
        });
        if !policy::can_assign_admin(has_admin, &viewer) {
            return Err(ApiError::Forbidden(
                "Only the current admin can assign a new admin",
            ));
        }

        if !db.set_admin(&req.admin_user_id.to_string())? {
            return Err(ApiError::NotFound("User"));
        }
        Ok(SuccessResponse::ok())
    })
    .await
    .map(Json)
}

/// Reset the directory. Messages survive; they become orphaned history the
/// next cohort of users inherits.
pub async fn reset_users(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let requested_by = requester_from_body(&body);

    run_blocking(state.db.clone(), move |db| {
        let has_admin = db.has_admin()?;
        let viewer = Viewer::from_user(match requested_by {
            Some(rid) => db.get_user(&rid.to_string())?,
            None => None,
        });
        if !policy::can_reset_directory(has_admin, &viewer) {
            return Err(ApiError::Forbidden("Only the admin can reset the app"));
        }

        db.delete_all_users()?;
        Ok(SuccessResponse::ok())
    })
    .await
    .map(Json)
}

fn requester_from_body(body: &[u8]) -> Option<Uuid> {
    serde_json::from_slice::<DeleteUserRequest>(body)
        .ok()
        .and_then(|b| b.requested_by_user_id)
}

fn to_model(row: UserRow) -> User {
    User {
        id: parse_uuid_lossy(&row.id, "user id"),
        name: row.name,
        is_admin: row.is_admin,
        created_at: parse_time_lossy(&row.created_at, "user created_at"),
    }
}
