use axum::{Json, extract::State};

use yappy_types::api::{
    NotifyOpenedRequest, SubscribePushRequest, SuccessResponse, VapidKeyResponse,
};

use crate::error::ApiError;
use crate::passcode::AppState;
use crate::policy::{self, Viewer};
use crate::run_blocking;

/// Upsert a push subscription, keyed by its endpoint URL. Re-registering
/// replaces the interest set wholesale.
pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribePushRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if req.subscription.endpoint.trim().is_empty() {
        return Err(ApiError::Validation(
            "subscription endpoint is required".to_string(),
        ));
    }

    run_blocking(state.db.clone(), move |db| {
        let viewer = Viewer::from_user(db.get_user(&req.user_id.to_string())?);
        let member = policy::member(&viewer)
            .ok_or(ApiError::Forbidden("Only known users can subscribe"))?;

        let notify: Vec<String> = req.notify_user_ids.iter().map(|id| id.to_string()).collect();
        db.upsert_push_subscription(
            &req.subscription.endpoint,
            &member.id,
            &req.subscription.keys.p256dh,
            &req.subscription.keys.auth,
            req.subscription.expiration_time,
            &notify,
        )?;
        Ok(SuccessResponse::ok())
    })
    .await
    .map(Json)
}

/// Public VAPID key for client-side subscription.
pub async fn vapid_key(State(state): State<AppState>) -> Result<Json<VapidKeyResponse>, ApiError> {
    match state.push.public_key() {
        Some(key) => Ok(Json(VapidKeyResponse {
            public_key: key.to_string(),
        })),
        None => Err(ApiError::Unavailable("VAPID not configured")),
    }
}

/// Wake subscribers interested in this user: they opened the app.
pub async fn notify_opened(
    State(state): State<AppState>,
    Json(req): Json<NotifyOpenedRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if !state.push.is_configured() {
        return Ok(Json(SuccessResponse::ok()));
    }

    let push = state.push.clone();
    let user_id = req.user_id.to_string();
    tokio::spawn(async move { push.notify_app_opened(&user_id).await });

    Ok(Json(SuccessResponse::ok()))
}
