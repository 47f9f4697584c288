use std::sync::Arc;

use axum::{Json, extract::State};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use yappy_db::Database;
use yappy_push::PushNotifier;
use yappy_types::api::{
    PasscodeResponse, SuccessResponse, UpdatePasscodeRequest, VerifyPasscodeRequest,
};

use crate::error::ApiError;
use crate::policy::{self, Viewer};
use crate::run_blocking;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub push: Arc<PushNotifier>,
    /// Environment fallback (`CHAT_PASSCODE`) that seeds the config
    /// collection the first time the passcode is read.
    pub default_passcode: Option<String>,
}

const PASSCODE_KEY: &str = "passcode";

/// Read the passcode, lazily persisting the environment default on first
/// use.
async fn load_or_seed_passcode(state: &AppState) -> Result<String, ApiError> {
    let default = state.default_passcode.clone();
    run_blocking(state.db.clone(), move |db| {
        if let Some(entry) = db.get_config(PASSCODE_KEY)? {
            return Ok(entry.value);
        }
        match default {
            Some(value) => {
                db.set_config(PASSCODE_KEY, &value)?;
                Ok(value)
            }
            None => Err(ApiError::NotConfigured),
        }
    })
    .await
}

/// Constant-time equality over SHA-256 digests: hashing fixes the compared
/// width regardless of candidate length, and `ct_eq` examines every byte
/// before answering.
fn passcode_matches(candidate: &str, secret: &str) -> bool {
    let candidate = Sha256::digest(candidate.as_bytes());
    let secret = Sha256::digest(secret.as_bytes());
    bool::from(candidate.as_slice().ct_eq(secret.as_slice()))
}

pub async fn get_passcode(
    State(state): State<AppState>,
) -> Result<Json<PasscodeResponse>, ApiError> {
    let passcode = load_or_seed_passcode(&state).await?;
    Ok(Json(PasscodeResponse { passcode }))
}

pub async fn verify_passcode(
    State(state): State<AppState>,
    Json(req): Json<VerifyPasscodeRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let secret = load_or_seed_passcode(&state).await?;

    if passcode_matches(&req.passcode, &secret) {
        Ok(Json(SuccessResponse::ok()))
    } else {
        Err(ApiError::Unauthorized("Incorrect passcode"))
    }
}

pub async fn update_passcode(
    State(state): State<AppState>,
    Json(req): Json<UpdatePasscodeRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if req.passcode.trim().is_empty() {
        return Err(ApiError::Validation("passcode is required".to_string()));
    }

    run_blocking(state.db.clone(), move |db| {
        let viewer = Viewer::from_user(db.get_user(&req.user_id.to_string())?);
        policy::admin(&viewer)
            .ok_or(ApiError::Forbidden("Only the admin can update the passcode"))?;

        db.set_config(PASSCODE_KEY, &req.passcode)?;
        Ok(SuccessResponse::ok())
    })
    .await
    .map(Json)
}
