use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Reaction};

// -- Shared --

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

// -- Passcode --

#[derive(Debug, Serialize)]
pub struct PasscodeResponse {
    pub passcode: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyPasscodeRequest {
    pub passcode: String,
    /// Client hint only; verification does not depend on the caller.
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePasscodeRequest {
    pub passcode: String,
    pub user_id: Uuid,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteUserRequest {
    pub requested_by_user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetAdminRequest {
    pub admin_user_id: Uuid,
    pub requested_by_user_id: Option<Uuid>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMessageRequest {
    pub sender_user_id: Option<Uuid>,
    pub text: Option<String>,
    pub image_base64: Option<String>,
    pub audio_base64: Option<String>,
    /// Lenient: a value that is not a resolvable message id is ignored
    /// rather than rejected, so stale client state cannot fail a send.
    pub reply_to_message_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteMessageRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClearMessagesRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkSeenRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MarkSeenResponse {
    pub success: bool,
    pub marked_count: usize,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub user_id: Uuid,
    pub emoji: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleReactionResponse {
    pub success: bool,
    pub reactions: Vec<Reaction>,
}

// -- Push --

/// Browser `PushSubscription.toJSON()` shape, passed through verbatim by
/// clients. Deliberately permissive about unknown fields so newer browsers
/// keep working.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscriptionPayload {
    pub endpoint: String,
    pub keys: PushKeys,
    pub expiration_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribePushRequest {
    pub user_id: Uuid,
    pub subscription: PushSubscriptionPayload,
    /// Sender ids this subscriber wants to be woken for.
    #[serde(default)]
    pub notify_user_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct VapidKeyResponse {
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyOpenedRequest {
    pub user_id: Uuid,
}
