/// Database row types — these map directly to SQLite rows.
/// Distinct from yappy-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub is_admin: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub body: Option<String>,
    pub image_base64: Option<String>,
    pub audio_base64: Option<String>,
    pub reply_to_id: Option<String>,
    pub reply_to_sender_id: Option<String>,
    pub reply_to_snippet: Option<String>,
    pub seen_at: Option<String>,
    pub created_at: String,
}

/// Input for message insertion. `created_at` is assigned by the store.
#[derive(Debug, Default)]
pub struct NewMessage {
    pub id: String,
    pub sender_id: String,
    pub body: Option<String>,
    pub image_base64: Option<String>,
    pub audio_base64: Option<String>,
    pub reply_to_id: Option<String>,
    pub reply_to_sender_id: Option<String>,
    pub reply_to_snippet: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ConfigRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct PushSubscriptionRow {
    pub endpoint: String,
    pub user_id: String,
    pub p256dh: String,
    pub auth: String,
    pub expiration_time: Option<i64>,
    pub updated_at: String,
}
