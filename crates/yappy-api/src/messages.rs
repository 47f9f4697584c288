use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;
use uuid::Uuid;

use yappy_db::models::{MessageRow, NewMessage};
use yappy_types::api::{
    ClearMessagesRequest, CreateMessageRequest, DeleteMessageRequest, MarkSeenRequest,
    MarkSeenResponse, MessageListResponse, SuccessResponse,
};
use yappy_types::models::{Message, Reaction};

use crate::error::ApiError;
use crate::passcode::AppState;
use crate::policy::{self, Viewer};
use crate::{parse_time_lossy, parse_uuid_lossy, run_blocking};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — the id of the oldest message from the
    /// previous page; only strictly-older messages are returned.
    pub before: Option<String>,
    /// Requesting user; controls hidden-set filtering and, for the admin,
    /// the moderation annotation.
    pub user_id: Option<String>,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let limit = query.limit.min(200);

    run_blocking(state.db.clone(), move |db| {
        let viewer = Viewer::from_user(match &query.user_id {
            Some(id) => db.get_user(id)?,
            None => None,
        });

        let cursor = match &query.before {
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => match db.get_message(&id.to_string())? {
                    Some(row) => Some(row),
                    // A well-formed id that resolves to nothing gets an
                    // empty page, not an error.
                    None => {
                        return Ok(MessageListResponse {
                            messages: vec![],
                            has_more: false,
                        });
                    }
                },
                // Not an id at all: ignore the cursor.
                Err(_) => None,
            },
            None => None,
        };

        let (rows, has_more) = db.list_messages(
            policy::visibility_filter(&viewer),
            cursor.as_ref().map(|c| (c.created_at.as_str(), c.id.as_str())),
            limit,
        )?;

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let reaction_rows = db.get_reactions_for_messages(&ids)?;
        let hidden_counts = if policy::sees_moderation_state(&viewer) {
            Some(db.get_hidden_counts(&ids)?)
        } else {
            None
        };

        let mut reaction_map: HashMap<String, Vec<Reaction>> = HashMap::new();
        for r in reaction_rows {
            reaction_map
                .entry(r.message_id.clone())
                .or_default()
                .push(Reaction {
                    user_id: parse_uuid_lossy(&r.user_id, "reactor id"),
                    emoji: r.emoji,
                });
        }

        let mut messages: Vec<Message> = rows
            .into_iter()
            .map(|row| {
                let reactions = reaction_map.remove(&row.id).unwrap_or_default();
                let is_deleted = hidden_counts
                    .as_ref()
                    .map(|counts| counts.get(&row.id).copied().unwrap_or(0) > 0);
                to_model(row, reactions, is_deleted)
            })
            .collect();

        // Fetched newest-first; delivered oldest-first for display.
        messages.reverse();

        Ok(MessageListResponse { messages, has_more })
    })
    .await
    .map(Json)
}

pub async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let sender = req
        .sender_user_id
        .ok_or_else(|| ApiError::Validation("sender_user_id is required".to_string()))?;
    let (text, image, audio) = normalize_content(req.text, req.image_base64, req.audio_base64)?;
    let reply_raw = req.reply_to_message_id;

    let row = run_blocking(state.db.clone(), move |db| {
        let mut new = NewMessage {
            id: Uuid::new_v4().to_string(),
            sender_id: sender.to_string(),
            body: text,
            image_base64: image,
            audio_base64: audio,
            ..Default::default()
        };

        if let Some(raw) = reply_raw {
            if let Ok(target_id) = Uuid::parse_str(raw.trim()) {
                if let Some(target) = db.get_message(&target_id.to_string())? {
                    new.reply_to_id = Some(target.id.clone());
                    new.reply_to_sender_id = Some(target.sender_id.clone());
                    new.reply_to_snippet = content_preview(&target);
                }
            }
        }

        let row = db.insert_message(&new)?;
        Ok(row)
    })
    .await?;

    // Notify subscribers off the request path; delivery failures stay in
    // the logs.
    let push = state.push.clone();
    let sender_id = sender.to_string();
    let preview = content_preview(&row).unwrap_or_default();
    tokio::spawn(async move { push.notify_message_sent(&sender_id, &preview).await });

    Ok((StatusCode::CREATED, Json(to_model(row, vec![], None))))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DeleteMessageRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    run_blocking(state.db.clone(), move |db| {
        let viewer = Viewer::from_user(db.get_user(&req.user_id.to_string())?);
        let member = policy::member(&viewer)
            .ok_or(ApiError::Forbidden("Only known users can delete messages"))?;

        let message_id = id.to_string();
        if db.get_message(&message_id)?.is_none() {
            return Err(ApiError::NotFound("Message"));
        }

        // The admin's delete is outright: hidden for everyone, remaining
        // visible to the admin only as moderation state. Everyone else
        // hides it for themselves.
        if viewer.is_admin() {
            db.hide_message_for_all(&message_id)?;
        } else {
            db.hide_message_for(&message_id, &member.id)?;
        }
        Ok(SuccessResponse::ok())
    })
    .await
    .map(Json)
}

/// Clear chat: the admin hard-deletes the history, everyone else clears
/// their own view.
pub async fn clear_messages(
    State(state): State<AppState>,
    Json(req): Json<ClearMessagesRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    run_blocking(state.db.clone(), move |db| {
        let viewer = Viewer::from_user(db.get_user(&req.user_id.to_string())?);
        let member = policy::member(&viewer)
            .ok_or(ApiError::Forbidden("Only known users can clear messages"))?;

        if viewer.is_admin() {
            db.delete_all_messages()?;
        } else {
            db.hide_all_messages_for(&member.id)?;
        }
        Ok(SuccessResponse::ok())
    })
    .await
    .map(Json)
}

/// Stamp `seen_at` on everything from other senders. Fired by the client
/// when the user unlocks chat mode.
pub async fn mark_seen(
    State(state): State<AppState>,
    Json(req): Json<MarkSeenRequest>,
) -> Result<Json<MarkSeenResponse>, ApiError> {
    run_blocking(state.db.clone(), move |db| {
        let viewer = Viewer::from_user(db.get_user(&req.user_id.to_string())?);
        let member = policy::member(&viewer)
            .ok_or(ApiError::Forbidden("Only known users can mark messages seen"))?;

        let marked_count = db.mark_seen(&member.id)?;
        Ok(MarkSeenResponse {
            success: true,
            marked_count,
        })
    })
    .await
    .map(Json)
}

/// Exactly one content kind per message; whitespace-only strings count as
/// absent.
fn normalize_content(
    text: Option<String>,
    image: Option<String>,
    audio: Option<String>,
) -> Result<(Option<String>, Option<String>, Option<String>), ApiError> {
    let text = text.filter(|t| !t.trim().is_empty());
    let image = image.filter(|i| !i.is_empty());
    let audio = audio.filter(|a| !a.is_empty());

    if let Some(image) = &image {
        if !media_payload_is_valid(image) {
            return Err(ApiError::Validation(
                "image_base64 is not valid base64".to_string(),
            ));
        }
    }
    if let Some(audio) = &audio {
        if !media_payload_is_valid(audio) {
            return Err(ApiError::Validation(
                "audio_base64 is not valid base64".to_string(),
            ));
        }
    }

    match text.is_some() as u8 + image.is_some() as u8 + audio.is_some() as u8 {
        0 => Err(ApiError::Validation(
            "Either text, image_base64 or audio_base64 is required".to_string(),
        )),
        1 => Ok((text, image, audio)),
        _ => Err(ApiError::Validation(
            "Only one of text, image_base64 and audio_base64 may be set".to_string(),
        )),
    }
}

/// Media arrives either as a bare base64 string or a full data URL
/// (`data:image/jpeg;base64,...`), depending on how the client produced it.
fn media_payload_is_valid(payload: &str) -> bool {
    let b64 = payload
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,").map(|(_, b64)| b64))
        .unwrap_or(payload);
    B64.decode(b64).is_ok()
}

/// Short preview of a message: the leading 100 characters of its text, or a
/// marker for media-only messages. Reply snapshots store it permanently;
/// push notifications reuse it as the notification body.
fn content_preview(message: &MessageRow) -> Option<String> {
    if let Some(text) = &message.body {
        Some(text.chars().take(100).collect())
    } else if message.image_base64.is_some() {
        Some("Photo".to_string())
    } else if message.audio_base64.is_some() {
        Some("Voice note".to_string())
    } else {
        None
    }
}

fn to_model(row: MessageRow, reactions: Vec<Reaction>, is_deleted: Option<bool>) -> Message {
    Message {
        id: parse_uuid_lossy(&row.id, "message id"),
        sender_user_id: parse_uuid_lossy(&row.sender_id, "sender id"),
        text: row.body,
        image_base64: row.image_base64,
        audio_base64: row.audio_base64,
        reply_to_message_id: row
            .reply_to_id
            .as_deref()
            .map(|s| parse_uuid_lossy(s, "reply target id")),
        reply_to_sender_user_id: row
            .reply_to_sender_id
            .as_deref()
            .map(|s| parse_uuid_lossy(s, "reply sender id")),
        reply_to_text: row.reply_to_snippet,
        created_at: parse_time_lossy(&row.created_at, "message created_at"),
        seen_at: row
            .seen_at
            .as_deref()
            .map(|s| parse_time_lossy(s, "message seen_at")),
        reactions,
        is_deleted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(text: &str) -> MessageRow {
        MessageRow {
            id: "m1".to_string(),
            sender_id: "u1".to_string(),
            body: Some(text.to_string()),
            image_base64: None,
            audio_base64: None,
            reply_to_id: None,
            reply_to_sender_id: None,
            reply_to_snippet: None,
            seen_at: None,
            created_at: "2025-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn preview_truncates_to_100_chars() {
        let long = "é".repeat(150);
        let preview = content_preview(&text_row(&long)).unwrap();
        assert_eq!(preview.chars().count(), 100);

        assert_eq!(content_preview(&text_row("hi there")).unwrap(), "hi there");
    }

    #[test]
    fn preview_marks_media_messages() {
        let mut row = text_row("");
        row.body = None;
        row.image_base64 = Some("aGk=".to_string());
        assert_eq!(content_preview(&row).unwrap(), "Photo");

        row.image_base64 = None;
        row.audio_base64 = Some("aGk=".to_string());
        assert_eq!(content_preview(&row).unwrap(), "Voice note");
    }

    #[test]
    fn content_must_be_exactly_one_kind() {
        assert!(normalize_content(Some("hi".into()), None, None).is_ok());
        assert!(normalize_content(None, Some("aGk=".into()), None).is_ok());
        assert!(normalize_content(None, None, Some("aGk=".into())).is_ok());

        assert!(normalize_content(None, None, None).is_err());
        assert!(normalize_content(Some("   ".into()), None, None).is_err());
        assert!(normalize_content(Some("hi".into()), Some("aGk=".into()), None).is_err());
    }

    #[test]
    fn media_payloads_accept_bare_base64_and_data_urls() {
        assert!(media_payload_is_valid("aGVsbG8="));
        assert!(media_payload_is_valid("data:image/jpeg;base64,aGVsbG8="));
        assert!(!media_payload_is_valid("definitely not base64!!!"));
        assert!(normalize_content(None, Some("not base64!!!".into()), None).is_err());
    }
}
