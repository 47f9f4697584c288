use std::collections::HashMap;

use crate::models::{
    ConfigRow, MessageRow, NewMessage, PushSubscriptionRow, ReactionRow, UserRow,
};
use crate::{Database, now_rfc3339};
use anyhow::Result;
use rusqlite::{Connection, types::ToSql};

/// Result of a user deletion attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteUserOutcome {
    Deleted,
    NotFound,
    /// The target is the admin and the only remaining user.
    SoleUser,
}

impl Database {
    // -- Users --

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, is_admin, created_at FROM users ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_name(&self, name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_name(conn, name))
    }

    /// Idempotent create: an existing user with the same name (compared
    /// case-insensitively) is returned unchanged. The first user ever
    /// created becomes admin; the count check and the insert share one
    /// transaction so two racing first-creates cannot both win the flag.
    /// Returns (user, created).
    pub fn create_or_get_user(&self, id: &str, name: &str) -> Result<(UserRow, bool)> {
        let now = now_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = query_user_by_name(&tx, name)? {
                return Ok((existing, false));
            }

            let user_count: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            let is_admin = user_count == 0;

            tx.execute(
                "INSERT INTO users (id, name, is_admin, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, name, is_admin, now],
            )?;
            tx.commit()?;

            Ok((
                UserRow {
                    id: id.to_string(),
                    name: name.to_string(),
                    is_admin,
                    created_at: now.clone(),
                },
                true,
            ))
        })
    }

    /// Make `target_id` the sole admin. One UPDATE flips every row, so there
    /// is no moment with zero or two admins. Returns false if the target
    /// does not exist.
    pub fn set_admin(&self, target_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if query_user_by_id(&tx, target_id)?.is_none() {
                return Ok(false);
            }
            tx.execute("UPDATE users SET is_admin = (id = ?1)", [target_id])?;
            tx.commit()?;

            Ok(true)
        })
    }

    /// Delete a user. When the target is the admin, another user is promoted
    /// in the same transaction before the row goes away, so the directory is
    /// never observed without an admin. The last remaining user cannot be
    /// deleted.
    pub fn delete_user(&self, target_id: &str) -> Result<DeleteUserOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(target) = query_user_by_id(&tx, target_id)? else {
                return Ok(DeleteUserOutcome::NotFound);
            };

            if target.is_admin {
                let heir: Option<String> = tx
                    .query_row(
                        "SELECT id FROM users WHERE id != ?1 LIMIT 1",
                        [target_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                match heir {
                    None => return Ok(DeleteUserOutcome::SoleUser),
                    Some(heir) => {
                        tx.execute("UPDATE users SET is_admin = (id = ?1)", [&heir])?;
                    }
                }
            }

            tx.execute("DELETE FROM users WHERE id = ?1", [target_id])?;
            tx.commit()?;

            Ok(DeleteUserOutcome::Deleted)
        })
    }

    pub fn delete_all_users(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM users", [])?;
            Ok(n)
        })
    }

    pub fn has_admin(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE is_admin = 1)",
                [],
                |r| r.get(0),
            )?;
            Ok(n != 0)
        })
    }

    // -- Config --

    pub fn get_config(&self, key: &str) -> Result<Option<ConfigRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, value, updated_at FROM config WHERE key = ?1")?;
            let row = stmt
                .query_row([key], |row| {
                    Ok(ConfigRow {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let now = now_rfc3339();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, now],
            )?;
            Ok(())
        })
    }

    // -- Messages --

    pub fn insert_message(&self, new: &NewMessage) -> Result<MessageRow> {
        let created_at = now_rfc3339();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, sender_id, body, image_base64, audio_base64,
                     reply_to_id, reply_to_sender_id, reply_to_snippet, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    new.id,
                    new.sender_id,
                    new.body,
                    new.image_base64,
                    new.audio_base64,
                    new.reply_to_id,
                    new.reply_to_sender_id,
                    new.reply_to_snippet,
                    created_at,
                ],
            )?;
            Ok(())
        })?;

        Ok(MessageRow {
            id: new.id.clone(),
            sender_id: new.sender_id.clone(),
            body: new.body.clone(),
            image_base64: new.image_base64.clone(),
            audio_base64: new.audio_base64.clone(),
            reply_to_id: new.reply_to_id.clone(),
            reply_to_sender_id: new.reply_to_sender_id.clone(),
            reply_to_snippet: new.reply_to_snippet.clone(),
            seen_at: None,
            created_at,
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{MESSAGE_COLUMNS} WHERE id = ?1"))?;
            let row = stmt.query_row([id], map_message).optional()?;
            Ok(row)
        })
    }

    /// Page of messages, newest first, fetching `limit + 1` rows so the
    /// caller learns whether older ones remain. `hidden_for` excludes
    /// messages hidden for that user; `before` is an exclusive cursor of
    /// (created_at, id). The comparison runs over the same total order the
    /// listing sorts by, so same-timestamp messages are neither skipped nor
    /// repeated across pages.
    pub fn list_messages(
        &self,
        hidden_for: Option<&str>,
        before: Option<(&str, &str)>,
        limit: u32,
    ) -> Result<(Vec<MessageRow>, bool)> {
        self.with_conn(|conn| {
            let fetch = i64::from(limit) + 1;
            let mut sql = String::from(MESSAGE_COLUMNS);
            let mut clauses: Vec<&str> = Vec::new();
            let mut params: Vec<&dyn ToSql> = Vec::new();

            if let Some(uid) = &hidden_for {
                clauses.push(
                    "NOT EXISTS (SELECT 1 FROM message_hidden h
                      WHERE h.message_id = messages.id AND h.user_id = ?)",
                );
                params.push(uid);
            }
            if let Some((ts, id)) = &before {
                clauses.push("(created_at < ? OR (created_at = ? AND id < ?))");
                params.push(ts);
                params.push(ts);
                params.push(id);
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
            params.push(&fetch);

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(params.as_slice(), map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let has_more = rows.len() > limit as usize;
            if has_more {
                rows.truncate(limit as usize);
            }
            Ok((rows, has_more))
        })
    }

    /// How many users have hidden each of the given messages. Messages with
    /// no hide rows are absent from the map.
    pub fn get_hidden_counts(&self, message_ids: &[String]) -> Result<HashMap<String, i64>> {
        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, COUNT(*) FROM message_hidden
                 WHERE message_id IN ({}) GROUP BY message_id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            Ok(rows)
        })
    }

    /// Hide one message for one user. Idempotent.
    pub fn hide_message_for(&self, message_id: &str, user_id: &str) -> Result<()> {
        let now = now_rfc3339();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO message_hidden (message_id, user_id, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![message_id, user_id, now],
            )?;
            Ok(())
        })
    }

    /// Hide one message for every current user (the admin's outright delete).
    pub fn hide_message_for_all(&self, message_id: &str) -> Result<()> {
        let now = now_rfc3339();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO message_hidden (message_id, user_id, created_at)
                 SELECT ?1, id, ?2 FROM users",
                rusqlite::params![message_id, now],
            )?;
            Ok(())
        })
    }

    /// Hide every message for one user ("clear my view"). Messages already
    /// hidden for them are untouched.
    pub fn hide_all_messages_for(&self, user_id: &str) -> Result<usize> {
        let now = now_rfc3339();
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO message_hidden (message_id, user_id, created_at)
                 SELECT id, ?1, ?2 FROM messages",
                rusqlite::params![user_id, now],
            )?;
            Ok(n)
        })
    }

    /// Hard delete of the whole history. Hidden-set and reaction rows go
    /// with their messages via ON DELETE CASCADE.
    pub fn delete_all_messages(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM messages", [])?;
            Ok(n)
        })
    }

    /// Stamp `seen_at` on every unseen message from other senders. Returns
    /// how many rows were stamped; already-seen messages keep their original
    /// timestamp.
    pub fn mark_seen(&self, user_id: &str) -> Result<usize> {
        let now = now_rfc3339();
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE messages SET seen_at = ?1
                 WHERE sender_id != ?2 AND seen_at IS NULL",
                rusqlite::params![now, user_id],
            )?;
            Ok(n)
        })
    }

    // -- Reactions --

    /// Toggle the (user, emoji) pair on a message: the delete-then-insert
    /// runs in one transaction, so concurrent toggles from different users
    /// commute instead of overwriting each other. Returns None when the
    /// message does not exist, otherwise (added, updated reaction list).
    pub fn toggle_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<Option<(bool, Vec<ReactionRow>)>> {
        let now = now_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let exists: Option<String> = tx
                .query_row("SELECT id FROM messages WHERE id = ?1", [message_id], |r| {
                    r.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Ok(None);
            }

            let removed = tx.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                rusqlite::params![message_id, user_id, emoji],
            )?;
            let added = removed == 0;
            if added {
                tx.execute(
                    "INSERT INTO reactions (message_id, user_id, emoji, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![message_id, user_id, emoji, now],
                )?;
            }

            let reactions = query_reactions(&tx, message_id)?;
            tx.commit()?;

            Ok(Some((added, reactions)))
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id, emoji, created_at FROM reactions
                 WHERE message_id IN ({}) ORDER BY created_at",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), map_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Push subscriptions --

    /// Upsert keyed by endpoint; the interest set is replaced wholesale in
    /// the same transaction.
    pub fn upsert_push_subscription(
        &self,
        endpoint: &str,
        user_id: &str,
        p256dh: &str,
        auth: &str,
        expiration_time: Option<i64>,
        notify_sender_ids: &[String],
    ) -> Result<()> {
        let now = now_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO push_subscriptions
                    (endpoint, user_id, p256dh, auth, expiration_time, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(endpoint) DO UPDATE SET
                    user_id = excluded.user_id,
                    p256dh = excluded.p256dh,
                    auth = excluded.auth,
                    expiration_time = excluded.expiration_time,
                    updated_at = excluded.updated_at",
                rusqlite::params![endpoint, user_id, p256dh, auth, expiration_time, now],
            )?;

            tx.execute("DELETE FROM push_interests WHERE endpoint = ?1", [endpoint])?;
            for sender_id in notify_sender_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO push_interests (endpoint, sender_id) VALUES (?1, ?2)",
                    rusqlite::params![endpoint, sender_id],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Subscriptions whose interest set contains `sender_id`.
    pub fn subscriptions_notifying(&self, sender_id: &str) -> Result<Vec<PushSubscriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.endpoint, s.user_id, s.p256dh, s.auth, s.expiration_time, s.updated_at
                 FROM push_subscriptions s
                 JOIN push_interests i ON i.endpoint = s.endpoint
                 WHERE i.sender_id = ?1",
            )?;
            let rows = stmt
                .query_map([sender_id], |row| {
                    Ok(PushSubscriptionRow {
                        endpoint: row.get(0)?,
                        user_id: row.get(1)?,
                        p256dh: row.get(2)?,
                        auth: row.get(3)?,
                        expiration_time: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const MESSAGE_COLUMNS: &str = "SELECT id, sender_id, body, image_base64, audio_base64,
    reply_to_id, reply_to_sender_id, reply_to_snippet, seen_at, created_at
 FROM messages";

fn map_user(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        is_admin: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn map_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        body: row.get(2)?,
        image_base64: row.get(3)?,
        audio_base64: row.get(4)?,
        reply_to_id: row.get(5)?,
        reply_to_sender_id: row.get(6)?,
        reply_to_snippet: row.get(7)?,
        seen_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn map_reaction(row: &rusqlite::Row) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        message_id: row.get(0)?,
        user_id: row.get(1)?,
        emoji: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, name, is_admin, created_at FROM users WHERE id = ?1")?;
    let row = stmt.query_row([id], map_user).optional()?;
    Ok(row)
}

fn query_user_by_name(conn: &Connection, name: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, name, is_admin, created_at FROM users WHERE name = ?1")?;
    let row = stmt.query_row([name], map_user).optional()?;
    Ok(row)
}

fn query_reactions(conn: &Connection, message_id: &str) -> Result<Vec<ReactionRow>> {
    let mut stmt = conn.prepare(
        "SELECT message_id, user_id, emoji, created_at FROM reactions
         WHERE message_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt
        .query_map([message_id], map_reaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, name: &str) -> UserRow {
        let id = Uuid::new_v4().to_string();
        db.create_or_get_user(&id, name).unwrap().0
    }

    fn post(db: &Database, sender: &UserRow, text: &str) -> MessageRow {
        db.insert_message(&NewMessage {
            id: Uuid::new_v4().to_string(),
            sender_id: sender.id.clone(),
            body: Some(text.to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn assert_single_admin(db: &Database) {
        let users = db.list_users().unwrap();
        if !users.is_empty() {
            assert_eq!(users.iter().filter(|u| u.is_admin).count(), 1);
        }
    }

    #[test]
    fn create_or_get_is_idempotent() {
        let db = db();
        let first = add_user(&db, "Bubu");
        let (again, created) = db
            .create_or_get_user(&Uuid::new_v4().to_string(), "Bubu")
            .unwrap();

        assert!(!created);
        assert_eq!(again.id, first.id);
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn create_or_get_matches_names_case_insensitively() {
        let db = db();
        let first = add_user(&db, "Bubu");
        let (again, created) = db
            .create_or_get_user(&Uuid::new_v4().to_string(), "bubu")
            .unwrap();

        assert!(!created);
        assert_eq!(again.id, first.id);
    }

    #[test]
    fn first_user_becomes_admin() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");

        assert!(a.is_admin);
        assert!(!b.is_admin);
        assert_single_admin(&db);
    }

    #[test]
    fn set_admin_reassigns_without_transient_states() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");

        assert!(db.set_admin(&b.id).unwrap());
        assert_single_admin(&db);
        assert!(db.get_user(&b.id).unwrap().unwrap().is_admin);
        assert!(!db.get_user(&a.id).unwrap().unwrap().is_admin);
    }

    #[test]
    fn set_admin_unknown_target() {
        let db = db();
        add_user(&db, "A");
        assert!(!db.set_admin("no-such-user").unwrap());
        assert_single_admin(&db);
    }

    #[test]
    fn deleting_admin_promotes_a_survivor() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");

        assert_eq!(db.delete_user(&a.id).unwrap(), DeleteUserOutcome::Deleted);
        assert_single_admin(&db);
        assert!(db.get_user(&b.id).unwrap().unwrap().is_admin);
    }

    #[test]
    fn sole_user_cannot_be_deleted() {
        let db = db();
        let a = add_user(&db, "A");

        assert_eq!(db.delete_user(&a.id).unwrap(), DeleteUserOutcome::SoleUser);
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn delete_unknown_user() {
        let db = db();
        add_user(&db, "A");
        assert_eq!(
            db.delete_user("no-such-user").unwrap(),
            DeleteUserOutcome::NotFound
        );
    }

    #[test]
    fn admin_invariant_holds_through_lifecycle() {
        let db = db();
        let a = add_user(&db, "A");
        assert_single_admin(&db);
        let b = add_user(&db, "B");
        assert_single_admin(&db);
        let c = add_user(&db, "C");
        assert_single_admin(&db);
        db.set_admin(&c.id).unwrap();
        assert_single_admin(&db);
        db.delete_user(&c.id).unwrap();
        assert_single_admin(&db);
        db.delete_user(&b.id).unwrap();
        assert_single_admin(&db);
        assert_eq!(db.delete_user(&a.id).unwrap(), DeleteUserOutcome::SoleUser);
        assert_single_admin(&db);
    }

    #[test]
    fn pagination_walks_the_full_history() {
        let db = db();
        let a = add_user(&db, "A");
        let mut all_ids = Vec::new();
        for i in 0..120 {
            all_ids.push(post(&db, &a, &format!("msg {}", i)).id);
        }

        let (page1, more1) = db.list_messages(None, None, 50).unwrap();
        assert_eq!(page1.len(), 50);
        assert!(more1);
        // Newest first within a page.
        for pair in page1.windows(2) {
            assert!(
                (pair[0].created_at.as_str(), pair[0].id.as_str())
                    > (pair[1].created_at.as_str(), pair[1].id.as_str())
            );
        }

        let cursor = page1.last().unwrap();
        let (page2, more2) = db
            .list_messages(None, Some((&cursor.created_at, &cursor.id)), 50)
            .unwrap();
        assert_eq!(page2.len(), 50);
        assert!(more2);

        let cursor = page2.last().unwrap();
        let (page3, more3) = db
            .list_messages(None, Some((&cursor.created_at, &cursor.id)), 50)
            .unwrap();
        assert_eq!(page3.len(), 20);
        assert!(!more3);

        // Pages are disjoint and jointly cover everything.
        let mut seen: Vec<&str> = page1
            .iter()
            .chain(&page2)
            .chain(&page3)
            .map(|m| m.id.as_str())
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 120);
    }

    #[test]
    fn hidden_messages_are_filtered_per_user() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");
        let msg = post(&db, &a, "hello");

        db.hide_message_for(&msg.id, &b.id).unwrap();
        // Idempotent.
        db.hide_message_for(&msg.id, &b.id).unwrap();

        let (for_a, _) = db.list_messages(Some(&a.id), None, 50).unwrap();
        let (for_b, _) = db.list_messages(Some(&b.id), None, 50).unwrap();
        let (unfiltered, _) = db.list_messages(None, None, 50).unwrap();

        assert_eq!(for_a.len(), 1);
        assert!(for_b.is_empty());
        assert_eq!(unfiltered.len(), 1);

        let counts = db.get_hidden_counts(&[msg.id.clone()]).unwrap();
        assert_eq!(counts.get(&msg.id), Some(&1));
    }

    #[test]
    fn hide_for_all_reaches_every_user() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");
        let msg = post(&db, &a, "gone");

        db.hide_message_for_all(&msg.id).unwrap();

        assert!(db.list_messages(Some(&a.id), None, 50).unwrap().0.is_empty());
        assert!(db.list_messages(Some(&b.id), None, 50).unwrap().0.is_empty());
        let counts = db.get_hidden_counts(&[msg.id.clone()]).unwrap();
        assert_eq!(counts.get(&msg.id), Some(&2));
    }

    #[test]
    fn personal_clear_then_hard_clear() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");
        post(&db, &a, "one");
        post(&db, &a, "two");

        // B clears their own view; A is unaffected.
        assert_eq!(db.hide_all_messages_for(&b.id).unwrap(), 2);
        assert!(db.list_messages(Some(&b.id), None, 50).unwrap().0.is_empty());
        assert_eq!(db.list_messages(Some(&a.id), None, 50).unwrap().0.len(), 2);
        // Re-clearing touches nothing new.
        assert_eq!(db.hide_all_messages_for(&b.id).unwrap(), 0);

        // Hard clear removes everything for everyone.
        assert_eq!(db.delete_all_messages().unwrap(), 2);
        assert!(db.list_messages(Some(&a.id), None, 50).unwrap().0.is_empty());
        assert!(db.list_messages(None, None, 50).unwrap().0.is_empty());
    }

    #[test]
    fn reaction_toggle_is_an_involution() {
        let db = db();
        let a = add_user(&db, "A");
        let msg = post(&db, &a, "react to me");

        let (added, reactions) = db
            .toggle_reaction(&msg.id, &a.id, "❤️")
            .unwrap()
            .unwrap();
        assert!(added);
        assert_eq!(reactions.len(), 1);

        let (added, reactions) = db
            .toggle_reaction(&msg.id, &a.id, "❤️")
            .unwrap()
            .unwrap();
        assert!(!added);
        assert!(reactions.is_empty());
    }

    #[test]
    fn reactions_are_per_user_per_emoji() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");
        let msg = post(&db, &a, "popular");

        db.toggle_reaction(&msg.id, &a.id, "❤️").unwrap();
        db.toggle_reaction(&msg.id, &b.id, "❤️").unwrap();
        let (_, reactions) = db.toggle_reaction(&msg.id, &a.id, "😂").unwrap().unwrap();

        assert_eq!(reactions.len(), 3);
        // Removing one user's pair leaves the other's in place.
        let (_, reactions) = db.toggle_reaction(&msg.id, &a.id, "❤️").unwrap().unwrap();
        assert_eq!(reactions.len(), 2);
        assert!(reactions.iter().any(|r| r.user_id == b.id));
    }

    #[test]
    fn toggle_on_missing_message() {
        let db = db();
        let a = add_user(&db, "A");
        assert!(db.toggle_reaction("gone", &a.id, "❤️").unwrap().is_none());
    }

    #[test]
    fn mark_seen_stamps_only_others_unseen_messages() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");
        post(&db, &a, "from a 1");
        post(&db, &a, "from a 2");
        let own = post(&db, &b, "from b");

        assert_eq!(db.mark_seen(&b.id).unwrap(), 2);
        // Idempotent: nothing left to stamp.
        assert_eq!(db.mark_seen(&b.id).unwrap(), 0);
        // B's own message is still unseen until A sweeps.
        assert!(db.get_message(&own.id).unwrap().unwrap().seen_at.is_none());
        assert_eq!(db.mark_seen(&a.id).unwrap(), 1);
    }

    #[test]
    fn reply_snapshot_is_stored_verbatim() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");
        let target = post(&db, &a, "hi there");

        let reply = db
            .insert_message(&NewMessage {
                id: Uuid::new_v4().to_string(),
                sender_id: b.id.clone(),
                body: Some("hello back".to_string()),
                reply_to_id: Some(target.id.clone()),
                reply_to_sender_id: Some(a.id.clone()),
                reply_to_snippet: Some("hi there".to_string()),
                ..Default::default()
            })
            .unwrap();

        // Hiding the target for someone does not touch the snapshot.
        db.hide_message_for(&target.id, &b.id).unwrap();
        let stored = db.get_message(&reply.id).unwrap().unwrap();
        assert_eq!(stored.reply_to_snippet.as_deref(), Some("hi there"));
        assert_eq!(stored.reply_to_id.as_deref(), Some(target.id.as_str()));
    }

    #[test]
    fn config_is_lazily_created_and_overwritten() {
        let db = db();
        assert!(db.get_config("passcode").unwrap().is_none());

        db.set_config("passcode", "1234").unwrap();
        assert_eq!(db.get_config("passcode").unwrap().unwrap().value, "1234");

        db.set_config("passcode", "5678").unwrap();
        assert_eq!(db.get_config("passcode").unwrap().unwrap().value, "5678");
    }

    #[test]
    fn subscription_upsert_replaces_interests() {
        let db = db();
        let a = add_user(&db, "A");
        let b = add_user(&db, "B");
        let endpoint = "https://push.example/sub-1";

        db.upsert_push_subscription(endpoint, &b.id, "p256dh", "auth", None, &[a.id.clone()])
            .unwrap();
        assert_eq!(db.subscriptions_notifying(&a.id).unwrap().len(), 1);

        // Re-registration with a different interest set replaces the old one.
        db.upsert_push_subscription(endpoint, &b.id, "p256dh", "auth", None, &[b.id.clone()])
            .unwrap();
        assert!(db.subscriptions_notifying(&a.id).unwrap().is_empty());
        assert_eq!(db.subscriptions_notifying(&b.id).unwrap().len(), 1);
    }
}
