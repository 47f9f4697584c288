//! Web Push notifier.
//!
//! Notifications carry an aes128gcm-encrypted JSON payload with the sender's
//! name and a short content preview, so subscribers see a real preview
//! without waking the app first. The `web-push` crate handles payload
//! encryption and VAPID signing; delivery itself goes over the shared
//! reqwest client.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::future::join_all;
use reqwest::Client;
use tracing::{debug, warn};
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder,
    request_builder,
};

use yappy_db::Database;
use yappy_db::models::PushSubscriptionRow;

const TTL_SECONDS: u32 = 86_400;

pub struct PushNotifier {
    db: Arc<Database>,
    http: Client,
    vapid: Option<Vapid>,
}

struct Vapid {
    /// base64url-encoded uncompressed P-256 point, served to clients as-is.
    public_key: String,
    /// PEM-encoded EC private key; the signer re-reads it per delivery.
    private_key_pem: String,
    /// `mailto:` contact for the VAPID `sub` claim.
    contact: String,
}

impl PushNotifier {
    /// Build from `VAPID_PUBLIC_KEY`, `VAPID_PRIVATE_KEY_PEM` and
    /// `VAPID_CONTACT`. Missing or invalid keys disable push rather than
    /// failing startup.
    pub fn from_env(db: Arc<Database>) -> Self {
        let vapid = match (
            std::env::var("VAPID_PUBLIC_KEY"),
            std::env::var("VAPID_PRIVATE_KEY_PEM"),
        ) {
            (Ok(public_key), Ok(pem)) => {
                match VapidSignatureBuilder::from_pem_no_sub(pem.as_bytes()) {
                    Ok(_) => Some(Vapid {
                        public_key,
                        private_key_pem: pem,
                        contact: std::env::var("VAPID_CONTACT")
                            .unwrap_or_else(|_| "mailto:app@yappynotes.local".into()),
                    }),
                    Err(e) => {
                        warn!("Invalid VAPID private key, push disabled: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        if vapid.is_none() {
            debug!("VAPID keys not set, push notifications disabled");
        }

        Self {
            db,
            http: Client::new(),
            vapid,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.vapid.is_some()
    }

    pub fn public_key(&self) -> Option<&str> {
        self.vapid.as_ref().map(|v| v.public_key.as_str())
    }

    /// Notify everyone who asked to hear about `sender_id`'s messages, with
    /// the sender's name and a content preview in the notification body.
    /// Best-effort: failures are logged per endpoint and never bubble up.
    pub async fn notify_message_sent(&self, sender_id: &str, preview: &str) {
        let Some((name, subs)) = self.audience(sender_id).await else {
            return;
        };
        self.deliver(&subs, &format!("{}: {}", name, preview), "message")
            .await;
    }

    /// Same audience, different occasion: `user_id` just opened the app.
    pub async fn notify_app_opened(&self, user_id: &str) {
        let Some((name, subs)) = self.audience(user_id).await else {
            return;
        };
        self.deliver(&subs, &format!("{} opened the app", name), "app-opened")
            .await;
    }

    /// Display name of the user plus the subscriptions interested in them.
    /// None when push is disabled or nobody subscribed.
    async fn audience(&self, user_id: &str) -> Option<(String, Vec<PushSubscriptionRow>)> {
        self.vapid.as_ref()?;

        let db = self.db.clone();
        let uid = user_id.to_string();
        let fetched = tokio::task::spawn_blocking(
            move || -> Result<(Option<String>, Vec<PushSubscriptionRow>)> {
                let name = db.get_user(&uid)?.map(|u| u.name);
                let subs = db.subscriptions_notifying(&uid)?;
                Ok((name, subs))
            },
        )
        .await;

        match fetched {
            Ok(Ok((_, subs))) if subs.is_empty() => None,
            Ok(Ok((name, subs))) => Some((name.unwrap_or_else(|| "Someone".into()), subs)),
            Ok(Err(e)) => {
                warn!("Push subscriber lookup failed: {}", e);
                None
            }
            Err(e) => {
                warn!("spawn_blocking join error: {}", e);
                None
            }
        }
    }

    async fn deliver(&self, subs: &[PushSubscriptionRow], body: &str, kind: &str) {
        let Some(vapid) = &self.vapid else { return };
        let payload = notification_payload(body);

        let sends = subs
            .iter()
            .map(|sub| self.send_notification(vapid, sub, &payload));
        let results = join_all(sends).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(
            "Push {}: {} delivered, {} failed",
            kind,
            results.len() - failed,
            failed
        );
        // TODO: drop subscriptions once the push service answers 410 Gone.
        for err in results.into_iter().filter_map(Result::err) {
            warn!("Push delivery failed: {:#}", err);
        }
    }

    async fn send_notification(
        &self,
        vapid: &Vapid,
        sub: &PushSubscriptionRow,
        payload: &str,
    ) -> Result<()> {
        let sub_info = SubscriptionInfo::new(
            sub.endpoint.clone(),
            sub.p256dh.clone(),
            sub.auth.clone(),
        );

        let mut signer =
            VapidSignatureBuilder::from_pem(vapid.private_key_pem.as_bytes(), &sub_info)
                .context("VAPID key rejected")?;
        signer.add_claim("sub", vapid.contact.clone());
        let signature = signer.build().context("VAPID signing failed")?;

        let mut message = WebPushMessageBuilder::new(&sub_info);
        message.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());
        message.set_vapid_signature(signature);
        message.set_ttl(TTL_SECONDS);
        let message = message.build().context("push payload encryption failed")?;

        let built = request_builder::build_request::<Vec<u8>>(message);
        let (parts, body) = built.into_parts();
        let url = parts
            .uri
            .to_string()
            .parse::<reqwest::Url>()
            .context("push endpoint URL rejected")?;
        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
            .context("push request conversion failed")?;
        let mut req_builder = self.http.request(method, url).body(body);
        for (name, value) in parts.headers.iter() {
            req_builder = req_builder.header(name.as_str(), value.as_bytes());
        }
        let request = req_builder.build().context("push request conversion failed")?;
        let resp = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("push request to {} failed", sub.endpoint))?;

        let status = http02::StatusCode::from_u16(resp.status().as_u16())
            .context("push response status conversion failed")?;
        let body = resp.bytes().await.unwrap_or_default().to_vec();
        request_builder::parse_response(status, body)
            .with_context(|| format!("push endpoint {} rejected the notification", sub.endpoint))?;
        Ok(())
    }
}

/// Notification payload the service worker renders verbatim.
fn notification_payload(body: &str) -> String {
    serde_json::json!({
        "title": "Yappy Notes",
        "body": body,
        "icon": "/icon-192.png",
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_title_body_and_icon() {
        let payload = notification_payload("Bubu: hi there");
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value["title"], "Yappy Notes");
        assert_eq!(value["body"], "Bubu: hi there");
        assert_eq!(value["icon"], "/icon-192.png");
    }

    #[test]
    fn garbage_vapid_key_is_rejected() {
        assert!(VapidSignatureBuilder::from_pem_no_sub(&b"not a pem"[..]).is_err());
    }
}
