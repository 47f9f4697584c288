use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use yappy_api::passcode::{self, AppState, AppStateInner};
use yappy_api::{messages, push, reactions, users};
use yappy_push::PushNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yappy=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("YAPPY_DB_PATH").unwrap_or_else(|_| "yappy.db".into());
    let host = std::env::var("YAPPY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("YAPPY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let default_passcode = std::env::var("CHAT_PASSCODE").ok();

    // Init database
    let db = Arc::new(yappy_db::Database::open(&PathBuf::from(&db_path))?);

    // Push notifier (disabled unless VAPID keys are configured)
    let push_notifier = Arc::new(PushNotifier::from_env(db.clone()));

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        push: push_notifier,
        default_passcode,
    });

    // Routes
    let app = Router::new()
        .route(
            "/api/passcode",
            get(passcode::get_passcode).put(passcode::update_passcode),
        )
        .route("/api/passcode/verify", post(passcode::verify_passcode))
        .route(
            "/api/users",
            get(users::list_users)
                .post(users::create_user)
                .delete(users::reset_users),
        )
        .route("/api/users/admin", put(users::set_admin))
        .route("/api/users/{id}", delete(users::delete_user))
        .route(
            "/api/messages",
            get(messages::list_messages)
                .post(messages::create_message)
                .delete(messages::clear_messages),
        )
        .route("/api/messages/seen", post(messages::mark_seen))
        .route("/api/messages/{id}", delete(messages::delete_message))
        .route(
            "/api/messages/{id}/reactions",
            post(reactions::toggle_reaction),
        )
        .route("/api/push/subscriptions", post(push::subscribe))
        .route("/api/push/vapid", get(push::vapid_key))
        .route("/api/push/opened", post(push::notify_opened))
        .with_state(state)
        // Inline base64 images ride inside JSON bodies.
        .layer(DefaultBodyLimit::max(16 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Yappy server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
