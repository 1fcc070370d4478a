use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use blinko_client::BlinkoClient;
use bot_core::{
    load_settings, BotEvent, HtmlFileRenderer, HtmlRenderer, IncomingMessage, NoteBot, Reply,
    Settings,
};
use serde::{Deserialize, Serialize};
use shared::error::{ApiError, ErrorCode};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    bot: Arc<NoteBot>,
    webhook_token: Option<String>,
}

impl AppState {
    fn new(bot: Arc<NoteBot>, settings: &Settings) -> Self {
        let token = settings.webhook_token.trim();
        Self {
            bot,
            webhook_token: (!token.is_empty()).then(|| token.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EventResponse {
    reply: Option<Reply>,
}

type ApiFailure = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Arc::new(load_settings(None)?);
    let repository = BlinkoClient::new(&settings.blinko_base_url, settings.blinko_token.clone())
        .context("invalid Blinko settings")?;
    let html = settings.enable_rich_display.then(|| {
        Arc::new(HtmlFileRenderer::from_settings(&settings)) as Arc<dyn HtmlRenderer>
    });

    let bot = Arc::new(NoteBot::new(Arc::clone(&settings), Arc::new(repository), html));
    tokio::spawn(log_events(bot.subscribe_events()));

    let app = build_router(AppState::new(Arc::clone(&bot), &settings));
    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid server_bind '{}'", settings.server_bind))?;
    info!(%addr, blinko = %settings.blinko_base_url, "fjnote webhook listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bot.shutdown().await;
    info!("fjnote webhook stopped");
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/events", post(post_event))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn post_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<IncomingMessage>,
) -> Result<Json<EventResponse>, ApiFailure> {
    authorize(&state, &headers)?;
    if message.user_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(ErrorCode::Validation, "user_id must not be empty")),
        ));
    }

    let reply = state.bot.handle_message(message).await;
    Ok(Json(EventResponse { reply }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiFailure> {
    let Some(expected) = state.webhook_token.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if provided == Some(expected) {
        return Ok(());
    }
    Err((
        StatusCode::UNAUTHORIZED,
        Json(ApiError::new(ErrorCode::Unauthorized, "missing or invalid bearer token")),
    ))
}

/// Flash notes are saved after the request that started them has been
/// answered, so their outcome can only be logged here.
async fn log_events(mut events: broadcast::Receiver<BotEvent>) {
    loop {
        match events.recv().await {
            Ok(BotEvent::FlashSaved { user_id, note, reply }) => {
                info!(
                    %user_id,
                    note_id = %note.id,
                    reply = reply.as_deref().unwrap_or_default(),
                    "flash note saved"
                );
            }
            Ok(BotEvent::FlashFailed { user_id, error, .. }) => {
                warn!(%user_id, %error, "flash note failed");
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
