use std::sync::Arc;

use blinko_client::BlinkoRepository;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Attachment, AttachmentKind, Note},
    tags::separate_trailing_tags,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    commands::{parse_command, CommandContext, CommandRegistry},
    config::Settings,
    error::{BotError, BotResult},
    render::HtmlRenderer,
    session::{
        attachment_placeholder, FlashSession, FlashSessionManager, Fragment, SessionUpdate,
    },
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub user_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl IncomingMessage {
    pub fn text(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Reply {
    Text(String),
    /// URL or path of a rendered card.
    Image(String),
}

/// Outcome of a flash session saved in the background.
#[derive(Debug, Clone)]
pub enum BotEvent {
    FlashSaved {
        user_id: String,
        note: Note,
        reply: Option<String>,
    },
    FlashFailed {
        user_id: String,
        error: String,
        reply: Option<String>,
    },
}

impl BotEvent {
    pub fn user_id(&self) -> &str {
        match self {
            BotEvent::FlashSaved { user_id, .. } | BotEvent::FlashFailed { user_id, .. } => user_id,
        }
    }

    pub fn reply(&self) -> Option<&str> {
        match self {
            BotEvent::FlashSaved { reply, .. } | BotEvent::FlashFailed { reply, .. } => {
                reply.as_deref()
            }
        }
    }
}

/// Persists finished flash sessions and reports the result.
struct FlashSaver {
    context: Arc<CommandContext>,
    events: broadcast::Sender<BotEvent>,
}

impl FlashSaver {
    async fn save(&self, session: FlashSession) -> BotEvent {
        let user_id = session.user_id.clone();
        let tags = session.tags();
        let age_secs = (Utc::now() - session.started_at).num_seconds();

        match self.persist(&session).await {
            Ok(note) => {
                info!(
                    %user_id,
                    note_id = %note.id,
                    fragments = session.fragments.len(),
                    age_secs,
                    "flash note saved"
                );
                BotEvent::FlashSaved {
                    reply: self.context.responses.flash_saved(&tags),
                    user_id,
                    note,
                }
            }
            Err(err) => {
                error!(%user_id, error = %err, age_secs, "failed to save flash note");
                BotEvent::FlashFailed {
                    reply: self.context.responses.error_general(&err.to_string()),
                    error: err.to_string(),
                    user_id,
                }
            }
        }
    }

    fn publish(&self, event: BotEvent) {
        if self.events.send(event).is_err() {
            debug!("no event subscribers");
        }
    }

    async fn persist(&self, session: &FlashSession) -> BotResult<Note> {
        let mut links = Vec::new();
        for attachment in session.attachments() {
            links.push(self.upload(attachment).await);
        }
        let mut links = links.into_iter();
        let merged = session.merge_with(|attachment| {
            links
                .next()
                .unwrap_or_else(|| attachment_placeholder(attachment))
        });
        if merged.trim().is_empty() {
            return Err(BotError::EmptySession(session.user_id.clone()));
        }

        self.context
            .flash
            .create(&separate_trailing_tags(&merged), &[])
            .await
    }

    /// Markdown link to the uploaded copy, or the placeholder when the
    /// transfer fails.
    async fn upload(&self, attachment: &Attachment) -> String {
        let repository = &self.context.repository;
        let uploaded = match repository.fetch_attachment(&attachment.url).await {
            Ok(bytes) => repository.upload_file(bytes, &attachment.filename).await,
            Err(err) => Err(err),
        };

        match uploaded {
            Ok(url) => match attachment.kind {
                AttachmentKind::Image => format!("![{}]({url})", attachment.filename),
                AttachmentKind::File => format!("[{}]({url})", attachment.filename),
            },
            Err(err) => {
                warn!(filename = %attachment.filename, error = %err, "attachment upload failed");
                attachment_placeholder(attachment)
            }
        }
    }
}

pub struct NoteBot {
    context: Arc<CommandContext>,
    commands: CommandRegistry,
    sessions: FlashSessionManager,
    saver: Arc<FlashSaver>,
    ignore_prefixes: Vec<String>,
}

impl NoteBot {
    /// Must be called inside a tokio runtime: the flash saver runs as a
    /// spawned task.
    pub fn new(
        settings: Arc<Settings>,
        repository: Arc<dyn BlinkoRepository>,
        html: Option<Arc<dyn HtmlRenderer>>,
    ) -> Self {
        let context = Arc::new(CommandContext::new(Arc::clone(&settings), repository, html));
        let (sessions, expired) = FlashSessionManager::new(settings.flash_timeout());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let saver = Arc::new(FlashSaver {
            context: Arc::clone(&context),
            events,
        });
        tokio::spawn(run_saver(Arc::clone(&saver), expired));

        Self {
            ignore_prefixes: settings.flash_filters.prefixes(),
            commands: CommandRegistry::with_defaults(),
            context,
            sessions,
            saver,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BotEvent> {
        self.saver.events.subscribe()
    }

    pub async fn handle_message(&self, message: IncomingMessage) -> Option<Reply> {
        let user_id = message.user_id.as_str();
        let text = message.text.trim();

        if let Some(parsed) = parse_command(text) {
            if let Some(handler) = self.commands.get(&parsed.name) {
                let flushed = self.flush(user_id).await;
                info!(%user_id, command = %parsed.name, "running command");
                let reply = match handler.handle(&self.context, &parsed.args).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        warn!(%user_id, command = %parsed.name, error = %err, "command failed");
                        self.context
                            .responses
                            .error_general(&err.to_string())
                            .map(Reply::Text)
                    }
                };
                return self.with_flush_outcome(flushed, reply);
            }
            debug!(%user_id, word = %parsed.name, "not a command, treating as flash");
        }

        let has_attachments = !message.attachments.is_empty();
        if !self.accepts_flash(text, has_attachments) {
            debug!(%user_id, "message filtered");
            return None;
        }

        let mut fragments = Vec::with_capacity(message.attachments.len() + 1);
        if !text.is_empty() {
            fragments.push(Fragment::Text(text.to_string()));
        }
        fragments.extend(message.attachments.into_iter().map(Fragment::Attachment));

        let responses = &self.context.responses;
        let reply = match self.sessions.push(user_id, fragments).await {
            SessionUpdate::Started => responses.flash_start(self.sessions.timeout().as_secs()),
            SessionUpdate::Appended { .. } => responses.flash_add(),
        };
        reply.map(Reply::Text)
    }

    /// Saves the user's pending flash session now, if there is one, and
    /// returns the outcome without publishing it.
    pub async fn flush(&self, user_id: &str) -> Option<BotEvent> {
        let session = self.sessions.take(user_id).await?;
        Some(self.saver.save(session).await)
    }

    /// A failed flush is reported ahead of a text reply (or in place of no
    /// reply). Anything else goes out as a normal event.
    fn with_flush_outcome(
        &self,
        flushed: Option<BotEvent>,
        reply: Option<Reply>,
    ) -> Option<Reply> {
        let Some(event) = flushed else {
            return reply;
        };
        let notice = match &event {
            BotEvent::FlashFailed {
                reply: Some(notice),
                ..
            } => Some(notice.clone()),
            _ => None,
        };
        match (notice, reply) {
            (Some(notice), Some(Reply::Text(text))) => {
                Some(Reply::Text(format!("{notice}\n{text}")))
            }
            (Some(notice), None) => Some(Reply::Text(notice)),
            (_, reply) => {
                self.saver.publish(event);
                reply
            }
        }
    }

    /// Saves every pending session. Call before the process exits.
    pub async fn shutdown(&self) {
        let pending = self.sessions.drain().await;
        if !pending.is_empty() {
            info!(count = pending.len(), "flushing pending flash sessions");
        }
        for session in pending {
            self.saver.publish(self.saver.save(session).await);
        }
    }

    fn accepts_flash(&self, text: &str, has_attachments: bool) -> bool {
        let lowered = text.to_lowercase();
        let ignored = self.ignore_prefixes.iter().any(|prefix| {
            lowered
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        });
        if ignored {
            return false;
        }
        if has_attachments {
            return true;
        }
        let min = self.settings().flash_filters.min_content_length.max(1);
        text.chars().count() >= min
    }
}

async fn run_saver(saver: Arc<FlashSaver>, mut expired: mpsc::UnboundedReceiver<FlashSession>) {
    while let Some(session) = expired.recv().await {
        saver.publish(saver.save(session).await);
    }
    debug!("flash saver stopped");
}

#[cfg(test)]
#[path = "tests/bot_tests.rs"]
mod tests;
