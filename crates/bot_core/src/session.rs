//! Per-user flash sessions.
//!
//! Each active session owns one timer task. Every push restarts the timer;
//! when it fires the session leaves the table and is sent on the expiry
//! channel. `take` and `drain` flush explicitly. A session is handed out
//! exactly once: a timer only emits if its generation still matches the
//! table entry, and all of this happens under the table lock.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Attachment, AttachmentKind},
    tags::extract_tags,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Attachment(Attachment),
}

#[derive(Debug, Clone)]
pub struct FlashSession {
    pub user_id: String,
    pub fragments: Vec<Fragment>,
    pub started_at: DateTime<Utc>,
}

impl FlashSession {
    /// Tags across all text fragments, first appearance first.
    pub fn tags(&self) -> Vec<String> {
        extract_tags(&self.texts().collect::<Vec<_>>().join("\n"))
    }

    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.fragments.iter().filter_map(|fragment| match fragment {
            Fragment::Attachment(attachment) => Some(attachment),
            Fragment::Text(_) => None,
        })
    }

    pub fn merge(&self) -> String {
        self.merge_with(attachment_placeholder)
    }

    /// Joins fragments with newlines; `render` supplies the line used for
    /// each attachment, in order.
    pub fn merge_with(&self, mut render: impl FnMut(&Attachment) -> String) -> String {
        self.fragments
            .iter()
            .map(|fragment| match fragment {
                Fragment::Text(text) => text.trim().to_string(),
                Fragment::Attachment(attachment) => render(attachment),
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn texts(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().filter_map(|fragment| match fragment {
            Fragment::Text(text) => Some(text.as_str()),
            Fragment::Attachment(_) => None,
        })
    }
}

pub fn attachment_placeholder(attachment: &Attachment) -> String {
    match attachment.kind {
        AttachmentKind::Image => format!("[image: {}]", attachment.filename),
        AttachmentKind::File => format!("[file: {}]", attachment.filename),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    Started,
    Appended { fragments: usize },
}

struct PendingSession {
    session: FlashSession,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<String, PendingSession>,
    next_generation: u64,
}

pub struct FlashSessionManager {
    table: Arc<Mutex<SessionTable>>,
    timeout: Duration,
    expired: mpsc::UnboundedSender<FlashSession>,
}

impl FlashSessionManager {
    pub fn new(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<FlashSession>) {
        let (expired, expired_rx) = mpsc::unbounded_channel();
        let manager = Self {
            table: Arc::new(Mutex::new(SessionTable::default())),
            timeout,
            expired,
        };
        (manager, expired_rx)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Adds fragments to the user's session, starting one if needed, and
    /// restarts the timer.
    pub async fn push(&self, user_id: &str, fragments: Vec<Fragment>) -> SessionUpdate {
        let mut table = self.table.lock().await;
        let generation = table.next_generation;
        table.next_generation += 1;
        let timer = self.arm_timer(user_id, generation);

        match table.sessions.get_mut(user_id) {
            Some(pending) => {
                pending.timer.abort();
                pending.timer = timer;
                pending.generation = generation;
                pending.session.fragments.extend(fragments);
                let count = pending.session.fragments.len();
                debug!(user_id, fragments = count, "flash session extended");
                SessionUpdate::Appended { fragments: count }
            }
            None => {
                table.sessions.insert(
                    user_id.to_string(),
                    PendingSession {
                        session: FlashSession {
                            user_id: user_id.to_string(),
                            fragments,
                            started_at: Utc::now(),
                        },
                        generation,
                        timer,
                    },
                );
                debug!(user_id, "flash session started");
                SessionUpdate::Started
            }
        }
    }

    /// Removes the user's session and cancels its timer.
    pub async fn take(&self, user_id: &str) -> Option<FlashSession> {
        let pending = self.table.lock().await.sessions.remove(user_id)?;
        pending.timer.abort();
        Some(pending.session)
    }

    pub async fn drain(&self) -> Vec<FlashSession> {
        let mut table = self.table.lock().await;
        table
            .sessions
            .drain()
            .map(|(_, pending)| {
                pending.timer.abort();
                pending.session
            })
            .collect()
    }

    pub async fn is_active(&self, user_id: &str) -> bool {
        self.table.lock().await.sessions.contains_key(user_id)
    }

    pub async fn active_count(&self) -> usize {
        self.table.lock().await.sessions.len()
    }

    fn arm_timer(&self, user_id: &str, generation: u64) -> JoinHandle<()> {
        let table = Arc::clone(&self.table);
        let expired = self.expired.clone();
        let deadline = Instant::now() + self.timeout;
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let mut table = table.lock().await;
            let is_current = table
                .sessions
                .get(&user_id)
                .is_some_and(|pending| pending.generation == generation);
            if !is_current {
                return;
            }
            let Some(pending) = table.sessions.remove(&user_id) else {
                return;
            };
            drop(table);

            debug!(%user_id, "flash session expired");
            if expired.send(pending.session).is_err() {
                warn!(%user_id, "expired flash session dropped: no consumer");
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
