use std::sync::Arc;

use blinko_client::BlinkoRepository;
use shared::{
    domain::{Note, NoteType},
    tags::{ensure_tags_present, extract_tags},
};
use tracing::{debug, info, warn};

use crate::{config::Settings, error::BotResult};

/// How a note of one kind is prepared and persisted.
pub struct NoteStrategy {
    kind: NoteType,
    repository: Arc<dyn BlinkoRepository>,
    settings: Arc<Settings>,
}

impl NoteStrategy {
    pub fn flash(repository: Arc<dyn BlinkoRepository>, settings: Arc<Settings>) -> Self {
        Self {
            kind: NoteType::Flash,
            repository,
            settings,
        }
    }

    pub fn todo(repository: Arc<dyn BlinkoRepository>, settings: Arc<Settings>) -> Self {
        Self {
            kind: NoteType::Todo,
            repository,
            settings,
        }
    }

    fn default_category(&self) -> &str {
        let categories = &self.settings.default_categories;
        match self.kind {
            NoteType::Flash => categories.flash_category.trim(),
            NoteType::Todo => categories.todo_category.trim(),
        }
    }

    /// Final note body: truncated if configured, with every tag (inline,
    /// extra and the default category) present in the text.
    pub fn prepare(&self, content: &str, extra_tags: &[String]) -> String {
        let mut tags = extract_tags(content);
        for tag in extra_tags
            .iter()
            .map(String::as_str)
            .chain(Some(self.default_category()))
        {
            if !tag.is_empty() && !tags.iter().any(|known| known == tag) {
                tags.push(tag.to_string());
            }
        }

        let max = self.settings.advanced.max_content_length;
        let body = if max > 0 && content.chars().count() > max {
            warn!(max, kind = self.kind.label(), "content truncated");
            format!("{}...", content.chars().take(max).collect::<String>())
        } else {
            content.to_string()
        };

        ensure_tags_present(&body, &tags)
    }

    pub async fn create(&self, content: &str, extra_tags: &[String]) -> BotResult<Note> {
        let content = self.prepare(content, extra_tags);
        if self.settings.advanced.debug {
            info!(kind = self.kind.label(), %content, "creating note");
        }
        let note = self.repository.create_note(&content, self.kind).await?;
        debug!(note_id = %note.id, kind = self.kind.label(), "note created");
        Ok(note)
    }
}

#[cfg(test)]
#[path = "tests/strategy_tests.rs"]
mod tests;
