//! Text and HTML presentations of command results.
//!
//! Turning HTML into an image is the host's job; `HtmlRenderer` is the seam.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::{Note, TagSummary, TodoItem};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{Settings, UiPreferences};

pub const DEFAULT_CATEGORY: &str = "default";
const COMPACT_WIDTH: usize = 30;
const SNIPPET_WIDTH: usize = 50;
const DEFAULT_CARD_RETENTION: usize = 50;

#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    /// Renders an HTML card and returns where the image (or page) lives.
    async fn render(&self, html: &str) -> anyhow::Result<String>;
}

/// Writes each card to `dir` and returns the file path. Only the most
/// recent cards written by this renderer are kept.
pub struct HtmlFileRenderer {
    dir: PathBuf,
    counter: AtomicU64,
    retention: usize,
    written: Mutex<VecDeque<PathBuf>>,
}

impl HtmlFileRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
            retention: DEFAULT_CARD_RETENTION,
            written: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.render_output_dir).with_retention(settings.render_card_retention)
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    async fn prune(&self, path: PathBuf) {
        let mut written = self.written.lock().await;
        written.push_back(path);
        while written.len() > self.retention {
            let Some(old) = written.pop_front() else {
                break;
            };
            if let Err(error) = tokio::fs::remove_file(&old).await {
                warn!(path = %old.display(), %error, "failed to remove old card");
            }
        }
    }
}

#[async_trait]
impl HtmlRenderer for HtmlFileRenderer {
    async fn render(&self, html: &str) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create '{}'", self.dir.display()))?;

        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let name = format!("card-{stamp}-{sequence}.html");
        let path = self.dir.join(name);
        tokio::fs::write(&path, html)
            .await
            .with_context(|| format!("failed to write '{}'", path.display()))?;

        debug!(path = %path.display(), "card rendered");
        let location = path.display().to_string();
        self.prune(path).await;
        Ok(location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoGroup {
    pub category: String,
    pub items: Vec<TodoItem>,
}

/// Groups items by category, categories in order of first appearance.
pub fn group_todos(items: Vec<TodoItem>) -> Vec<TodoGroup> {
    let mut groups: Vec<TodoGroup> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|group| group.category == item.category) {
            Some(group) => group.items.push(item),
            None => groups.push(TodoGroup {
                category: item.category.clone(),
                items: vec![item],
            }),
        }
    }
    groups
}

#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub keyword: String,
    pub flash: Vec<Note>,
    pub todo: Vec<Note>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.flash.is_empty() && self.todo.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    ui: UiPreferences,
}

impl Renderer {
    pub fn new(ui: UiPreferences) -> Self {
        Self { ui }
    }

    fn display_content(&self, content: &str) -> String {
        let single_line = content.split_whitespace().collect::<Vec<_>>().join(" ");
        if self.ui.compact_mode {
            truncate_chars(&single_line, COMPACT_WIDTH)
        } else {
            single_line
        }
    }

    fn timestamp(&self, created_at: Option<DateTime<Utc>>) -> Option<String> {
        created_at
            .filter(|_| self.ui.show_timestamps)
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
    }

    pub fn todo_list_text(&self, groups: &[TodoGroup], filter: Option<&str>) -> String {
        let mut out = match filter {
            Some(tag) => format!("📝 Todo list - {tag}"),
            None => "📝 Todo list".to_string(),
        };
        if groups.is_empty() {
            out.push_str("\n✨ No open todos");
            return out;
        }
        for group in groups {
            out.push_str(&format!("\n📂 {}", group.category));
            for item in &group.items {
                let mark = if item.completed { "☑" } else { "☐" };
                out.push_str(&format!(
                    "\n[{}] {mark} {}",
                    item.position,
                    self.display_content(&item.content)
                ));
                if let Some(at) = self.timestamp(item.created_at) {
                    out.push_str(&format!(" ({at})"));
                }
            }
        }
        out
    }

    pub fn todo_list_html(&self, groups: &[TodoGroup], filter: Option<&str>) -> String {
        let title = match filter {
            Some(tag) => format!("📝 Todo list - {}", escape_html(tag)),
            None => "📝 Todo list".to_string(),
        };
        let mut body = String::new();
        if groups.is_empty() {
            body.push_str(r#"<div class="empty">✨ No open todos</div>"#);
        }
        for group in groups {
            if group.category != DEFAULT_CATEGORY {
                body.push_str(&format!(
                    r#"<div class="section">📂 {}</div>"#,
                    escape_html(&group.category)
                ));
            }
            for item in &group.items {
                let meta = self
                    .timestamp(item.created_at)
                    .map(|at| format!(r#"<span class="meta">{at}</span>"#))
                    .unwrap_or_default();
                body.push_str(&format!(
                    r#"<div class="item{}"><span class="num">[{}]</span> {} <span class="text">{}</span>{meta}</div>"#,
                    if item.completed { " done" } else { "" },
                    item.position,
                    if item.completed { "☑" } else { "☐" },
                    escape_html(&self.display_content(&item.content)),
                ));
            }
        }
        self.card(&title, &body, "#667eea", "#764ba2")
    }

    pub fn search_text(&self, results: &SearchResults) -> String {
        let mut out = format!("🔍 \"{}\"", results.keyword);
        if results.is_empty() {
            out.push_str("\nNo matching notes");
            return out;
        }
        for (label, notes) in [("⚡ Flash", &results.flash), ("☐ Todo", &results.todo)] {
            if notes.is_empty() {
                continue;
            }
            out.push_str(&format!("\n{label} ({})", notes.len()));
            for note in notes {
                out.push_str(&format!("\n• {}", snippet(&note.content)));
            }
        }
        out
    }

    pub fn search_html(&self, results: &SearchResults) -> String {
        let title = format!("🔍 \"{}\"", escape_html(&results.keyword));
        let mut body = String::new();
        if results.is_empty() {
            body.push_str(r#"<div class="empty">No matching notes</div>"#);
        }
        for (label, notes) in [("⚡ Flash", &results.flash), ("☐ Todo", &results.todo)] {
            if notes.is_empty() {
                continue;
            }
            body.push_str(&format!(
                r#"<div class="section">{label} ({})</div>"#,
                notes.len()
            ));
            for note in notes {
                let meta = self
                    .timestamp(note.created_at)
                    .map(|at| format!(r#"<span class="meta">{at}</span>"#))
                    .unwrap_or_default();
                body.push_str(&format!(
                    r#"<div class="item"><span class="text">{}</span>{meta}</div>"#,
                    escape_html(&snippet(&note.content))
                ));
            }
        }
        self.card(&title, &body, "#00b894", "#00a085")
    }

    pub fn tags_text(&self, tags: &[TagSummary]) -> String {
        if tags.is_empty() {
            return "🏷 No tags yet".to_string();
        }
        let lines: Vec<String> = tags
            .iter()
            .map(|tag| match tag.count {
                Some(count) => format!("#{} ({count})", tag.name),
                None => format!("#{}", tag.name),
            })
            .collect();
        format!("🏷 Tags\n{}", lines.join("\n"))
    }

    pub fn tags_html(&self, tags: &[TagSummary]) -> String {
        let body = if tags.is_empty() {
            r#"<div class="empty">No tags yet</div>"#.to_string()
        } else {
            tags.iter()
                .map(|tag| {
                    let count = tag.count.map(|c| format!(" ({c})")).unwrap_or_default();
                    format!(r#"<span class="tag">#{}{count}</span>"#, escape_html(&tag.name))
                })
                .collect::<Vec<_>>()
                .join(" ")
        };
        self.card("🏷 Tags", &body, "#fd79a8", "#e84393")
    }

    pub fn help_text(&self, usages: &[(&str, &str)]) -> String {
        let mut out = String::from(
            "📖 FJNote\nPlain messages are collected into a flash note until you pause.",
        );
        for (usage, summary) in usages {
            out.push_str(&format!("\n{usage}  {summary}"));
        }
        out
    }

    pub fn help_html(&self, usages: &[(&str, &str)]) -> String {
        let mut body = String::from(
            r#"<div class="empty">Plain messages are collected into a flash note until you pause.</div>"#,
        );
        for (usage, summary) in usages {
            body.push_str(&format!(
                r#"<div class="item"><span class="num">{}</span> <span class="text">{}</span></div>"#,
                escape_html(usage),
                escape_html(summary)
            ));
        }
        self.card("📖 FJNote", &body, "#6c5ce7", "#a29bfe")
    }

    fn card(&self, title: &str, body: &str, from: &str, to: &str) -> String {
        let font = self.ui.font_size;
        let (padding, line_height) = if self.ui.compact_mode {
            ("6px", "1.1")
        } else {
            ("10px", "1.3")
        };
        format!(
            r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><style>
body {{ margin: 0; }}
.card {{ font-family: 'Helvetica Neue', Arial, sans-serif; font-size: {font}px; line-height: {line_height}; padding: {padding}; color: white; border-radius: 6px; background: linear-gradient(135deg, {from} 0%, {to} 100%); }}
.title {{ text-align: center; font-size: {title_size}px; font-weight: 700; margin-bottom: 6px; }}
.section {{ color: #ffd700; font-size: {small}px; font-weight: 600; border-bottom: 1px solid #ffd700; margin: 4px 0 2px 0; }}
.item {{ background: rgba(255,255,255,0.15); border-left: 2px solid #ffd700; border-radius: 3px; padding: 3px 6px; margin: 1px 0; }}
.item.done .text {{ text-decoration: line-through; opacity: 0.7; }}
.num {{ color: #ffd700; font-weight: 600; }}
.meta {{ float: right; color: #ddd; font-size: {tiny}px; }}
.tag {{ display: inline-block; background: rgba(255,255,255,0.25); border-radius: 8px; padding: 1px 6px; margin: 2px; }}
.empty {{ text-align: center; color: #ddd; font-style: italic; padding: 8px; }}
</style></head>
<body><div class="card"><div class="title">{title_text}</div>{body}</div></body></html>"#,
            title_size = font + 2,
            small = font.saturating_sub(2),
            tiny = font.saturating_sub(4),
            title_text = title,
        )
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    format!("{}...", text.chars().take(max).collect::<String>())
}

fn snippet(content: &str) -> String {
    truncate_chars(
        &content.split_whitespace().collect::<Vec<_>>().join(" "),
        SNIPPET_WIDTH,
    )
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
