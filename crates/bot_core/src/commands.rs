//! `#command` parsing and the handlers behind each command.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use blinko_client::{BlinkoRepository, ListQuery, NoteUpdate};
use shared::{
    domain::{Note, NoteType, TodoItem},
    tags::{extract_tags, format_tags, strip_deadlines, strip_tags},
};
use tracing::{debug, warn};

use crate::{
    bot::Reply,
    config::Settings,
    error::BotResult,
    render::{group_todos, HtmlRenderer, Renderer, SearchResults, DEFAULT_CATEGORY},
    responses::ResponseManager,
    strategy::NoteStrategy,
};

/// Page size used when walking every open todo. `#list`, `#done`, `#del`
/// and `#edit` number the same full listing.
pub const TODO_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Splits `#name arg...`. Returns `None` when the text is not shaped like
/// a command; whether `name` is known is the registry's call.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let mut words = text.trim().split_whitespace();
    let name = words.next()?.strip_prefix('#')?.to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        name,
        args: words.map(str::to_string).collect(),
    })
}

/// Everything a handler may touch.
pub struct CommandContext {
    pub repository: Arc<dyn BlinkoRepository>,
    pub settings: Arc<Settings>,
    pub responses: ResponseManager,
    pub renderer: Renderer,
    pub html: Option<Arc<dyn HtmlRenderer>>,
    pub flash: NoteStrategy,
    pub todo: NoteStrategy,
}

impl CommandContext {
    pub fn new(
        settings: Arc<Settings>,
        repository: Arc<dyn BlinkoRepository>,
        html: Option<Arc<dyn HtmlRenderer>>,
    ) -> Self {
        Self {
            responses: ResponseManager::new(settings.responses.clone()),
            renderer: Renderer::new(settings.ui.clone()),
            flash: NoteStrategy::flash(Arc::clone(&repository), Arc::clone(&settings)),
            todo: NoteStrategy::todo(Arc::clone(&repository), Arc::clone(&settings)),
            html,
            repository,
            settings,
        }
    }

    /// Image reply when rich display is on and a renderer is available,
    /// text otherwise or when rendering fails.
    pub async fn present(&self, text: String, html: impl FnOnce(&Renderer) -> String) -> Reply {
        let Some(renderer) = self
            .html
            .as_ref()
            .filter(|_| self.settings.enable_rich_display)
        else {
            return Reply::Text(text);
        };

        match renderer.render(&html(&self.renderer)).await {
            Ok(location) => Reply::Image(location),
            Err(error) => {
                warn!(%error, "html rendering failed, falling back to text");
                Reply::Text(text)
            }
        }
    }

    pub async fn open_todos(&self) -> BotResult<Vec<Note>> {
        Ok(self
            .repository
            .list_all_notes(ListQuery::open_todos(TODO_PAGE_SIZE))
            .await?)
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn usage(&self) -> &'static str;
    fn summary(&self) -> &'static str;
    async fn handle(&self, ctx: &CommandContext, args: &[String]) -> BotResult<Option<Reply>>;

    fn usage_hint(&self) -> Option<Reply> {
        Some(Reply::Text(format!("Usage: {}", self.usage())))
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    order: Vec<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("todo", &[], Arc::new(TodoCommand));
        registry.register("list", &[], Arc::new(ListCommand));
        registry.register("done", &[], Arc::new(DoneCommand));
        registry.register("del", &["rm"], Arc::new(DeleteCommand));
        registry.register("edit", &[], Arc::new(EditCommand));
        registry.register("find", &["search"], Arc::new(FindCommand));
        registry.register("tags", &["cats"], Arc::new(TagsCommand));

        let mut usages = registry.usages();
        usages.push((HelpCommand::USAGE.to_string(), HelpCommand::SUMMARY.to_string()));
        registry.register("help", &[], Arc::new(HelpCommand { usages }));
        registry
    }

    pub fn register(&mut self, name: &str, aliases: &[&str], handler: Arc<dyn CommandHandler>) {
        for alias in aliases {
            self.handlers.insert(alias.to_string(), Arc::clone(&handler));
        }
        self.handlers.insert(name.to_string(), handler);
        self.order.push(name.to_string());
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Primary command names in registration order.
    pub fn commands(&self) -> &[String] {
        &self.order
    }

    pub fn usages(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|handler| (handler.usage().to_string(), handler.summary().to_string()))
            .collect()
    }
}

fn with_tags(clean: &str, tags: &[String]) -> String {
    if tags.is_empty() {
        clean.to_string()
    } else {
        format!("{clean} {}", format_tags(tags))
    }
}

/// Valid 1-based positions from `args`, deduplicated, in the order given.
fn parse_positions(args: &[String]) -> Vec<usize> {
    let mut positions = Vec::new();
    for position in args.iter().filter_map(|arg| arg.parse::<usize>().ok()) {
        if position > 0 && !positions.contains(&position) {
            positions.push(position);
        }
    }
    positions
}

fn join_positions(positions: &[usize]) -> String {
    positions
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct TodoCommand;

#[async_trait]
impl CommandHandler for TodoCommand {
    fn usage(&self) -> &'static str {
        "#todo <text> [#tag...] [~deadline]"
    }

    fn summary(&self) -> &'static str {
        "add a todo"
    }

    async fn handle(&self, ctx: &CommandContext, args: &[String]) -> BotResult<Option<Reply>> {
        let raw = args.join(" ");
        let tags = extract_tags(&raw);
        let clean = strip_deadlines(&strip_tags(&raw));
        if clean.is_empty() {
            return Ok(self.usage_hint());
        }

        ctx.todo.create(&with_tags(&clean, &tags), &[]).await?;
        Ok(ctx
            .responses
            .todo_created(&clean, tags.first().map(String::as_str))
            .map(Reply::Text))
    }
}

pub struct ListCommand;

#[async_trait]
impl CommandHandler for ListCommand {
    fn usage(&self) -> &'static str {
        "#list [tag]"
    }

    fn summary(&self) -> &'static str {
        "show open todos by tag"
    }

    async fn handle(&self, ctx: &CommandContext, args: &[String]) -> BotResult<Option<Reply>> {
        let filter = args
            .first()
            .map(|tag| tag.trim_start_matches('#').to_string())
            .filter(|tag| !tag.is_empty());

        let items: Vec<TodoItem> = ctx
            .open_todos()
            .await?
            .into_iter()
            .enumerate()
            .map(|(index, note)| TodoItem {
                position: index + 1,
                note_id: note.id,
                category: note.category().unwrap_or(DEFAULT_CATEGORY).to_string(),
                completed: note.is_archived,
                created_at: note.created_at,
                content: note.content,
            })
            .filter(|item| filter.as_deref().map_or(true, |tag| item.category == tag))
            .collect();
        debug!(count = items.len(), filter = ?filter, "listing todos");

        let groups = group_todos(items);
        let filter = filter.as_deref();
        let text = ctx.renderer.todo_list_text(&groups, filter);
        Ok(Some(
            ctx.present(text, |renderer| renderer.todo_list_html(&groups, filter))
                .await,
        ))
    }
}

pub struct DoneCommand;

#[async_trait]
impl CommandHandler for DoneCommand {
    fn usage(&self) -> &'static str {
        "#done <n> [n...]"
    }

    fn summary(&self) -> &'static str {
        "complete todos by list number"
    }

    async fn handle(&self, ctx: &CommandContext, args: &[String]) -> BotResult<Option<Reply>> {
        let positions = parse_positions(args);
        if positions.is_empty() {
            return Ok(self.usage_hint());
        }

        let open = ctx.open_todos().await?;
        let mut completed = Vec::new();
        for position in positions {
            let Some(note) = open.get(position - 1) else {
                continue;
            };
            ctx.repository.update_note(NoteUpdate::archive(note.id)).await?;
            completed.push((position, note.content.as_str()));
        }

        let reply = match completed.as_slice() {
            [] => ctx.responses.error_not_found(&args.join(" "), NoteType::Todo),
            [(position, content)] => ctx.responses.todo_completed(&position.to_string(), content),
            many => {
                let ids: Vec<usize> = many.iter().map(|(position, _)| *position).collect();
                let contents: Vec<&str> = many.iter().map(|(_, content)| *content).collect();
                ctx.responses
                    .todo_completed(&join_positions(&ids), &contents.join("; "))
            }
        };
        Ok(reply.map(Reply::Text))
    }
}

pub struct DeleteCommand;

#[async_trait]
impl CommandHandler for DeleteCommand {
    fn usage(&self) -> &'static str {
        "#del <n> [n...]"
    }

    fn summary(&self) -> &'static str {
        "delete todos by list number (alias #rm)"
    }

    async fn handle(&self, ctx: &CommandContext, args: &[String]) -> BotResult<Option<Reply>> {
        let positions = parse_positions(args);
        if positions.is_empty() {
            return Ok(self.usage_hint());
        }

        let open = ctx.open_todos().await?;
        let mut deleted = Vec::new();
        for position in positions {
            let Some(note) = open.get(position - 1) else {
                continue;
            };
            ctx.repository.delete_note(note.id).await?;
            deleted.push(position);
        }
        deleted.sort_unstable();

        let reply = if deleted.is_empty() {
            ctx.responses.error_not_found(&args.join(" "), NoteType::Todo)
        } else {
            ctx.responses
                .item_deleted(&join_positions(&deleted), NoteType::Todo)
        };
        Ok(reply.map(Reply::Text))
    }
}

pub struct EditCommand;

#[async_trait]
impl CommandHandler for EditCommand {
    fn usage(&self) -> &'static str {
        "#edit <n> <new text>"
    }

    fn summary(&self) -> &'static str {
        "replace the text of a todo"
    }

    async fn handle(&self, ctx: &CommandContext, args: &[String]) -> BotResult<Option<Reply>> {
        let [position, rest @ ..] = args else {
            return Ok(self.usage_hint());
        };
        let Some(position) = position.parse::<usize>().ok().filter(|p| *p > 0) else {
            return Ok(self.usage_hint());
        };
        let raw = rest.join(" ");
        let tags = extract_tags(&raw);
        let clean = strip_tags(&raw);
        if clean.is_empty() {
            return Ok(self.usage_hint());
        }

        let open = ctx.open_todos().await?;
        let Some(note) = open.get(position - 1) else {
            return Ok(ctx
                .responses
                .error_not_found(&position.to_string(), NoteType::Todo)
                .map(Reply::Text));
        };

        ctx.repository
            .update_note(NoteUpdate::content(note.id, with_tags(&clean, &tags)))
            .await?;
        Ok(ctx
            .responses
            .todo_edited(&position.to_string(), &clean)
            .map(Reply::Text))
    }
}

pub struct FindCommand;

#[async_trait]
impl CommandHandler for FindCommand {
    fn usage(&self) -> &'static str {
        "#find <keyword>"
    }

    fn summary(&self) -> &'static str {
        "search flash notes and todos (alias #search)"
    }

    async fn handle(&self, ctx: &CommandContext, args: &[String]) -> BotResult<Option<Reply>> {
        let keyword = args.join(" ");
        if keyword.is_empty() {
            return Ok(self.usage_hint());
        }

        // Blinko's search is fuzzy; keep only literal matches.
        let needle = keyword.to_lowercase();
        let (flash, todo): (Vec<Note>, Vec<Note>) = ctx
            .repository
            .search_notes(&keyword)
            .await?
            .into_iter()
            .filter(|note| note.content.to_lowercase().contains(&needle))
            .partition(|note| note.note_type == NoteType::Flash);

        let results = SearchResults {
            keyword,
            flash,
            todo,
        };
        let text = ctx.renderer.search_text(&results);
        Ok(Some(
            ctx.present(text, |renderer| renderer.search_html(&results))
                .await,
        ))
    }
}

pub struct TagsCommand;

#[async_trait]
impl CommandHandler for TagsCommand {
    fn usage(&self) -> &'static str {
        "#tags"
    }

    fn summary(&self) -> &'static str {
        "list Blinko tags (alias #cats)"
    }

    async fn handle(&self, ctx: &CommandContext, _args: &[String]) -> BotResult<Option<Reply>> {
        let tags = ctx.repository.list_tags().await?;
        let text = ctx.renderer.tags_text(&tags);
        Ok(Some(
            ctx.present(text, |renderer| renderer.tags_html(&tags)).await,
        ))
    }
}

pub struct HelpCommand {
    usages: Vec<(String, String)>,
}

impl HelpCommand {
    const USAGE: &'static str = "#help";
    const SUMMARY: &'static str = "show this help";
}

#[async_trait]
impl CommandHandler for HelpCommand {
    fn usage(&self) -> &'static str {
        Self::USAGE
    }

    fn summary(&self) -> &'static str {
        Self::SUMMARY
    }

    async fn handle(&self, ctx: &CommandContext, _args: &[String]) -> BotResult<Option<Reply>> {
        let usages: Vec<(&str, &str)> = self
            .usages
            .iter()
            .map(|(usage, summary)| (usage.as_str(), summary.as_str()))
            .collect();
        let text = ctx.renderer.help_text(&usages);
        Ok(Some(
            ctx.present(text, |renderer| renderer.help_html(&usages))
                .await,
        ))
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
