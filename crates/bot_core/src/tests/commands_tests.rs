use super::*;

use anyhow::anyhow;

use crate::test_support::{note, Call, FakeRepository};

fn context(
    repository: &FakeRepository,
    rich: bool,
    html: Option<Arc<dyn HtmlRenderer>>,
) -> CommandContext {
    let settings = Arc::new(Settings {
        enable_rich_display: rich,
        ..Settings::default()
    });
    CommandContext::new(settings, Arc::new(repository.clone()), html)
}

fn todos() -> FakeRepository {
    FakeRepository::with_notes(vec![
        note(1, "write report #work", NoteType::Todo, false),
        note(2, "old chore", NoteType::Todo, true),
        note(3, "buy milk", NoteType::Todo, false),
        note(4, "a passing thought", NoteType::Flash, false),
        note(5, "deploy #work", NoteType::Todo, false),
    ])
}

async fn run(ctx: &CommandContext, line: &str) -> Option<Reply> {
    let parsed = parse_command(line).expect("command");
    let registry = CommandRegistry::with_defaults();
    let handler = registry.get(&parsed.name).expect("known command");
    handler.handle(ctx, &parsed.args).await.expect("handled")
}

fn text(reply: Option<Reply>) -> String {
    match reply {
        Some(Reply::Text(text)) => text,
        other => panic!("expected text reply, got {other:?}"),
    }
}

struct FixedRenderer(anyhow::Result<String>);

#[async_trait]
impl HtmlRenderer for FixedRenderer {
    async fn render(&self, html: &str) -> anyhow::Result<String> {
        assert!(html.starts_with("<!DOCTYPE html>"));
        match &self.0 {
            Ok(location) => Ok(location.clone()),
            Err(error) => Err(anyhow!("{error}")),
        }
    }
}

#[test]
fn parse_command_lowercases_and_splits() {
    assert_eq!(
        parse_command("  #TODO  buy   milk #home "),
        Some(ParsedCommand {
            name: "todo".into(),
            args: vec!["buy".into(), "milk".into(), "#home".into()],
        })
    );
    assert_eq!(parse_command("plain text"), None);
    assert_eq!(parse_command("# spaced"), None);
    assert_eq!(parse_command(""), None);
}

#[test]
fn registry_resolves_aliases_and_keeps_order() {
    let registry = CommandRegistry::with_defaults();
    let names = [
        "todo", "list", "done", "del", "rm", "edit", "find", "search", "tags", "cats", "help",
    ];
    for name in names {
        assert!(registry.get(name).is_some(), "missing {name}");
    }
    assert!(registry.get("idea").is_none());
    assert_eq!(
        registry.commands(),
        ["todo", "list", "done", "del", "edit", "find", "tags", "help"]
    );
}

#[tokio::test]
async fn todo_strips_deadline_and_keeps_tags_in_content() {
    let repository = FakeRepository::new();
    let ctx = context(&repository, false, None);

    let reply = text(run(&ctx, "#todo file taxes ~friday #home #money").await);

    assert_eq!(reply, "✅ Todo added: file taxes");
    assert_eq!(
        repository.created(),
        vec![("file taxes #home #money".to_string(), NoteType::Todo)]
    );
}

#[tokio::test]
async fn todo_without_text_replies_with_usage() {
    let repository = FakeRepository::new();
    let ctx = context(&repository, false, None);

    assert!(text(run(&ctx, "#todo").await).starts_with("Usage: #todo"));
    assert!(text(run(&ctx, "#todo #only-tags ~soon").await).starts_with("Usage: #todo"));
    assert!(repository.created().is_empty());
}

#[tokio::test]
async fn list_numbers_open_todos_and_groups_by_first_tag() {
    let repository = todos();
    let ctx = context(&repository, false, None);

    assert_eq!(
        text(run(&ctx, "#list").await),
        "📝 Todo list\n📂 work\n[1] ☐ write report #work\n[3] ☐ deploy #work\n📂 default\n[2] ☐ buy milk"
    );
    assert_eq!(
        text(run(&ctx, "#list #work").await),
        "📝 Todo list - work\n📂 work\n[1] ☐ write report #work\n[3] ☐ deploy #work"
    );
    assert!(repository
        .calls()
        .contains(&Call::ListAll(ListQuery::open_todos(TODO_PAGE_SIZE))));
}

#[tokio::test]
async fn list_and_done_reach_every_open_todo() {
    let notes = (1..=120)
        .map(|id| note(id, &format!("task {id}"), NoteType::Todo, false))
        .collect();
    let repository = FakeRepository::with_notes(notes);
    let ctx = context(&repository, false, None);

    let listing = text(run(&ctx, "#list").await);
    assert_eq!(listing.matches("☐ task").count(), 120);
    assert!(listing.contains("[120] ☐ task 120"));

    assert_eq!(text(run(&ctx, "#done 120").await), "☑ Completed [120] task 120");
    assert!(repository.notes()[119].is_archived);
}

#[tokio::test]
async fn list_renders_an_image_when_rich_display_is_on() {
    let repository = todos();
    let renderer: Arc<dyn HtmlRenderer> = Arc::new(FixedRenderer(Ok("/tmp/card.png".into())));
    let ctx = context(&repository, true, Some(renderer));

    assert_eq!(
        run(&ctx, "#list").await,
        Some(Reply::Image("/tmp/card.png".into()))
    );
}

#[tokio::test]
async fn failed_rendering_falls_back_to_text() {
    let repository = todos();
    let renderer: Arc<dyn HtmlRenderer> = Arc::new(FixedRenderer(Err(anyhow!("no browser"))));
    let ctx = context(&repository, true, Some(renderer));

    assert!(text(run(&ctx, "#tags").await).starts_with("🏷 Tags"));
}

#[tokio::test]
async fn done_archives_by_list_number() {
    let repository = todos();
    let ctx = context(&repository, false, None);

    assert_eq!(text(run(&ctx, "#done 2").await), "☑ Completed [2] buy milk");
    assert!(repository
        .calls()
        .contains(&Call::Update(NoteUpdate::archive(shared::domain::NoteId(3)))));

    // Numbering follows the remaining open todos.
    assert_eq!(
        text(run(&ctx, "#done 1 2 2 9").await),
        "☑ Completed [1, 2] write report #work; deploy #work"
    );
    assert_eq!(text(run(&ctx, "#done 1").await), "❌ No todo numbered 1");
    assert!(text(run(&ctx, "#done first").await).starts_with("Usage: #done"));
}

#[tokio::test]
async fn delete_and_rm_remove_by_list_number() {
    let repository = todos();
    let ctx = context(&repository, false, None);

    assert_eq!(text(run(&ctx, "#rm 3 1").await), "🗑 Deleted todo [1, 3]");
    let remaining: Vec<i64> = repository.notes().iter().map(|n| n.id.0).collect();
    assert_eq!(remaining, vec![2, 3, 4]);
    assert_eq!(text(run(&ctx, "#del 5").await), "❌ No todo numbered 5");
}

#[tokio::test]
async fn edit_replaces_content_and_validates_arguments() {
    let repository = todos();
    let ctx = context(&repository, false, None);

    assert_eq!(
        text(run(&ctx, "#edit 2 buy oat milk #shop").await),
        "✏️ Updated [2] buy oat milk"
    );
    let edited = repository
        .notes()
        .into_iter()
        .find(|n| n.id.0 == 3)
        .expect("note");
    assert_eq!(edited.content, "buy oat milk #shop");

    assert!(text(run(&ctx, "#edit 2").await).starts_with("Usage: #edit"));
    assert!(text(run(&ctx, "#edit two words").await).starts_with("Usage: #edit"));
    assert_eq!(text(run(&ctx, "#edit 7 nothing").await), "❌ No todo numbered 7");
}

#[tokio::test]
async fn find_matches_either_type_case_insensitively() {
    let repository = FakeRepository::with_notes(vec![
        note(1, "Buy MILK", NoteType::Todo, false),
        note(2, "milk is a drink", NoteType::Flash, false),
        note(3, "bread", NoteType::Todo, false),
        note(4, "finished milk run", NoteType::Todo, true),
    ]);
    let ctx = context(&repository, false, None);

    assert_eq!(
        text(run(&ctx, "#search milk").await),
        "🔍 \"milk\"\n⚡ Flash (1)\n• milk is a drink\n☐ Todo (2)\n• Buy MILK\n• finished milk run"
    );
    assert!(repository.calls().contains(&Call::Search("milk".into())));
    assert!(text(run(&ctx, "#find").await).starts_with("Usage: #find"));
}

#[tokio::test]
async fn help_lists_every_command() {
    let repository = FakeRepository::new();
    let ctx = context(&repository, false, None);

    let help = text(run(&ctx, "#help").await);
    for usage in ["#todo", "#list", "#done", "#del", "#edit", "#find", "#tags", "#help"] {
        assert!(help.contains(usage), "help is missing {usage}");
    }
}

#[tokio::test]
async fn repository_errors_propagate_to_the_caller() {
    let repository = todos();
    repository.fail_requests();
    let ctx = context(&repository, false, None);

    let registry = CommandRegistry::with_defaults();
    let handler = registry.get("list").expect("list");
    let err = handler.handle(&ctx, &[]).await.expect_err("must fail");
    assert!(matches!(err, crate::error::BotError::Blinko(_)));
}
