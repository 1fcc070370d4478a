use super::*;

#[test]
fn plain_lines_become_text_messages() {
    let message = parse_line("me", "  remember the milk  ");
    assert_eq!(message, IncomingMessage::text("me", "remember the milk"));
}

#[test]
fn attachment_lines_carry_url_and_filename() {
    let message = parse_line("me", "@image https://cdn.example/a/photo.png?size=2");
    assert!(message.text.is_empty());
    assert_eq!(
        message.attachments,
        vec![Attachment {
            kind: AttachmentKind::Image,
            url: "https://cdn.example/a/photo.png?size=2".into(),
            filename: "photo.png".into(),
        }]
    );

    let file = parse_line("me", "@file https://cdn.example/");
    assert_eq!(file.attachments[0].kind, AttachmentKind::File);
    assert_eq!(file.attachments[0].filename, "attachment");
}

#[test]
fn cli_parses_send_with_config() {
    let cli = Cli::try_parse_from([
        "fjnote", "--config", "bot.toml", "send", "--user", "u1", "a", "b",
    ])
    .expect("args");
    assert_eq!(cli.config, Some(PathBuf::from("bot.toml")));
    match cli.command {
        Command::Send { user, messages } => {
            assert_eq!(user, "u1");
            assert_eq!(messages, vec!["a", "b"]);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}
