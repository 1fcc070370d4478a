use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use blinko_client::BlinkoClient;
use bot_core::{
    load_settings, BotEvent, HtmlFileRenderer, HtmlRenderer, IncomingMessage, NoteBot, Reply,
};
use clap::{Parser, Subcommand};
use shared::domain::{Attachment, AttachmentKind};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const EVENT_DRAIN: Duration = Duration::from_secs(2);

/// Console host for the Blinko note bot.
#[derive(Parser, Debug)]
#[command(name = "fjnote")]
struct Cli {
    /// Settings file; defaults to $FJNOTE_CONFIG or ./fjnote.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read messages from stdin, one per line. `@image <url>` and
    /// `@file <url>` send an attachment.
    Repl {
        #[arg(long, default_value = "console")]
        user: String,
    },
    /// Send each argument as a message, then save pending flash notes.
    Send {
        #[arg(long, default_value = "console")]
        user: String,
        #[arg(required = true)]
        messages: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let settings = Arc::new(load_settings(cli.config.as_deref())?);
    let repository = BlinkoClient::new(&settings.blinko_base_url, settings.blinko_token.clone())
        .context("invalid Blinko settings")?;
    let html = settings.enable_rich_display.then(|| {
        Arc::new(HtmlFileRenderer::from_settings(&settings)) as Arc<dyn HtmlRenderer>
    });
    let bot = NoteBot::new(Arc::clone(&settings), Arc::new(repository), html);
    let printer = tokio::spawn(print_events(bot.subscribe_events()));

    match cli.command {
        Command::Repl { user } => {
            println!(
                "fjnote: talking to {} as '{user}'. Ctrl-D saves pending notes and exits.",
                settings.blinko_base_url
            );
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                print_reply(bot.handle_message(parse_line(&user, &line)).await);
            }
        }
        Command::Send { user, messages } => {
            for message in messages {
                print_reply(bot.handle_message(parse_line(&user, &message)).await);
            }
        }
    }

    bot.shutdown().await;
    drop(bot);
    // The printer ends once the bot's event channel closes.
    match tokio::time::timeout(EVENT_DRAIN, printer).await {
        Ok(Err(error)) => debug!(%error, "event printer failed"),
        Ok(Ok(())) => {}
        Err(_) => debug!("event printer still running at exit"),
    }
    Ok(())
}

fn parse_line(user: &str, line: &str) -> IncomingMessage {
    let trimmed = line.trim();
    let attachment = trimmed
        .strip_prefix("@image ")
        .map(|url| (AttachmentKind::Image, url))
        .or_else(|| trimmed.strip_prefix("@file ").map(|url| (AttachmentKind::File, url)));

    match attachment {
        Some((kind, url)) => {
            let url = url.trim();
            IncomingMessage {
                user_id: user.to_string(),
                text: String::new(),
                attachments: vec![Attachment {
                    kind,
                    filename: filename_from_url(url),
                    url: url.to_string(),
                }],
            }
        }
        None => IncomingMessage::text(user, trimmed),
    }
}

fn filename_from_url(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("attachment")
        .to_string()
}

fn print_reply(reply: Option<Reply>) {
    match reply {
        Some(Reply::Text(text)) => println!("bot> {text}"),
        Some(Reply::Image(location)) => println!("bot> [card] {location}"),
        None => {}
    }
}

async fn print_events(mut events: broadcast::Receiver<BotEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(reply) = event.reply() {
                    println!("bot> {reply}");
                }
            }
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "missed bot events"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
