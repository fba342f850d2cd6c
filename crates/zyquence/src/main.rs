//! A terminal client that streams replies from one of the assistants.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;
use zyquence::Assistant;
use zyquence::core::{
    Expect, JsonFileStore, Notice, ParsedCompletion, SessionContext,
    SessionStore,
};
use zyquence::gateway::{GatewayConfigBuilder, GatewayProvider};

enum ConversationEvent {
    Delta(String),
    Notice(Notice),
    Idle,
}

const BAR_CHAR: &str = "▎";
const SESSION_FILE: &str = ".zyquence-session.json";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(endpoint) = env::var("ZYQUENCE_GATEWAY_URL") else {
        eprintln!("ZYQUENCE_GATEWAY_URL environment variable is not set");
        return;
    };
    let Ok(token) = env::var("ZYQUENCE_GATEWAY_TOKEN") else {
        eprintln!("ZYQUENCE_GATEWAY_TOKEN environment variable is not set");
        return;
    };
    let assistant = match env::var("ZYQUENCE_ASSISTANT") {
        Ok(name) => match name.parse::<Assistant>() {
            Ok(assistant) => assistant,
            Err(err) => {
                eprintln!("{err}");
                return;
            }
        },
        Err(_) => Assistant::AtlasChat,
    };

    let mut config = GatewayConfigBuilder::with_token(token)
        .with_endpoint(endpoint);
    if let Ok(model) = env::var("ZYQUENCE_MODEL") {
        config = config.with_model(model);
    }
    let provider = match GatewayProvider::new(config.build()) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("failed to create the gateway client: {err}");
            return;
        }
    };

    let store = JsonFileStore::new(SESSION_FILE);
    let session = match store.load().await {
        Ok(session) => session.unwrap_or_default(),
        Err(err) => {
            warn!("starting with a fresh session: {err}");
            SessionContext::default()
        }
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let handle = assistant
        .builder(provider)
        .with_session(session)
        .on_delta({
            let event_tx = event_tx.clone();
            move |delta| {
                event_tx.send(ConversationEvent::Delta(delta.to_owned())).ok();
            }
        })
        .on_notice({
            let event_tx = event_tx.clone();
            move |notice| {
                event_tx.send(ConversationEvent::Notice(notice)).ok();
            }
        })
        .on_idle(move || {
            event_tx.send(ConversationEvent::Idle).ok();
        })
        .spawn();

    println!(
        "{} {}",
        "Chatting with".dimmed(),
        assistant.bright_white().bold()
    );
    println!("{}", "Type /reset to start over, /quit to leave.".dimmed());

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    'outer: loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                handle.reset();
                continue;
            }
            input => handle.submit(input),
        }

        let mut progress_bar = None;
        let mut reply = String::new();

        loop {
            // Spin until the first piece of the reply shows up.
            if reply.is_empty() {
                progress_bar
                    .get_or_insert_with(|| {
                        let progress_bar = ProgressBar::new_spinner();
                        progress_bar.set_style(progress_style.clone());
                        progress_bar.set_message("💭 Thinking...");
                        progress_bar
                    })
                    .inc(1);
            }

            let sleep = sleep(Duration::from_millis(100));
            let event = select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        break 'outer;
                    };
                    event
                },
                _ = sleep => {
                    continue;
                }
            };

            // Finish the progress bar before printing anything else.
            if let Some(progress_bar) = progress_bar.take() {
                progress_bar.finish_and_clear();
            }

            match event {
                ConversationEvent::Delta(delta) => {
                    if reply.is_empty() {
                        print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    }
                    print!("{}", delta.bright_white());
                    std::io::stdout().flush().ok();
                    reply.push_str(&delta);
                }
                ConversationEvent::Notice(notice) => {
                    if !reply.is_empty() {
                        println!();
                    }
                    print_notice(&notice);
                }
                ConversationEvent::Idle => {
                    if !reply.is_empty() {
                        println!();
                        print_files(assistant, &reply);
                    }
                    break;
                }
            }
        }
    }

    let Some(controller) = handle.close().await else {
        return;
    };
    if let Err(err) = controller.unmount(&store).await {
        eprintln!("failed to save the session: {err}");
    }
}

fn print_notice(notice: &Notice) {
    let bar = BAR_CHAR.bright_yellow();
    if *notice == Notice::Cancelled {
        println!("{bar}{}", notice.dimmed());
    } else if notice.is_retryable() {
        println!("{bar}⚠️  {}", notice.to_string().bright_red());
    } else {
        println!("{bar}⏳ {}", notice.to_string().bright_yellow());
    }
}

fn print_files(assistant: Assistant, reply: &str) {
    if assistant.expects() != Expect::Files {
        return;
    }
    match ParsedCompletion::parse(reply, Expect::Files) {
        Ok(ParsedCompletion::Files(files)) => {
            for file in files {
                println!(
                    "{}📄 {} ({} bytes)",
                    BAR_CHAR.bright_green(),
                    file.path.bright_white().bold(),
                    file.contents.len()
                );
            }
        }
        Ok(_) => {}
        Err(err) => debug!("reply has no files: {err}"),
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
