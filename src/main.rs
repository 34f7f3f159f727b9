use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use chat_api::{Attachment, ChatApiClient};
use conversation_store::{ConversationStore, FileStorage, Message, Role};
use gene_chat::{display_content, logging, ConversationController, EnvConfig, SendOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};

enum Command<'a> {
    Quit,
    New,
    Attach { path: &'a str, text: &'a str },
    Send(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    match line {
        "/quit" => Command::Quit,
        "/new" => Command::New,
        _ => match line.strip_prefix("/attach ") {
            Some(rest) => {
                let rest = rest.trim_start();
                let (path, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                Command::Attach {
                    path,
                    text: text.trim(),
                }
            }
            None => Command::Send(line),
        },
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let config = EnvConfig::from_env();
    logging::init(config.log_filter.as_deref());

    let cwd = std::env::current_dir()?;
    let storage = FileStorage::new(config.store_root(&cwd));
    let store = ConversationStore::open(Arc::new(storage));
    let client = ChatApiClient::new(config.api_config()).map_err(io::Error::other)?;

    let mut controller =
        ConversationController::new(Arc::new(client), store).with_streaming(config.streaming);

    let status = controller.check_health().await;
    println!("{}", status.label());
    if let Some(conversation_id) = controller.conversation_id() {
        println!(
            "Restored conversation {conversation_id} ({} messages)",
            controller.messages().len()
        );
        for message in controller.messages() {
            print_message(message);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Quit => break,
            Command::New => match controller.start_new_conversation().await {
                Ok(conversation_id) => println!("Started conversation {conversation_id}"),
                Err(error) => eprintln!("{error}"),
            },
            Command::Attach { path, text } => match Attachment::from_path(Path::new(path)) {
                Ok(attachment) => send(&mut controller, text, Some(attachment)).await?,
                Err(error) => eprintln!("cannot read {path}: {error}"),
            },
            Command::Send(text) => send(&mut controller, text, None).await?,
        }
    }

    controller.stop_stream();
    Ok(())
}

async fn send(
    controller: &mut ConversationController,
    text: &str,
    attachment: Option<Attachment>,
) -> io::Result<()> {
    let before = controller.messages().len();
    let message_id = match controller.send_message(text, attachment).await {
        Ok(SendOutcome::Started { message_id }) => message_id,
        Ok(SendOutcome::Rejected) => return Ok(()),
        Err(error) => {
            eprintln!("{error}");
            return Ok(());
        }
    };

    let mut printed = 0usize;
    loop {
        let stepped = tokio::select! {
            _ = tokio::signal::ctrl_c() => None,
            stepped = controller.pump() => Some(stepped),
        };

        match stepped {
            None => {
                controller.stop_stream();
                println!("\n[stopped]");
                break;
            }
            Some(false) => break,
            Some(true) => {}
        }

        if let Some(message) = controller.log().find_by_id(&message_id) {
            if message.role == Role::Assistant && controller.is_loading() {
                print!("{}", &message.content[printed..]);
                io::stdout().flush()?;
                printed = message.content.len();
            }
        }
        if !controller.is_loading() {
            break;
        }
    }

    // The user message sits at `before`; print whatever the reply left behind.
    for message in controller.messages().iter().skip(before + 1) {
        let streamed = printed > 0 && message.id.as_deref() == Some(message_id.as_str());
        if streamed && message.role == Role::Assistant {
            println!("{}", &message.content[printed..]);
            if let Some(tokens) = message.tokens {
                println!("[{tokens} tokens]");
            }
        } else {
            if printed > 0 {
                println!();
            }
            print_message(message);
        }
    }

    Ok(())
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("> {}", message.content),
        Role::Assistant => {
            if let Some(thinking) = message.thinking.as_deref() {
                println!("(thinking) {thinking}");
            }
            println!("{}", display_content(&message.content));
            if let Some(tokens) = message.tokens {
                println!("[{tokens} tokens]");
            }
        }
        Role::Error => println!("error: {}", message.content),
    }
}
