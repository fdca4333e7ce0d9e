use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use uuid::Uuid;

use wren_client::{ChatClient, ClientConfig, SessionEvent};
use wren_types::events::ServerEvent;
use wren_types::models::ReactionKind;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wren_client=debug,wren_cli=debug".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;
    let client = ChatClient::connect(config).await?;
    info!("Connected as {}", client.local_user());

    let conversations = client.refresh_conversations().await?;
    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }
    for (index, conversation) in conversations.iter().enumerate() {
        println!(
            "[{}] {} -- {}",
            index,
            conversation.display_name(client.local_user()),
            conversation.preview()
        );
    }

    // Pick a conversation by index (first argument, default 0)
    let selected = std::env::args()
        .nth(1)
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(0);
    let conversation = conversations
        .get(selected)
        .ok_or_else(|| anyhow::anyhow!("No conversation at index {}", selected))?;

    println!(
        "\nOpening {}. Type to send, /older for history, /react <message-id> <kind>, /quit to leave.\n",
        conversation.display_name(client.local_user())
    );
    client.open_conversation(conversation.id).await?;

    if let Some(snapshot) = client.timeline().await {
        for message in &snapshot.messages {
            print_message(&message.created_at.format("%H:%M").to_string(), message);
        }
    }

    let mut events = client.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Event(ServerEvent::ReceiveMessage(message))) => {
                    print_message(&message.created_at.format("%H:%M").to_string(), &message);
                }
                Ok(SessionEvent::Event(ServerEvent::Typing { user_id, is_typing, .. })) => {
                    if is_typing && user_id != client.local_user() {
                        println!("... {} is typing", user_id);
                    }
                }
                Ok(SessionEvent::Event(ServerEvent::ReactionUpdate { message_id, reactions })) => {
                    println!("[reactions on {}: {}]", message_id, reactions.len());
                }
                Ok(SessionEvent::Closed) => {
                    println!("Connection closed.");
                    break;
                }
                Err(_) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim() == "/quit" {
                    break;
                }
                if let Err(e) = handle_line(&client, &line).await {
                    eprintln!("error: {}", e);
                }
            }
        }
    }

    Ok(())
}

fn print_message(time: &str, message: &wren_types::models::Message) {
    if message.reactions.is_empty() {
        println!("{} {}: {}", time, message.sender_id, message.content);
    } else {
        println!(
            "{} {}: {} [{} reactions]",
            time,
            message.sender_id,
            message.content,
            message.reactions.len()
        );
    }
}

async fn handle_line(client: &ChatClient, line: &str) -> wren_client::Result<()> {
    if let Some(rest) = line.strip_prefix("/react ") {
        let mut parts = rest.split_whitespace();
        let (Some(raw_id), Some(raw_kind)) = (parts.next(), parts.next()) else {
            eprintln!("usage: /react <message-id> <like|love|haha|sad|angry>");
            return Ok(());
        };
        let Ok(message_id) = raw_id.parse::<Uuid>() else {
            eprintln!("not a message id: {}", raw_id);
            return Ok(());
        };
        let kind = match raw_kind {
            "like" => ReactionKind::Like,
            "love" => ReactionKind::Love,
            "haha" => ReactionKind::Haha,
            "sad" => ReactionKind::Sad,
            "angry" => ReactionKind::Angry,
            other => {
                eprintln!("unknown reaction: {}", other);
                return Ok(());
            }
        };
        return client.send_reaction(message_id, kind);
    }

    match line.trim() {
        "/older" => client.load_older().await,
        "/typing" => client.notify_typing().await,
        "" => Ok(()),
        _ => client.send_message(line).await,
    }
}
