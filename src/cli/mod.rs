pub mod commands;

use anyhow::{bail, Context};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::cli::commands::{Commands, ImageAction, InsightAction, SessionAction};
use crate::config::AppConfig;
use crate::db::{
    get_connection, Attachment, DuckDbStore, Message, NewImage, NewMessage, Role, SessionStore,
    UserTurn,
};
use crate::facilitator::{Facilitator, StreamEvent, TurnOutcome};
use crate::llm::ProviderFactory;
use crate::phase::Phase;
use crate::transcript;

pub async fn run_cli(command: Commands, config_path: String) -> anyhow::Result<()> {
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    if let Commands::Phases = command {
        for p in Phase::ALL {
            println!("{}  {}", p.title(), p.description());
        }
        return Ok(());
    }

    let pool = get_connection(&config.database).context("failed to open database")?;
    let store = Arc::new(DuckDbStore::new(pool));

    match command {
        Commands::Phases => Ok(()),
        Commands::Session { action } => run_session(store.as_ref(), action),
        Commands::Insight { action } => run_insight(store.as_ref(), action),
        Commands::Image { action } => run_image(store.as_ref(), action),
        Commands::Chat { session } => run_repl(session, store, &config).await,
    }
}

fn run_session(store: &dyn SessionStore, action: SessionAction) -> anyhow::Result<()> {
    match action {
        SessionAction::Create { name } => {
            let session = store.create_session(&name)?;
            println!("Created Session: {} ({})", session.name, session.id);
        }
        SessionAction::List => {
            let sessions = store.list_sessions()?;
            if sessions.is_empty() {
                println!("No sessions found.");
                return Ok(());
            }
            println!("{:<38} | {:<5} | {:<20} | Name", "ID", "Phase", "Updated At");
            println!("{:-<38}-+-{:-<5}-+-{:-<20}-+-{:-<20}", "", "", "", "");
            for s in sessions {
                println!(
                    "{:<38} | {:<5} | {:<20} | {}",
                    s.id,
                    s.current_phase.number(),
                    s.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    s.name
                );
            }
        }
        SessionAction::Show { id } => {
            let session = store.get_session(id)?.with_context(|| format!("Session {id} not found."))?;
            println!("{} ({})", session.name, session.id);
            println!(
                "{} - {}",
                session.current_phase.title(),
                session.current_phase.description()
            );
            for m in store.get_messages(id)? {
                print_message(&m);
            }
        }
        SessionAction::Rename { id, name } => {
            store.rename_session(id, &name)?;
            println!("Renamed session {id} to {name}");
        }
        SessionAction::Delete { id } => {
            store.delete_session(id)?;
            println!("Deleted session {id}");
        }
        SessionAction::Export { id, path } => {
            let session = store.get_session(id)?.with_context(|| format!("Session {id} not found."))?;
            let messages = store.get_messages(id)?;

            let export_path = path.unwrap_or_else(|| format!("session_{id}.txt"));
            std::fs::write(&export_path, transcript::render(&session, &messages))
                .with_context(|| format!("failed to write {export_path}"))?;

            println!("Session exported successfully to: {export_path}");
        }
        SessionAction::Import { path } => {
            let content =
                std::fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
            let session = import_transcript(store, &content)?;
            println!("Imported session: {} ({})", session.0, session.1);
        }
    }
    Ok(())
}

/// Recreates a session from transcript text. Returns its name and id.
pub fn import_transcript(store: &dyn SessionStore, content: &str) -> anyhow::Result<(String, Uuid)> {
    let parsed = transcript::parse(content);
    if parsed.entries.is_empty() {
        bail!("no messages found in transcript");
    }

    let name = parsed.name.unwrap_or_else(|| "Sesión importada".to_string());
    let messages: Vec<NewMessage> = parsed
        .entries
        .into_iter()
        .map(|entry| NewMessage {
            role: entry.role,
            content: entry.content,
            is_insight: entry.is_insight,
        })
        .collect();
    let session = store.import_session(&name, parsed.phase, &messages)?;

    Ok((session.name, session.id))
}

fn run_insight(store: &dyn SessionStore, action: InsightAction) -> anyhow::Result<()> {
    match action {
        InsightAction::Toggle { message_id } => {
            let message = store.toggle_insight(message_id)?;
            let state = if message.is_insight { "marked" } else { "unmarked" };
            println!("Message {message_id} {state} as insight");
        }
        InsightAction::List { session_id } => {
            let insights = store.list_insights(session_id)?;
            if insights.is_empty() {
                println!("No insights marked.");
            }
            for m in insights {
                print_message(&m);
            }
        }
    }
    Ok(())
}

fn run_image(store: &dyn SessionStore, action: ImageAction) -> anyhow::Result<()> {
    match action {
        ImageAction::Add {
            session,
            path,
            title,
            message,
        } => {
            let mut attachment = read_image(&path)?;
            if let Some(title) = title {
                attachment.title = title;
            }

            let image = store.add_image(NewImage {
                session_id: session,
                message_id: message,
                title: attachment.title,
                mime_type: attachment.mime_type,
                data: attachment.data,
            })?;
            println!("Added image {} ({})", image.title, image.id);
        }
        ImageAction::List { session_id } => {
            let images = store.list_images(session_id)?;
            if images.is_empty() {
                println!("No images found.");
            }
            for img in images {
                println!(
                    "{} | {:<20} | {:<10} | {} bytes | {}",
                    img.id,
                    img.title,
                    img.mime_type,
                    img.data.len(),
                    img.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ImageAction::Delete { id } => {
            store.delete_image(id)?;
            println!("Deleted image {id}");
        }
    }
    Ok(())
}

/// Loads an image file, titled after its file name.
fn read_image(path: &str) -> anyhow::Result<Attachment> {
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    if !mime_type.starts_with("image/") {
        bail!("{path} does not look like an image ({mime_type})");
    }
    let data = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
    let title = Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Modelo".to_string());

    Ok(Attachment {
        title,
        mime_type,
        data,
    })
}

fn print_message(m: &Message) {
    let speaker = match m.role {
        Role::User => "Usuario",
        Role::Model => "Facilitador",
    };
    let star = if m.is_insight { " *" } else { "" };
    println!("\n[{speaker}{star}] ({})\n{}", m.id, m.content);
}

/// Longest prefix of `display` that cannot still turn into a marker.
fn stable_prefix(display: &str) -> &str {
    match display.rfind('[') {
        Some(pos) if !display[pos..].contains(']') => &display[..pos],
        _ => display,
    }
}

async fn run_repl(session_id: Uuid, store: Arc<DuckDbStore>, config: &AppConfig) -> anyhow::Result<()> {
    let session = store
        .get_session(session_id)?
        .with_context(|| format!("Session {session_id} not found."))?;

    let llm = ProviderFactory::create_default(config).with_context(|| {
        format!("no usable configuration for LLM provider '{}'", config.llm.provider)
    })?;
    let facilitator = Facilitator::from_config(store, llm, &config.chat)?;

    println!("--- LSP Facilitator ---");
    println!("Session: {} ({})", session.name, session.id);
    println!("{}", session.current_phase.title());
    println!("Type /exit to quit, /phase to show the current phase, /image PATH to attach a photo.");
    println!("-----------------------");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Vec<Attachment> = Vec::new();

    loop {
        print!("\nUsuario> ");
        std::io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let text = input.trim();

        if text.is_empty() {
            continue;
        }
        if text == "/exit" || text == "/quit" {
            break;
        }
        if text == "/phase" {
            if let Some(s) = facilitator.store().get_session(session_id)? {
                println!("{} - {}", s.current_phase.title(), s.current_phase.description());
            }
            continue;
        }
        if let Some(path) = text.strip_prefix("/image ") {
            match read_image(path.trim()) {
                Ok(attachment) => {
                    println!("Imagen adjunta al próximo mensaje: {}", attachment.title);
                    pending.push(attachment);
                }
                Err(e) => println!("{e:#}"),
            }
            continue;
        }

        print!("Facilitador> ");
        std::io::stdout().flush()?;

        let mut raw = String::new();
        let mut shown = String::new();
        let mut on_event = |event: StreamEvent<'_>| match event {
            StreamEvent::Fragment(fragment) => {
                raw.push_str(fragment);
                let display = facilitator.engine().display_text(&raw);
                let stable = stable_prefix(&display);
                if let Some(rest) = stable.strip_prefix(shown.as_str()) {
                    print!("{rest}");
                    let _ = std::io::stdout().flush();
                    shown = stable.to_string();
                }
            }
            StreamEvent::Retrying { attempt, delay } => {
                raw.clear();
                shown.clear();
                println!("\n[intento {attempt} fallido, reintentando en {} ms]", delay.as_millis());
            }
        };

        let turn = UserTurn {
            content: text.to_string(),
            attachments: std::mem::take(&mut pending),
        };
        let outcome = facilitator.send_user_turn(session_id, turn, &mut on_event).await?;
        match outcome {
            TurnOutcome::Completed {
                model_message,
                change,
                ..
            } => {
                match model_message.content.strip_prefix(shown.as_str()) {
                    Some(rest) => println!("{rest}"),
                    None => println!("\n{}", model_message.content),
                }
                if let Some(change) = change {
                    println!("\n>> {} - {}", change.to.title(), change.to.description());
                }
            }
            TurnOutcome::Abandoned { notice, .. } => {
                println!("\n{notice}");
            }
        }
    }

    Ok(())
}
