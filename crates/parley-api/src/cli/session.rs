//! Session management CLI commands: list, history, delete, rename, lock.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_types::conversation::{Role, Turn, TurnPart};

use crate::state::AppState;

/// Longest title shown in the session table.
const TITLE_WIDTH: usize = 40;

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// List sessions with messages, most recent first.
///
/// # Examples
///
/// ```bash
/// parley sessions
/// parley sessions --json
/// ```
pub async fn list_sessions(state: &AppState, json: bool) -> Result<()> {
    let sessions = state.chat_service.list_sessions().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions yet. Start one with: {}",
            style("i").blue().bold(),
            style("parley chat \"hello\"").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Last message").fg(Color::White),
    ]);

    for session in &sessions {
        let title = session.title.as_deref().unwrap_or("(untitled)");
        table.add_row(vec![
            Cell::new(session.id.to_string()).fg(Color::White),
            Cell::new(truncate(title, TITLE_WIDTH)).fg(Color::Cyan),
            Cell::new(
                session
                    .last_message_at
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
            )
            .fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

fn describe_part(part: &TurnPart) -> String {
    match part {
        TurnPart::Text(text) => text.clone(),
        TurnPart::InlineData(data) => format!(
            "[{} attachment, {} bytes]",
            data.media_type,
            data.data.len()
        ),
    }
}

fn print_turn(turn: &Turn) {
    let speaker = match turn.role {
        Role::User => style("you").green().bold(),
        Role::Model => style("model").cyan().bold(),
    };
    println!("  {} {}", style(format!("#{}", turn.id)).dim(), speaker);
    for part in &turn.parts {
        for line in describe_part(part).lines() {
            println!("    {line}");
        }
    }
    println!();
}

/// Print a session's turns in order.
pub async fn show_history(state: &AppState, session_id: i64, json: bool) -> Result<()> {
    let history = state.chat_service.get_history(session_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    let Some(turns) = history else {
        println!();
        println!(
            "  {} Session {} has no history.",
            style("i").blue().bold(),
            style(session_id).cyan()
        );
        println!();
        return Ok(());
    };

    println!();
    for turn in &turns {
        print_turn(turn);
    }
    Ok(())
}

pub async fn delete_session(state: &AppState, session_id: i64, json: bool) -> Result<()> {
    state.chat_service.delete_session(session_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "deleted": true, "session_id": session_id })
        );
    } else {
        println!(
            "  {} Deleted session {}",
            style("✓").green().bold(),
            style(session_id).cyan()
        );
    }
    Ok(())
}

pub async fn rename_session(state: &AppState, session_id: i64, title: &str, json: bool) -> Result<()> {
    let renamed = state.chat_service.edit_title(session_id, title).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "renamed": renamed, "session_id": session_id })
        );
        return Ok(());
    }
    if !renamed {
        bail!("Session {session_id} not found");
    }
    println!(
        "  {} Session {} is now '{}'",
        style("✓").green().bold(),
        style(session_id).cyan(),
        title.trim()
    );
    Ok(())
}

pub async fn lock_session(state: &AppState, session_id: i64, json: bool) -> Result<()> {
    state.chat_service.lock_session(session_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "is_limited": true, "session_id": session_id })
        );
    } else {
        println!(
            "  {} Session {} is limited and will refuse new messages",
            style("✓").green().bold(),
            style(session_id).cyan()
        );
    }
    Ok(())
}
