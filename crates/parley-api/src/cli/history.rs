//! Session history CLI commands: show, clear.
//!
//! Both talk to the configured session store directly, so they work without
//! a running server.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use parley_core::session::box_store::BoxSessionStore;
use parley_core::session::store::SessionStore;
use parley_types::chat::{MessageRole, SessionScope};

use super::ScopeArgs;

/// Longest message preview shown in the table.
const PREVIEW_CHARS: usize = 80;

/// Print the stored messages of one session, oldest first.
///
/// # Examples
///
/// ```bash
/// parley history --user u1 --domain shop
/// parley history --user u1 --json
/// ```
pub async fn show_history(store: &BoxSessionStore, args: &ScopeArgs, json: bool) -> Result<()> {
    let scope = SessionScope::new(
        args.user.as_str(),
        args.domain.as_deref(),
        args.category.as_deref(),
    );
    let messages = store.get_history(&scope).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!(
            "  {} No history stored for {}",
            style("i").blue().bold(),
            style(&scope).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Content").fg(Color::White),
    ]);

    for (index, message) in messages.iter().enumerate() {
        let role_color = match message.role {
            MessageRole::User => Color::Cyan,
            MessageRole::Assistant => Color::Green,
            MessageRole::System => Color::Yellow,
        };
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&message.role).fg(role_color),
            Cell::new(preview(&message.content)),
        ]);
    }

    println!();
    println!(
        "  {} ({} messages)",
        style(&scope).cyan().bold(),
        messages.len()
    );
    println!("{table}");
    println!();

    Ok(())
}

/// Clear one session (all components given) or every matching session.
pub async fn clear_history(
    store: &BoxSessionStore,
    args: &ScopeArgs,
    force: bool,
    json: bool,
) -> Result<()> {
    let target = describe_target(args);

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!("Clear history for {}?", style(&target).red().bold()))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let removed = store
        .clear_history(&args.user, args.domain.as_deref(), args.category.as_deref())
        .await?;

    if json {
        println!("{}", serde_json::json!({ "error": false, "removed": removed }));
    } else {
        println!(
            "  {} Removed {} session(s) for {}.",
            style("x").red().bold(),
            removed,
            target
        );
    }

    Ok(())
}

fn describe_target(args: &ScopeArgs) -> String {
    format!(
        "{}/{}/{}",
        args.user,
        args.domain.as_deref().unwrap_or("*"),
        args.category.as_deref().unwrap_or("*")
    )
}

fn preview(content: &str) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() > PREVIEW_CHARS {
        let cut: String = single_line.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        single_line
    }
}
