use crate::cli::HistoryCommand;
use crate::commands::AppContext;
use crate::conversation::{ConversationLibrary, Role};
use crate::error::{ChatQuotaError, Result};
use colored::Colorize;
use prettytable::{format, Table};
use std::sync::Arc;

/// Handle history commands
pub fn handle_history(ctx: &AppContext, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List => {
            let entries = ctx.cache.load_index();
            if entries.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(prettytable::row![
                "ID".bold(),
                "Title".bold(),
                "Last Accessed".bold()
            ]);

            for entry in entries {
                let id_short: String = entry.id.chars().take(8).collect();
                table.add_row(prettytable::row![
                    id_short.cyan(),
                    entry.title,
                    entry.last_accessed.format("%Y-%m-%d %H:%M")
                ]);
            }

            println!("\nConversation History:");
            table.printstd();
            println!();
            println!(
                "Use {} to continue a conversation.",
                "chatquota send --conversation <ID> <MESSAGE>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id } => {
            let library = open_library(ctx);
            let record = library
                .resolve(&id)
                .ok_or_else(|| ChatQuotaError::ConversationNotFound(id.clone()))?;

            println!();
            println!("{} {}", record.title.bold(), format!("({})", record.id).dimmed());
            println!();
            for message in &record.messages {
                let speaker = match message.role {
                    Role::User => "you".cyan().bold(),
                    Role::Assistant => "assistant".green().bold(),
                };
                println!("{}: {}", speaker, message.content);
                println!();
            }
        }
        HistoryCommand::Delete { id } => {
            let mut library = open_library(ctx);
            let full_id = library
                .resolve(&id)
                .map(|r| r.id.clone())
                .unwrap_or(id);
            if library.remove(&full_id)? {
                println!("{}", format!("Deleted conversation {}", full_id).green());
            } else {
                return Err(ChatQuotaError::ConversationNotFound(full_id).into());
            }
        }
    }

    Ok(())
}

fn open_library(ctx: &AppContext) -> ConversationLibrary {
    let mut library = ConversationLibrary::new(ctx.cache.clone(), Arc::clone(&ctx.clock));
    library.load();
    library
}
