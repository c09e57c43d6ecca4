//! One chat exchange from the command line

use crate::commands::status::print_quota;
use crate::commands::AppContext;
use crate::completion::HttpChatCompletion;
use crate::conversation::ConversationLibrary;
use crate::error::{ChatQuotaError, Result};
use crate::session::ChatSession;
use colored::Colorize;
use std::sync::Arc;

/// Sends `message`, optionally continuing `conversation`, and prints the reply
///
/// # Errors
///
/// Returns [`ChatQuotaError::QuotaExceeded`] without contacting the
/// completion server when the allowance is used up.
pub async fn run_send(ctx: AppContext, message: String, conversation: Option<String>) -> Result<()> {
    let completion = HttpChatCompletion::new(
        &ctx.config.chat.api_base,
        ctx.config.chat.model.clone(),
        ctx.config.chat.timeout(),
        ctx.config.chat.api_key.clone(),
    )?;

    let library = ConversationLibrary::new(ctx.cache.clone(), Arc::clone(&ctx.clock));
    let mut session = ChatSession::new(ctx.quota.clone(), library, Arc::new(completion));

    match session.send(conversation.as_deref(), &message).await {
        Ok(outcome) => {
            println!("{}", outcome.reply);
            println!();
            println!(
                "{} {}  {}",
                "conversation".dimmed(),
                outcome.conversation_id.cyan(),
                format!(
                    "{}/{} messages used ({}%)",
                    outcome.quota.count,
                    outcome.quota.limit,
                    outcome.quota.percent_used()
                )
                .dimmed()
            );
            Ok(())
        }
        Err(e) => {
            if let Some(ChatQuotaError::QuotaExceeded { .. }) = e.downcast_ref::<ChatQuotaError>() {
                eprintln!("{}", "You have used all messages for this period.".red().bold());
                print_quota(&ctx.quota.snapshot());
            }
            Err(e)
        }
    }
}
