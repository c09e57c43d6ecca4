//! Quota status rendering

use crate::commands::AppContext;
use crate::error::Result;
use crate::quota::QuotaState;
use crate::subscription::SubscriptionSnapshot;
use colored::Colorize;
use prettytable::{format, row, Table};

/// Prints the quota of the configured user
pub fn show_status(ctx: &AppContext) -> Result<()> {
    let state = ctx.quota.snapshot();
    println!();
    println!("Quota for {}:", ctx.config.user.id.cyan());
    print_quota(&state);
    println!();
    if !state.can_send_message() {
        println!(
            "{} Upgrade with {} or wait for the reset.",
            "Message limit reached.".red().bold(),
            "chatquota checkout <PLAN>".cyan()
        );
    }
    Ok(())
}

/// Renders a quota state as a table
pub fn print_quota(state: &QuotaState) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Used", format!("{}/{}", state.count, state.limit)]);
    table.add_row(row!["Percent", usage_label(state)]);
    table.add_row(row!["Remaining", state.remaining()]);
    table.add_row(row![
        "Can send",
        if state.can_send_message() {
            "yes".green()
        } else {
            "no".red()
        }
    ]);
    table.add_row(row![
        "Period",
        format!(
            "{} to {}",
            state.last_reset.format("%Y-%m-%d %H:%M"),
            state.next_reset.format("%Y-%m-%d %H:%M")
        )
    ]);
    table.printstd();
}

/// Renders a subscription snapshot as a table
pub fn print_subscription(snapshot: &SubscriptionSnapshot, stale: bool) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    let tier = snapshot
        .tier
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());
    table.add_row(row!["Tier", tier]);

    match &snapshot.plan {
        Some(plan) => {
            table.add_row(row!["Plan", plan.id]);
            table.add_row(row!["Messages / month", plan.message_limit]);
            table.add_row(row![
                "Price",
                format!(
                    "{}.{:02} {}",
                    plan.price_amount / 100,
                    plan.price_amount % 100,
                    plan.price_currency
                )
            ]);
            if !plan.features.is_empty() {
                let features: Vec<&str> = plan.features.iter().map(String::as_str).collect();
                table.add_row(row!["Features", features.join(", ")]);
            }
        }
        None => {
            table.add_row(row!["Plan", "free"]);
        }
    }

    if let Some(end) = snapshot.period_end {
        table.add_row(row!["Period end", end.format("%Y-%m-%d")]);
    }
    if stale {
        table.add_row(row!["Status", "stale".yellow()]);
    }
    table.printstd();
}

fn usage_label(state: &QuotaState) -> colored::ColoredString {
    let pct = state.percent_used();
    let label = format!("{}%", pct);
    match pct {
        0..=74 => label.green(),
        75..=99 => label.yellow(),
        _ => label.red(),
    }
}
