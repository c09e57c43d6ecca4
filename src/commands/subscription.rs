//! Subscription refresh and checkout

use crate::commands::status::{print_quota, print_subscription};
use crate::commands::AppContext;
use crate::error::Result;
use crate::refresh::SyncCoordinator;
use colored::Colorize;
use std::sync::Arc;

/// Re-pulls the subscription and rolls the quota period if it elapsed
///
/// A failed pull is reported but is not an error: the quota is still
/// checked for a reset and the local state stays usable.
pub async fn run_refresh(ctx: &AppContext) -> Result<()> {
    let mirror = ctx.mirror()?;
    let coordinator = SyncCoordinator::new(
        Arc::clone(&mirror),
        ctx.quota.clone(),
        Arc::clone(&ctx.clock),
    );
    let report = coordinator.sync().await;

    println!();
    match &report.subscription {
        Ok(snapshot) => {
            println!("Subscription:");
            print_subscription(snapshot, mirror.is_stale());
        }
        Err(e) => {
            println!("{} {:#}", "Could not refresh subscription:".yellow(), e);
        }
    }
    if report.reset {
        println!("{}", "A new quota period has started.".green());
    }
    println!();
    println!("Quota:");
    print_quota(&report.quota);
    println!();
    Ok(())
}

/// Opens a checkout for `plan` and prints where to complete it
pub async fn run_checkout(ctx: &AppContext, plan: &str) -> Result<()> {
    let mirror = ctx.mirror()?;
    let session = mirror.start_checkout(plan).await?;

    println!();
    println!("Checkout started for plan {}.", plan.cyan());
    println!("Complete the payment at:");
    println!("  {}", session.url.underline());
    println!();
    println!(
        "Your plan changes after payment. Run {} to pick it up.",
        "chatquota refresh".cyan()
    );
    println!();
    Ok(())
}
