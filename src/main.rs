//! chatquota - usage-quota aware chat client
#![doc = "chatquota - usage-quota aware chat client"]
#![doc = "Main entry point for the chatquota command-line application."]

use anyhow::Result;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatquota::cli::{Cli, Commands};
use chatquota::commands::{self, AppContext};
use chatquota::config::Config;
use chatquota::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    telemetry::init_metrics_exporter();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    let ctx = AppContext::open(config)?;

    // Execute command
    match cli.command {
        Commands::Status => {
            commands::status::show_status(&ctx)?;
            Ok(())
        }
        Commands::Send {
            message,
            conversation,
        } => {
            tracing::info!("Sending message");
            if let Some(id) = &conversation {
                tracing::debug!("Continuing conversation: {}", id);
            }
            commands::send::run_send(ctx, message, conversation).await?;
            Ok(())
        }
        Commands::Refresh => {
            tracing::info!("Refreshing subscription state");
            commands::subscription::run_refresh(&ctx).await?;
            Ok(())
        }
        Commands::Checkout { plan } => {
            tracing::info!("Starting checkout for plan {}", plan);
            commands::subscription::run_checkout(&ctx, &plan).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::debug!("Starting history command");
            commands::history::handle_history(&ctx, command)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins over `--verbose`. Logs go to stderr so command output
/// stays clean; `CHATQUOTA_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "chatquota=debug"
    } else {
        "chatquota=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let json = std::env::var("CHATQUOTA_LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
