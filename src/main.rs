use clap::Parser;
use listing_scout::cli::Cli;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Days of step logs kept on disk
const LOG_RETENTION: usize = 7;

/// Console plus `{log_dir}/{step}.*.log`. The guard flushes the file writer
/// and must live until exit.
fn init_logging(cli: &Cli) -> Option<WorkerGuard> {
    let default_filter = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(cli.step.as_str())
        .filename_suffix("log")
        .max_log_files(LOG_RETENTION)
        .build(&cli.log_dir);

    match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
            warn!("File logging disabled, cannot open {}: {}", cli.log_dir.display(), e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(&cli);

    info!("🏠 Listing Scout - Jiji Ghana");
    info!("============================");

    match cli.run().await {
        Ok(summary) => {
            info!("✅ {}", summary.0);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ {} step failed: {}", cli.step.as_str(), e);
            ExitCode::FAILURE
        }
    }
}
