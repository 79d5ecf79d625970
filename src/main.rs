/// Stockroom asset service binary
use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use stockroom::{
    assets::{orphan_min_age, GcOptions},
    config::{LoggingConfig, DEFAULT_LOG_FILTER},
    jobs::JobScheduler,
    server, AppContext, ServerConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stockroom", version, about = "Asset storage service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and background jobs (default)
    Serve,
    /// Run one asset garbage collection sweep and exit
    AssetsGc {
        #[arg(long)]
        pending_limit: Option<usize>,
        #[arg(long)]
        orphan_limit: Option<usize>,
        #[arg(long)]
        orphan_min_age_secs: Option<u64>,
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ServerConfig::from_env().context("failed to load configuration")?;
    init_logging(&config.logging);

    let ctx = AppContext::new(config)
        .await
        .context("failed to initialize application context")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let ctx = Arc::new(ctx);

            let scheduler = Arc::new(JobScheduler::new(Arc::clone(&ctx)));
            scheduler.start();

            server::serve((*ctx).clone()).await?;
        }
        Command::AssetsGc {
            pending_limit,
            orphan_limit,
            orphan_min_age_secs,
            dry_run,
        } => {
            let mut options = GcOptions::from_config(&ctx.config.gc, Utc::now())?;
            if let Some(limit) = pending_limit {
                options.pending_limit = limit;
            }
            if let Some(limit) = orphan_limit {
                options.orphan_limit = limit;
            }
            if let Some(secs) = orphan_min_age_secs {
                let secs = i64::try_from(secs).context("orphan min age out of range")?;
                options.orphan_min_age = orphan_min_age(secs)?;
            }
            options.dry_run = dry_run;

            let report = ctx.assets.garbage_collect(options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.errors > 0 {
                anyhow::bail!("asset GC finished with {} errors", report.errors);
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&logging.level)
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
