use adwatch_core::config::Settings;
use adwatch_core::notify::{ChatworkNotifier, LogNotifier, Notifier};
use adwatch_core::rules::RuleParams;
use adwatch_core::run::RunContext;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Authenticated API balance queries over the static account list.
    Api,
    /// Browser-driven CSV export from the platform's web console.
    Console,
}

#[derive(Debug, Parser)]
#[command(name = "adwatch")]
struct Args {
    /// Which acquisition path to run.
    #[arg(long, value_enum)]
    mode: Mode,

    /// Do everything except posting to the chat room.
    #[arg(long)]
    dry_run: bool,

    /// Base directory for the per-run download dir and log artifact.
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    let ctx = RunContext::create(&args.work_dir)?;
    let log_file = ctx.open_log_file()?;

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .with(sentry_tracing::layer())
        .init();

    let params = RuleParams::from_env();
    let notifier: Box<dyn Notifier> = if args.dry_run {
        Box::new(LogNotifier)
    } else {
        Box::new(ChatworkNotifier::from_settings(&settings)?)
    };

    tracing::info!(run_id = %ctx.run_id, mode = ?args.mode, dry_run = args.dry_run, "balance check started");

    let result = match args.mode {
        Mode::Api => {
            adwatch_core::pipeline::run_api_check(&settings, &params, notifier.as_ref()).await
        }
        Mode::Console => {
            adwatch_core::pipeline::run_console_check(&settings, &params, &ctx, notifier.as_ref())
                .await
        }
    };

    match result {
        Ok(report) => {
            tracing::info!(
                run_id = %ctx.run_id,
                flagged = report.records.len(),
                "balance check finished"
            );
            // Per-run artifacts are transient; keep them only when something
            // went wrong.
            ctx.cleanup()
                .context("failed to clean up per-run artifacts")?;
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(run_id = %ctx.run_id, error = %err, "balance check failed");
            Err(err)
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
