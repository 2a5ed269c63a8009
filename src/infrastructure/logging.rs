use std::io;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{config::AppConfig, infrastructure::directories::ResolvedPaths};

const LOG_FILE: &str = "exterminator.log";
const VERBOSE_TARGETS: &[&str] = &["scanner", "suspicion", "matcher", "search"];

static GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

fn default_directives(level: &str, verbose: bool) -> String {
    let mut directives = vec![level.trim().to_ascii_lowercase()];
    if verbose {
        directives.extend(VERBOSE_TARGETS.iter().map(|target| format!("{target}=debug")));
    }
    directives.join(",")
}

pub fn init_tracing(config: &AppConfig, paths: &ResolvedPaths) -> Result<()> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.logging.level, config.verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&paths.logs_dir, LOG_FILE));

    let console_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_target(config.verbose)
        .with_ansi(true);
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;
    let _ = GUARD.set(guard);

    tracing::debug!(target: "app", logs = %paths.logs_dir.join(LOG_FILE).display(), "logging ready");
    Ok(())
}
