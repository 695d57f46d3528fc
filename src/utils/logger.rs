use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATE_TARGET: &str = "newstore_integrations";

/// `RUST_LOG` wins; otherwise the `LOG_LEVEL` variable the deployed
/// functions already carry is mapped onto the crate target.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_lowercase())
            .unwrap_or_else(|| default_level.to_string());
        EnvFilter::new(format!("{}={},info", CRATE_TARGET, level))
    })
}

/// Compact console output; `--verbose` adds debug events and their targets.
pub fn init_cli_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

pub fn init_lambda_logger() {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_target(false)
                .without_time(), // CloudWatch 自帶時間戳
        )
        .init();
}
