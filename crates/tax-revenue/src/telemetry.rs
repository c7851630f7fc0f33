use crate::config::TelemetryConfig;
use thiserror::Error;
use tracing_subscriber::filter::{LevelFilter, ParseError};
use tracing_subscriber::EnvFilter;

/// Targets that follow a bare `APP_LOG_LEVEL`. Dependencies (hyper, tower, axum) stay at `warn`.
const PIPELINE_TARGETS: &[&str] = &["tax_revenue", "tax_revenue_api", "tax_etl"];

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log level/filter '{value}': unable to build EnvFilter")]
    EnvFilter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("telemetry error: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// Installs the global subscriber, writing compact lines to stderr so stdout stays free for
/// command output. `RUST_LOG` wins over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

fn build_filter(log_level: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(pipeline_directives(log_level)).map_err(|source| {
        TelemetryError::EnvFilter {
            value: log_level.to_string(),
            source,
        }
    })
}

/// Expands a bare level such as `debug` into per-crate directives. Full filter strings pass
/// through unchanged.
fn pipeline_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.parse::<LevelFilter>().is_err() {
        return level.to_string();
    }

    let mut directives = vec!["warn".to_string()];
    directives.extend(
        PIPELINE_TARGETS
            .iter()
            .map(|target| format!("{target}={level}")),
    );
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_is_scoped_to_pipeline_crates() {
        assert_eq!(
            pipeline_directives(" debug "),
            "warn,tax_revenue=debug,tax_revenue_api=debug,tax_etl=debug"
        );
    }

    #[test]
    fn full_filters_pass_through() {
        assert_eq!(
            pipeline_directives("info,hyper=debug"),
            "info,hyper=debug"
        );
        assert!(build_filter("info,hyper=debug").is_ok());
    }

    #[test]
    fn malformed_filter_reports_the_configured_value() {
        let error = build_filter("tax_revenue=shout").expect_err("invalid level");
        assert!(matches!(
            &error,
            TelemetryError::EnvFilter { value, .. } if value == "tax_revenue=shout"
        ));
        assert!(error.to_string().contains("'tax_revenue=shout'"));
    }
}
