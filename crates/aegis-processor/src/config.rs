//! Environment-driven processor configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use aegis_types::Severity;

/// Tunables for the processing pipeline.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum messages pulled per tick (`BATCH_SIZE`).
    pub batch_size: usize,
    /// Long-poll wait per receive (`POLL_INTERVAL_SECONDS`).
    pub poll_interval: Duration,
    /// Lookback window fed to the correlator (`CORRELATION_WINDOW_MINUTES`).
    pub correlation_window_minutes: i64,
    /// Lowest severity that alerts on its own (`ALERT_THRESHOLD_SEVERITY`).
    pub alert_threshold_severity: Severity,
    /// Risk score at or above which any event alerts
    /// (`ALERT_THRESHOLD_RISK_SCORE`).
    pub alert_threshold_risk_score: u8,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            correlation_window_minutes: 60,
            alert_threshold_severity: Severity::High,
            alert_threshold_risk_score: 70,
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from the environment.
    ///
    /// Missing variables take their defaults; unparsable values are logged
    /// and replaced by the default rather than failing startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse("BATCH_SIZE", defaults.batch_size),
            poll_interval: Duration::from_secs(env_parse(
                "POLL_INTERVAL_SECONDS",
                defaults.poll_interval.as_secs(),
            )),
            correlation_window_minutes: env_parse(
                "CORRELATION_WINDOW_MINUTES",
                defaults.correlation_window_minutes,
            ),
            alert_threshold_severity: env::var("ALERT_THRESHOLD_SEVERITY")
                .map(|raw| Severity::from_wire(&raw.to_lowercase()))
                .unwrap_or(defaults.alert_threshold_severity),
            alert_threshold_risk_score: env_parse(
                "ALERT_THRESHOLD_RISK_SCORE",
                defaults.alert_threshold_risk_score,
            ),
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(name, %raw, "unparsable configuration value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let config = ProcessorConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.correlation_window_minutes, 60);
        assert_eq!(config.alert_threshold_severity, Severity::High);
        assert_eq!(config.alert_threshold_risk_score, 70);
    }

    #[test]
    fn environment_overrides_and_garbage_fallback() {
        env::set_var("BATCH_SIZE", "25");
        env::set_var("POLL_INTERVAL_SECONDS", "not-a-number");
        env::set_var("ALERT_THRESHOLD_SEVERITY", "CRITICAL");

        let config = ProcessorConfig::from_env();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.alert_threshold_severity, Severity::Critical);

        env::remove_var("BATCH_SIZE");
        env::remove_var("POLL_INTERVAL_SECONDS");
        env::remove_var("ALERT_THRESHOLD_SEVERITY");
    }
}
