mod env;
pub use env::GatewayConfig;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Optional tuning file (`GUILDGATE_CONFIG`). Every section may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TuningConfig {
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub join: JoinConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub quiz: QuizConfig,
}

/// Background token refresh
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_minutes: u64,
    /// Refresh grants expiring within this many seconds
    #[serde(default = "default_sweep_horizon")]
    pub horizon_seconds: i64,
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sweep_horizon() -> i64 {
    21_600
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_sweep_interval(),
            horizon_seconds: default_sweep_horizon(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinConfig {
    /// Pause between bulk join attempts; values below 500 are raised to 500
    #[serde(default = "default_join_delay")]
    pub delay_ms: u64,
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_seconds: i64,
}

fn default_join_delay() -> u64 {
    500
}

fn default_refresh_margin() -> i64 {
    60
}

impl JoinConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.max(default_join_delay()))
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_join_delay(),
            refresh_margin_seconds: default_refresh_margin(),
        }
    }
}

/// Outbound HTTP (provider and platform calls)
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

fn default_http_timeout() -> u64 {
    10
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_http_timeout(),
        }
    }
}

/// Question shown by quiz panels
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuizConfig {
    #[serde(default = "default_quiz_question")]
    pub question: String,
    #[serde(default = "default_quiz_answer")]
    pub answer: String,
}

fn default_quiz_question() -> String {
    "2 + 2 = ?".to_string()
}

fn default_quiz_answer() -> String {
    "4".to_string()
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            question: default_quiz_question(),
            answer: default_quiz_answer(),
        }
    }
}

/// Load tuning from a TOML file
pub fn load_tuning(path: impl AsRef<Path>) -> Result<TuningConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TuningConfig::default();
        assert_eq!(config.sweep.interval(), Duration::from_secs(3600));
        assert_eq!(config.sweep.horizon_seconds, 21_600);
        assert_eq!(config.join.delay(), Duration::from_millis(500));
        assert_eq!(config.join.refresh_margin_seconds, 60);
        assert_eq!(config.http.timeout(), Duration::from_secs(10));
        assert_eq!(config.quiz.answer, "4");
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [sweep]
            interval_minutes = 30
            horizon_seconds = 7200

            [join]
            delay_ms = 1500
            refresh_margin_seconds = 120

            [http]
            timeout_seconds = 5

            [quiz]
            question = "Capital of France?"
            answer = "Paris"
        "#;

        let config: TuningConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.sweep.interval(), Duration::from_secs(1800));
        assert_eq!(config.sweep.horizon_seconds, 7200);
        assert_eq!(config.join.delay(), Duration::from_millis(1500));
        assert_eq!(config.join.refresh_margin_seconds, 120);
        assert_eq!(config.http.timeout(), Duration::from_secs(5));
        assert_eq!(config.quiz.question, "Capital of France?");
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [join]
            delay_ms = 10
        "#;

        let config: TuningConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.join.delay(), Duration::from_millis(500)); // clamped
        assert_eq!(config.join.refresh_margin_seconds, 60);
        assert_eq!(config.sweep.interval_minutes, 60);
    }

    #[test]
    fn test_load_tuning_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http]\ntimeout_seconds = 3").unwrap();

        let config = load_tuning(file.path()).unwrap();
        assert_eq!(config.http.timeout_seconds, 3);

        assert!(load_tuning("/nonexistent/guildgate.toml").is_err());
    }
}
