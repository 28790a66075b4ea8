use clap::Parser;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// API key for the inference service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Model used for both text and image classification
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// Timeout for a single upstream call, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "60")]
    pub request_timeout_secs: u64,

    /// Total attempts per classification when rate limited
    #[arg(long, env = "MAX_ATTEMPTS", default_value = "3")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[arg(long, env = "RETRY_DELAY_MS", default_value = "2000")]
    pub retry_delay_ms: u64,

    /// Maximum accepted request body size (images arrive as data URIs)
    #[arg(long, env = "BODY_LIMIT_BYTES", default_value = "31457280")]
    pub body_limit_bytes: usize,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("openai_api_key", &"<redacted>")
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("log_json", &self.log_json)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for RetryConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

impl Config {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["smartbin-gateway", "--openai-api-key", "sk-test"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_listen_on_port_8000() {
        let config = parse(&[]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.server_address(), "127.0.0.1:8000");
        assert_eq!(config.body_limit_bytes, 30 * 1024 * 1024);
        assert_eq!(RetryConfig::from(&config), RetryConfig::default());
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        let config = parse(&["--max-attempts", "0", "--retry-delay-ms", "10"]);
        let retry = RetryConfig::from(&config);
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.delay, Duration::from_millis(10));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = parse(&[]);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-test"));
        assert!(rendered.contains("<redacted>"));
    }
}
