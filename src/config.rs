//! Command-line and environment configuration
//!
//! Every flag can also be set through the environment variable named in its
//! `env` attribute; a `.env` file in the working directory is loaded first.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::agent::AgentConfig;
use crate::mode::Mode;
use crate::sandbox::PoolConfig;
use crate::skills::SkillsConfig;
use crate::tracing::TracingConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "skillbench")]
#[command(about = "Side-by-side chat comparing a baseline agent with a skills-enhanced one")]
#[command(version)]
pub struct Cli {
    /// Address to serve HTTP on
    #[arg(long, env = "SKILLBENCH_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: String,

    #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = "https://api.anthropic.com")]
    pub anthropic_base_url: String,

    #[arg(long, env = "SKILLBENCH_MODEL", default_value = "claude-sonnet-4-20250514")]
    pub model: String,

    #[arg(long, env = "SKILLBENCH_MAX_TOKENS", default_value_t = 4096)]
    pub max_tokens: u32,

    /// Model calls allowed per request
    #[arg(long, env = "SKILLBENCH_MAX_ITERATIONS", default_value_t = 10)]
    pub max_iterations: usize,

    /// Remote sandbox service
    #[arg(long, env = "SANDBOX_URL")]
    pub sandbox_url: String,

    #[arg(long, env = "SANDBOX_API_KEY", hide_env_values = true)]
    pub sandbox_api_key: Option<String>,

    /// Pre-built sandbox template for the baseline configuration
    #[arg(long, env = "SANDBOX_TEMPLATE_BASELINE")]
    pub baseline_template: Option<String>,

    /// Pre-built sandbox template for the enhanced configuration
    #[arg(long, env = "SANDBOX_TEMPLATE_ENHANCED")]
    pub enhanced_template: Option<String>,

    #[arg(long, env = "SKILLBENCH_EXECUTION_TIMEOUT_SECS", default_value_t = 60)]
    pub execution_timeout_secs: u64,

    /// Cap on package installation in sandboxes without a template
    #[arg(long, env = "SKILLBENCH_SETUP_TIMEOUT_SECS", default_value_t = 300)]
    pub setup_timeout_secs: u64,

    /// Environments unused for this long are destroyed
    #[arg(long, env = "SKILLBENCH_IDLE_TIMEOUT_SECS", default_value_t = 1800)]
    pub idle_timeout_secs: u64,

    #[arg(
        long,
        env = "SKILLBENCH_REAP_INTERVAL_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reap_interval_secs: u64,

    /// Skills document URL (embedded copy when unset)
    #[arg(long, env = "SKILLS_URL")]
    pub skills_url: Option<String>,

    /// Package manifest URL (embedded list when unset)
    #[arg(long, env = "SKILLS_MANIFEST_URL")]
    pub skills_manifest_url: Option<String>,

    #[arg(long, env = "SKILLS_TTL_SECS", default_value_t = 300)]
    pub skills_ttl_secs: u64,

    /// Secrets exposed to sandboxed code, as KEY=VALUE
    #[arg(long = "secret", env = "SANDBOX_SECRETS", value_delimiter = ',', value_parser = parse_key_value, hide_env_values = true)]
    pub secrets: Vec<(String, String)>,

    /// Chat history and upload storage
    #[arg(long, env = "SKILLBENCH_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// OTLP collector endpoint for span export
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log as JSON lines
    #[arg(long, env = "SKILLBENCH_LOG_JSON")]
    pub log_json: bool,

    /// Turns a session may send in a burst
    #[arg(long, env = "SKILLBENCH_RATE_LIMIT_BURST", default_value_t = 10)]
    pub rate_limit_burst: u64,

    /// Sustained turns per second per session
    #[arg(long, env = "SKILLBENCH_RATE_LIMIT_PER_SEC", default_value_t = 0.5)]
    pub rate_limit_per_sec: f64,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {:?}", s));
    }
    Ok((key.to_string(), value.to_string()))
}

impl Cli {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_iterations: self.max_iterations,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        let mut templates = HashMap::new();
        if let Some(template) = &self.baseline_template {
            templates.insert(Mode::Baseline, template.clone());
        }
        if let Some(template) = &self.enhanced_template {
            templates.insert(Mode::Enhanced, template.clone());
        }
        PoolConfig {
            templates,
            secrets: self.secrets.iter().cloned().collect(),
            execution_timeout: Duration::from_secs(self.execution_timeout_secs),
            setup_timeout: Duration::from_secs(self.setup_timeout_secs),
        }
    }

    pub fn skills_config(&self) -> SkillsConfig {
        SkillsConfig {
            instructions_url: self.skills_url.clone(),
            manifest_url: self.skills_manifest_url.clone(),
            ttl: Duration::from_secs(self.skills_ttl_secs),
        }
    }

    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig {
            otlp_endpoint: self.otlp_endpoint.clone(),
            json: self.log_json,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 5] = [
        "skillbench",
        "--anthropic-api-key",
        "sk-test",
        "--sandbox-url",
        "http://sandbox.local",
    ];

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(REQUIRED).unwrap();
        assert_eq!(cli.bind, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.model, "claude-sonnet-4-20250514");
        assert_eq!(cli.agent_config().max_iterations, 10);

        let pool = cli.pool_config();
        assert!(pool.templates.is_empty());
        assert_eq!(pool.execution_timeout, Duration::from_secs(60));
        assert_eq!(pool.setup_timeout, Duration::from_secs(300));
        assert_eq!(cli.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(cli.skills_config().ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_templates_and_secrets() {
        let mut args = REQUIRED.to_vec();
        args.extend([
            "--enhanced-template",
            "skills-v2",
            "--secret",
            "DB_URL=postgres://x",
            "--secret",
            "TOKEN=a=b",
        ]);
        let cli = Cli::try_parse_from(args).unwrap();
        let pool = cli.pool_config();

        assert_eq!(pool.templates.get(&Mode::Enhanced).map(String::as_str), Some("skills-v2"));
        assert!(!pool.templates.contains_key(&Mode::Baseline));
        assert_eq!(pool.secrets.get("DB_URL").map(String::as_str), Some("postgres://x"));
        assert_eq!(pool.secrets.get("TOKEN").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_rejects_malformed_secret() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--secret", "NOVALUE"]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_rejects_zero_reap_interval() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--reap-interval-secs", "0"]);
        assert!(Cli::try_parse_from(args).is_err());

        let mut args = REQUIRED.to_vec();
        args.extend(["--reap-interval-secs", "1"]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.reap_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("A=1"), Ok(("A".to_string(), "1".to_string())));
        assert!(parse_key_value("=1").is_err());
    }
}
