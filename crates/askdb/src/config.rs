use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::database::DatabaseTarget;
use crate::pipeline::ModelSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout_seconds: u64,
    pub database_url: Option<String>,
    pub db_scheme: String,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    pub query_timeout_seconds: u64,
    pub narrate_results: bool,
    pub history_window: usize,
    pub result_preview_rows: usize,
    pub api_host: String,
    pub api_port: u16,
    pub request_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        Self::from_source(|key| env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes the process environment.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let llm_temperature: f32 = parse_var("LLM_TEMPERATURE", &or("LLM_TEMPERATURE", "0.2"))?;
        if !(0.0..=1.0).contains(&llm_temperature) {
            bail!("LLM_TEMPERATURE must be between 0.0 and 1.0, got {}", llm_temperature);
        }

        let llm_max_tokens: u32 = parse_var("LLM_MAX_TOKENS", &or("LLM_MAX_TOKENS", "1000"))?;
        if !(100..=4000).contains(&llm_max_tokens) {
            bail!("LLM_MAX_TOKENS must be between 100 and 4000, got {}", llm_max_tokens);
        }

        let db_port = match get("DB_PORT") {
            Some(raw) => Some(parse_var::<u16>("DB_PORT", &raw)?),
            None => None,
        };

        Ok(Self {
            llm_api_key: get("OPENAI_API_KEY").or_else(|| get("LLM_API_KEY")),
            llm_base_url: or("LLM_BASE_URL", "https://api.openai.com"),
            llm_model: or("LLM_MODEL", "gpt-4o"),
            llm_temperature,
            llm_max_tokens,
            llm_timeout_seconds: parse_var("LLM_TIMEOUT_SECONDS", &or("LLM_TIMEOUT_SECONDS", "60"))?,
            database_url: get("DATABASE_URL").or_else(|| get("DB_PATH")),
            db_scheme: or("DB_SCHEME", "mysql"),
            db_host: get("DB_HOST"),
            db_port,
            db_user: get("DB_USER"),
            db_password: get("DB_PASSWORD"),
            db_name: get("DB_NAME"),
            query_timeout_seconds: parse_var("QUERY_TIMEOUT_SECONDS", &or("QUERY_TIMEOUT_SECONDS", "30"))?,
            narrate_results: parse_bool("NARRATE_RESULTS", &or("NARRATE_RESULTS", "true"))?,
            history_window: parse_var("HISTORY_WINDOW", &or("HISTORY_WINDOW", "20"))?,
            result_preview_rows: parse_var("RESULT_PREVIEW_ROWS", &or("RESULT_PREVIEW_ROWS", "50"))?,
            api_host: or("API_HOST", "127.0.0.1"),
            api_port: parse_var("API_PORT", &or("API_PORT", "8000"))?,
            request_timeout_seconds: parse_var(
                "REQUEST_TIMEOUT_SECONDS",
                &or("REQUEST_TIMEOUT_SECONDS", "300"),
            )?,
        })
    }

    /// The configured database, if any. A connection string wins over the
    /// discrete `DB_*` parameters.
    pub fn database_target(&self) -> Result<Option<DatabaseTarget>> {
        if let Some(url) = &self.database_url {
            return DatabaseTarget::parse(url)
                .map(Some)
                .with_context(|| "invalid DATABASE_URL / DB_PATH".to_string());
        }

        let Some(host) = &self.db_host else {
            return Ok(None);
        };
        let scheme = self.db_scheme.to_ascii_lowercase();
        let port = match (self.db_port, scheme.as_str()) {
            (Some(port), _) => port,
            (None, "postgres") | (None, "postgresql") => 5432,
            (None, _) => 3306,
        };

        DatabaseTarget::network(
            &scheme,
            host,
            port,
            self.db_user.as_deref().unwrap_or_default(),
            self.db_password.as_deref().unwrap_or_default(),
            self.db_name.as_deref().unwrap_or_default(),
        )
        .map(Some)
        .context("invalid DB_* connection parameters")
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            history_window: self.history_window,
            result_preview_rows: self.result_preview_rows,
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_seconds)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Model: {} via {}", self.llm_model, self.llm_base_url);
        info!(
            "- API key: {}",
            if self.llm_api_key.is_some() { "set" } else { "not set" }
        );
        info!("- Temperature: {}", self.llm_temperature);
        info!("- Max Tokens: {}", self.llm_max_tokens);
        info!("- Model Timeout: {}s", self.llm_timeout_seconds);
        match self.database_target() {
            Ok(Some(target)) => info!("- Database: {}", target),
            Ok(None) => info!("- Database: not configured"),
            Err(e) => warn!("- Database: {:#}", e),
        }
        info!("- Query Timeout: {}s", self.query_timeout_seconds);
        info!("- Narrate Results: {}", self.narrate_results);
        info!("- History Window: {}", self.history_window);
        info!("- API: {}:{}", self.api_host, self.api_port);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("invalid API_HOST/API_PORT: {}:{}", self.api_host, self.api_port))
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("{} has invalid value {:?}: {}", key, raw, e))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} has invalid value {:?}: expected true or false", key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| vars.get(key).cloned())
    }

    /// Helper function to create a test Config with default values
    fn create_test_config() -> Config {
        config_from(&[]).unwrap()
    }

    #[test]
    fn test_config_creation_with_default_values() {
        let config = create_test_config();

        assert!(config.llm_api_key.is_none());
        assert_eq!(config.llm_base_url, "https://api.openai.com");
        assert_eq!(config.llm_model, "gpt-4o");
        assert_eq!(config.llm_temperature, 0.2);
        assert_eq!(config.llm_max_tokens, 1000);
        assert_eq!(config.query_timeout_seconds, 30);
        assert!(config.narrate_results);
        assert_eq!(config.history_window, 20);
        assert_eq!(config.api_port, 8000);
    }

    #[test]
    fn test_api_key_fallback() {
        let config = config_from(&[("LLM_API_KEY", "gsk-test")]).unwrap();
        assert_eq!(config.llm_api_key.as_deref(), Some("gsk-test"));

        let config = config_from(&[("OPENAI_API_KEY", "sk-a"), ("LLM_API_KEY", "gsk-b")]).unwrap();
        assert_eq!(config.llm_api_key.as_deref(), Some("sk-a"));
    }

    // ===== API Address Tests =====

    #[test]
    fn test_api_addr_parsing() {
        let config = create_test_config();
        let addr = config.api_addr().unwrap();

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_api_addr_with_zero_address() {
        let mut config = create_test_config();
        config.api_host = "0.0.0.0".to_string();
        config.api_port = 5000;

        let addr = config.api_addr().unwrap();
        assert_eq!(addr.port(), 5000);
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_api_addr_rejects_hostname() {
        let mut config = create_test_config();
        config.api_host = "not a host".to_string();
        assert!(config.api_addr().is_err());
    }

    // ===== Validation Tests =====

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let err = config_from(&[("LLM_TEMPERATURE", "1.5")]).unwrap_err();
        assert!(err.to_string().contains("LLM_TEMPERATURE"));

        let err = config_from(&[("LLM_MAX_TOKENS", "50")]).unwrap_err();
        assert!(err.to_string().contains("LLM_MAX_TOKENS"));

        let err = config_from(&[("API_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("API_PORT"));

        let err = config_from(&[("NARRATE_RESULTS", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("NARRATE_RESULTS"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("LLM_MODEL", "  "), ("NARRATE_RESULTS", "off")]).unwrap();
        assert_eq!(config.llm_model, "gpt-4o");
        assert!(!config.narrate_results);
    }

    // ===== Database Target Tests =====

    #[test]
    fn test_no_database_configured() {
        assert_eq!(create_test_config().database_target().unwrap(), None);
    }

    #[test]
    fn test_database_url_wins_over_discrete_parameters() {
        let config = config_from(&[("DATABASE_URL", "sqlite::memory:"), ("DB_HOST", "db.internal")]).unwrap();
        assert_eq!(config.database_target().unwrap(), Some(DatabaseTarget::InMemory));
    }

    #[test]
    fn test_db_path_is_sqlite_file() {
        let config = config_from(&[("DB_PATH", "playground.db")]).unwrap();
        match config.database_target().unwrap() {
            Some(DatabaseTarget::Sqlite { path }) => assert!(path.ends_with("playground.db")),
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_discrete_network_parameters() {
        let config = config_from(&[
            ("DB_SCHEME", "postgres"),
            ("DB_HOST", "localhost"),
            ("DB_USER", "root"),
            ("DB_PASSWORD", "admin"),
            ("DB_NAME", "chinook"),
        ])
        .unwrap();

        match config.database_target().unwrap() {
            Some(DatabaseTarget::Network { scheme, port, database, .. }) => {
                assert_eq!(scheme, "postgres");
                assert_eq!(port, 5432);
                assert_eq!(database, "chinook");
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_network_parameters_fail() {
        let config = config_from(&[("DB_HOST", "localhost")]).unwrap();
        assert!(config.database_target().is_err());
    }

    #[test]
    fn test_model_settings_follow_config() {
        let config = config_from(&[("LLM_MODEL", "llama3-70b-8192"), ("HISTORY_WINDOW", "0")]).unwrap();
        let settings = config.model_settings();
        assert_eq!(settings.model, "llama3-70b-8192");
        assert_eq!(settings.history_window, 0);
    }
}
