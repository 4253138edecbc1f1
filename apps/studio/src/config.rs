use anyhow::{bail, Context, Result};

/// Environment variable holding the chat-completions API key.
pub const API_KEY_VAR: &str = "DEEPSEEK_API_KEY";

/// Application configuration loaded from environment variables.
/// Startup halts if the API key is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub deepseek_api_key: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` is the only
    /// production caller; tests pass a closure over a fixed map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let deepseek_api_key = match lookup(API_KEY_VAR) {
            Some(key) if !key.trim().is_empty() => key,
            _ => bail!("Missing {API_KEY_VAR}. Add it to .env or the process environment."),
        };

        Ok(Config {
            deepseek_api_key,
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}
