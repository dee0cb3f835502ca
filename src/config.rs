//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Discord connection settings
#[derive(Clone)]
pub struct DiscordConfig {
    pub api_base: url::Url,
    pub bot_token: String,
    pub guild_id: u64,
}

// Keeps the bot token out of logs.
impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("api_base", &self.api_base.as_str())
            .field("bot_token", &"****")
            .field("guild_id", &self.guild_id)
            .finish()
    }
}

/// Proposal lifecycle settings
#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
    /// Forum hosting governance (BGP) proposals
    pub governance_channel: String,
    /// Forum hosting budget (BBP) proposals
    pub budget_channel: String,
    pub voting_window: Duration,
    pub quorum: u64,
    pub tally_interval: Duration,
    pub ongoing_votes_path: PathBuf,
    pub counters_path: PathBuf,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            governance_channel: "improvement-props".to_string(),
            budget_channel: "budgetary-props".to_string(),
            voting_window: Duration::from_secs(48 * 60 * 60),
            quorum: 5,
            tally_interval: Duration::from_secs(60),
            ongoing_votes_path: PathBuf::from("./data/ongoing_votes.json"),
            counters_path: PathBuf::from("./data/proposal_ids.json"),
        }
    }
}

/// External submission script settings
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub program: String,
    pub script: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            script: "./snapshot/wrapper.js".to_string(),
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub discord: DiscordConfig,
    pub governance: GovernanceConfig,
    pub bridge: BridgeConfig,
    pub jwt_secret: Option<String>,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            host: parse_or(&lookup, "HOST", ServerConfig::default().host)?,
            port: parse_or(&lookup, "PORT", ServerConfig::default().port)?,
        };

        let cors = CorsConfig {
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let api_base = lookup("DISCORD_API_BASE")
            .unwrap_or_else(|| "https://discord.com/api/v10".to_string());
        let discord = DiscordConfig {
            api_base: url::Url::parse(&api_base).map_err(|e| {
                ConfigError::InvalidValue(format!("DISCORD_API_BASE '{}': {}", api_base, e))
            })?,
            bot_token: lookup("DISCORD_BOT_TOKEN")
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar("DISCORD_BOT_TOKEN".to_string()))?,
            guild_id: lookup("DISCORD_GUILD_ID")
                .ok_or_else(|| ConfigError::MissingVar("DISCORD_GUILD_ID".to_string()))?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DISCORD_GUILD_ID must be a numeric id".to_string()))?,
        };

        let defaults = GovernanceConfig::default();
        let governance = GovernanceConfig {
            governance_channel: lookup("GOVERNANCE_CHANNEL").unwrap_or(defaults.governance_channel),
            budget_channel: lookup("GOVERNANCE_BUDGET_CHANNEL").unwrap_or(defaults.budget_channel),
            voting_window: secs_or(&lookup, "VOTING_WINDOW_SECS", defaults.voting_window)?,
            quorum: parse_or(&lookup, "VOTE_QUORUM", defaults.quorum)?,
            tally_interval: secs_or(&lookup, "TALLY_INTERVAL_SECS", defaults.tally_interval)?,
            ongoing_votes_path: lookup("ONGOING_VOTES_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ongoing_votes_path),
            counters_path: lookup("PROPOSAL_COUNTERS_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.counters_path),
        };

        validate_voting_window(governance.voting_window)?;

        if governance.tally_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "TALLY_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        let bridge_defaults = BridgeConfig::default();
        let bridge = BridgeConfig {
            program: lookup("SNAPSHOT_BRIDGE_PROGRAM").unwrap_or(bridge_defaults.program),
            script: lookup("SNAPSHOT_BRIDGE_SCRIPT").unwrap_or(bridge_defaults.script),
        };

        Ok(Self {
            server,
            cors,
            discord,
            governance,
            bridge,
            jwt_secret: lookup("JWT_SECRET"),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

/// The window must produce a representable deadline from now
fn validate_voting_window(window: Duration) -> Result<(), ConfigError> {
    let representable = chrono::Duration::from_std(window)
        .ok()
        .and_then(|delta| chrono::Utc::now().checked_add_signed(delta))
        .is_some();
    if !representable {
        return Err(ConfigError::InvalidValue(format!(
            "VOTING_WINDOW_SECS {} is too large",
            window.as_secs()
        )));
    }
    Ok(())
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}
