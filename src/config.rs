use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::campaign::{SybilLimits, Wallet};

/// Minimum length of an admin reviewer key
const MIN_ADMIN_KEY_LEN: usize = 16;

/// Configuration for the airdrop campaign service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Request limits
    pub security: SecurityConfig,
    /// Wallet creation limits per origin
    pub sybil: SybilConfig,
    /// Reviewer keys and exempt wallets
    pub admin: AdminConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Optional catalog override
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Rate limit per minute per origin
    pub rate_limit_per_minute: u32,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SybilConfig {
    /// New wallets one origin may create inside the ban window
    pub max_wallets_per_origin: u32,
    /// Hours an origin stays banned once it hits the limit
    pub ban_hours: i64,
}

impl SybilConfig {
    pub fn to_limits(&self) -> SybilLimits {
        SybilLimits {
            max_wallets_per_origin: self.max_wallets_per_origin,
            ban_duration: chrono::Duration::hours(self.ban_hours),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Reviewer name keyed by API key. Never logged.
    #[serde(skip_serializing)]
    pub keys: HashMap<String, String>,
    /// Wallets that bypass the origin limits
    pub exempt_wallets: Vec<Wallet>,
}

impl AdminConfig {
    /// Reviewer name for an API key, if the key is on the allow-list
    pub fn reviewer_for(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    pub fn is_exempt(&self, wallet: &Wallet) -> bool {
        self.exempt_wallets.contains(wallet)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug)
    pub level: String,
    /// Mask wallets and keys in request logs
    pub sanitize_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, state lives in memory only)
    pub postgres_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON catalog replacing the built-in tasks and achievements
    pub path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/airdrop".to_string(),
            postgres_enabled: false,
        }
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let limits = SybilLimits::default();
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            security: SecurityConfig {
                rate_limit_per_minute: 60,
                max_request_size: 64 * 1024,
            },
            sybil: SybilConfig {
                max_wallets_per_origin: limits.max_wallets_per_origin,
                ban_hours: limits.ban_duration.num_hours(),
            },
            admin: AdminConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
            },
            catalog: CatalogConfig::default(),
        }
    }
}

impl CampaignConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var("AIRDROP_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = env::var("AIRDROP_PORT") {
            config.server.port = port.parse().context("Invalid AIRDROP_PORT value")?;
        }

        if let Ok(rate_limit) = env::var("AIRDROP_RATE_LIMIT_PER_MINUTE") {
            config.security.rate_limit_per_minute = rate_limit
                .parse()
                .context("Invalid AIRDROP_RATE_LIMIT_PER_MINUTE value")?;
        }

        if let Ok(size) = env::var("AIRDROP_MAX_REQUEST_SIZE") {
            config.security.max_request_size = size
                .parse()
                .context("Invalid AIRDROP_MAX_REQUEST_SIZE value")?;
        }

        if let Ok(max) = env::var("AIRDROP_MAX_WALLETS_PER_IP") {
            config.sybil.max_wallets_per_origin = max
                .parse()
                .context("Invalid AIRDROP_MAX_WALLETS_PER_IP value")?;
        }

        if let Ok(hours) = env::var("AIRDROP_IP_BAN_HOURS") {
            config.sybil.ban_hours = hours
                .parse()
                .context("Invalid AIRDROP_IP_BAN_HOURS value")?;
        }

        if let Ok(keys) = env::var("AIRDROP_ADMIN_KEYS") {
            config.admin.keys = parse_admin_keys(&keys)?;
        } else {
            warn!("AIRDROP_ADMIN_KEYS not set, admin review endpoints will reject every request");
        }

        if let Ok(wallets) = env::var("AIRDROP_EXEMPT_WALLETS") {
            config.admin.exempt_wallets = parse_exempt_wallets(&wallets)?;
        }

        if let Ok(url) = env::var("AIRDROP_POSTGRES_URL") {
            config.database.postgres_url = url;
        }

        if let Ok(enabled) = env::var("AIRDROP_POSTGRES_ENABLED") {
            config.database.postgres_enabled = enabled
                .parse()
                .context("Invalid AIRDROP_POSTGRES_ENABLED value")?;
        }

        if let Ok(log_level) = env::var("AIRDROP_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        if let Ok(sanitize_logs) = env::var("AIRDROP_SANITIZE_LOGS") {
            config.logging.sanitize_logs = sanitize_logs
                .parse()
                .context("Invalid AIRDROP_SANITIZE_LOGS value")?;
        }

        if let Ok(path) = env::var("AIRDROP_CATALOG_PATH") {
            if !path.trim().is_empty() {
                config.catalog.path = Some(PathBuf::from(path));
            }
        }

        config.validate()?;

        info!(
            host = %config.server.host,
            port = config.server.port,
            reviewers = config.admin.keys.len(),
            exempt_wallets = config.admin.exempt_wallets.len(),
            postgres = config.database.postgres_enabled,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be zero"));
        }

        if self.security.rate_limit_per_minute == 0 {
            return Err(anyhow::anyhow!("Rate limit per minute cannot be zero"));
        }

        if self.security.max_request_size == 0 {
            return Err(anyhow::anyhow!("Maximum request size cannot be zero"));
        }

        if self.sybil.max_wallets_per_origin == 0 {
            return Err(anyhow::anyhow!("Max wallets per origin cannot be zero"));
        }

        if self.sybil.ban_hours <= 0 {
            return Err(anyhow::anyhow!("Origin ban duration must be positive"));
        }

        for (key, reviewer) in &self.admin.keys {
            if key.len() < MIN_ADMIN_KEY_LEN {
                return Err(anyhow::anyhow!(
                    "Admin key for {} is too short (minimum {} characters)",
                    reviewer,
                    MIN_ADMIN_KEY_LEN
                ));
            }
            if reviewer.is_empty() {
                return Err(anyhow::anyhow!("Admin key {} has no reviewer name", sanitize_for_logging(key)));
            }
        }

        if self.database.postgres_enabled && self.database.postgres_url.is_empty() {
            return Err(anyhow::anyhow!("PostgreSQL is enabled but no URL is configured"));
        }

        Ok(())
    }
}

/// Parse `name=key,name=key` into a key -> reviewer map
fn parse_admin_keys(raw: &str) -> Result<HashMap<String, String>> {
    let mut keys = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, key) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("AIRDROP_ADMIN_KEYS entries must be name=key"))?;
        keys.insert(key.trim().to_string(), name.trim().to_string());
    }
    Ok(keys)
}

fn parse_exempt_wallets(raw: &str) -> Result<Vec<Wallet>> {
    raw.split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(|w| Wallet::parse(w).with_context(|| format!("Invalid exempt wallet {}", w)))
        .collect()
}

/// Sanitize sensitive data for logging
pub fn sanitize_for_logging(data: &str) -> String {
    let sensitive_patterns = ["key", "token", "password", "secret", "credential"];

    let data_lower = data.to_lowercase();
    let looks_sensitive = sensitive_patterns.iter().any(|p| data_lower.contains(p));
    if !looks_sensitive || !data.is_ascii() {
        return data.to_string();
    }

    if data.len() > 20 {
        format!("{}***{}", &data[..6], &data[data.len() - 6..])
    } else {
        format!(
            "{}***{}",
            &data[..data.len().min(2)],
            &data[data.len().saturating_sub(2)..]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_for_logging() {
        assert_eq!(sanitize_for_logging("admin_key_1234"), "ad***34");
        assert_eq!(sanitize_for_logging("normal_data"), "normal_data");
    }

    #[test]
    fn test_config_validation() {
        let mut config = CampaignConfig::default();
        assert!(config.validate().is_ok());

        config
            .admin
            .keys
            .insert("short".to_string(), "alice".to_string());
        assert!(config.validate().is_err());

        let mut config = CampaignConfig::default();
        config.sybil.max_wallets_per_origin = 0;
        assert!(config.validate().is_err());

        let mut config = CampaignConfig::default();
        config.server.host.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_admin_keys() {
        let keys = parse_admin_keys("alice=aaaaaaaaaaaaaaaa, bob=bbbbbbbbbbbbbbbb").unwrap();
        assert_eq!(keys.get("aaaaaaaaaaaaaaaa").map(String::as_str), Some("alice"));
        assert_eq!(keys.get("bbbbbbbbbbbbbbbb").map(String::as_str), Some("bob"));
        assert!(parse_admin_keys("nokey").is_err());
    }

    #[test]
    fn test_exempt_wallets_are_normalized() {
        let wallets =
            parse_exempt_wallets(" 0xABCDEF0123456789ABCDEF0123456789ABCDEF01 ,").unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert!(parse_exempt_wallets("0x12").is_err());
    }

    #[test]
    fn test_sybil_limits_conversion() {
        let config = CampaignConfig::default();
        let limits = config.sybil.to_limits();
        assert_eq!(limits.max_wallets_per_origin, 5);
        assert_eq!(limits.ban_duration, chrono::Duration::hours(24));
    }
}
