//! Service configuration model, defaults and file loading.

use std::path::{Path, PathBuf};

use log::{info, warn};

const CONFIG_ENV_VAR: &str = "NAMEORIGIN_CONFIG";
const API_TOKENS_ENV_VAR: &str = "NAMEORIGIN_API_TOKENS";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// HTTP listener settings.
    pub server: ServerConfig,
    #[serde(default)]
    /// Database location.
    pub storage: StorageConfig,
    #[serde(default)]
    /// Freshness window of cached name predictions.
    pub cache: CacheConfig,
    #[serde(default)]
    /// Upstream provider endpoints, timeouts and quotas.
    pub upstream: UpstreamConfig,
    #[serde(default)]
    /// Accepted bearer tokens.
    pub auth: AuthConfig,
    #[serde(default)]
    /// Popularity ranking limits.
    pub popularity: PopularityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StorageConfig {
    /// Empty means `<data dir>/nameorigin/nameorigin.db`.
    #[serde(default)]
    pub database_path: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_freshness_ttl_hours")]
    pub freshness_ttl_hours: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_prediction_base_url")]
    pub prediction_base_url: String,
    #[serde(default = "default_metadata_base_url")]
    pub metadata_base_url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Per-provider client-side quota; 0 disables limiting.
    #[serde(default)]
    pub requests_per_minute: u32,
    /// How long a call may wait for a quota slot before failing.
    #[serde(default = "default_rate_limit_wait_ms")]
    pub rate_limit_wait_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PopularityConfig {
    #[serde(default = "default_popularity_limit")]
    pub default_limit: usize,
    #[serde(default = "default_popularity_max_limit")]
    pub max_limit: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_ttl_hours: default_freshness_ttl_hours(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            prediction_base_url: default_prediction_base_url(),
            metadata_base_url: default_metadata_base_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            requests_per_minute: 0,
            rate_limit_wait_ms: default_rate_limit_wait_ms(),
        }
    }
}

impl Default for PopularityConfig {
    fn default() -> Self {
        Self {
            default_limit: default_popularity_limit(),
            max_limit: default_popularity_max_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_freshness_ttl_hours() -> u32 {
    24
}

fn default_prediction_base_url() -> String {
    "https://api.nationalize.io/".to_string()
}

fn default_metadata_base_url() -> String {
    "https://restcountries.com/v3.1/alpha/".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_read_timeout_ms() -> u64 {
    10_000
}

fn default_rate_limit_wait_ms() -> u64 {
    800
}

fn default_popularity_limit() -> usize {
    5
}

fn default_popularity_max_limit() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Freshness window as a chrono duration.
    pub fn freshness_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.cache.freshness_ttl_hours))
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.logging
            .level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }

    /// Resolves the database path, falling back to the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf, String> {
        let configured = self.storage.database_path.trim();
        if !configured.is_empty() {
            return Ok(PathBuf::from(configured));
        }
        dirs::data_dir()
            .map(|dir| dir.join("nameorigin").join("nameorigin.db"))
            .ok_or_else(|| "could not find a data directory; set storage.database_path".to_string())
    }
}

/// Clamps numeric fields into supported ranges and trims string settings.
pub fn sanitize_config(config: Config) -> Config {
    let max_limit = config.popularity.max_limit.clamp(1, 1_000);
    Config {
        server: ServerConfig {
            bind_address: config.server.bind_address.trim().to_string(),
        },
        storage: config.storage,
        cache: CacheConfig {
            freshness_ttl_hours: config.cache.freshness_ttl_hours.clamp(1, 24 * 365),
        },
        upstream: UpstreamConfig {
            prediction_base_url: config.upstream.prediction_base_url.trim().to_string(),
            metadata_base_url: config.upstream.metadata_base_url.trim().to_string(),
            connect_timeout_ms: config.upstream.connect_timeout_ms.clamp(100, 60_000),
            read_timeout_ms: config.upstream.read_timeout_ms.clamp(100, 120_000),
            requests_per_minute: config.upstream.requests_per_minute,
            rate_limit_wait_ms: config.upstream.rate_limit_wait_ms.min(30_000),
        },
        auth: AuthConfig {
            tokens: config
                .auth
                .tokens
                .into_iter()
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
                .collect(),
        },
        popularity: PopularityConfig {
            default_limit: config.popularity.default_limit.clamp(1, max_limit),
            max_limit,
        },
        logging: config.logging,
    }
}

/// Picks the config file: explicit argument, then `NAMEORIGIN_CONFIG`, then
/// the platform config directory.
pub fn resolve_config_path(cli_arg: Option<String>) -> Result<PathBuf, String> {
    if let Some(path) = cli_arg.filter(|value| !value.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("nameorigin").join("config.toml"))
        .ok_or_else(|| "could not find a config directory; pass a config path".to_string())
}

/// Reads the config file, writing defaults first when it does not exist.
pub fn load_or_create(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    format!("failed to create config directory {}: {err}", parent.display())
                })?;
            }
        }
        let serialized = toml::to_string(&Config::default())
            .map_err(|err| format!("failed to serialize default config: {err}"))?;
        std::fs::write(path, serialized)
            .map_err(|err| format!("failed to write config {}: {err}", path.display()))?;
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {err}", path.display()))?;
    let mut config = match toml::from_str::<Config>(&content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Config file {} is invalid, using defaults: {}",
                path.display(),
                err
            );
            Config::default()
        }
    };
    config.auth.tokens.extend(tokens_from_env());
    Ok(sanitize_config(config))
}

fn tokens_from_env() -> Vec<String> {
    std::env::var(API_TOKENS_ENV_VAR)
        .map(|raw| raw.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{sanitize_config, Config};

    #[test]
    fn test_partial_toml_falls_back_to_section_defaults() {
        let config: Config = toml::from_str(
            r#"
            [upstream]
            requests_per_minute = 60

            [auth]
            tokens = ["abc"]
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.requests_per_minute, 60);
        assert_eq!(
            config.upstream.prediction_base_url,
            "https://api.nationalize.io/"
        );
        assert_eq!(config.cache.freshness_ttl_hours, 24);
        assert_eq!(config.popularity.default_limit, 5);
        assert_eq!(config.auth.tokens, vec!["abc".to_string()]);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let serialized = toml::to_string(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_sanitize_config_clamps_ranges_and_drops_blank_tokens() {
        let mut config = Config::default();
        config.cache.freshness_ttl_hours = 0;
        config.upstream.connect_timeout_ms = 1;
        config.popularity.default_limit = 500;
        config.popularity.max_limit = 20;
        config.auth.tokens = vec![" token-a ".to_string(), "  ".to_string()];

        let sanitized = sanitize_config(config);
        assert_eq!(sanitized.cache.freshness_ttl_hours, 1);
        assert_eq!(sanitized.upstream.connect_timeout_ms, 100);
        assert_eq!(sanitized.popularity.default_limit, 20);
        assert_eq!(sanitized.auth.tokens, vec!["token-a".to_string()]);
    }

    #[test]
    fn test_log_level_parses_or_defaults_to_info() {
        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
        config.logging.level = "chatty".to_string();
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let mut config = Config::default();
        config.storage.database_path = "/tmp/names.db".to_string();
        assert_eq!(
            config.database_path().unwrap(),
            std::path::PathBuf::from("/tmp/names.db")
        );
    }
}
