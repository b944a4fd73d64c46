use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_QUEUE_LIMIT: usize = 50;
pub const MAX_QUEUE_LIMIT: usize = 500;
/// The due pool is fetched with `limit * DUE_OVERFETCH` rows so ranking has
/// more than the first `limit` overdue cards to choose from.
pub const DUE_OVERFETCH: usize = 3;

/// Top-level config (arbor.toml + ARBOR_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArborConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// How exact priority ties are broken when building a study queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreakMode {
    /// Tiny random jitter added to every score.
    #[default]
    Random,
    /// No jitter; the lower card id wins an exact tie.
    CardId,
}

/// Study-queue selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Batch size used when the caller does not pass `limit`.
    #[serde(default = "default_queue_limit")]
    pub default_limit: usize,
    /// Requests asking for more than this are rejected.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_overfetch")]
    pub due_overfetch: usize,
    #[serde(default)]
    pub tie_break: TieBreakMode,
    /// Fixes the random tie-break sequence. Unset means seeded from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_QUEUE_LIMIT,
            max_limit: MAX_QUEUE_LIMIT,
            due_overfetch: DUE_OVERFETCH,
            tie_break: TieBreakMode::default(),
            seed: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_queue_limit() -> usize {
    DEFAULT_QUEUE_LIMIT
}
fn default_max_limit() -> usize {
    MAX_QUEUE_LIMIT
}
fn default_overfetch() -> usize {
    DUE_OVERFETCH
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.arbor/arbor.db", home)
}

impl ArborConfig {
    /// Load config from a TOML file with ARBOR_* env var overrides.
    ///
    /// Nested keys use a double underscore so snake_case field names survive:
    /// `ARBOR_QUEUE__DEFAULT_LIMIT=20` sets `queue.default_limit`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::ArborError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ARBOR_").ignore(&["CONFIG"]).split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.arbor/arbor.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = ArborConfig::load(Some("/nonexistent/arbor.toml")).unwrap();
        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert_eq!(config.queue.default_limit, 50);
        assert_eq!(config.queue.tie_break, TieBreakMode::Random);
    }

    #[test]
    fn toml_sections_are_parsed() {
        let toml = r#"
            [gateway]
            port = 9000

            [queue]
            default_limit = 20
            tie_break = "card-id"
            seed = 7
        "#;
        let config: ArborConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.bind, DEFAULT_BIND);
        assert_eq!(config.queue.default_limit, 20);
        assert_eq!(config.queue.max_limit, MAX_QUEUE_LIMIT);
        assert_eq!(config.queue.tie_break, TieBreakMode::CardId);
        assert_eq!(config.queue.seed, Some(7));
    }
}
