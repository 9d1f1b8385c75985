//! TOML configuration parsing and validation.
//!
//! All settings live in a single file (default `./config/assist.toml`).
//! Only `[db]` and `[server]` are required; every other section falls back
//! to defaults suitable for a local install.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::keywords::KeywordTables;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub keywords: KeywordTables,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_response_ttl")]
    pub response_cache_ttl_secs: u64,
    #[serde(default = "default_lecture_ttl")]
    pub lecture_cache_ttl_secs: u64,
    #[serde(default = "default_fetch_limit")]
    pub lecture_fetch_limit: i64,
    #[serde(default)]
    pub response_cache_path: Option<PathBuf>,
    #[serde(default)]
    pub transcript_path: Option<PathBuf>,
    #[serde(default = "default_transcript_limit")]
    pub transcript_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            response_cache_ttl_secs: default_response_ttl(),
            lecture_cache_ttl_secs: default_lecture_ttl(),
            lecture_fetch_limit: default_fetch_limit(),
            response_cache_path: None,
            transcript_path: None,
            transcript_limit: default_transcript_limit(),
        }
    }
}

/// Longest accepted cache TTL (30 days).
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

impl ChatConfig {
    /// Response cache TTL, clamped to [`MAX_TTL_SECS`].
    pub fn response_ttl(&self) -> chrono::Duration {
        ttl_duration(self.response_cache_ttl_secs)
    }

    /// Lecture cache TTL, clamped to [`MAX_TTL_SECS`].
    pub fn lecture_ttl(&self) -> chrono::Duration {
        ttl_duration(self.lecture_cache_ttl_secs)
    }
}

fn ttl_duration(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

fn default_response_ttl() -> u64 {
    60 * 60
}
fn default_lecture_ttl() -> u64 {
    10 * 60
}
fn default_fetch_limit() -> i64 {
    100
}
fn default_transcript_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_top_k() -> u32 {
    40
}
fn default_top_p() -> f64 {
    0.95
}
fn default_max_output_tokens() -> u32 {
    2048
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    let chat = &config.chat;
    if chat.response_cache_ttl_secs == 0 {
        anyhow::bail!("chat.response_cache_ttl_secs must be > 0");
    }
    if chat.lecture_cache_ttl_secs == 0 {
        anyhow::bail!("chat.lecture_cache_ttl_secs must be > 0");
    }
    if chat.response_cache_ttl_secs > MAX_TTL_SECS {
        anyhow::bail!("chat.response_cache_ttl_secs must be <= {}", MAX_TTL_SECS);
    }
    if chat.lecture_cache_ttl_secs > MAX_TTL_SECS {
        anyhow::bail!("chat.lecture_cache_ttl_secs must be <= {}", MAX_TTL_SECS);
    }
    if chat.lecture_fetch_limit < 1 {
        anyhow::bail!("chat.lecture_fetch_limit must be >= 1");
    }
    if chat.transcript_limit == 0 {
        anyhow::bail!("chat.transcript_limit must be >= 1");
    }

    let gen = &config.generation;
    match gen.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&gen.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if !(0.0..=1.0).contains(&gen.top_p) {
        anyhow::bail!("generation.top_p must be in [0.0, 1.0]");
    }
    if gen.max_output_tokens == 0 {
        anyhow::bail!("generation.max_output_tokens must be > 0");
    }
    if gen.api_key_env.trim().is_empty() {
        anyhow::bail!("generation.api_key_env must not be empty");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "cohere" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or cohere.",
            other
        ),
    }

    config.keywords.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/assist.sqlite"

[server]
bind = "127.0.0.1:8787"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.db.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(cfg.chat.response_cache_ttl_secs, 3600);
        assert_eq!(cfg.chat.lecture_cache_ttl_secs, 600);
        assert_eq!(cfg.chat.lecture_fetch_limit, 100);
        assert_eq!(cfg.chat.transcript_limit, 50);
        assert_eq!(cfg.generation.provider, "gemini");
        assert_eq!(cfg.generation.model, "gemini-2.5-flash");
        assert_eq!(cfg.generation.max_output_tokens, 2048);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.keywords, KeywordTables::default());
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let content = format!("{}\n[chat]\nresponse_cache_ttl_secs = 0\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("response_cache_ttl_secs"));
    }

    #[test]
    fn test_rejects_oversized_ttl() {
        let content = format!(
            "{}\n[chat]\nresponse_cache_ttl_secs = 100000000000000000\n",
            MINIMAL
        );
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("response_cache_ttl_secs must be <="));

        let content = format!(
            "{}\n[chat]\nlecture_cache_ttl_secs = 100000000000000000\n",
            MINIMAL
        );
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("lecture_cache_ttl_secs must be <="));

        let content = format!(
            "{}\n[chat]\nresponse_cache_ttl_secs = {}\n",
            MINIMAL, MAX_TTL_SECS
        );
        assert!(parse_config(&content).is_ok());
    }

    #[test]
    fn test_ttl_helpers_clamp() {
        let chat = ChatConfig {
            response_cache_ttl_secs: u64::MAX,
            ..ChatConfig::default()
        };
        assert_eq!(chat.response_ttl().num_seconds(), MAX_TTL_SECS as i64);
        assert_eq!(chat.lecture_ttl().num_seconds(), 600);
    }

    #[test]
    fn test_rejects_unknown_generation_provider() {
        let content = format!("{}\n[generation]\nprovider = \"gpt\"\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("Unknown generation provider"));
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let content = format!("{}\n[embedding]\nprovider = \"cohere\"\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let content = format!(
            "{}\n[embedding]\nprovider = \"cohere\"\nmodel = \"embed-multilingual-v3.0\"\ndims = 1024\n",
            MINIMAL
        );
        assert!(parse_config(&content).unwrap().embedding.is_enabled());
    }

    #[test]
    fn test_top_p_out_of_range() {
        let content = format!("{}\n[generation]\ntop_p = 1.5\n", MINIMAL);
        assert!(parse_config(&content).is_err());
    }
}
