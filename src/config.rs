use anyhow::{Result, anyhow, bail};
use std::path::PathBuf;

pub const DEFAULT_SEGMENT_LENGTH_MS: u64 = 300_000;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_SPOOL_DIR: &str = "spool";

/// Runtime configuration, resolved once at startup from the environment
/// (a `.env` file is honored if present).
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Shared gate secret every visitor must enter.
    pub password: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    /// Target length of one audio segment, in milliseconds.
    pub segment_length_ms: u64,
    /// Root directory for per-request job directories.
    pub spool_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            password: require_env("PASSWORD")?,
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            gemini_model: env_or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            gemini_base_url: normalize_base_url(env_or(
                "GEMINI_BASE_URL",
                DEFAULT_GEMINI_BASE_URL,
            )),
            segment_length_ms: parse_segment_length(std::env::var("SEGMENT_LENGTH_MS").ok())?,
            spool_dir: PathBuf::from(env_or("SPOOL_DIR", DEFAULT_SPOOL_DIR)),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    non_empty(key, std::env::var(key).ok())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn non_empty(key: &str, value: Option<String>) -> Result<String> {
    let value = value.ok_or_else(|| anyhow!("{key} is not set"))?;
    if value.trim().is_empty() {
        bail!("{key} is set but empty");
    }
    Ok(value)
}

fn normalize_base_url(raw: String) -> String {
    raw.trim_end_matches('/').to_string()
}

fn parse_segment_length(raw: Option<String>) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_SEGMENT_LENGTH_MS);
    };
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow!("SEGMENT_LENGTH_MS must be a positive integer, got {raw:?}"))?;
    if value == 0 {
        bail!("SEGMENT_LENGTH_MS must be greater than zero");
    }
    Ok(value)
}
