//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or the path given with `--config`), then applies `QUIZROOM_DB_PATH`,
//! `QUIZROOM_LOG_LEVEL` and `QUIZROOM_BIND` env overrides.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// HTTP server configuration (`[server]`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Display name used in logs and the health endpoint.
    pub name: String,
    /// Socket address the axum listener binds to.
    pub bind: String,
}

/// Room defaults (`[rooms]`).
#[derive(Debug, Clone)]
pub struct RoomsConfig {
    /// Player cap applied to every new room.
    pub max_players: u32,
    /// How many random PINs to try before giving up on a collision streak.
    pub pin_attempts: u32,
}

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"` or `"openai"`).
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Quiz drafting knobs (`[quizgen]`).
#[derive(Debug, Clone)]
pub struct QuizgenConfig {
    pub min_questions: u32,
    pub max_questions: u32,
    /// Used when the model leaves `timePerQuestion` out or sets it to zero.
    pub default_time_per_question: u32,
    /// Language the drafted questions are written in, e.g. `PT-PT`.
    pub language: String,
}

/// Fully-resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub log_level: String,
    /// SQLite database file (already expanded, no `~`). `:memory:` is allowed.
    pub db_path: PathBuf,
    pub rooms: RoomsConfig,
    pub llm: LlmConfig,
    /// API key from `LLM_API_KEY` env var. Never sourced from TOML.
    pub llm_api_key: Option<String>,
    pub quizgen: QuizgenConfig,
}

/// Overrides normally taken from the environment.
/// Tests pass them directly instead of mutating env vars.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides<'a> {
    pub db_path: Option<&'a str>,
    pub log_level: Option<&'a str>,
    pub bind: Option<&'a str>,
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    server: RawServer,
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    rooms: RawRooms,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    quizgen: RawQuizgen,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_server_name")]
    name: String,
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawStore {
    #[serde(default = "default_db_path")]
    db_path: String,
}

impl Default for RawStore {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

#[derive(Deserialize)]
struct RawRooms {
    #[serde(default = "default_max_players")]
    max_players: u32,
    #[serde(default = "default_pin_attempts")]
    pin_attempts: u32,
}

impl Default for RawRooms {
    fn default() -> Self {
        Self {
            max_players: default_max_players(),
            pin_attempts: default_pin_attempts(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawQuizgen {
    #[serde(default = "default_min_questions")]
    min_questions: u32,
    #[serde(default = "default_max_questions")]
    max_questions: u32,
    #[serde(default = "default_time_per_question")]
    default_time_per_question: u32,
    #[serde(default = "default_language")]
    language: String,
}

impl Default for RawQuizgen {
    fn default() -> Self {
        Self {
            min_questions: default_min_questions(),
            max_questions: default_max_questions(),
            default_time_per_question: default_time_per_question(),
            language: default_language(),
        }
    }
}

fn default_server_name() -> String { "quizroom".to_string() }
fn default_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_db_path() -> String { "~/.quizroom/quizroom.db".to_string() }
fn default_max_players() -> u32 { 50 }
fn default_pin_attempts() -> u32 { 8 }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_openai_api_base_url() -> String { "https://api.groq.com/openai/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "llama-3.3-70b-versatile".to_string() }
fn default_openai_temperature() -> f32 { 0.7 }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_min_questions() -> u32 { 5 }
fn default_max_questions() -> u32 { 10 }
fn default_time_per_question() -> u32 { 30 }
fn default_language() -> String { "PT-PT".to_string() }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `path` (or `config/default.toml`), then apply env overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let db_path = env::var("QUIZROOM_DB_PATH").ok();
    let log_level = env::var("QUIZROOM_LOG_LEVEL").ok();
    let bind = env::var("QUIZROOM_BIND").ok();
    let mut config = load_from(
        Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)),
        Overrides {
            db_path: db_path.as_deref(),
            log_level: log_level.as_deref(),
            bind: bind.as_deref(),
        },
    )?;
    config.llm_api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.trim().is_empty());
    Ok(config)
}

/// Internal loader: explicit path and overrides, no environment access.
pub fn load_from(path: &Path, overrides: Overrides<'_>) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, overrides)
        .map_err(|e| match e {
            AppError::Config(msg) => AppError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
}

fn parse(raw: &str, overrides: Overrides<'_>) -> Result<Config, AppError> {
    let parsed: RawConfig =
        toml::from_str(raw).map_err(|e| AppError::Config(format!("parse error: {e}")))?;

    let s = parsed.server;
    let db_path = expand_home(overrides.db_path.unwrap_or(&parsed.store.db_path));
    let log_level = overrides.log_level.unwrap_or(&s.log_level).to_string();
    let bind = overrides.bind.unwrap_or(&s.bind).to_string();

    let rooms = parsed.rooms;
    if rooms.max_players == 0 {
        return Err(AppError::Config("rooms.max_players must be at least 1".into()));
    }
    if rooms.pin_attempts == 0 {
        return Err(AppError::Config("rooms.pin_attempts must be at least 1".into()));
    }

    let q = parsed.quizgen;
    if q.min_questions == 0 || q.min_questions > q.max_questions {
        return Err(AppError::Config(format!(
            "quizgen question range {}..={} is empty",
            q.min_questions, q.max_questions
        )));
    }

    Ok(Config {
        server: ServerConfig { name: s.name, bind },
        log_level,
        db_path,
        rooms: RoomsConfig {
            max_players: rooms.max_players,
            pin_attempts: rooms.pin_attempts,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        llm_api_key: None,
        quizgen: QuizgenConfig {
            min_questions: q.min_questions,
            max_questions: q.max_questions,
            default_time_per_question: q.default_time_per_question,
            language: q.language,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// In-memory database, dummy LLM, no API key: safe for tests.
    pub fn test_default() -> Self {
        Self {
            server: ServerConfig { name: "test".into(), bind: "127.0.0.1:0".into() },
            log_level: "info".into(),
            db_path: PathBuf::from(":memory:"),
            rooms: RoomsConfig { max_players: default_max_players(), pin_attempts: default_pin_attempts() },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            llm_api_key: None,
            quizgen: QuizgenConfig {
                min_questions: default_min_questions(),
                max_questions: default_max_questions(),
                default_time_per_question: default_time_per_question(),
                language: default_language(),
            },
        }
    }
}
