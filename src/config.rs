use crate::types::*;
use std::{env, fs, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("read config {path}: {source}")]
  Read { path: String, source: std::io::Error },
  #[error("parse config {path}: {source}")]
  Parse { path: String, source: serde_json::Error },
  #[error("{key} must be a non-negative integer, got {value:?}")]
  InvalidEnv { key: String, value: String },
}

pub fn config_path() -> PathBuf {
  env_default("BRACKET_CONFIG_PATH")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

pub fn env_flag_true(key: &str) -> bool {
  match env::var(key) {
    Ok(value) => parse_flag(&value),
    Err(_) => false,
  }
}

fn parse_flag(value: &str) -> bool {
  let value = value.trim().to_ascii_lowercase();
  matches!(value.as_str(), "1" | "true" | "yes" | "on")
}

/// Environment values win over the file for every key that is set.
pub fn apply_env_defaults(mut config: EngineConfig) -> Result<EngineConfig, ConfigError> {
  if let Some(value) = env_default("BRACKET_DATA_DIR") {
    config.data_dir = value;
  }
  if let Some(value) = env_default("BRACKET_BIND_ADDR") {
    config.bind_addr = value;
  }
  if let Some(value) = env_default("BRACKET_LOG_DIR") {
    config.log_dir = value;
  }
  if env_flag_true("BRACKET_STRICT_ROUND_ORDER") {
    config.strict_round_order = true;
  }
  if let Some(value) = env_default("BRACKET_TIE_BREAK_SEED") {
    let seed = value.parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
      key: "BRACKET_TIE_BREAK_SEED".to_string(),
      value: value.clone(),
    })?;
    config.tie_break_seed = Some(seed);
  }
  Ok(config)
}

pub fn load_config() -> Result<EngineConfig, ConfigError> {
  let path = config_path();
  if !path.is_file() {
    return apply_env_defaults(EngineConfig::default());
  }
  let data = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
    path: path.display().to_string(),
    source,
  })?;
  let config = serde_json::from_str::<EngineConfig>(&data).map_err(|source| ConfigError::Parse {
    path: path.display().to_string(),
    source,
  })?;
  apply_env_defaults(config)
}

/// Loads `.env` from the working directory without overriding variables
/// that are already set.
pub fn load_env_file() {
  let env_path = PathBuf::from(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.len() >= 2
    && ((value.starts_with('"') && value.ends_with('"')) || (value.starts_with('\'') && value.ends_with('\'')))
  {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

/// `None` when the engine should keep tournaments in memory only.
pub fn data_dir(config: &EngineConfig) -> Option<PathBuf> {
  let trimmed = config.data_dir.trim();
  if trimmed.is_empty() {
    None
  } else {
    Some(PathBuf::from(trimmed))
  }
}
