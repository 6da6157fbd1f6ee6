use std::env;
use std::str::FromStr;

use chrono::TimeDelta;
use duel_core::{BattleRules, MAX_WORDS_LIMIT};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("{name} must be set unless AUTH_DEV_MODE=true")]
    Missing { name: &'static str },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub round_duration_seconds: i64,
    pub max_attempts_per_round: u32,
    pub default_max_words: u32,
    pub rematch_window_seconds: i64,
    pub word_list_path: String,
    pub word_service_url: Option<String>,
    pub auth_dev_mode: bool,
    pub jwt_secret: Option<String>,
    pub admin_token: Option<String>,
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any key/value source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_var(&lookup, "PORT", "8080")?,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://word_duel.db?mode=rwc".to_string()),
            round_duration_seconds: parse_var(&lookup, "ROUND_DURATION_SECONDS", "60")?,
            max_attempts_per_round: parse_var(&lookup, "MAX_ATTEMPTS_PER_ROUND", "6")?,
            default_max_words: parse_var(&lookup, "DEFAULT_MAX_WORDS", "3")?,
            rematch_window_seconds: parse_var(&lookup, "REMATCH_WINDOW_SECONDS", "300")?,
            word_list_path: lookup("WORD_LIST_PATH")
                .unwrap_or_else(|| "./shared/words.txt".to_string()),
            word_service_url: optional("WORD_SERVICE_URL"),
            auth_dev_mode: parse_var(&lookup, "AUTH_DEV_MODE", "false")?,
            jwt_secret: optional("JWT_SECRET"),
            admin_token: optional("ADMIN_TOKEN"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.round_duration_seconds <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "ROUND_DURATION_SECONDS",
                value: self.round_duration_seconds.to_string(),
            });
        }
        if self.max_attempts_per_round == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_ATTEMPTS_PER_ROUND",
                value: self.max_attempts_per_round.to_string(),
            });
        }
        if self.default_max_words == 0 || self.default_max_words > MAX_WORDS_LIMIT {
            return Err(ConfigError::InvalidValue {
                name: "DEFAULT_MAX_WORDS",
                value: self.default_max_words.to_string(),
            });
        }
        if self.rematch_window_seconds <= 0 {
            return Err(ConfigError::InvalidValue {
                name: "REMATCH_WINDOW_SECONDS",
                value: self.rematch_window_seconds.to_string(),
            });
        }
        if !self.auth_dev_mode && self.jwt_secret.is_none() {
            return Err(ConfigError::Missing { name: "JWT_SECRET" });
        }
        Ok(())
    }

    pub fn battle_rules(&self) -> BattleRules {
        BattleRules {
            round_duration: TimeDelta::seconds(self.round_duration_seconds),
            max_attempts: self.max_attempts_per_round,
            default_max_words: self.default_max_words,
            rematch_window: TimeDelta::seconds(self.rematch_window_seconds),
            ..BattleRules::default()
        }
    }
}
