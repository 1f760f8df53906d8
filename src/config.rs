use std::{net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration, read from the environment (and `.env` when present).
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub agent_email: String,
    pub agent_password: String,
    pub session_idle_minutes: i64,
    /// `None` keeps rooms awaiting feedback forever.
    pub feedback_grace: Option<Duration>,
    pub cors_allow_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let feedback_grace_secs: u64 = parse_or(&lookup, "FEEDBACK_GRACE_SECS", 600)?;

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            agent_email: required("AGENT_EMAIL")?,
            agent_password: required("AGENT_PASSWORD")?,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 16)?,
            session_idle_minutes: parse_or(&lookup, "SESSION_IDLE_MINUTES", 60)?,
            feedback_grace: (feedback_grace_secs > 0).then(|| Duration::from_secs(feedback_grace_secs)),
            cors_allow_origins: lookup("CORS_ALLOW_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const BASE: [(&str, &str); 3] = [
        ("DATABASE_URL", "sqlite://relay.db"),
        ("AGENT_EMAIL", "agent@example.com"),
        ("AGENT_PASSWORD", "hunter2"),
    ];

    #[test]
    fn defaults_apply() {
        let config = config(&BASE).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.db_max_connections, 16);
        assert_eq!(config.session_idle_minutes, 60);
        assert_eq!(config.feedback_grace, Some(Duration::from_secs(600)));
        assert!(config.cors_allow_origins.is_empty());
    }

    #[test]
    fn overrides_parse() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("BIND_ADDR", "127.0.0.1:3000"),
            ("FEEDBACK_GRACE_SECS", "0"),
            ("CORS_ALLOW_ORIGINS", "https://a.example, https://b.example,"),
        ]);

        let config = config(&vars).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.feedback_grace, None);
        assert_eq!(config.cors_allow_origins, ["https://a.example", "https://b.example"]);
    }

    #[test]
    fn missing_credentials_fail() {
        let err = config(&BASE[..2]).err().unwrap();
        assert!(matches!(err, ConfigError::Missing("AGENT_PASSWORD")));
    }

    #[test]
    fn bad_number_is_reported_with_key() {
        let mut vars = BASE.to_vec();
        vars.push(("DB_MAX_CONNECTIONS", "lots"));

        let err = config(&vars).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. }));
        assert!(err.to_string().contains("lots"));
    }
}
