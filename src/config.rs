use std::{
    env,
    error::Error,
    fmt::{self, Display},
};

pub const DB_URL: &str = "POLLS_DB_URL";
pub const BIND_ADDR: &str = "POLLS_BIND_ADDR";
pub const DB_MAX_CONNECTIONS: &str = "POLLS_DB_MAX_CONNECTIONS";
pub const SESSION_KEY: &str = "POLLS_SESSION_KEY";
pub const SECURE_COOKIES: &str = "POLLS_SECURE_COOKIES";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 4;
/// Cookie signing and encryption needs at least this many bytes of key material.
pub const MIN_SESSION_KEY_LEN: usize = 64;

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Key {} not found in environment", key),
            ConfigError::Invalid { key, reason } => write!(f, "Invalid value for {}: {}", key, reason),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub session_key: Option<Vec<u8>>,
    pub secure_cookies: bool,
}

impl AppConfig {
    /// Reads the process environment. A `.env` file is honoured if present.
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        dotenv::dotenv().ok();
        AppConfig::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<AppConfig, ConfigError>
    where F: Fn(&str) -> Option<String> {
        let db_url = lookup(DB_URL).ok_or(ConfigError::Missing(DB_URL))?;

        let bind_addr = lookup(BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned());

        let max_connections = match lookup(DB_MAX_CONNECTIONS) {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(value) => match value.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::Invalid {
                    key: DB_MAX_CONNECTIONS,
                    reason: format!("expected a positive integer, got [{}]", value),
                }),
            },
        };

        let session_key = match lookup(SESSION_KEY) {
            None => None,
            Some(value) if value.len() < MIN_SESSION_KEY_LEN => return Err(ConfigError::Invalid {
                key: SESSION_KEY,
                reason: format!("must be at least {} bytes", MIN_SESSION_KEY_LEN),
            }),
            Some(value) => Some(value.into_bytes()),
        };

        let secure_cookies = match lookup(SECURE_COOKIES).as_deref() {
            None => true,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => return Err(ConfigError::Invalid {
                key: SECURE_COOKIES,
                reason: format!("expected true or false, got [{}]", other),
            }),
        };

        Ok(AppConfig {
            db_url,
            bind_addr,
            max_connections,
            session_key,
            secure_cookies,
        })
    }
}
