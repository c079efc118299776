//! Relay configuration from the environment.
//!
//! An optional `.env` file is loaded first; real environment variables win.

use std::net::SocketAddr;
use std::num::ParseIntError;

use canvasx_collab::ServerConfig;
use canvasx_suggest::SuggestConfig;
use thiserror::Error;

pub const WS_ADDR_VAR: &str = "CANVASX_WS_ADDR";
pub const HTTP_ADDR_VAR: &str = "CANVASX_HTTP_ADDR";
pub const MAILBOX_CAPACITY_VAR: &str = "CANVASX_MAILBOX_CAPACITY";
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const MODEL_VAR: &str = "GEMINI_MODEL";
pub const BASE_URL_VAR: &str = "GEMINI_BASE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a socket address: {source}")]
    InvalidAddr {
        var: &'static str,
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("{var}={value:?} is not a number: {source}")]
    InvalidNumber {
        var: &'static str,
        value: String,
        source: ParseIntError,
    },

    #[error("{var} must be at least 1")]
    Zero { var: &'static str },
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub ws_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub mailbox_capacity: usize,
    /// None when no API key is set; suggestions are then always empty.
    pub suggest: Option<SuggestConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ws_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3080)),
            mailbox_capacity: ServerConfig::default().mailbox_capacity,
            suggest: None,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset and blank values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let ws_addr = match get(WS_ADDR_VAR) {
            Some(value) => parse_addr(WS_ADDR_VAR, value)?,
            None => defaults.ws_addr,
        };
        let http_addr = match get(HTTP_ADDR_VAR) {
            Some(value) => parse_addr(HTTP_ADDR_VAR, value)?,
            None => defaults.http_addr,
        };
        let mailbox_capacity = match get(MAILBOX_CAPACITY_VAR) {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(0) => return Err(ConfigError::Zero { var: MAILBOX_CAPACITY_VAR }),
                Ok(n) => n,
                Err(source) => {
                    return Err(ConfigError::InvalidNumber {
                        var: MAILBOX_CAPACITY_VAR,
                        value,
                        source,
                    })
                }
            },
            None => defaults.mailbox_capacity,
        };

        let suggest = get(API_KEY_VAR).map(|key| {
            let mut config = SuggestConfig::new(key.trim());
            if let Some(model) = get(MODEL_VAR) {
                config = config.with_model(model.trim());
            }
            if let Some(url) = get(BASE_URL_VAR) {
                config = config.with_base_url(url.trim());
            }
            config
        });

        Ok(Self {
            ws_addr,
            http_addr,
            mailbox_capacity,
            suggest,
        })
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.ws_addr.to_string(),
            mailbox_capacity: self.mailbox_capacity,
        }
    }
}

fn parse_addr(var: &'static str, value: String) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidAddr { var, value, source })
}
