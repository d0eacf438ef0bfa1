use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use crate::{Error, Result};

pub const LISTEN_ADDR_VAR: &str = "CONSOLE_LISTEN_ADDR";
pub const OPERATOR_API_URL_VAR: &str = "OPERATOR_API_URL";
pub const PARITY_DEBOUNCE_VAR: &str = "CONSOLE_PARITY_DEBOUNCE_MS";
pub const REQUEST_TIMEOUT_VAR: &str = "CONSOLE_REQUEST_TIMEOUT_SECS";

/// Runtime configuration, read from the environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Address the web server binds to
    pub listen_addr: SocketAddr,

    /// Base URL of the console API used by [`crate::api::ConsoleClient`]
    pub operator_api_url: String,

    /// Quiet period before a parity lookup is sent
    pub parity_debounce: Duration,

    /// Timeout applied to every outgoing request
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            operator_api_url: "http://localhost:9090".into(),
            parity_debounce: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            listen_addr: parse_var(&lookup, LISTEN_ADDR_VAR)?.unwrap_or(defaults.listen_addr),
            operator_api_url: lookup(OPERATOR_API_URL_VAR)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.operator_api_url),
            parity_debounce: parse_var(&lookup, PARITY_DEBOUNCE_VAR)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.parity_debounce),
            request_timeout: parse_var(&lookup, REQUEST_TIMEOUT_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        })
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::ConfigError(format!("invalid value `{raw}` for {key}")))
        })
        .transpose()
}
