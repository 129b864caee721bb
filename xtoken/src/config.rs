//! Process configuration, read once at startup.

use std::path::PathBuf;
use std::time::Duration;

use xtoken_engine::negotiation::DEFAULT_BEARER;
use xtoken_engine::{
    ClientOptions, EgressClientFactory, Negotiator, PlatformApi, ProxyListSource, ProxyScheme,
    RaceConfig, TokenService,
};

use crate::api::server::ApiServerConfig;
use crate::error::{Error, Result};

/// Everything the service needs, resolved from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bearer credential sent to the platform
    pub authorization: String,
    /// Newline-delimited egress endpoint list
    pub proxy_list_url: String,
    pub proxy_list_timeout: Duration,
    /// Shared secret an inbound request must present as `token`
    pub shared_secret: String,
    pub server: ApiServerConfig,
    pub proxy_scheme: ProxyScheme,
    pub race_deadline: Duration,
    pub attempt_timeout: Duration,
    pub max_in_flight: Option<usize>,
    /// Directory for rolling log files, if any
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load from process environment variables.
    ///
    /// Supported env vars:
    /// - `AUTHORIZATION` (optional, defaults to the public mobile bearer)
    /// - `PROXY_LIST_URL` (required)
    /// - `TOKEN` (required)
    /// - `API_BIND_ADDRESS`, `API_PORT`
    /// - `PROXY_SCHEME` (`socks5`, `socks5h` or `http`)
    /// - `RACE_DEADLINE_SECS`, `ATTEMPT_TIMEOUT_SECS`, `PROXY_LIST_TIMEOUT_SECS`
    /// - `MAX_IN_FLIGHT`
    /// - `LOG_DIR`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let proxy_list_url = get("PROXY_LIST_URL")
            .ok_or_else(|| Error::config("PROXY_LIST_URL is not set"))?;
        let shared_secret =
            get("TOKEN").ok_or_else(|| Error::config("TOKEN is not set"))?;

        let mut server = ApiServerConfig::default();
        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            server.bind_address = bind_address;
        }
        if let Some(port) = get("API_PORT") {
            server.port = parse_value("API_PORT", &port)?;
        }

        let proxy_scheme = match get("PROXY_SCHEME") {
            Some(scheme) => scheme
                .parse()
                .map_err(|e| Error::config(format!("PROXY_SCHEME: {e}")))?,
            None => ProxyScheme::default(),
        };

        let secs = |key: &str, default: u64| -> Result<Duration> {
            match get(key) {
                Some(value) => Ok(Duration::from_secs(parse_value(key, &value)?)),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let race_deadline = secs("RACE_DEADLINE_SECS", 10)?;
        if race_deadline.is_zero() {
            return Err(Error::config("RACE_DEADLINE_SECS must be greater than 0"));
        }

        let max_in_flight = match get("MAX_IN_FLIGHT") {
            Some(value) => match parse_value::<usize>("MAX_IN_FLIGHT", &value)? {
                0 => None,
                n => Some(n),
            },
            None => None,
        };

        Ok(Self {
            authorization: get("AUTHORIZATION").unwrap_or_else(|| DEFAULT_BEARER.to_string()),
            proxy_list_url,
            proxy_list_timeout: secs("PROXY_LIST_TIMEOUT_SECS", 10)?,
            shared_secret,
            server,
            proxy_scheme,
            race_deadline,
            attempt_timeout: secs("ATTEMPT_TIMEOUT_SECS", 3)?,
            max_in_flight,
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn race_config(&self) -> RaceConfig {
        RaceConfig {
            deadline: self.race_deadline,
            max_in_flight: self.max_in_flight,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            scheme: self.proxy_scheme,
            request_timeout: self.attempt_timeout,
            ..ClientOptions::default()
        }
    }

    /// Wire up the token service described by this configuration.
    pub fn build_token_service(&self) -> Result<TokenService> {
        let api = PlatformApi::new(&self.authorization)?;
        let negotiator = Negotiator::new(api, EgressClientFactory::new(self.client_options()));
        let source = ProxyListSource::new(&self.proxy_list_url, self.proxy_list_timeout)?;
        Ok(TokenService::new(source, negotiator, self.race_config()))
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::config(format!("{key}: invalid value `{value}`: {e}")))
}
