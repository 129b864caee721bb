use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::{Client, Proxy};
use tracing::debug;
use url::Url;

use crate::error::EndpointError;

/// Proxy protocol spoken by egress endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyScheme {
    /// SOCKS5, target hostnames resolved locally
    #[default]
    Socks5,
    /// SOCKS5, target hostnames resolved by the proxy
    Socks5h,
    /// Plain HTTP proxy
    Http,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Socks5 => "socks5",
            ProxyScheme::Socks5h => "socks5h",
            ProxyScheme::Http => "http",
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socks5" => Ok(ProxyScheme::Socks5),
            "socks5h" => Ok(ProxyScheme::Socks5h),
            "http" => Ok(ProxyScheme::Http),
            other => Err(format!("unsupported proxy scheme `{other}`")),
        }
    }
}

/// Address of one egress proxy, as it appeared in the endpoint list.
///
/// Kept opaque until a client is built for it; validation happens in
/// [`EgressClientFactory::build`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EgressEndpoint(String);

impl EgressEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the address into a proxy URL under `scheme`.
    ///
    /// Addresses that already carry a scheme (`socks5://host:port`) keep it.
    pub fn proxy_url(&self, scheme: ProxyScheme) -> Result<Url, EndpointError> {
        let address = self.0.trim();
        if address.is_empty() {
            return Err(EndpointError::Empty);
        }

        let raw = if address.contains("://") {
            address.to_string()
        } else {
            format!("{scheme}://{address}")
        };

        let url = Url::parse(&raw).map_err(|e| EndpointError::invalid(address, e.to_string()))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(EndpointError::invalid(address, "missing host"));
        }
        if url.port().is_none() {
            return Err(EndpointError::MissingPort {
                input: address.to_string(),
            });
        }
        Ok(url)
    }
}

impl fmt::Display for EgressEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EgressEndpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Transport settings applied to every per-endpoint client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub scheme: ProxyScheme,
    /// Timeout for one request, including reading the body
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            scheme: ProxyScheme::Socks5,
            request_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Builds one network client per egress endpoint.
///
/// Nothing is connected here: connection failures surface when the first
/// request is sent.
#[derive(Debug, Clone, Default)]
pub struct EgressClientFactory {
    options: ClientOptions,
}

impl EgressClientFactory {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Build a client tunnelling all traffic through `endpoint`.
    pub fn build(&self, endpoint: &EgressEndpoint) -> Result<Client, EndpointError> {
        install_rustls_provider();

        let url = endpoint.proxy_url(self.options.scheme)?;
        let client_err = |source| EndpointError::Client {
            input: endpoint.to_string(),
            source,
        };

        let proxy = Proxy::all(url.as_str()).map_err(client_err)?;

        let mut builder = Client::builder()
            .proxy(proxy)
            .pool_max_idle_per_host(1)
            .connect_timeout(self.options.connect_timeout);
        if self.options.request_timeout > Duration::ZERO {
            builder = builder.timeout(self.options.request_timeout);
        }

        builder.build().map_err(client_err)
    }
}
