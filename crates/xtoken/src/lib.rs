//! Guest OAuth credential negotiation, raced across egress proxies.
//!
//! Each egress endpoint gets its own client and runs the guest → flow →
//! oauth exchange; the first endpoint to finish supplies the credentials.

pub mod credentials;
pub mod error;
pub mod negotiation;
pub mod proxy;
pub mod proxy_list;
pub mod race;
pub mod service;

pub use credentials::{CredentialPair, format_credentials, token_preview};
pub use error::{
    AttemptError, EndpointError, Error, ErrorKind, ProxyListError, RaceError, Result, Stage,
    StageError,
};
pub use negotiation::{AttemptOutcome, Negotiator, PlatformApi};
pub use proxy::{ClientOptions, EgressClientFactory, EgressEndpoint, ProxyScheme};
pub use proxy_list::{ProxyListSource, parse_endpoint_list};
pub use race::{RaceConfig, RaceCoordinator, RaceWin, WinnerSlot};
pub use service::TokenService;
