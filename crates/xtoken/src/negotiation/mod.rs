//! The three-stage guest → flow → oauth negotiation for one egress endpoint.

pub mod models;

use std::time::Instant;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialPair, token_preview};
use crate::error::{AttemptError, Stage, StageError};
use crate::proxy::{EgressClientFactory, EgressEndpoint};

use self::models::{FlowStart, GuestActivation, OpenAccount, StageResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
pub const MOBILE_USER_AGENT: &str = "TwitterAndroid/10.10.0";
pub const DEFAULT_BEARER: &str = "AAAAAAAAAAAAAAAAAAAAAFXzAwAAAAAAMHCxpeSDG1gLNLghVe8d74hl6k4%3DRUMF4xAQLsbeBhTSRrCiQpJtxoGWeyHrDb5te2jpGskWDFW82F";

const GUEST_ACTIVATE_PATH: &str = "/1.1/guest/activate.json";
const ONBOARDING_TASK_PATH: &str = "/1.1/onboarding/task.json";
const WELCOME_FLOW: &str = "welcome";
const GUEST_TOKEN_HEADER: &str = "x-guest-token";

/// Outcome of one endpoint's negotiation.
pub type AttemptOutcome = Result<CredentialPair, AttemptError>;

/// Fixed request surface of the credential-issuing platform.
#[derive(Debug, Clone)]
pub struct PlatformApi {
    base_url: String,
    authorization: HeaderValue,
}

impl PlatformApi {
    /// `bearer` may be given with or without its `Bearer ` prefix.
    pub fn new(bearer: &str) -> Result<Self, crate::Error> {
        Self::with_base_url(DEFAULT_BASE_URL, bearer)
    }

    pub fn with_base_url(base_url: impl Into<String>, bearer: &str) -> Result<Self, crate::Error> {
        let bearer = bearer.trim();
        if bearer.is_empty() {
            return Err(crate::Error::config("authorization bearer is empty"));
        }
        let value = if bearer.starts_with("Bearer ") {
            bearer.to_string()
        } else {
            format!("Bearer {bearer}")
        };
        let mut authorization = HeaderValue::from_str(&value)
            .map_err(|e| crate::Error::config(format!("invalid authorization bearer: {e}")))?;
        authorization.set_sensitive(true);

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authorization,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn guest_activate_url(&self) -> String {
        format!("{}{GUEST_ACTIVATE_PATH}", self.base_url)
    }

    fn onboarding_task_url(&self) -> String {
        format!("{}{ONBOARDING_TASK_PATH}", self.base_url)
    }
}

/// Per-attempt state. Owned by exactly one pipeline and dropped with it.
#[derive(Debug, Default)]
struct NegotiationState {
    guest_token: Option<String>,
    flow_token: Option<String>,
}

/// A live negotiation over one client.
///
/// The client is built for this session only and released when it ends.
struct Session<'a> {
    api: &'a PlatformApi,
    client: Client,
    endpoint: &'a EgressEndpoint,
    cancel: &'a CancellationToken,
    state: NegotiationState,
}

impl Session<'_> {
    async fn activate_guest(&mut self) -> Result<(), StageError> {
        let request = self
            .client
            .post(self.api.guest_activate_url())
            .header(AUTHORIZATION, self.api.authorization.clone());
        let record: GuestActivation = self.exchange(Stage::Guest, request).await?;

        debug!(
            endpoint = %self.endpoint,
            guest_token = %token_preview(&record.guest_token),
            "Got guest token"
        );
        self.state.guest_token = Some(record.guest_token);
        Ok(())
    }

    async fn start_flow(&mut self) -> Result<(), StageError> {
        let request = self
            .onboarding_request()
            .query(&[("flow_name", WELCOME_FLOW)])
            .json(&models::flow_start_body());
        let record: FlowStart = self.exchange(Stage::Flow, request).await?;

        debug!(
            endpoint = %self.endpoint,
            flow_token = %token_preview(&record.flow_token),
            "Got flow token"
        );
        self.state.flow_token = Some(record.flow_token);
        Ok(())
    }

    async fn open_account(&mut self) -> Result<CredentialPair, StageError> {
        let flow_token = self.state.flow_token.as_deref().unwrap_or_default();
        let request = self
            .onboarding_request()
            .json(&models::open_account_body(flow_token));
        let record: OpenAccount = self.exchange(Stage::OAuth, request).await?;

        Ok(CredentialPair::new(
            record.oauth_token,
            record.oauth_token_secret,
        ))
    }

    fn onboarding_request(&self) -> RequestBuilder {
        let guest_token = self.state.guest_token.as_deref().unwrap_or_default();
        self.client
            .post(self.api.onboarding_task_url())
            .header(AUTHORIZATION, self.api.authorization.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, MOBILE_USER_AGENT)
            .header(GUEST_TOKEN_HEADER, guest_token)
    }

    /// Send `request`, read and validate the body. Abandons the request as
    /// soon as the shared token is cancelled.
    async fn exchange<T: StageResponse>(
        &self,
        stage: Stage,
        request: RequestBuilder,
    ) -> Result<T, StageError> {
        let roundtrip = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, StageError>((status, body))
        };

        let (status, body) = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(StageError::Cancelled),
            result = roundtrip => result?,
        };

        debug!(
            endpoint = %self.endpoint,
            %stage,
            status = status.as_u16(),
            bytes = body.len(),
            "Stage response received"
        );

        let value: Value =
            serde_json::from_slice(&body).map_err(|source| StageError::Decode { status, source })?;
        T::from_json(&value)
    }
}

/// Runs the negotiation pipeline for one endpoint at a time.
#[derive(Debug, Clone)]
pub struct Negotiator {
    api: PlatformApi,
    factory: EgressClientFactory,
}

impl Negotiator {
    pub fn new(api: PlatformApi, factory: EgressClientFactory) -> Self {
        Self { api, factory }
    }

    pub fn api(&self) -> &PlatformApi {
        &self.api
    }

    /// Negotiate credentials through `endpoint`.
    ///
    /// Stages run strictly in order; the first failure ends the attempt.
    pub async fn negotiate(
        &self,
        endpoint: &EgressEndpoint,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let started = Instant::now();
        let outcome = self.run(endpoint, cancel).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(pair) => info!(
                endpoint = %endpoint,
                oauth_token = %token_preview(pair.oauth_token()),
                elapsed_ms,
                "Negotiation succeeded"
            ),
            Err(AttemptError::Stage { stage, cause }) if cause.is_cancelled() => debug!(
                endpoint = %endpoint,
                %stage,
                elapsed_ms,
                "Negotiation abandoned"
            ),
            Err(AttemptError::Stage { stage, cause }) => warn!(
                endpoint = %endpoint,
                %stage,
                kind = %cause.kind(),
                error = %cause,
                elapsed_ms,
                "Negotiation failed"
            ),
            Err(err) => warn!(endpoint = %endpoint, error = %err, "Negotiation not started"),
        }

        outcome
    }

    async fn run(&self, endpoint: &EgressEndpoint, cancel: &CancellationToken) -> AttemptOutcome {
        let client = self.factory.build(endpoint)?;
        debug!(endpoint = %endpoint, "Trying endpoint");

        let mut session = Session {
            api: &self.api,
            client,
            endpoint,
            cancel,
            state: NegotiationState::default(),
        };

        session
            .activate_guest()
            .await
            .map_err(|e| AttemptError::stage(Stage::Guest, e))?;
        session
            .start_flow()
            .await
            .map_err(|e| AttemptError::stage(Stage::Flow, e))?;
        session
            .open_account()
            .await
            .map_err(|e| AttemptError::stage(Stage::OAuth, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_prefix_added() {
        let api = PlatformApi::new("abc").unwrap();
        assert_eq!(api.authorization.to_str().unwrap(), "Bearer abc");
        assert!(api.authorization.is_sensitive());

        let api = PlatformApi::new("Bearer abc").unwrap();
        assert_eq!(api.authorization.to_str().unwrap(), "Bearer abc");
    }

    #[test]
    fn test_bearer_rejected_when_empty_or_invalid() {
        assert!(PlatformApi::new("   ").is_err());
        assert!(PlatformApi::new("bad\nvalue").is_err());
    }

    #[test]
    fn test_urls() {
        let api = PlatformApi::with_base_url("http://api.test/", DEFAULT_BEARER).unwrap();
        assert_eq!(api.base_url(), "http://api.test");
        assert_eq!(
            api.guest_activate_url(),
            "http://api.test/1.1/guest/activate.json"
        );
        assert_eq!(
            api.onboarding_task_url(),
            "http://api.test/1.1/onboarding/task.json"
        );
    }

    #[tokio::test]
    async fn test_malformed_endpoint_fails_before_any_stage() {
        let negotiator = Negotiator::new(
            PlatformApi::new(DEFAULT_BEARER).unwrap(),
            EgressClientFactory::default(),
        );
        let cancel = CancellationToken::new();
        let err = negotiator
            .negotiate(&EgressEndpoint::new("missing-port"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::Endpoint(_)));
        assert_eq!(err.failed_stage(), None);
    }

    #[tokio::test]
    async fn test_cancelled_token_abandons_first_stage() {
        let negotiator = Negotiator::new(
            PlatformApi::new(DEFAULT_BEARER).unwrap(),
            EgressClientFactory::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = negotiator
            .negotiate(&EgressEndpoint::new("127.0.0.1:9"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::Guest));
        assert!(err.is_cancelled());
    }
}
