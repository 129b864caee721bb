//! One external credential request: load endpoints, race, format.

use std::sync::Arc;

use tracing::instrument;

use crate::error::Result;
use crate::negotiation::Negotiator;
use crate::proxy_list::ProxyListSource;
use crate::race::{RaceConfig, RaceCoordinator};

#[derive(Debug, Clone)]
pub struct TokenService {
    source: ProxyListSource,
    coordinator: RaceCoordinator,
}

impl TokenService {
    pub fn new(source: ProxyListSource, negotiator: Negotiator, race: RaceConfig) -> Self {
        Self {
            source,
            coordinator: RaceCoordinator::new(Arc::new(negotiator), race),
        }
    }

    pub fn coordinator(&self) -> &RaceCoordinator {
        &self.coordinator
    }

    /// Acquire one credential pair and return its response text.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<String> {
        let endpoints = self.source.fetch().await?;
        let win = self.coordinator.race(endpoints).await?;
        Ok(win.credentials.to_response_text())
    }
}
