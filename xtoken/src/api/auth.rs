//! Shared-secret check for the credential endpoint.

use std::fmt;
use std::sync::Arc;

use subtle::ConstantTimeEq;

/// The static secret an inbound request must present.
#[derive(Clone)]
pub struct SharedSecret(Arc<str>);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::from(secret.into()))
    }

    /// Constant-time comparison against the provided value.
    pub fn verify(&self, provided: Option<&str>) -> bool {
        match provided {
            Some(token) => token.as_bytes().ct_eq(self.0.as_bytes()).into(),
            None => false,
        }
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}
