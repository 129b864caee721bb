//! The negotiated credential pair and its wire text.

use std::fmt;

/// Separator between token and secret in the response text.
pub const SEPARATOR: char = ',';

/// Leading characters of a token kept by [`token_preview`].
const PREVIEW_CHARS: usize = 4;

/// OAuth credentials issued by the final negotiation stage.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    oauth_token: String,
    oauth_token_secret: String,
}

impl CredentialPair {
    pub fn new(oauth_token: impl Into<String>, oauth_token_secret: impl Into<String>) -> Self {
        Self {
            oauth_token: oauth_token.into(),
            oauth_token_secret: oauth_token_secret.into(),
        }
    }

    pub fn oauth_token(&self) -> &str {
        &self.oauth_token
    }

    pub fn oauth_token_secret(&self) -> &str {
        &self.oauth_token_secret
    }

    /// `"<oauth_token>,<oauth_token_secret>"`.
    pub fn to_response_text(&self) -> String {
        format_credentials(&self.oauth_token, &self.oauth_token_secret)
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("oauth_token", &token_preview(&self.oauth_token))
            .field("oauth_token_secret", &"<redacted>")
            .finish()
    }
}

/// Log form of a token: its first few characters and its length.
pub fn token_preview(token: &str) -> String {
    let head: String = token.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...({} chars)", token.chars().count())
}

/// Join token and secret with [`SEPARATOR`].
///
/// No escaping is done; neither value may contain the separator.
pub fn format_credentials(oauth_token: &str, oauth_token_secret: &str) -> String {
    let mut text = String::with_capacity(oauth_token.len() + oauth_token_secret.len() + 1);
    text.push_str(oauth_token);
    text.push(SEPARATOR);
    text.push_str(oauth_token_secret);
    text
}
