use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::dom::Document;

/// Heuristic view of whether the user is signed in to the target app.
///
/// This is pattern matching on what the page shows, not an auth check: it can
/// be wrong in both directions when the target changes its markup or its
/// sign-in addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedIn,
    LoggedOut,
    /// No evidence either way, usually a page still rendering. Never blocks.
    Indeterminate,
}

impl SessionState {
    pub fn blocks_injection(self) -> bool {
        matches!(self, SessionState::LoggedOut)
    }
}

pub struct SessionGuard<'a> {
    config: &'a SessionConfig,
}

impl<'a> SessionGuard<'a> {
    pub fn new(config: &'a SessionConfig) -> Self {
        Self { config }
    }

    /// Sign-in address evidence first, then authenticated indicators, else
    /// indeterminate. Links elsewhere on the page are never consulted.
    pub fn classify(&self, location: &str, doc: &dyn Document) -> SessionState {
        if let Some(pattern) = self.matching_login_pattern(location) {
            tracing::info!(location = %location, pattern = %pattern, "on a sign-in page");
            return SessionState::LoggedOut;
        }

        let indicators = &self.config.authenticated_indicators;
        if indicators.resolve(doc, None).is_some() {
            tracing::debug!("authenticated indicator present");
            return SessionState::LoggedIn;
        }

        tracing::debug!(
            indicators = %indicators,
            "no authenticated indicator yet; not blocking"
        );
        SessionState::Indeterminate
    }

    fn matching_login_pattern(&self, location: &str) -> Option<&'a str> {
        let address = address_of(location);
        self.config
            .login_url_patterns
            .iter()
            .map(String::as_str)
            .filter(|p| !p.is_empty())
            .find(|p| address.contains(&p.to_lowercase()))
    }
}

/// Lowercased scheme, host, port and path. Query and fragment are dropped so
/// carried text can never look like a sign-in address.
fn address_of(location: &str) -> String {
    match url::Url::parse(location) {
        Ok(url) => url[..url::Position::AfterPath].to_lowercase(),
        Err(_) => location
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase(),
    }
}
