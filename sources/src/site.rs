//! Module that defines what a site (API endpoint) is.
//!
//! Sites can have different ways to authenticate the request: some take an
//! API key in the query string on every call, some want a per-request
//! header, some nothing at all.
//!

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded request timeout applied when a site does not specify one.
///
pub const DEFAULT_TIMEOUT: u64 = 10;

/// Describe what a site is and associated credentials.
///
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Site {
    /// Name of the site
    pub name: String,
    /// Base URL (to avoid repeating)
    pub base_url: String,
    /// Credentials
    pub auth: Option<Auth>,
    /// Different URLs available
    pub routes: Option<BTreeMap<String, String>>,
    /// Request timeout in seconds
    pub timeout: Option<u64>,
}

impl Site {
    pub fn new(name: &str, base_url: &str) -> Self {
        Site {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: None,
            routes: None,
            timeout: None,
        }
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Override the named route.
    ///
    pub fn add_route(mut self, name: &str, target: &str) -> Self {
        self.routes
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), target.to_string());
        self
    }

    /// Return the named route, if the site defines one.
    ///
    pub fn route(&self, name: &str) -> Option<&str> {
        self.routes.as_ref()?.get(name).map(|s| s.as_str())
    }

    /// Timeout as a `Duration`, falling back to the default.
    ///
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
    }
}

/// Describe the possible ways to authenticate oneself.
///
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Auth {
    /// Nothing special, no auth
    #[default]
    Anon,
    /// Using an API key supplied through the URL on every call
    Key { api_key: String },
    /// Using a fixed header on every call (e.g. `x-user-id`)
    Header { name: String, value: String },
}

impl Display for Auth {
    /// Obfuscate the keys
    ///
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let auth = match self.clone() {
            Auth::Key { .. } => Auth::Key {
                api_key: "HIDDEN".to_string(),
            },
            Auth::Header { name, .. } => Auth::Header {
                name,
                value: "HIDDEN".to_string(),
            },
            _ => Auth::Anon,
        };
        write!(f, "{:?}", auth)
    }
}
