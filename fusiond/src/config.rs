//! Daemon configuration.
//!
//! Two layers, deliberately separate:
//!
//! - the two base URLs (and credentials) come from the environment, they
//!   are deployment-specific and required — a missing base URL is the only
//!   fatal error in the whole daemon
//! - tuning knobs (cadences, retention, backoff, timeout) come from an
//!   optional versioned HCL file with sensible defaults
//!

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use fleetfusion_sources::{Auth, Site};

/// Environment variable holding the tracking API base URL
pub const FM_API_BASE: &str = "FM_API_BASE";
/// Environment variable holding the events API base URL
pub const EVENTS_BASE: &str = "EVENTS_BASE";
/// Optional tracking API key
pub const FM_API_KEY: &str = "FM_API_KEY";
/// Optional events caller id, sent as `x-user-id`
pub const EVENTS_USER_ID: &str = "EVENTS_USER_ID";

/// Default events caller id
const DEF_USER_ID: &str = "user_1";

/// Configuration file version
const CONFIG_VERSION: usize = 1;

/// Errors around configuration loading.  `Missing` is the fatal startup
/// condition from the error taxonomy, everything else is file trouble.
///
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("Can not read {0}")]
    Unreadable(PathBuf),
    #[error("Bad configuration file: {0}")]
    Parse(String),
    #[error("Bad configuration version {0}, expected {CONFIG_VERSION}")]
    BadVersion(usize),
}

/// Tuning knobs, all with defaults.  Loaded from `fusiond.hcl` when given.
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FusiondConfig {
    /// Version of the configuration file format
    #[serde(default = "def_version")]
    pub version: usize,
    /// Tracking poll cadence in seconds
    #[serde(default = "def_tracking_interval")]
    pub tracking_interval: u64,
    /// Events poll cadence in seconds
    #[serde(default = "def_events_interval")]
    pub events_interval: u64,
    /// Event retention window in seconds
    #[serde(default = "def_retention")]
    pub retention: i64,
    /// Backoff base in seconds
    #[serde(default = "def_backoff_base")]
    pub backoff_base: u64,
    /// Backoff cap in seconds
    #[serde(default = "def_backoff_cap")]
    pub backoff_cap: u64,
    /// Consecutive failures before a source is flagged degraded
    #[serde(default = "def_degraded_after")]
    pub degraded_after: u32,
    /// Request timeout in seconds
    #[serde(default = "def_timeout")]
    pub timeout: u64,
    /// Route override for the tracking fetch (default `/objects`)
    #[serde(default)]
    pub tracking_route: Option<String>,
    /// Route override for the events fetch (default `/events`)
    #[serde(default)]
    pub events_route: Option<String>,
}

fn def_version() -> usize {
    CONFIG_VERSION
}
fn def_tracking_interval() -> u64 {
    5
}
fn def_events_interval() -> u64 {
    30
}
fn def_retention() -> i64 {
    3600
}
fn def_backoff_base() -> u64 {
    1
}
fn def_backoff_cap() -> u64 {
    30
}
fn def_degraded_after() -> u32 {
    5
}
fn def_timeout() -> u64 {
    10
}

impl Default for FusiondConfig {
    fn default() -> Self {
        FusiondConfig {
            version: CONFIG_VERSION,
            tracking_interval: def_tracking_interval(),
            events_interval: def_events_interval(),
            retention: def_retention(),
            backoff_base: def_backoff_base(),
            backoff_cap: def_backoff_cap(),
            degraded_after: def_degraded_after(),
            timeout: def_timeout(),
            tracking_route: None,
            events_route: None,
        }
    }
}

impl FusiondConfig {
    /// Load the configuration file if one was given, else the defaults.
    ///
    #[tracing::instrument]
    pub fn load(fname: Option<&PathBuf>) -> Result<Self, ConfigError> {
        trace!("config::load");

        let cfg: FusiondConfig = match fname {
            Some(fname) => {
                let data =
                    fs::read_to_string(fname).map_err(|_| ConfigError::Unreadable(fname.into()))?;
                hcl::from_str(&data).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            None => FusiondConfig::default(),
        };
        debug!("config = {:?}", cfg);

        if cfg.version != CONFIG_VERSION {
            return Err(ConfigError::BadVersion(cfg.version));
        }
        Ok(cfg)
    }

    /// Build the two `Site` descriptions from the environment.
    ///
    /// Absence of either base URL is fatal; credentials are optional.
    ///
    #[tracing::instrument(skip(self))]
    pub fn sites(&self) -> Result<(Site, Site), ConfigError> {
        trace!("config::sites");

        let fm_base = std::env::var(FM_API_BASE).map_err(|_| ConfigError::Missing(FM_API_BASE))?;
        let ev_base = std::env::var(EVENTS_BASE).map_err(|_| ConfigError::Missing(EVENTS_BASE))?;

        let mut tracking = Site::new("fm-track", &fm_base);
        tracking.timeout = Some(self.timeout);
        if let Ok(key) = std::env::var(FM_API_KEY) {
            tracking = tracking.auth(Auth::Key { api_key: key });
        }
        if let Some(route) = &self.tracking_route {
            tracking = tracking.add_route("get", route);
        }

        let user = std::env::var(EVENTS_USER_ID).unwrap_or_else(|_| DEF_USER_ID.to_string());
        let mut events = Site::new("events", &ev_base).auth(Auth::Header {
            name: "x-user-id".to_string(),
            value: user,
        });
        events.timeout = Some(self.timeout);
        if let Some(route) = &self.events_route {
            events = events.add_route("get", route);
        }

        Ok((tracking, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = FusiondConfig::default();
        assert_eq!(CONFIG_VERSION, cfg.version);
        assert_eq!(5, cfg.tracking_interval);
        assert_eq!(30, cfg.events_interval);
        assert_eq!(3600, cfg.retention);
        assert_eq!(5, cfg.degraded_after);
    }

    #[test]
    fn test_load_hcl() {
        let cfg: FusiondConfig = hcl::from_str(
            r#"
version = 1
tracking_interval = 2
events_interval = 60
"#,
        )
        .unwrap();
        assert_eq!(2, cfg.tracking_interval);
        assert_eq!(60, cfg.events_interval);
        // untouched knobs keep their defaults
        //
        assert_eq!(3600, cfg.retention);
    }

    #[test]
    fn test_bad_version_rejected() {
        let fname = std::env::temp_dir().join("fusiond-bad-version.hcl");
        fs::write(&fname, "version = 2").unwrap();

        let res = FusiondConfig::load(Some(&fname));
        let _ = fs::remove_file(&fname);
        assert!(matches!(res, Err(ConfigError::BadVersion(2))));
    }

    #[test]
    fn test_unreadable_file() {
        let fname = PathBuf::from("/nonexistent/fusiond.hcl");
        assert!(matches!(
            FusiondConfig::load(Some(&fname)),
            Err(ConfigError::Unreadable(_))
        ));
    }

    // Single test for everything env-driven so parallel test threads do
    // not race on the process environment.
    //
    #[test]
    fn test_sites_from_env() {
        std::env::remove_var(FM_API_BASE);
        std::env::remove_var(EVENTS_BASE);

        let mut cfg = FusiondConfig::default();

        // Each missing base URL is fatal, in turn
        //
        assert!(matches!(
            cfg.sites(),
            Err(ConfigError::Missing(v)) if v == FM_API_BASE
        ));

        std::env::set_var(FM_API_BASE, "https://api.fm-track.example/");
        assert!(matches!(
            cfg.sites(),
            Err(ConfigError::Missing(v)) if v == EVENTS_BASE
        ));

        std::env::set_var(EVENTS_BASE, "http://127.0.0.1:9877/api");
        cfg.tracking_route = Some("/v2/objects".to_string());

        let (tracking, events) = cfg.sites().unwrap();
        assert_eq!("https://api.fm-track.example", tracking.base_url);
        assert_eq!(Some("/v2/objects"), tracking.route("get"));
        assert_eq!(None, events.route("get"));
        assert!(matches!(events.auth, Some(Auth::Header { .. })));

        std::env::remove_var(FM_API_BASE);
        std::env::remove_var(EVENTS_BASE);
    }
}
