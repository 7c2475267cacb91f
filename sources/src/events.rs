//! Events service specifics.
//!
//! `GET {base_url}/events` returns recent domain events (stops, refuels,
//! drains, …).  The service identifies the caller through the `x-user-id`
//! header and takes an explicit `from`/`to` window; we always ask for the
//! last `window` seconds so the upstream window and the store's retention
//! window agree.
//!

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clap::{crate_name, crate_version};
use reqwest::{Client, StatusCode};
use tracing::{debug, trace};

use fleetfusion_formats::{Event, RawEvent};

use crate::{Auth, FetchError, Fetchable, Records, Site};

/// Default route for recent events
const DEF_GET: &str = "/events";

/// Default lookback window in seconds
const DEF_WINDOW: i64 = 3600;

/// Return ISO 8601 UTC string with Z suffix, the format the events API
/// expects in its query string.
///
pub fn to_iso_z(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Events represents what is needed to connect to and fetch recent domain
/// events from the events service.
///
#[derive(Clone, Debug)]
pub struct Events {
    /// Name of the site
    pub site: String,
    /// Base site url taken from config
    pub base_url: String,
    /// Add this to `base_url` to fetch data
    pub get: String,
    /// Identification header (`x-user-id` style), sent on every call
    pub header: Option<(String, String)>,
    /// Lookback window in seconds
    pub window: i64,
    /// reqwest client
    pub client: Client,
}

impl Events {
    #[tracing::instrument]
    pub fn new() -> Self {
        trace!("events::new");

        Events {
            site: "NONE".to_string(),
            base_url: "".to_owned(),
            get: DEF_GET.to_owned(),
            header: None,
            window: DEF_WINDOW,
            client: Client::new(),
        }
    }

    /// Load site data from the in-memory loaded config.
    ///
    #[tracing::instrument]
    pub fn load(&mut self, site: &Site) -> &mut Self {
        trace!("events::load");

        self.site = site.name.clone();
        self.base_url = site.base_url.clone();
        if let Some(route) = site.route("get") {
            self.get = route.to_owned();
        }
        if let Some(Auth::Header { name, value }) = &site.auth {
            self.header = Some((name.clone(), value.clone()));
        }
        self.client = Client::builder()
            .user_agent(format!("{}/{}", crate_name!(), crate_version!()))
            .timeout(site.timeout())
            .build()
            .unwrap_or_default();
        self
    }

    /// Size the lookback window (seconds).
    ///
    pub fn window(&mut self, secs: i64) -> &mut Self {
        self.window = secs;
        self
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetchable for Events {
    fn name(&self) -> String {
        self.site.clone()
    }

    /// Fetch the last `window` seconds worth of events.
    ///
    #[tracing::instrument(skip(self))]
    async fn fetch(&self) -> Result<Records, FetchError> {
        trace!("events::fetch");

        let url = format!("{}{}", self.base_url, self.get);
        let to = Utc::now();
        let from = to - Duration::seconds(self.window);
        trace!("Fetching data from {}…", url);

        let mut req = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .query(&[("from", to_iso_z(from)), ("to", to_iso_z(to))]);
        if let Some((name, value)) = &self.header {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let body = resp.text().await?;
        let raw: Vec<RawEvent> = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        let events = raw
            .iter()
            .map(Event::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        debug!("{} events from {}", events.len(), self.site);
        Ok(Records::Events(events))
    }
}
