//! fm-track style tracking provider specifics.
//!
//! Single call API: `GET {base_url}/objects` returns the current list of
//! vehicles with their last known position.  The API key travels in the
//! query string on every call (so there is no token to cache or refresh).
//!
//! This implements the `Fetchable` trait described in `lib.rs`.
//!

use async_trait::async_trait;
use clap::{crate_name, crate_version};
use reqwest::{Client, StatusCode};
use tracing::{debug, trace};

use fleetfusion_formats::{FmObject, VehicleState};

use crate::{Auth, FetchError, Fetchable, Records, Site};

/// Default route for the vehicle list
const DEF_GET: &str = "/objects";

/// Tracking represents what is needed to connect to and fetch vehicle
/// positions from an fm-track style site.
///
#[derive(Clone, Debug)]
pub struct Tracking {
    /// Name of the site (site "foo" may use the same interface)
    pub site: String,
    /// Base site url taken from config
    pub base_url: String,
    /// Add this to `base_url` to fetch data
    pub get: String,
    /// API key, passed in the query string
    pub api_key: Option<String>,
    /// reqwest client
    pub client: Client,
}

impl Tracking {
    #[tracing::instrument]
    pub fn new() -> Self {
        trace!("tracking::new");

        Tracking {
            site: "NONE".to_string(),
            base_url: "".to_owned(),
            get: DEF_GET.to_owned(),
            api_key: None,
            client: Client::new(),
        }
    }

    /// Load site data from the in-memory loaded config.
    ///
    #[tracing::instrument]
    pub fn load(&mut self, site: &Site) -> &mut Self {
        trace!("tracking::load");

        self.site = site.name.clone();
        self.base_url = site.base_url.clone();
        if let Some(route) = site.route("get") {
            self.get = route.to_owned();
        }
        if let Some(Auth::Key { api_key }) = &site.auth {
            self.api_key = Some(api_key.clone());
        }
        self.client = Client::builder()
            .user_agent(format!("{}/{}", crate_name!(), crate_version!()))
            .timeout(site.timeout())
            .build()
            .unwrap_or_default();
        self
    }
}

impl Default for Tracking {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetchable for Tracking {
    fn name(&self) -> String {
        self.site.clone()
    }

    /// Single call API, no pagination.
    ///
    #[tracing::instrument(skip(self))]
    async fn fetch(&self) -> Result<Records, FetchError> {
        trace!("tracking::fetch");

        let url = format!("{}{}", self.base_url, self.get);
        trace!("Fetching data from {}…", url);

        let mut req = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .query(&[("version", "1")]);
        if let Some(key) = &self.api_key {
            req = req.query(&[("api_key", key.as_str())]);
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
        let raw: Vec<FmObject> = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        // One bad record poisons the whole answer, the schema is not
        // negotiable per-record.
        //
        let vehicles = raw
            .iter()
            .map(VehicleState::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        debug!("{} vehicles from {}", vehicles.len(), self.site);
        Ok(Records::Vehicles(vehicles))
    }
}
