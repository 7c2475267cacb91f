//! Module to deal with the different kind of sources we can connect to to
//! fetch data.
//!
//! The different submodules deal with the differences between sources:
//!
//! - authentication (API key in the query string, per-request header)
//! - fetching data and normalizing the answer
//!
//! Every source implements [`Fetchable`] and yields [`Records`]; the poller
//! never has to know which upstream it is driving.
//!

use std::fmt::Debug;

use async_trait::async_trait;

use fleetfusion_formats::{Event, VehicleState};

// Re-export these modules for a shorter import path.
//
pub use error::*;
pub use events::*;
pub use site::*;
pub use tracking::*;

mod error;
mod events;
mod site;
mod tracking;

/// One fetch cycle worth of normalized records, whatever the source.
///
#[derive(Clone, Debug)]
pub enum Records {
    Vehicles(Vec<VehicleState>),
    Events(Vec<Event>),
}

impl Records {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Records::Vehicles(v) => v.len(),
            Records::Events(e) => e.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// This trait enables us to manage different ways of connecting and fetching
/// data under a single interface.
///
/// Adapters are stateless between calls; every `fetch()` is a full request
/// with a bounded timeout, errors are returned to the caller and never
/// retried here.
///
#[async_trait]
pub trait Fetchable: Debug + Send + Sync {
    /// Return the source's name
    fn name(&self) -> String;
    /// Fetch and normalize the current batch of records
    async fn fetch(&self) -> Result<Records, FetchError>;
}
