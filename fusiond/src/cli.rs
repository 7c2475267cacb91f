//! Module describing all possible options to the `fusiond` daemon.
//!

use std::path::PathBuf;

use clap::{crate_authors, crate_description, crate_name, crate_version, Parser};

/// CLI options
#[derive(Debug, Parser)]
#[command(disable_version_flag = true)]
#[clap(name = crate_name!(), about = crate_description!())]
#[clap(version = crate_version!(), author = crate_authors!())]
pub struct Opts {
    /// configuration file (HCL).
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Tracking poll cadence in seconds, overrides the config file.
    #[clap(long)]
    pub tracking_interval: Option<u64>,
    /// Events poll cadence in seconds, overrides the config file.
    #[clap(long)]
    pub events_interval: Option<u64>,
    /// Hierarchical span output instead of the compact format.
    #[clap(short = 'T', long)]
    pub tree: bool,
    /// Verbose mode.
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
