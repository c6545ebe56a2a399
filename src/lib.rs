//! Defines the CloudFormation stacks of a scalable web tier: a network,
//! an optional database, a compute layer behind a load balancer, and a
//! CloudFront distribution in `us-east-1` in front of it.
//!
//! ```no_run
//! use webtier::app::{App, HandoffState};
//! use webtier::config::{Overrides, ParametersFile};
//! use webtier::params::{AppParams, ContextLookups};
//!
//! # fn main() -> webtier::Result<()> {
//! let file = ParametersFile::load("parameters.toml")?;
//! let config = file.environment(&Overrides::default())?;
//! let params = AppParams::derive(config, ContextLookups::default())?;
//! let app = App::define(params, &HandoffState::NotPublished)?;
//! webtier::synth::synth(&app, std::path::Path::new("cdk.out"))?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod cidr;
pub mod config;
pub mod error;
pub mod intrinsics;
pub mod params;
pub mod regions;
pub mod resources;
pub mod stacks;
pub mod synth;
pub mod template;
pub mod userdata;

pub use error::{Error, Result};
