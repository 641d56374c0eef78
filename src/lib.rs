pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod spatial;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::storage::LocalStorage;
pub use app::pipelines::HotspotPipeline;
pub use config::HotspotConfig;
pub use core::etl::EtlEngine;
pub use utils::error::{HotspotError, Result};
