pub mod hotspot_pipeline;

pub use hotspot_pipeline::HotspotPipeline;
