use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;

/// 依序執行 extract → transform → load
pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: Option<SystemMonitor>,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor: None,
        }
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: monitor_enabled.then(|| SystemMonitor::new(true)),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    fn log_stage(&self, stage: &str) {
        if let Some(monitor) = &self.monitor {
            monitor.log_stats(stage);
        }
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("🚀 Starting hotspot run");
        self.log_stage("Start");

        tracing::info!("📥 Extracting occurrences and boundary...");
        let data = self.pipeline.extract().await?;
        tracing::info!(
            "📥 Extracted {} occurrences for {} ({})",
            data.occurrences.len(),
            data.country.name,
            data.country.iso3
        );
        self.log_stage("Extract");

        tracing::info!("🔄 Projecting and estimating densities...");
        let result = self.pipeline.transform(data).await?;
        tracing::info!(
            "🔄 Built {} yearly facets from {} records",
            result.facets.len(),
            result.projected.len()
        );
        self.log_stage("Transform");

        tracing::info!("💾 Writing outputs...");
        let output_path = self.pipeline.load(result).await?;
        self.log_stage("Load");

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }
        tracing::info!("⏱️ Finished in {:?}", started.elapsed());

        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        Boundary, CountryCode, ExtractedData, Extent, RunSummary, TransformResult,
    };
    use crate::utils::error::HotspotError;
    use geo::MultiPolygon;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPipeline {
        calls: AtomicUsize,
        fail_transform: bool,
    }

    fn country() -> CountryCode {
        CountryCode {
            name: "Iceland".to_string(),
            iso2: "IS".to_string(),
            iso3: "ISL".to_string(),
        }
    }

    #[async_trait::async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<ExtractedData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExtractedData {
                country: country(),
                occurrences: vec![],
                boundary: Boundary {
                    name: "Iceland".to_string(),
                    iso3: "ISL".to_string(),
                    level: 0,
                    geometry: MultiPolygon::new(vec![]),
                },
            })
        }

        async fn transform(&self, data: ExtractedData) -> Result<TransformResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_transform {
                return Err(HotspotError::ProcessingError {
                    message: "boom".to_string(),
                });
            }
            let extent = Extent {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 1.0,
                max_y: 1.0,
            };
            Ok(TransformResult {
                projected: vec![],
                outline: data.boundary.geometry,
                facets: vec![],
                breaks: vec![0.0],
                png: vec![],
                summary: RunSummary {
                    scientific_name: "Lagopus muta".to_string(),
                    country: data.country,
                    year_start: 2010,
                    year_end: 2011,
                    utm_zone: 27,
                    total_records: 0,
                    records_outside_outline_extent: 0,
                    extent,
                    breaks: vec![0.0],
                    facets: vec![],
                },
            })
        }

        async fn load(&self, _result: TransformResult) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("out/hotspots.png".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_calls_each_stage_once() {
        let engine = EtlEngine::new_with_monitoring(
            CountingPipeline {
                calls: AtomicUsize::new(0),
                fail_transform: false,
            },
            true,
        );

        let path = engine.run().await.unwrap();
        assert_eq!(path, "out/hotspots.png");
        assert_eq!(engine.pipeline().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_at_first_error() {
        let engine = EtlEngine::new(CountingPipeline {
            calls: AtomicUsize::new(0),
            fail_transform: true,
        });

        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, HotspotError::ProcessingError { .. }));
        assert_eq!(engine.pipeline().calls.load(Ordering::SeqCst), 2);
    }
}
