use crate::adapters::country_lookup::CountryTable;
use crate::adapters::gbif::{GbifClient, OccurrenceQuery};
use crate::adapters::geoboundaries::{multi_polygon_from_geojson, GeoBoundariesClient};
use crate::adapters::http::HttpClient;
use crate::config::toml_config::HotspotConfig;
use crate::domain::model::{
    Boundary, CountryCode, ExtractedData, Facet, FacetSummary, ProjectedOccurrence, RunSummary, TransformResult,
};
use crate::domain::ports::{Pipeline, Storage};
use crate::spatial::density::{bandwidths, contour_breaks, density_extent, kde2d};
use crate::spatial::render::{encode_png, FacetRenderer};
use crate::spatial::{dissolve, UtmProjection};
use crate::utils::error::{HotspotError, Result};
use geo::BoundingRect;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const PNG_FILE: &str = "hotspots.png";
pub const CSV_FILE: &str = "occurrences.csv";
pub const TSV_FILE: &str = "occurrences.tsv";
pub const JSON_FILE: &str = "summary.json";

/// 下載、投影、密度估計並輸出分年熱點圖
pub struct HotspotPipeline<S: Storage, I: Storage> {
    pub(crate) storage: S,
    pub(crate) inputs: I,
    pub(crate) config: HotspotConfig,
    pub(crate) http: HttpClient,
}

impl<S: Storage, I: Storage> HotspotPipeline<S, I> {
    /// `storage` receives the artifacts; `inputs` serves lookup and boundary files.
    pub fn new(storage: S, inputs: I, config: HotspotConfig) -> Result<Self> {
        let http = HttpClient::new(&config.source)?;
        Ok(Self {
            storage,
            inputs,
            config,
            http,
        })
    }

    async fn country_table(&self) -> Result<CountryTable> {
        let mut table = CountryTable::embedded()?;
        for file in &self.config.lookup.files {
            let data = self.inputs.read_file(file).await?;
            let added = table.merge_csv(&data)?;
            tracing::debug!("Loaded {} countries from lookup file {}", added, file);
        }
        Ok(table)
    }

    async fn boundary(&self, country: &CountryCode) -> Result<Boundary> {
        let level = self.config.boundary.level;

        if let Some(file) = &self.config.boundary.file {
            tracing::info!("🗺️ Reading boundary from local file {}", file);
            let data = self.inputs.read_file(file).await?;
            return Ok(Boundary {
                name: country.name.clone(),
                iso3: country.iso3.clone(),
                level,
                geometry: multi_polygon_from_geojson(&data)?,
            });
        }

        GeoBoundariesClient::new(
            self.http.clone(),
            &self.config.boundary.endpoint,
            &self.config.boundary.release,
            self.config.boundary.simplified,
        )
        .fetch(country, level)
        .await
    }
}

#[async_trait::async_trait]
impl<S: Storage, I: Storage> Pipeline for HotspotPipeline<S, I> {
    async fn extract(&self) -> Result<ExtractedData> {
        let scientific_name = self.config.scientific_name()?;
        let table = self.country_table().await?;
        let country = table.resolve(self.config.country()?)?.clone();
        tracing::info!(
            "🌍 Country '{}' resolved to {} / {}",
            country.name,
            country.iso2,
            country.iso3
        );

        let query = OccurrenceQuery::new(scientific_name, &country, &self.config.query);
        let occurrences = GbifClient::new(self.http.clone(), &self.config.source.endpoint)
            .search(&query)
            .await?;

        let boundary = self.boundary(&country).await?;
        tracing::info!(
            "🗺️ Boundary '{}' has {} polygon parts",
            boundary.name,
            boundary.geometry.0.len()
        );

        Ok(ExtractedData {
            country,
            occurrences,
            boundary,
        })
    }

    async fn transform(&self, data: ExtractedData) -> Result<TransformResult> {
        let projection = match self.config.projection.utm_zone {
            Some(zone) => UtmProjection::new(zone)?,
            None => UtmProjection::for_geometry(&data.boundary.geometry)?,
        };
        tracing::info!("🧭 Projecting to UTM zone {}", projection.zone());

        let outline = dissolve(&projection.project_multi_polygon(&data.boundary.geometry));

        let projected: Vec<ProjectedOccurrence> = data
            .occurrences
            .into_iter()
            .map(|occurrence| {
                let (easting, northing) =
                    projection.project(occurrence.longitude, occurrence.latitude);
                ProjectedOccurrence {
                    occurrence,
                    easting,
                    northing,
                }
            })
            .collect();

        // 合理性檢查：點應落在國界外框內
        let outside = outline
            .bounding_rect()
            .map(|rect| {
                projected
                    .iter()
                    .filter(|p| {
                        p.easting < rect.min().x
                            || p.easting > rect.max().x
                            || p.northing < rect.min().y
                            || p.northing > rect.max().y
                    })
                    .count()
            })
            .unwrap_or(0);
        if outside > 0 {
            tracing::warn!(
                "⚠️ {} of {} records fall outside the boundary extent",
                outside,
                projected.len()
            );
        }

        let mut by_year: BTreeMap<i32, Vec<(f64, f64)>> = BTreeMap::new();
        for p in &projected {
            by_year
                .entry(p.occurrence.year)
                .or_default()
                .push((p.easting, p.northing));
        }

        let settings = &self.config.density;
        let extent = density_extent(
            &outline,
            by_year.values().flatten(),
            settings.padding_fraction,
        )
        .ok_or_else(|| HotspotError::ProcessingError {
            message: "Nothing to draw: empty boundary and no occurrences".to_string(),
        })?;

        let facets: Vec<Facet> = by_year
            .into_iter()
            .map(|(year, points)| {
                let (hx, hy) = bandwidths(&points, settings);
                let density = kde2d(&points, hx, hy, settings.grid_size, extent);
                tracing::debug!(
                    "Facet {}: {} points, bandwidth {:.0}m x {:.0}m",
                    year,
                    points.len(),
                    hx,
                    hy
                );
                Facet {
                    year,
                    points,
                    density,
                    bandwidth_x: hx,
                    bandwidth_y: hy,
                }
            })
            .collect();

        let max_density = facets
            .iter()
            .map(|f| f.density.max())
            .fold(0.0, f64::max);
        let breaks = contour_breaks(max_density, settings.bins);

        let image = FacetRenderer::new(&self.config.render, &outline, &breaks, extent).render(&facets);
        let png = encode_png(&image)?;
        tracing::info!(
            "🎨 Rendered {} facets into a {}x{} image",
            facets.len(),
            image.width(),
            image.height()
        );

        let summary = RunSummary {
            scientific_name: self.config.scientific_name()?.to_string(),
            country: data.country,
            year_start: self.config.query.year_start,
            year_end: self.config.query.year_end,
            utm_zone: projection.zone(),
            total_records: projected.len(),
            records_outside_outline_extent: outside,
            extent,
            breaks: breaks.clone(),
            facets: facets
                .iter()
                .map(|f| FacetSummary {
                    year: f.year,
                    records: f.points.len(),
                    bandwidth_x_m: f.bandwidth_x,
                    bandwidth_y_m: f.bandwidth_y,
                    max_density: f.density.max(),
                })
                .collect(),
        };

        Ok(TransformResult {
            projected,
            outline,
            facets,
            breaks,
            png,
            summary,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let artifacts = self.artifacts(&result)?;
        let output_dir = self.config.output_path().trim_end_matches('/');

        if let Some(compression) = self.config.compression() {
            tracing::debug!("Creating ZIP file with {} files", artifacts.len());

            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for (name, data) in &artifacts {
                    zip.start_file(*name, SimpleFileOptions::default())?;
                    zip.write_all(data)?;
                }
                zip.finish()?.into_inner()
            };

            self.storage
                .write_file(&compression.filename, &zip_data)
                .await?;
            let path = format!("{}/{}", output_dir, compression.filename);
            tracing::info!("📦 Archive saved: {} ({} bytes)", path, zip_data.len());
            return Ok(path);
        }

        for (name, data) in &artifacts {
            self.storage.write_file(name, data).await?;
            tracing::info!("💾 Wrote {}/{} ({} bytes)", output_dir, name, data.len());
        }

        let primary = artifacts
            .iter()
            .map(|(name, _)| *name)
            .find(|name| *name == PNG_FILE)
            .or_else(|| artifacts.first().map(|(name, _)| *name))
            .ok_or_else(|| HotspotError::ProcessingError {
                message: "No output formats selected".to_string(),
            })?;
        Ok(format!("{}/{}", output_dir, primary))
    }
}

#[derive(Debug, Serialize)]
struct OccurrenceRow<'a> {
    key: Option<u64>,
    scientific_name: &'a str,
    species: Option<&'a str>,
    year: i32,
    latitude: f64,
    longitude: f64,
    easting: f64,
    northing: f64,
    country_code: Option<&'a str>,
    basis_of_record: Option<&'a str>,
    dataset_key: Option<&'a str>,
    event_date: Option<&'a str>,
}

impl<'a> From<&'a ProjectedOccurrence> for OccurrenceRow<'a> {
    fn from(p: &'a ProjectedOccurrence) -> Self {
        let o = &p.occurrence;
        Self {
            key: o.key,
            scientific_name: &o.scientific_name,
            species: o.species.as_deref(),
            year: o.year,
            latitude: o.latitude,
            longitude: o.longitude,
            easting: p.easting,
            northing: p.northing,
            country_code: o.country_code.as_deref(),
            basis_of_record: o.basis_of_record.as_deref(),
            dataset_key: o.dataset_key.as_deref(),
            event_date: o.event_date.as_deref(),
        }
    }
}

const COLUMNS: [&str; 12] = [
    "key",
    "scientific_name",
    "species",
    "year",
    "latitude",
    "longitude",
    "easting",
    "northing",
    "country_code",
    "basis_of_record",
    "dataset_key",
    "event_date",
];

/// 即使沒有資料也輸出標頭列
fn delimited(rows: &[ProjectedOccurrence], delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.serialize(OccurrenceRow::from(row))?;
    }
    writer
        .into_inner()
        .map_err(|e| HotspotError::IoError(e.into_error()))
}

impl<S: Storage, I: Storage> HotspotPipeline<S, I> {
    /// 依 output_formats 的順序產生輸出檔
    fn artifacts(&self, result: &TransformResult) -> Result<Vec<(&'static str, Vec<u8>)>> {
        let mut artifacts = Vec::new();
        for format in &self.config.load.output_formats {
            match format.as_str() {
                "png" => artifacts.push((PNG_FILE, result.png.clone())),
                "csv" => artifacts.push((CSV_FILE, delimited(&result.projected, b',')?)),
                "tsv" => artifacts.push((TSV_FILE, delimited(&result.projected, b'\t')?)),
                "json" => artifacts.push((JSON_FILE, serde_json::to_vec_pretty(&result.summary)?)),
                other => {
                    return Err(HotspotError::InvalidConfigValueError {
                        field: "load.output_formats".to_string(),
                        value: other.to_string(),
                        reason: "Unsupported format".to_string(),
                    })
                }
            }
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Occurrence;
    use geo::polygon;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }

        async fn put_file(&self, path: &str, data: &[u8]) {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                HotspotError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.put_file(path, data).await;
            Ok(())
        }
    }

    fn config(extra: &str) -> HotspotConfig {
        let toml_content = format!(
            r#"
[query]
scientific_name = "Passer domesticus"
country = "United Kingdom"
year_start = 2006
year_end = 2016

[projection]
utm_zone = 30

[density]
grid_size = 40

[render]
panel_size = 96

[load]
output_path = "./out"
output_formats = ["png", "csv", "tsv", "json"]
{}
"#,
            extra
        );
        HotspotConfig::from_toml_str(&toml_content).unwrap()
    }

    fn occurrence(key: u64, lon: f64, lat: f64, year: i32) -> Occurrence {
        Occurrence {
            key: Some(key),
            scientific_name: "Passer domesticus".to_string(),
            species: Some("Passer domesticus".to_string()),
            latitude: lat,
            longitude: lon,
            year,
            event_date: None,
            country_code: Some("GB".to_string()),
            basis_of_record: Some("HUMAN_OBSERVATION".to_string()),
            dataset_key: None,
        }
    }

    fn extracted(occurrences: Vec<Occurrence>) -> ExtractedData {
        ExtractedData {
            country: CountryCode {
                name: "United Kingdom".to_string(),
                iso2: "GB".to_string(),
                iso3: "GBR".to_string(),
            },
            occurrences,
            boundary: Boundary {
                name: "United Kingdom".to_string(),
                iso3: "GBR".to_string(),
                level: 0,
                geometry: geo::MultiPolygon::new(vec![
                    polygon![(x: -3.0, y: 51.0), (x: -1.0, y: 51.0), (x: -1.0, y: 53.0), (x: -3.0, y: 53.0)],
                    polygon![(x: -1.0, y: 51.0), (x: 1.0, y: 51.0), (x: 1.0, y: 53.0), (x: -1.0, y: 53.0)],
                ]),
            },
        }
    }

    #[tokio::test]
    async fn test_transform_facets_by_year() {
        let pipeline = HotspotPipeline::new(MockStorage::default(), MockStorage::default(), config("")).unwrap();
        let data = extracted(vec![
            occurrence(1, -0.1, 51.5, 2008),
            occurrence(2, -0.2, 51.6, 2008),
            occurrence(3, -2.0, 52.5, 2006),
            occurrence(4, -2.1, 52.4, 2006),
            occurrence(5, -2.2, 52.6, 2006),
        ]);

        let result = pipeline.transform(data).await.unwrap();

        assert_eq!(result.outline.0.len(), 1);
        assert_eq!(result.projected.len(), 5);
        let years: Vec<i32> = result.facets.iter().map(|f| f.year).collect();
        assert_eq!(years, vec![2006, 2008]);
        assert_eq!(result.facets[0].points.len(), 3);
        assert_eq!(result.breaks.len(), 11);
        assert_eq!(result.summary.utm_zone, 30);
        assert_eq!(result.summary.records_outside_outline_extent, 0);
        assert_eq!(&result.png[..4], b"\x89PNG");
    }

    #[tokio::test]
    async fn test_transform_flags_points_outside_boundary() {
        let pipeline = HotspotPipeline::new(MockStorage::default(), MockStorage::default(), config("")).unwrap();
        let data = extracted(vec![occurrence(1, -0.1, 51.5, 2010), occurrence(2, -6.0, 49.0, 2010)]);

        let result = pipeline.transform(data).await.unwrap();
        assert_eq!(result.summary.records_outside_outline_extent, 1);
        assert_eq!(result.summary.total_records, 2);
    }

    #[tokio::test]
    async fn test_transform_without_occurrences_renders_outline() {
        let pipeline = HotspotPipeline::new(MockStorage::default(), MockStorage::default(), config("")).unwrap();
        let result = pipeline.transform(extracted(vec![])).await.unwrap();

        assert!(result.facets.is_empty());
        assert!(!result.png.is_empty());
        assert!(result.breaks.iter().all(|b| *b == 0.0));
    }

    #[tokio::test]
    async fn test_load_writes_each_format() {
        let storage = MockStorage::default();
        let pipeline = HotspotPipeline::new(storage.clone(), MockStorage::default(), config("")).unwrap();
        let result = pipeline
            .transform(extracted(vec![occurrence(7, -0.1, 51.5, 2012)]))
            .await
            .unwrap();

        let path = pipeline.load(result).await.unwrap();
        assert_eq!(path, "./out/hotspots.png");

        let csv_data = String::from_utf8(storage.get_file(CSV_FILE).await.unwrap()).unwrap();
        let mut lines = csv_data.lines();
        assert!(lines.next().unwrap().starts_with("key,scientific_name,species,year,latitude,longitude,easting,northing"));
        assert!(lines.next().unwrap().starts_with("7,Passer domesticus,Passer domesticus,2012,51.5,-0.1,"));

        let tsv_data = String::from_utf8(storage.get_file(TSV_FILE).await.unwrap()).unwrap();
        assert!(tsv_data.starts_with("key\tscientific_name"));

        let summary: serde_json::Value =
            serde_json::from_slice(&storage.get_file(JSON_FILE).await.unwrap()).unwrap();
        assert_eq!(summary["facets"][0]["year"], 2012);
        assert_eq!(summary["country"]["iso3"], "GBR");

        assert!(storage.get_file(PNG_FILE).await.is_some());
    }

    #[tokio::test]
    async fn test_load_bundles_zip_when_compression_enabled() {
        let storage = MockStorage::default();
        let extra = "[load.compression]\nenabled = true\nfilename = \"bundle.zip\"\n";
        let pipeline = HotspotPipeline::new(storage.clone(), MockStorage::default(), config(extra)).unwrap();
        let result = pipeline.transform(extracted(vec![])).await.unwrap();

        let path = pipeline.load(result).await.unwrap();
        assert_eq!(path, "./out/bundle.zip");

        let zip_data = storage.get_file("bundle.zip").await.unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains(&PNG_FILE));
        assert!(names.contains(&JSON_FILE));
        assert!(storage.get_file(PNG_FILE).await.is_none());
    }

    #[tokio::test]
    async fn test_boundary_from_local_file_and_lookup_override() {
        let inputs = MockStorage::default();
        inputs
            .put_file(
                "uk.geojson",
                br#"{"type": "Polygon", "coordinates": [[[-3.0, 51.0], [1.0, 51.0], [1.0, 53.0], [-3.0, 53.0], [-3.0, 51.0]]]}"#,
            )
            .await;
        inputs
            .put_file("extra.csv", b"name,iso2,iso3\nBlighty,GB,GBR\n")
            .await;

        let mut config = config("");
        config.boundary.file = Some("uk.geojson".to_string());
        config.lookup.files = vec!["extra.csv".to_string()];
        config.query.country = Some("Blighty".to_string());

        let pipeline = HotspotPipeline::new(MockStorage::default(), inputs, config).unwrap();
        let table = pipeline.country_table().await.unwrap();
        let country = table.resolve("Blighty").unwrap().clone();
        assert_eq!(country.iso2, "GB");

        let boundary = pipeline.boundary(&country).await.unwrap();
        assert_eq!(boundary.iso3, "GBR");
        assert_eq!(boundary.geometry.0.len(), 1);
    }
}
