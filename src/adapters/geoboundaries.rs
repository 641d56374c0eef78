use crate::adapters::http::HttpClient;
use crate::domain::model::{Boundary, CountryCode};
use crate::utils::error::{HotspotError, Result};
use geo::{Geometry, MultiPolygon, Polygon};
use geojson::GeoJson;
use serde::Deserialize;

/// Metadata returned by `/{release}/{ISO3}/ADM{level}/`.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryMetadata {
    #[serde(rename = "boundaryName")]
    pub name: Option<String>,
    #[serde(rename = "boundaryISO")]
    pub iso: Option<String>,
    #[serde(rename = "gjDownloadURL")]
    pub download_url: Option<String>,
    #[serde(rename = "simplifiedGeometryGeoJSON")]
    pub simplified_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MetadataResponse {
    One(BoundaryMetadata),
    Many(Vec<BoundaryMetadata>),
}

pub struct GeoBoundariesClient {
    http: HttpClient,
    endpoint: String,
    release: String,
    simplified: bool,
}

impl GeoBoundariesClient {
    pub fn new(
        http: HttpClient,
        endpoint: impl Into<String>,
        release: impl Into<String>,
        simplified: bool,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            release: release.into(),
            simplified,
        }
    }

    fn metadata_url(&self, iso3: &str, level: u8) -> String {
        format!(
            "{}/{}/{}/ADM{}/",
            self.endpoint.trim_end_matches('/'),
            self.release,
            iso3,
            level
        )
    }

    pub async fn metadata(&self, iso3: &str, level: u8) -> Result<BoundaryMetadata> {
        let url = self.metadata_url(iso3, level);
        let response: MetadataResponse = self.http.get_json(&url, &[]).await?;

        match response {
            MetadataResponse::One(meta) => Ok(meta),
            MetadataResponse::Many(list) => {
                list.into_iter()
                    .next()
                    .ok_or_else(|| HotspotError::BoundaryError {
                        message: format!("No boundary metadata for {} ADM{}", iso3, level),
                    })
            }
        }
    }

    pub async fn fetch(&self, country: &CountryCode, level: u8) -> Result<Boundary> {
        let meta = self.metadata(&country.iso3, level).await?;

        let (preferred, fallback) = if self.simplified {
            (&meta.simplified_url, &meta.download_url)
        } else {
            (&meta.download_url, &meta.simplified_url)
        };
        let url = preferred
            .as_ref()
            .or(fallback.as_ref())
            .ok_or_else(|| HotspotError::BoundaryError {
                message: format!(
                    "Boundary metadata for {} ADM{} has no GeoJSON download link",
                    country.iso3, level
                ),
            })?;

        tracing::info!("🗺️ Downloading ADM{} boundary for {} from {}", level, country.iso3, url);
        let bytes = self.http.get_bytes(url, &[]).await?;
        let geometry = multi_polygon_from_geojson(&bytes)?;

        Ok(Boundary {
            name: meta.name.unwrap_or_else(|| country.name.clone()),
            iso3: meta.iso.unwrap_or_else(|| country.iso3.clone()),
            level,
            geometry,
        })
    }
}

/// Collect every Polygon and MultiPolygon in a GeoJSON document.
pub fn multi_polygon_from_geojson(bytes: &[u8]) -> Result<MultiPolygon<f64>> {
    let text = std::str::from_utf8(bytes).map_err(|e| HotspotError::BoundaryError {
        message: format!("GeoJSON is not valid UTF-8: {}", e),
    })?;
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| {
        HotspotError::BoundaryError {
            message: format!("Invalid GeoJSON: {}", e),
        }
    })?;
    let collection = geo::GeometryCollection::<f64>::try_from(&geojson).map_err(|e| {
        HotspotError::BoundaryError {
            message: format!("Unsupported GeoJSON geometry: {}", e),
        }
    })?;

    let mut polygons = Vec::new();
    for geometry in collection {
        collect_polygons(geometry, &mut polygons);
    }

    if polygons.is_empty() {
        return Err(HotspotError::BoundaryError {
            message: "GeoJSON contains no polygon geometry".to_string(),
        });
    }
    Ok(MultiPolygon::new(polygons))
}

fn collect_polygons(geometry: Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(polygon) => out.push(polygon),
        Geometry::MultiPolygon(multi) => out.extend(multi),
        Geometry::GeometryCollection(collection) => {
            for inner in collection {
                collect_polygons(inner, out);
            }
        }
        Geometry::Rect(rect) => out.push(rect.to_polygon()),
        _ => {}
    }
}
