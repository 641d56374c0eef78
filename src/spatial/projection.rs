use crate::utils::error::{HotspotError, Result};
use geo::{Centroid, Coord, MapCoords, MultiPolygon};

/// WGS84 lon/lat to UTM metres for one fixed zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmProjection {
    zone: u8,
}

impl UtmProjection {
    pub fn new(zone: u8) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(HotspotError::ProjectionError {
                message: format!("UTM zone {} is outside 1-60", zone),
            });
        }
        Ok(Self { zone })
    }

    /// Zone containing the centroid of `geometry`.
    pub fn for_geometry(geometry: &MultiPolygon<f64>) -> Result<Self> {
        let centroid = geometry
            .centroid()
            .ok_or_else(|| HotspotError::ProjectionError {
                message: "Cannot derive a UTM zone from an empty boundary".to_string(),
            })?;
        let zone = utm::lat_lon_to_zone_number(centroid.y(), centroid.x());
        tracing::debug!(
            "Boundary centroid ({:.4}, {:.4}) lies in UTM zone {}",
            centroid.x(),
            centroid.y(),
            zone
        );
        Self::new(zone)
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    /// Returns `(easting, northing)`.
    pub fn project(&self, longitude: f64, latitude: f64) -> (f64, f64) {
        let (northing, easting, _convergence) = utm::to_utm_wgs84(latitude, longitude, self.zone);
        (easting, northing)
    }

    pub fn project_multi_polygon(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry.map_coords(|c| {
            let (x, y) = self.project(c.x, c.y);
            Coord { x, y }
        })
    }
}
