use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// One reported sighting, as returned by the occurrence search API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub key: Option<u64>,
    pub scientific_name: String,
    pub species: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub year: i32,
    pub event_date: Option<String>,
    pub country_code: Option<String>,
    pub basis_of_record: Option<String>,
    pub dataset_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCode {
    pub name: String,
    pub iso2: String,
    pub iso3: String,
}

/// Administrative boundary in WGS84 lon/lat.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub name: String,
    pub iso3: String,
    pub level: u8,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedOccurrence {
    pub occurrence: Occurrence,
    pub easting: f64,
    pub northing: f64,
}

/// Planar bounding box in projected metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Grow every side by `fraction` of the larger dimension.
    pub fn padded(&self, fraction: f64) -> Extent {
        let pad = self.width().max(self.height()) * fraction;
        Extent {
            min_x: self.min_x - pad,
            min_y: self.min_y - pad,
            max_x: self.max_x + pad,
            max_y: self.max_y + pad,
        }
    }
}

/// Density values on a regular `nx * ny` grid, row-major from the south-west corner.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    pub nx: usize,
    pub ny: usize,
    pub extent: Extent,
    pub values: Vec<f64>,
}

impl DensityGrid {
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.values[j * self.nx + i]
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// 雙線性內插；超出範圍回傳 0
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        if self.nx < 2 || self.ny < 2 || !self.extent.contains(x, y) {
            return 0.0;
        }

        let fx = (x - self.extent.min_x) / self.extent.width() * (self.nx - 1) as f64;
        let fy = (y - self.extent.min_y) / self.extent.height() * (self.ny - 1) as f64;
        let i0 = (fx.floor() as usize).min(self.nx - 2);
        let j0 = (fy.floor() as usize).min(self.ny - 2);
        let tx = fx - i0 as f64;
        let ty = fy - j0 as f64;

        let v00 = self.value(i0, j0);
        let v10 = self.value(i0 + 1, j0);
        let v01 = self.value(i0, j0 + 1);
        let v11 = self.value(i0 + 1, j0 + 1);

        v00 * (1.0 - tx) * (1.0 - ty) + v10 * tx * (1.0 - ty) + v01 * (1.0 - tx) * ty + v11 * tx * ty
    }
}

/// One panel of the map.
#[derive(Debug, Clone)]
pub struct Facet {
    pub year: i32,
    pub points: Vec<(f64, f64)>,
    pub density: DensityGrid,
    pub bandwidth_x: f64,
    pub bandwidth_y: f64,
}

/// What `extract` hands to `transform`.
#[derive(Debug, Clone)]
pub struct ExtractedData {
    pub country: CountryCode,
    pub occurrences: Vec<Occurrence>,
    pub boundary: Boundary,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacetSummary {
    pub year: i32,
    pub records: usize,
    pub bandwidth_x_m: f64,
    pub bandwidth_y_m: f64,
    pub max_density: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub scientific_name: String,
    pub country: CountryCode,
    pub year_start: i32,
    pub year_end: i32,
    pub utm_zone: u8,
    pub total_records: usize,
    pub records_outside_outline_extent: usize,
    pub extent: Extent,
    pub breaks: Vec<f64>,
    pub facets: Vec<FacetSummary>,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub projected: Vec<ProjectedOccurrence>,
    pub outline: MultiPolygon<f64>,
    pub facets: Vec<Facet>,
    pub breaks: Vec<f64>,
    pub png: Vec<u8>,
    pub summary: RunSummary,
}
