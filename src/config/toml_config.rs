use crate::utils::error::{HotspotError, Result};
use crate::utils::validation::{self, Validate};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_OCCURRENCE_ENDPOINT: &str = "https://api.gbif.org/v1/occurrence/search";
pub const DEFAULT_BOUNDARY_ENDPOINT: &str = "https://www.geoboundaries.org/api/current";

/// GBIF 單頁上限
pub const MAX_PAGE_SIZE: usize = 300;
/// The occurrence search API stops paging at offset 100 000.
pub const MAX_SEARCH_RECORDS: usize = 100_000;

pub const OUTPUT_FORMATS: [&str; 4] = ["png", "csv", "tsv", "json"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HotspotConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub query: QueryConfig,
    pub boundary: BoundaryConfig,
    pub lookup: LookupConfig,
    pub projection: ProjectionConfig,
    pub density: DensityConfig,
    pub render: RenderConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    pub description: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "occurrence-hotspots".to_string(),
            description: "Yearly occurrence density map".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub endpoint: String,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub headers: Option<HashMap<String, String>>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OCCURRENCE_ENDPOINT.to_string(),
            timeout_seconds: Some(60),
            retry_attempts: 2,
            retry_delay_seconds: 2,
            headers: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub scientific_name: Option<String>,
    pub country: Option<String>,
    pub year_start: i32,
    pub year_end: i32,
    pub has_coordinate: bool,
    pub exclude_geospatial_issues: bool,
    pub limit: usize,
    pub page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            scientific_name: None,
            country: None,
            year_start: 2006,
            year_end: 2016,
            has_coordinate: true,
            exclude_geospatial_issues: false,
            limit: 500,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub endpoint: String,
    pub release: String,
    pub level: u8,
    pub simplified: bool,
    /// Local GeoJSON file, read through storage instead of downloading
    pub file: Option<String>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BOUNDARY_ENDPOINT.to_string(),
            release: "gbOpen".to_string(),
            level: 0,
            simplified: true,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub utm_zone: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    pub grid_size: usize,
    pub bins: usize,
    pub bandwidth_adjust: f64,
    pub bandwidth_m: Option<f64>,
    pub min_bandwidth_m: f64,
    pub padding_fraction: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            grid_size: 100,
            bins: 10,
            bandwidth_adjust: 1.0,
            bandwidth_m: None,
            min_bandwidth_m: 5_000.0,
            padding_fraction: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub panel_size: u32,
    pub columns: Option<usize>,
    pub show_points: bool,
    pub point_radius: i32,
    pub clip_to_outline: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            panel_size: 320,
            columns: None,
            show_points: true,
            point_radius: 2,
            clip_to_outline: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub output_path: String,
    pub output_formats: Vec<String>,
    pub compression: Option<CompressionConfig>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            output_path: "./output".to_string(),
            output_formats: vec!["png".to_string(), "csv".to_string(), "json".to_string()],
            compression: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl HotspotConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| HotspotError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GBIF_ENDPOINT})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| HotspotError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    pub fn scientific_name(&self) -> Result<&str> {
        validation::validate_required_field("query.scientific_name", &self.query.scientific_name)
            .map(String::as_str)
    }

    pub fn country(&self) -> Result<&str> {
        validation::validate_required_field("query.country", &self.query.country)
            .map(String::as_str)
    }

    pub fn output_path(&self) -> &str {
        &self.load.output_path
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn compression(&self) -> Option<&CompressionConfig> {
        self.load.compression.as_ref().filter(|c| c.enabled)
    }

    pub fn wants_format(&self, format: &str) -> bool {
        self.load.output_formats.iter().any(|f| f == format)
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("query.scientific_name", self.scientific_name()?)?;
        validation::validate_non_empty_string("query.country", self.country()?)?;

        validation::validate_url("source.endpoint", &self.source.endpoint)?;
        match &self.boundary.file {
            Some(file) => {
                validation::validate_path("boundary.file", file)?;
                validation::validate_file_extensions(
                    "boundary.file",
                    std::slice::from_ref(file),
                    &["geojson", "json"],
                )?;
            }
            None => validation::validate_url("boundary.endpoint", &self.boundary.endpoint)?,
        }
        validation::validate_file_extensions("lookup.files", &self.lookup.files, &["csv"])?;
        validation::validate_path("load.output_path", &self.load.output_path)?;

        let current_year = chrono::Utc::now().year();
        validation::validate_year_range(
            "query.year_start..year_end",
            self.query.year_start,
            self.query.year_end,
            current_year,
        )?;
        validation::validate_range("query.limit", self.query.limit, 1, MAX_SEARCH_RECORDS)?;
        validation::validate_range("query.page_size", self.query.page_size, 1, MAX_PAGE_SIZE)?;
        validation::validate_range("boundary.level", self.boundary.level, 0, 5)?;

        if let Some(zone) = self.projection.utm_zone {
            validation::validate_range("projection.utm_zone", zone, 1, 60)?;
        }

        validation::validate_range("density.grid_size", self.density.grid_size, 2, 1000)?;
        validation::validate_range("density.bins", self.density.bins, 2, 50)?;
        if !(self.density.bandwidth_adjust > 0.0) {
            return Err(HotspotError::InvalidConfigValueError {
                field: "density.bandwidth_adjust".to_string(),
                value: self.density.bandwidth_adjust.to_string(),
                reason: "Value must be greater than 0".to_string(),
            });
        }
        if let Some(bw) = self.density.bandwidth_m {
            if !(bw > 0.0) {
                return Err(HotspotError::InvalidConfigValueError {
                    field: "density.bandwidth_m".to_string(),
                    value: bw.to_string(),
                    reason: "Value must be greater than 0".to_string(),
                });
            }
        }
        if !(self.density.min_bandwidth_m > 0.0) {
            return Err(HotspotError::InvalidConfigValueError {
                field: "density.min_bandwidth_m".to_string(),
                value: self.density.min_bandwidth_m.to_string(),
                reason: "Value must be greater than 0".to_string(),
            });
        }
        validation::validate_range(
            "density.padding_fraction",
            self.density.padding_fraction,
            0.0,
            1.0,
        )?;

        validation::validate_range("render.panel_size", self.render.panel_size, 64, 4096)?;
        validation::validate_range("render.point_radius", self.render.point_radius, 0, 32)?;
        if let Some(columns) = self.render.columns {
            validation::validate_positive_number("render.columns", columns, 1)?;
        }

        if self.load.output_formats.is_empty() {
            return Err(HotspotError::MissingConfigError {
                field: "load.output_formats".to_string(),
            });
        }
        for format in &self.load.output_formats {
            if !OUTPUT_FORMATS.contains(&format.as_str()) {
                return Err(HotspotError::InvalidConfigValueError {
                    field: "load.output_formats".to_string(),
                    value: format.clone(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        OUTPUT_FORMATS.join(", ")
                    ),
                });
            }
        }
        if let Some(compression) = self.compression() {
            validation::validate_non_empty_string("load.compression.filename", &compression.filename)?;
        }

        Ok(())
    }
}

impl Validate for HotspotConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
