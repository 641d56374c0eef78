use crate::config::toml_config::HotspotConfig;
use crate::utils::error::{HotspotError, Result};
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "hotspots")]
#[command(about = "Download species occurrences and render yearly density hotspot maps")]
pub struct CliArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Scientific name of the taxon, e.g. "Passer domesticus"
    #[arg(long)]
    pub species: Option<String>,

    /// Country name or ISO 3166 code
    #[arg(long)]
    pub country: Option<String>,

    /// Inclusive year range, e.g. 2006-2016 or a single year
    #[arg(long)]
    pub years: Option<String>,

    /// Maximum number of occurrence records to download
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<String>,

    /// Force a UTM zone instead of deriving it from the boundary
    #[arg(long)]
    pub utm_zone: Option<u8>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    pub monitor: Option<bool>,

    /// Dry run - show what would be fetched without executing
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// 載入配置檔（若有）並套用命令列覆蓋
    pub fn resolve_config(&self) -> Result<HotspotConfig> {
        let mut config = match &self.config {
            Some(path) => HotspotConfig::from_file(path)?,
            None => HotspotConfig::default(),
        };
        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut HotspotConfig) -> Result<()> {
        if let Some(species) = &self.species {
            config.query.scientific_name = Some(species.clone());
        }
        if let Some(country) = &self.country {
            config.query.country = Some(country.clone());
        }
        if let Some(years) = &self.years {
            let (start, end) = parse_year_range(years)?;
            config.query.year_start = start;
            config.query.year_end = end;
        }
        if let Some(limit) = self.limit {
            config.query.limit = limit;
        }
        if let Some(output) = &self.output {
            config.load.output_path = output.clone();
        }
        if let Some(zone) = self.utm_zone {
            config.projection.utm_zone = Some(zone);
        }
        Ok(())
    }

    pub fn monitor_enabled(&self, config: &HotspotConfig) -> bool {
        self.monitor.unwrap_or_else(|| config.monitoring_enabled())
    }
}

/// "2006-2016"、"2006,2016" 或單一年份 "2010"
pub fn parse_year_range(value: &str) -> Result<(i32, i32)> {
    let invalid = || HotspotError::InvalidConfigValueError {
        field: "--years".to_string(),
        value: value.to_string(),
        reason: "Expected START-END or a single year".to_string(),
    };

    let parts: Vec<&str> = value
        .split(['-', ','])
        .map(str::trim)
        .collect();

    match parts.as_slice() {
        [single] => {
            let year = single.parse().map_err(|_| invalid())?;
            Ok((year, year))
        }
        [start, end] => {
            let start = start.parse().map_err(|_| invalid())?;
            let end = end.parse().map_err(|_| invalid())?;
            Ok((start, end))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_year_range() {
        assert_eq!(parse_year_range("2006-2016").unwrap(), (2006, 2016));
        assert_eq!(parse_year_range("2006, 2016").unwrap(), (2006, 2016));
        assert_eq!(parse_year_range("2010").unwrap(), (2010, 2010));
        assert!(parse_year_range("twenty").is_err());
        assert!(parse_year_range("2006-2010-2016").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = CliArgs::parse_from([
            "hotspots",
            "--species",
            "Passer domesticus",
            "--country",
            "United Kingdom",
            "--years",
            "2008-2012",
            "--limit",
            "50",
            "--utm-zone",
            "30",
            "-o",
            "/tmp/out",
        ]);

        let config = args.resolve_config().unwrap();
        assert_eq!(config.scientific_name().unwrap(), "Passer domesticus");
        assert_eq!(config.country().unwrap(), "United Kingdom");
        assert_eq!((config.query.year_start, config.query.year_end), (2008, 2012));
        assert_eq!(config.query.limit, 50);
        assert_eq!(config.projection.utm_zone, Some(30));
        assert_eq!(config.output_path(), "/tmp/out");
        assert!(!args.monitor_enabled(&config));
    }
}
