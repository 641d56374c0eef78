use crate::adapters::http::HttpClient;
use crate::config::toml_config::{QueryConfig, MAX_PAGE_SIZE};
use crate::domain::model::{CountryCode, Occurrence};
use crate::utils::error::Result;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

/// One page of `/occurrence/search`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    end_of_records: bool,
    count: Option<u64>,
    #[serde(default)]
    results: Vec<RawOccurrence>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOccurrence {
    key: Option<u64>,
    scientific_name: Option<String>,
    species: Option<String>,
    decimal_latitude: Option<f64>,
    decimal_longitude: Option<f64>,
    year: Option<i32>,
    event_date: Option<String>,
    country_code: Option<String>,
    basis_of_record: Option<String>,
    dataset_key: Option<String>,
}

/// Filter for one occurrence download.
#[derive(Debug, Clone)]
pub struct OccurrenceQuery {
    pub scientific_name: String,
    pub country_iso2: String,
    pub year_start: i32,
    pub year_end: i32,
    pub has_coordinate: bool,
    pub exclude_geospatial_issues: bool,
    pub limit: usize,
    pub page_size: usize,
}

impl OccurrenceQuery {
    pub fn new(scientific_name: &str, country: &CountryCode, query: &QueryConfig) -> Self {
        Self {
            scientific_name: scientific_name.trim().to_string(),
            country_iso2: country.iso2.clone(),
            year_start: query.year_start,
            year_end: query.year_end,
            has_coordinate: query.has_coordinate,
            exclude_geospatial_issues: query.exclude_geospatial_issues,
            limit: query.limit,
            page_size: query.page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn params(&self, offset: usize, limit: usize) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("scientificName", self.scientific_name.clone()),
            ("country", self.country_iso2.clone()),
            ("hasCoordinate", self.has_coordinate.to_string()),
            ("year", format!("{},{}", self.year_start, self.year_end)),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        if self.exclude_geospatial_issues {
            params.push(("hasGeospatialIssue", "false".to_string()));
        }
        params
    }
}

pub struct GbifClient {
    http: HttpClient,
    endpoint: String,
}

impl GbifClient {
    pub fn new(http: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// 逐頁下載直到達到 limit、endOfRecords 或空頁
    pub async fn search(&self, query: &OccurrenceQuery) -> Result<Vec<Occurrence>> {
        let mut occurrences = Vec::new();
        let mut offset = 0;
        let mut dropped = 0;

        while offset < query.limit {
            let page_limit = query.page_size.min(query.limit - offset);
            let page: SearchPage = self
                .http
                .get_json(&self.endpoint, &query.params(offset, page_limit))
                .await?;

            if offset == 0 {
                if let Some(count) = page.count {
                    tracing::info!(
                        "🔎 {} matching records for {} in {} ({}-{})",
                        count,
                        query.scientific_name,
                        query.country_iso2,
                        query.year_start,
                        query.year_end
                    );
                }
            }

            let received = page.results.len();
            offset += received;
            tracing::debug!("Page returned {} records (offset now {})", received, offset);

            for raw in page.results {
                match raw.into_occurrence(query.year_start, query.year_end) {
                    Some(occurrence) => occurrences.push(occurrence),
                    None => dropped += 1,
                }
            }

            if page.end_of_records || received == 0 {
                break;
            }
        }

        occurrences.truncate(query.limit);
        if dropped > 0 {
            tracing::warn!(
                "Dropped {} records without usable coordinates or year",
                dropped
            );
        }
        tracing::info!("📊 Kept {} occurrence records", occurrences.len());
        Ok(occurrences)
    }
}

impl RawOccurrence {
    fn into_occurrence(self, year_start: i32, year_end: i32) -> Option<Occurrence> {
        let latitude = self.decimal_latitude.filter(|v| (-90.0..=90.0).contains(v))?;
        let longitude = self
            .decimal_longitude
            .filter(|v| (-180.0..=180.0).contains(v))?;

        let year = self
            .year
            .or_else(|| self.event_date.as_deref().and_then(year_from_event_date))
            .filter(|y| (year_start..=year_end).contains(y))?;

        let scientific_name = self
            .scientific_name
            .or_else(|| self.species.clone())
            .unwrap_or_default();

        Some(Occurrence {
            key: self.key,
            scientific_name,
            species: self.species,
            latitude,
            longitude,
            year,
            event_date: self.event_date,
            country_code: self.country_code,
            basis_of_record: self.basis_of_record,
            dataset_key: self.dataset_key,
        })
    }
}

/// eventDate 可能是 "2010-05-01"、"2010-05-01T10:00:00" 或 "2010-05/2010-06"
fn year_from_event_date(event_date: &str) -> Option<i32> {
    if let Some(date) = event_date.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return Some(date.year());
        }
    }
    event_date.get(..4)?.parse().ok()
}
