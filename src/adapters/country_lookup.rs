use crate::domain::model::CountryCode;
use crate::utils::error::{HotspotError, Result};
use std::collections::HashMap;

/// ISO 3166-1 table shipped with the crate.
pub static EMBEDDED_COUNTRY_CODES: &str = include_str!("../../data/country_codes.csv");

/// Common names that differ from the table's short names.
const ALIASES: &[(&str, &str)] = &[
    ("uk", "GB"),
    ("great britain", "GB"),
    ("britain", "GB"),
    ("usa", "US"),
    ("united states of america", "US"),
    ("russia", "RU"),
    ("turkey", "TR"),
    ("vietnam", "VN"),
    ("czech republic", "CZ"),
    ("swaziland", "SZ"),
    ("ivory coast", "CI"),
    ("cape verde", "CV"),
    ("laos", "LA"),
    ("syria", "SY"),
    ("macedonia", "MK"),
    ("burma", "MM"),
    ("holland", "NL"),
];

#[derive(Debug, Clone, Default)]
pub struct CountryTable {
    entries: Vec<CountryCode>,
    by_name: HashMap<String, usize>,
    by_iso2: HashMap<String, usize>,
    by_iso3: HashMap<String, usize>,
}

impl CountryTable {
    pub fn embedded() -> Result<Self> {
        Self::from_csv(EMBEDDED_COUNTRY_CODES.as_bytes())
    }

    /// Header must be `name,iso2,iso3`.
    pub fn from_csv(data: &[u8]) -> Result<Self> {
        let mut table = Self::default();
        table.merge_csv(data)?;
        Ok(table)
    }

    /// 後載入的資料覆蓋同代碼或同名的既有項目
    pub fn merge_csv(&mut self, data: &[u8]) -> Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data);

        let mut added = 0;
        for row in reader.deserialize::<CountryCode>() {
            let mut country = row?;
            country.iso2 = country.iso2.to_ascii_uppercase();
            country.iso3 = country.iso3.to_ascii_uppercase();

            if country.iso2.len() != 2 || country.iso3.len() != 3 {
                return Err(HotspotError::ProcessingError {
                    message: format!(
                        "Invalid ISO codes for '{}': {}/{}",
                        country.name, country.iso2, country.iso3
                    ),
                });
            }

            self.insert(country);
            added += 1;
        }

        Ok(added)
    }

    fn insert(&mut self, country: CountryCode) {
        let existing = self
            .by_iso2
            .get(&country.iso2)
            .or_else(|| self.by_name.get(&normalize(&country.name)))
            .copied();

        let index = match existing {
            Some(index) => {
                let old = std::mem::replace(&mut self.entries[index], country.clone());
                self.by_name.remove(&normalize(&old.name));
                self.by_iso2.remove(&old.iso2);
                self.by_iso3.remove(&old.iso3);
                index
            }
            None => {
                self.entries.push(country.clone());
                self.entries.len() - 1
            }
        };

        self.by_name.insert(normalize(&country.name), index);
        self.by_iso2.insert(country.iso2, index);
        self.by_iso3.insert(country.iso3, index);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 依名稱、別名、alpha-2、alpha-3 的順序查找
    pub fn resolve(&self, query: &str) -> Result<&CountryCode> {
        let key = normalize(query);
        let upper = query.trim().to_ascii_uppercase();

        let alias = ALIASES
            .iter()
            .find(|(name, _)| *name == key)
            .and_then(|(_, iso2)| self.by_iso2.get(*iso2));

        self.by_name
            .get(&key)
            .or(alias)
            .or_else(|| self.by_iso2.get(&upper))
            .or_else(|| self.by_iso3.get(&upper))
            .map(|&index| &self.entries[index])
            .ok_or_else(|| HotspotError::LookupError {
                query: query.trim().to_string(),
            })
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_table_resolves_by_name_and_codes() {
        let table = CountryTable::embedded().unwrap();
        assert!(table.len() > 240);

        let uk = table.resolve("United Kingdom").unwrap();
        assert_eq!(uk.iso2, "GB");
        assert_eq!(uk.iso3, "GBR");

        assert_eq!(table.resolve("  united   kingdom ").unwrap().iso2, "GB");
        assert_eq!(table.resolve("gb").unwrap().iso3, "GBR");
        assert_eq!(table.resolve("GBR").unwrap().iso2, "GB");
        assert_eq!(table.resolve("UK").unwrap().iso2, "GB");
        assert_eq!(
            table.resolve("Congo, Democratic Republic of the").unwrap().iso3,
            "COD"
        );
    }

    #[test]
    fn test_unknown_country_is_lookup_error() {
        let table = CountryTable::embedded().unwrap();
        let err = table.resolve("Atlantis").unwrap_err();
        assert!(matches!(err, HotspotError::LookupError { ref query } if query == "Atlantis"));
    }

    #[test]
    fn test_merge_overrides_existing_entry() {
        let mut table = CountryTable::embedded().unwrap();
        let before = table.len();

        let added = table
            .merge_csv(b"name,iso2,iso3\nScotland,GB,GBR\nNew Land,QZ,QZZ\n")
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(table.len(), before + 1);

        assert_eq!(table.resolve("scotland").unwrap().iso3, "GBR");
        assert!(table.resolve("United Kingdom").is_err());
        assert_eq!(table.resolve("QZ").unwrap().name, "New Land");
    }

    #[test]
    fn test_invalid_codes_are_rejected() {
        assert!(CountryTable::from_csv(b"name,iso2,iso3\nBad,GBR,GB\n").is_err());
    }
}
