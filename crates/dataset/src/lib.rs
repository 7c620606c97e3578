use std::path::Path;

use anyhow::{Context, Result};
use midc_core::{
    build_location_index, get_rate, resolve, LocationIndex, PlaceKey, RateRecord, RateType,
    RateValue,
};
use serde::Deserialize;
use walkdir::WalkDir;

/// One row as it appears in a dataset file, before cleaning. District and
/// taluka cells are blank on merged-cell exports and get forward-filled;
/// rows without a location are dropped.
#[derive(Debug, Clone, Deserialize)]
struct RawRow {
    #[serde(default)]
    district: Option<String>,
    #[serde(default)]
    taluka: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    industrial_rate: Option<RateValue>,
    #[serde(default)]
    residential_rate: Option<RateValue>,
    #[serde(default)]
    commercial_rate: Option<RateValue>,
}

#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub records_loaded: usize,
    pub locations_indexed: usize,
    pub districts: usize,
}

/// The cleaned rate table plus its location index. Built once at startup and
/// shared read-only; sessions never mutate it.
#[derive(Debug, Clone)]
pub struct RateTable {
    records: Vec<RateRecord>,
    index: LocationIndex,
}

impl RateTable {
    /// Loads a dataset from a single JSON file or from every `.json` file
    /// under a directory, cleans it, and builds the index.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut rows = Vec::new();

        if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| {
                    entry.path().extension().and_then(|ext| ext.to_str()) == Some("json")
                })
            {
                rows.extend(read_rows(entry.path())?);
            }
        } else {
            rows = read_rows(path)?;
        }

        Ok(Self::from_rows(rows))
    }

    /// Builds a table from already-cleaned records. Used by hosts that own
    /// their own loading, and by tests.
    pub fn from_records(mut records: Vec<RateRecord>) -> Self {
        records.sort_by(|a, b| {
            (&a.district, &a.taluka, &a.location).cmp(&(&b.district, &b.taluka, &b.location))
        });
        let index = build_location_index(&records);
        Self { records, index }
    }

    fn from_rows(rows: Vec<RawRow>) -> Self {
        let mut records = Vec::with_capacity(rows.len());
        let mut last_district = String::new();
        let mut last_taluka = String::new();

        for row in rows {
            if let Some(district) = non_empty(row.district) {
                last_district = district;
            }
            if let Some(taluka) = non_empty(row.taluka) {
                last_taluka = taluka;
            }

            let Some(location) = non_empty(row.location) else {
                continue;
            };
            if last_district.is_empty() || last_taluka.is_empty() {
                // Location rows before the first district/taluka header have
                // no owner and cannot be keyed.
                continue;
            }

            records.push(RateRecord {
                district: last_district.clone(),
                taluka: last_taluka.clone(),
                location,
                industrial: row.industrial_rate,
                residential: row.residential_rate,
                commercial: row.commercial_rate,
            });
        }

        Self::from_records(records)
    }

    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            records_loaded: self.records.len(),
            locations_indexed: self.index.len(),
            districts: self.districts().len(),
        }
    }

    pub fn records(&self) -> &[RateRecord] {
        &self.records
    }

    pub fn index(&self) -> &LocationIndex {
        &self.index
    }

    pub fn resolve(&self, text: &str) -> Option<PlaceKey> {
        resolve(text, &self.records, &self.index)
    }

    pub fn get_rate(
        &self,
        district: &str,
        taluka: &str,
        location: &str,
        rate_type: RateType,
    ) -> Option<&RateValue> {
        get_rate(&self.records, district, taluka, location, rate_type)
    }

    pub fn districts(&self) -> Vec<String> {
        let mut names = self
            .records
            .iter()
            .map(|record| record.district.clone())
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();
        names
    }

    pub fn talukas(&self, district: &str) -> Vec<String> {
        let mut names = self
            .records
            .iter()
            .filter(|record| record.district == district)
            .map(|record| record.taluka.clone())
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();
        names
    }

    pub fn locations(&self, district: &str, taluka: &str) -> Vec<String> {
        let mut names = self
            .records
            .iter()
            .filter(|record| record.district == district && record.taluka == taluka)
            .map(|record| record.location.clone())
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();
        names
    }
}

fn read_rows(path: &Path) -> Result<Vec<RawRow>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading dataset file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing dataset rows from {}", path.display()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
