use std::collections::BTreeMap;

use crate::models::{PlaceKey, RateRecord};

/// Normalized location name -> owning triple. A BTreeMap so that substring
/// scans walk keys in sorted order and repeated lookups always agree.
pub type LocationIndex = BTreeMap<String, PlaceKey>;

pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Builds the index once per dataset. Duplicate normalized names keep the
/// first record seen.
pub fn build_location_index(records: &[RateRecord]) -> LocationIndex {
    let mut index = LocationIndex::new();
    for record in records {
        index
            .entry(normalize_text(&record.location))
            .or_insert_with(|| PlaceKey::of(record));
    }
    index
}

/// Maps free text to a canonical (district, taluka, location) triple.
///
/// Rules run in order, first success wins: exact location key, substring
/// match either direction over sorted keys, taluka equality, district
/// equality. No scoring; ties break on sorted order.
pub fn resolve(text: &str, records: &[RateRecord], index: &LocationIndex) -> Option<PlaceKey> {
    let needle = normalize_text(text);
    if needle.is_empty() {
        return None;
    }

    if let Some(place) = index.get(&needle) {
        return Some(place.clone());
    }

    for (key, place) in index {
        if key.contains(&needle) || needle.contains(key.as_str()) {
            return Some(place.clone());
        }
    }

    match_by(records, &needle, |record| &record.taluka)
        .or_else(|| match_by(records, &needle, |record| &record.district))
}

fn match_by<'a, F>(records: &'a [RateRecord], needle: &str, field: F) -> Option<PlaceKey>
where
    F: Fn(&RateRecord) -> &str,
{
    let mut hits = records
        .iter()
        .filter(|record| normalize_text(field(record)) == needle)
        .collect::<Vec<_>>();

    if hits.is_empty() {
        return None;
    }
    hits.sort_by(|a, b| a.location.cmp(&b.location));

    let preferred = hits
        .iter()
        .find(|record| normalize_text(&record.location) == needle)
        .copied()
        .unwrap_or(hits[0]);

    Some(PlaceKey::of(preferred))
}
