use crate::models::{RateRecord, RateType, RateValue};

/// Reads one rate cell for a fully resolved triple. Keys are matched
/// case-sensitively: callers hand in canonical triples from the resolver,
/// not raw user text. Returns `None` for a missing row or an unavailable
/// cell (absent, NaN, blank, or "not applicable").
pub fn get_rate<'a>(
    records: &'a [RateRecord],
    district: &str,
    taluka: &str,
    location: &str,
    rate_type: RateType,
) -> Option<&'a RateValue> {
    records
        .iter()
        .find(|record| {
            record.district == district && record.taluka == taluka && record.location == location
        })
        .and_then(|record| record.rate(rate_type))
        .filter(|value| value.is_available())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hinjewadi() -> RateRecord {
        RateRecord {
            district: "Pune".to_string(),
            taluka: "Haveli".to_string(),
            location: "Hinjewadi".to_string(),
            industrial: Some(RateValue::Amount(5000.0)),
            residential: None,
            commercial: Some(RateValue::Text("not applicable".to_string())),
        }
    }

    #[test]
    fn returns_available_cell() {
        let records = vec![hinjewadi()];
        let rate = get_rate(&records, "Pune", "Haveli", "Hinjewadi", RateType::Industrial);
        assert_eq!(rate, Some(&RateValue::Amount(5000.0)));
    }

    #[test]
    fn absent_cell_is_none() {
        let records = vec![hinjewadi()];
        assert!(get_rate(&records, "Pune", "Haveli", "Hinjewadi", RateType::Residential).is_none());
    }

    #[test]
    fn not_applicable_cell_is_none() {
        let records = vec![hinjewadi()];
        assert!(get_rate(&records, "Pune", "Haveli", "Hinjewadi", RateType::Commercial).is_none());
    }

    #[test]
    fn unknown_triple_is_none() {
        let records = vec![hinjewadi()];
        assert!(get_rate(&records, "Pune", "Haveli", "Chakan", RateType::Industrial).is_none());
    }

    #[test]
    fn triple_match_is_case_sensitive() {
        let records = vec![hinjewadi()];
        assert!(get_rate(&records, "pune", "Haveli", "Hinjewadi", RateType::Industrial).is_none());
    }
}
