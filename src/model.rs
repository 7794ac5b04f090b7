use serde::{Deserialize, Serialize};

/// Rows with this ethnicity are totals and never reach the grouped set.
pub const ALL_ETHNICITIES: &str = "All";
/// Rows with this geography are the national total and are filtered out.
pub const ALL_ENGLAND: &str = "All - England";

/// Column names the source file must carry, in source order.
pub const REQUIRED_COLUMNS: [&str; 13] = [
    "Measure",
    "Ethnicity",
    "Ethnicity_type",
    "Time",
    "Time_type",
    "Geography",
    "Geography_type",
    "Geography_code",
    "Gender",
    "Value",
    "Value_type",
    "Denominator",
    "Numerator",
];

/// One record of the source file, exactly as read.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawRecord {
    #[serde(rename = "Measure")]
    pub measure: String,
    #[serde(rename = "Ethnicity")]
    pub ethnicity: String,
    #[serde(rename = "Ethnicity_type")]
    pub ethnicity_type: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Time_type")]
    pub time_type: String,
    #[serde(rename = "Geography")]
    pub geography: String,
    #[serde(rename = "Geography_type")]
    pub geography_type: String,
    #[serde(rename = "Geography_code")]
    pub geography_code: String,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Value_type")]
    pub value_type: String,
    #[serde(rename = "Denominator")]
    pub denominator: u64,
    #[serde(rename = "Numerator")]
    pub numerator: u64,
}

impl RawRecord {
    /// True when the row survives the total-row filter of the aggregation.
    pub fn is_breakdown(&self) -> bool {
        self.ethnicity != ALL_ETHNICITIES && self.geography != ALL_ENGLAND
    }
}

/// Sum of denominators for one (geography, ethnicity, gender).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupedRecord {
    pub geography: String,
    pub ethnicity: String,
    pub gender: String,
    pub total_value: u64,
}

/// Wide form of the grouped rows for one (geography, ethnicity), carrying the
/// JSON document to write and where to write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotedRecord {
    pub geography: String,
    pub ethnicity: String,
    pub all_value: u64,
    pub boys_value: u64,
    pub girls_value: u64,
    pub json_content: String,
    pub file_name: String,
    pub relative_file_path: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::RawRecord;

    /// Build a record with only the fields the pipeline looks at filled in.
    pub fn raw(geography: &str, ethnicity: &str, gender: &str, denominator: u64) -> RawRecord {
        RawRecord {
            measure: "Percentage achieving 9-5 in English & mathematics".to_string(),
            ethnicity: ethnicity.to_string(),
            ethnicity_type: "ONS 2011 5+1".to_string(),
            time: "2019-2020".to_string(),
            time_type: "Academic year".to_string(),
            geography: geography.to_string(),
            geography_type: "Local authority".to_string(),
            geography_code: "E06000015".to_string(),
            gender: gender.to_string(),
            value: 43.9,
            value_type: "%".to_string(),
            denominator,
            numerator: denominator / 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::raw;

    #[test]
    fn total_rows_are_not_breakdowns() {
        assert!(raw("Derby", "Asian", "Boys", 1).is_breakdown());
        assert!(!raw("Derby", "All", "Boys", 1).is_breakdown());
        assert!(!raw("All - England", "Asian", "Boys", 1).is_breakdown());
        // filter is case-sensitive
        assert!(raw("Derby", "ALL", "Boys", 1).is_breakdown());
    }
}
