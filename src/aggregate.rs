use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use tracing::info;

use crate::model::{GroupedRecord, RawRecord};

/// Sum `denominator` per (geography, ethnicity, gender), skipping the
/// "All" ethnicity and "All - England" geography total rows.
///
/// Output is ordered by (geography, ethnicity, gender), byte-wise. A group
/// whose sum overflows `u64` is a data error.
#[tracing::instrument(level = "info", skip(rows), fields(rows = rows.len()))]
pub fn aggregate(rows: &[RawRecord]) -> Result<Vec<GroupedRecord>> {
    let mut sums: BTreeMap<(&str, &str, &str), u64> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.is_breakdown()) {
        let total = sums
            .entry((
                row.geography.as_str(),
                row.ethnicity.as_str(),
                row.gender.as_str(),
            ))
            .or_insert(0);
        *total = total.checked_add(row.denominator).ok_or_else(|| {
            anyhow!(
                "denominator sum overflows for {}/{}/{}",
                row.geography,
                row.ethnicity,
                row.gender
            )
        })?;
    }

    let grouped: Vec<GroupedRecord> = sums
        .into_iter()
        .map(|((geography, ethnicity, gender), total_value)| GroupedRecord {
            geography: geography.to_string(),
            ethnicity: ethnicity.to_string(),
            gender: gender.to_string(),
            total_value,
        })
        .collect();

    info!(groups = grouped.len(), "aggregated");
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::raw;
    use crate::model::{ALL_ENGLAND, ALL_ETHNICITIES};
    use std::collections::HashMap;

    #[test]
    fn derby_example() -> Result<()> {
        let rows = vec![
            raw("Derby", "Asian", "Boys", 125),
            raw("Derby", "Asian", "Girls", 130),
            raw("Derby", "Asian", "All", 255),
        ];
        let grouped = aggregate(&rows)?;
        let got: Vec<(&str, &str, &str, u64)> = grouped
            .iter()
            .map(|g| {
                (
                    g.geography.as_str(),
                    g.ethnicity.as_str(),
                    g.gender.as_str(),
                    g.total_value,
                )
            })
            .collect();
        assert_eq!(
            got,
            vec![
                ("Derby", "Asian", "All", 255),
                ("Derby", "Asian", "Boys", 125),
                ("Derby", "Asian", "Girls", 130),
            ]
        );
        Ok(())
    }

    #[test]
    fn totals_are_filtered_out() -> Result<()> {
        let rows = vec![
            raw("Derby", ALL_ETHNICITIES, "Boys", 1000),
            raw(ALL_ENGLAND, "Asian", "Boys", 1000),
            raw(ALL_ENGLAND, ALL_ETHNICITIES, "All", 1000),
            raw("Derby", "Black", "Boys", 7),
        ];
        let grouped = aggregate(&rows)?;
        assert_eq!(grouped.len(), 1);
        assert!(grouped
            .iter()
            .all(|g| g.ethnicity != ALL_ETHNICITIES && g.geography != ALL_ENGLAND));
        assert_eq!(grouped[0].total_value, 7);
        Ok(())
    }

    #[test]
    fn sums_repeated_keys_and_conserves_mass() -> Result<()> {
        let rows = vec![
            raw("Barking and Dagenham", "Asian", "Boys", 100),
            raw("Barking and Dagenham", "Asian", "Boys", 170),
            raw("Barking and Dagenham", "Asian", "Girls", 285),
            raw("Barking and Dagenham", "Black", "Girls", 334),
            raw("Derby", "Asian", "Girls", 1),
            raw("Derby", ALL_ETHNICITIES, "Girls", 99),
        ];
        let grouped = aggregate(&rows)?;

        let mut expected: HashMap<(String, String), u64> = HashMap::new();
        for r in rows.iter().filter(|r| r.is_breakdown()) {
            *expected
                .entry((r.geography.clone(), r.ethnicity.clone()))
                .or_default() += r.denominator;
        }
        let mut actual: HashMap<(String, String), u64> = HashMap::new();
        for g in &grouped {
            *actual
                .entry((g.geography.clone(), g.ethnicity.clone()))
                .or_default() += g.total_value;
        }
        assert_eq!(expected, actual);

        let boys = grouped
            .iter()
            .find(|g| g.ethnicity == "Asian" && g.gender == "Boys")
            .map(|g| g.total_value);
        assert_eq!(boys, Some(270));
        Ok(())
    }

    #[test]
    fn ordering_is_case_sensitive_bytewise() -> Result<()> {
        let rows = vec![
            raw("derby", "Asian", "Boys", 1),
            raw("Derby", "asian", "Boys", 1),
            raw("Derby", "Asian", "girls", 1),
            raw("Derby", "Asian", "Girls", 1),
        ];
        let keys: Vec<(String, String, String)> = aggregate(&rows)?
            .into_iter()
            .map(|g| (g.geography, g.ethnicity, g.gender))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[0].0, "Derby");
        assert_eq!(keys[0].2, "Girls");
        assert_eq!(keys[3].0, "derby");
        Ok(())
    }

    #[test]
    fn empty_input_yields_nothing() -> Result<()> {
        assert!(aggregate(&[])?.is_empty());
        Ok(())
    }

    #[test]
    fn overflowing_sum_is_a_data_error() {
        let rows = vec![
            raw("Derby", "Asian", "Boys", u64::MAX / 2 + 1),
            raw("Derby", "Asian", "Boys", u64::MAX / 2 + 1),
        ];
        let err = aggregate(&rows).unwrap_err();
        assert!(err.to_string().contains("Derby/Asian/Boys"));
    }
}
