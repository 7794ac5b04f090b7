use anyhow::{anyhow, bail, Context, Result};
use percent_encoding::{percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::model::{GroupedRecord, PivotedRecord};

/// Gender labels of the summary columns. "ALL" does not match the "All"
/// spelling used in the source data; the comparison is kept case-sensitive.
const ALL_COLUMN: &str = "ALL";
const BOYS_COLUMN: &str = "Boys";
const GIRLS_COLUMN: &str = "Girls";

/// ASCII characters that cannot appear literally inside one path segment.
const PATH_HOSTILE: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'\\')
    .add(b'%')
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|');

/// How geography/ethnicity values become directory and file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMode {
    /// Percent-encode characters that would break out of a path segment.
    #[default]
    Sanitized,
    /// Use the values byte-for-byte.
    Verbatim,
}

impl PathMode {
    fn segment(self, raw: &str) -> String {
        match self {
            PathMode::Verbatim => raw.to_string(),
            PathMode::Sanitized => encode_segment(raw),
        }
    }
}

/// Injective: a literal `%` always becomes `%25`, so the bare `%` used for
/// an empty value and the `%2E` forms of `.`/`..` cannot come from any other
/// input.
fn encode_segment(raw: &str) -> String {
    match raw {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => {
            let mut out = String::with_capacity(raw.len());
            for ch in raw.chars() {
                if ch.is_ascii() {
                    out.extend(percent_encode(&[ch as u8], PATH_HOSTILE));
                } else {
                    out.push(ch);
                }
            }
            out
        }
    }
}

/// `{geography}-{ethnicity}.json` and `./{geography}/{ethnicity}/{file_name}`.
pub fn output_names(geography: &str, ethnicity: &str, mode: PathMode) -> (String, String) {
    let geography = mode.segment(geography);
    let ethnicity = mode.segment(ethnicity);
    let file_name = format!("{}-{}.json", geography, ethnicity);
    let relative_file_path = format!("./{}/{}/{}", geography, ethnicity, file_name);
    (file_name, relative_file_path)
}

/// Genders seen for one key, in first-seen order.
struct Splits<'a> {
    geography: &'a str,
    ethnicity: &'a str,
    values: Vec<(&'a str, u64)>,
}

impl<'a> Splits<'a> {
    fn add(&mut self, gender: &'a str, total: u64) -> Result<()> {
        let (geography, ethnicity) = (self.geography, self.ethnicity);
        match self.values.iter_mut().find(|(g, _)| *g == gender) {
            Some((_, v)) => {
                *v = v.checked_add(total).ok_or_else(|| {
                    anyhow!(
                        "total overflows for {}/{}/{}",
                        geography,
                        ethnicity,
                        gender
                    )
                })?;
            }
            None => self.values.push((gender, total)),
        }
        Ok(())
    }

    fn column(&self, gender: &str) -> u64 {
        self.values
            .iter()
            .find(|(g, _)| *g == gender)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    fn into_record(self, mode: PathMode) -> Result<PivotedRecord> {
        let all_value = self.column(ALL_COLUMN);
        let boys_value = self.column(BOYS_COLUMN);
        let girls_value = self.column(GIRLS_COLUMN);

        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(g, v)| (g.to_string(), Value::from(*v)))
            .collect();
        let json_content = serde_json::to_string(&map).with_context(|| {
            format!(
                "serializing gender splits for {}/{}",
                self.geography, self.ethnicity
            )
        })?;

        let (file_name, relative_file_path) = output_names(self.geography, self.ethnicity, mode);
        Ok(PivotedRecord {
            geography: self.geography.to_string(),
            ethnicity: self.ethnicity.to_string(),
            all_value,
            boys_value,
            girls_value,
            json_content,
            file_name,
            relative_file_path,
        })
    }
}

/// Reshape grouped rows (one per gender) into one record per
/// (geography, ethnicity). Keys keep the order they first appear in `groups`.
#[tracing::instrument(level = "info", skip(groups), fields(groups = groups.len()))]
pub fn pivot(groups: &[GroupedRecord], mode: PathMode) -> Result<Vec<PivotedRecord>> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut keys: Vec<Splits<'_>> = Vec::new();

    for g in groups {
        let key = (g.geography.as_str(), g.ethnicity.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            keys.push(Splits {
                geography: key.0,
                ethnicity: key.1,
                values: Vec::new(),
            });
            keys.len() - 1
        });
        keys[slot].add(&g.gender, g.total_value)?;
    }

    let pivoted = keys
        .into_iter()
        .map(|s| s.into_record(mode))
        .collect::<Result<Vec<_>>>()?;

    let mut paths = HashSet::with_capacity(pivoted.len());
    for p in &pivoted {
        if !paths.insert(p.relative_file_path.as_str()) {
            bail!(
                "{}/{} maps to {} which another key already uses",
                p.geography,
                p.ethnicity,
                p.relative_file_path
            );
        }
        debug!(path = %p.relative_file_path, json = %p.json_content, "pivoted");
    }
    info!(records = pivoted.len(), "pivoted");
    Ok(pivoted)
}
