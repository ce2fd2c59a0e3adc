//! Typed CSV parsing for the raw sources.
//!
//! Every stream has its UTF-8 byte-order mark stripped once, before the
//! header row is interpreted, and all fields are whitespace-trimmed.

use std::collections::HashMap;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;

use crate::error::{CovidError, Result};

const BOM: &[u8] = b"\xEF\xBB\xBF";

const FIPS_COLUMN: &str = "countyFIPS";
const COUNTY_COLUMN: &str = "County Name";
const STATE_COLUMN: &str = "State";

/// Returns `bytes` without a leading UTF-8 byte-order mark.
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(BOM).unwrap_or(bytes)
}

fn reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .from_reader(strip_bom(bytes))
}

/// One row of the county population table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CountyPopulation {
    #[serde(rename = "countyFIPS")]
    pub county_fips: i64,
    #[serde(rename = "County Name")]
    pub county_name: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(alias = "Population")]
    pub population: u64,
}

#[derive(Debug, Deserialize)]
struct MedianAgeRow {
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Median")]
    median_age: f64,
}

/// Parses the county population table, keeping counties with a positive
/// identifier (statewide "unallocated" rows carry 0).
pub fn parse_population(bytes: &[u8]) -> Result<Vec<CountyPopulation>> {
    let mut rdr = reader(bytes);
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let row: CountyPopulation = result?;
        if row.county_fips > 0 {
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Parses the state median-age table into `state -> median age`.
pub fn parse_median_age(bytes: &[u8]) -> Result<HashMap<String, f64>> {
    let mut rdr = reader(bytes);
    let mut ages = HashMap::new();

    for result in rdr.deserialize() {
        let row: MedianAgeRow = result?;
        ages.insert(row.state, row.median_age);
    }

    Ok(ages)
}

/// A county row of a cumulative case or death table.
#[derive(Debug, Clone)]
pub struct CumulativeRow {
    pub county_fips: i64,
    pub county_name: String,
    pub state: String,
    line: u64,
    record: StringRecord,
}

/// A cumulative count table with one column per reporting date.
///
/// Date columns are located by their header text, never by position.
#[derive(Debug, Clone)]
pub struct CumulativeTable {
    source_name: String,
    columns: HashMap<String, usize>,
    rows: Vec<CumulativeRow>,
}

impl CumulativeTable {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn rows(&self) -> &[CumulativeRow] {
        &self.rows
    }

    pub fn has_column(&self, header: &str) -> bool {
        self.columns.contains_key(header)
    }

    /// Cumulative readings of `row` under each of `date_keys`, in order.
    ///
    /// # Errors
    ///
    /// [`CovidError::MissingColumn`] if a key is not a header,
    /// [`CovidError::MalformedValue`] if a cell is not an integer.
    pub fn readings(&self, row: &CumulativeRow, date_keys: &[String]) -> Result<Vec<i64>> {
        date_keys
            .iter()
            .map(|key| {
                let idx = self.column(key)?;
                let raw = row.record.get(idx).unwrap_or("");
                raw.parse::<i64>().map_err(|_| CovidError::MalformedValue {
                    source_name: self.source_name.clone(),
                    line: row.line,
                    column: key.clone(),
                    value: raw.to_string(),
                })
            })
            .collect()
    }

    fn column(&self, header: &str) -> Result<usize> {
        self.columns
            .get(header)
            .copied()
            .ok_or_else(|| CovidError::MissingColumn {
                source_name: self.source_name.clone(),
                column: header.to_string(),
            })
    }
}

/// Parses a cumulative count table (cases or deaths).
///
/// Requires `countyFIPS` and `State` columns; `County Name` is optional.
/// Rows whose identifier is not positive are skipped.
pub fn parse_cumulative(source_name: &str, bytes: &[u8]) -> Result<CumulativeTable> {
    let mut rdr = reader(bytes);

    let columns: HashMap<String, usize> = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_string(), i))
        .collect();

    let mut table = CumulativeTable {
        source_name: source_name.to_string(),
        columns,
        rows: Vec::new(),
    };

    let fips_idx = table.column(FIPS_COLUMN)?;
    let state_idx = table.column(STATE_COLUMN)?;
    let county_idx = table.columns.get(COUNTY_COLUMN).copied();

    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());

        let raw_fips = record.get(fips_idx).unwrap_or("");
        let county_fips: i64 = raw_fips.parse().map_err(|_| CovidError::MalformedValue {
            source_name: source_name.to_string(),
            line,
            column: FIPS_COLUMN.to_string(),
            value: raw_fips.to_string(),
        })?;

        if county_fips <= 0 {
            continue;
        }

        let state = record.get(state_idx).unwrap_or("").to_string();
        let county_name = county_idx
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .to_string();

        table.rows.push(CumulativeRow {
            county_fips,
            county_name,
            state,
            line,
            record,
        });
    }

    Ok(table)
}
