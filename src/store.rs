//! Per-state records and the store that owns them.
//!
//! The store is populated once by ingestion and then queried read-only. Its
//! flat CSV form (`State, Population, Median Age, Period, Cases, Deaths`,
//! one row per state and period, or one profile row with empty counts for a
//! state without periods) is the only durable artifact and doubles as the
//! ingestion cache.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CovidError, Result};
use crate::parser::strip_bom;
use crate::period::Period;

/// Counts attributed to one month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeriodCounts {
    pub cases: i64,
    pub deaths: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    state_code: String,
    population: u64,
    median_age: f64,
    periods: BTreeMap<Period, PeriodCounts>,
}

impl StateRecord {
    pub fn new(state_code: impl Into<String>) -> Self {
        Self::with_profile(state_code, 0, 0.0)
    }

    pub fn with_profile(state_code: impl Into<String>, population: u64, median_age: f64) -> Self {
        Self {
            state_code: state_code.into(),
            population,
            median_age,
            periods: BTreeMap::new(),
        }
    }

    pub fn state_code(&self) -> &str {
        &self.state_code
    }

    pub fn population(&self) -> u64 {
        self.population
    }

    pub fn median_age(&self) -> f64 {
        self.median_age
    }

    pub fn set_population(&mut self, population: u64) {
        self.population = population;
    }

    pub fn set_median_age(&mut self, median_age: f64) {
        self.median_age = median_age;
    }

    /// Periods in month order.
    pub fn periods(&self) -> impl Iterator<Item = (Period, PeriodCounts)> + '_ {
        self.periods.iter().map(|(p, c)| (*p, *c))
    }

    pub fn period(&self, period: Period) -> Option<PeriodCounts> {
        self.periods.get(&period).copied()
    }

    pub fn has_period(&self, period: Period) -> bool {
        self.periods.contains_key(&period)
    }

    /// Adds `delta` to the period's case count, creating the bucket if absent.
    pub fn add_cases(&mut self, period: Period, delta: i64) {
        self.periods.entry(period).or_default().cases += delta;
    }

    /// Adds `delta` to the period's death count, creating the bucket if absent.
    pub fn add_deaths(&mut self, period: Period, delta: i64) {
        self.periods.entry(period).or_default().deaths += delta;
    }

    pub fn total_cases(&self) -> i64 {
        self.periods.values().map(|c| c.cases).sum()
    }

    pub fn total_deaths(&self) -> i64 {
        self.periods.values().map(|c| c.deaths).sum()
    }

    /// Largest single-period case count, `None` without periods.
    pub fn max_cases(&self) -> Option<i64> {
        self.periods.values().map(|c| c.cases).max()
    }

    /// Largest single-period death count, `None` without periods.
    pub fn max_deaths(&self) -> Option<i64> {
        self.periods.values().map(|c| c.deaths).max()
    }
}

impl fmt::Display for StateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "State: {}, Population: {}, Median Age: {}, Data: {{",
            self.state_code, self.population, self.median_age
        )?;
        for (i, (period, counts)) in self.periods.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: ({}, {})", period, counts.cases, counts.deaths)?;
        }
        f.write_str("}")
    }
}

/// Population and counts summed over every state in a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NationalTotals {
    pub population: u64,
    pub cases: i64,
    pub deaths: i64,
}

/// Owns every [`StateRecord`], keyed by state code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateRecordStore {
    records: BTreeMap<String, StateRecord>,
}

impl StateRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, state: &str) -> bool {
        self.records.contains_key(state)
    }

    /// Adds a prepared record, replacing any record with the same code.
    pub fn insert(&mut self, record: StateRecord) {
        self.records.insert(record.state_code.clone(), record);
    }

    /// Records in state-code order.
    pub fn states(&self) -> impl Iterator<Item = &StateRecord> {
        self.records.values()
    }

    pub fn get(&self, state: &str) -> Result<&StateRecord> {
        self.records
            .get(state)
            .ok_or_else(|| CovidError::StateNotFound(state.to_string()))
    }

    fn entry(&mut self, state: &str) -> &mut StateRecord {
        self.records
            .entry(state.to_string())
            .or_insert_with(|| StateRecord::new(state))
    }

    pub fn upsert_cases(&mut self, state: &str, period: Period, delta: i64) {
        self.entry(state).add_cases(period, delta);
    }

    pub fn upsert_deaths(&mut self, state: &str, period: Period, delta: i64) {
        self.entry(state).add_deaths(period, delta);
    }

    pub fn set_population(&mut self, state: &str, population: u64) {
        self.entry(state).set_population(population);
    }

    pub fn set_median_age(&mut self, state: &str, median_age: f64) {
        self.entry(state).set_median_age(median_age);
    }

    pub fn has_period(&self, state: &str, period: Period) -> Result<bool> {
        Ok(self.get(state)?.has_period(period))
    }

    pub fn total_cases(&self, state: &str) -> Result<i64> {
        Ok(self.get(state)?.total_cases())
    }

    pub fn total_deaths(&self, state: &str) -> Result<i64> {
        Ok(self.get(state)?.total_deaths())
    }

    pub fn max_cases(&self, state: &str) -> Result<Option<i64>> {
        Ok(self.get(state)?.max_cases())
    }

    pub fn max_deaths(&self, state: &str) -> Result<Option<i64>> {
        Ok(self.get(state)?.max_deaths())
    }

    pub fn cases_for_period(&self, state: &str, period: Period) -> Result<i64> {
        Ok(self.counts_for_period(state, period)?.cases)
    }

    pub fn deaths_for_period(&self, state: &str, period: Period) -> Result<i64> {
        Ok(self.counts_for_period(state, period)?.deaths)
    }

    fn counts_for_period(&self, state: &str, period: Period) -> Result<PeriodCounts> {
        self.get(state)?
            .period(period)
            .ok_or_else(|| CovidError::PeriodNotFound {
                state: state.to_string(),
                period: period.month(),
            })
    }

    pub fn national_totals(&self) -> NationalTotals {
        self.records
            .values()
            .fold(NationalTotals::default(), |acc, r| NationalTotals {
                population: acc.population + r.population,
                cases: acc.cases + r.total_cases(),
                deaths: acc.deaths + r.total_deaths(),
            })
    }

    /// Writes one flat row per `(state, period)` with a header row. A record
    /// without periods gets a single profile row with empty counts.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().has_headers(true).from_writer(writer);

        for record in self.records.values() {
            let profile = FlatRow {
                state: record.state_code.clone(),
                population: record.population,
                median_age: record.median_age,
                period: None,
                cases: None,
                deaths: None,
            };
            if record.periods.is_empty() {
                wtr.serialize(&profile)?;
                continue;
            }
            for (period, counts) in record.periods() {
                wtr.serialize(FlatRow {
                    period: Some(period),
                    cases: Some(counts.cases),
                    deaths: Some(counts.deaths),
                    ..profile.clone()
                })?;
            }
        }

        wtr.flush()?;
        Ok(())
    }

    /// Rebuilds a store from flat rows. A file without a `Cases` column
    /// (death-only ingestion) yields zero cases.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
        let mut store = Self::new();

        for result in rdr.deserialize() {
            let row: FlatRow = result?;
            let record = store.entry(&row.state);
            record.set_population(row.population);
            record.set_median_age(row.median_age);
            let Some(period) = row.period else {
                continue;
            };
            record.add_cases(period, row.cases.unwrap_or(0));
            record.add_deaths(period, row.deaths.unwrap_or(0));
        }

        Ok(store)
    }

    #[tracing::instrument(skip(self), fields(states = self.len()))]
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_csv(file)?;
        debug!(path = %path.display(), states = self.len(), "Store written");
        Ok(())
    }

    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let store = Self::read_csv(strip_bom(&bytes))?;
        debug!(path = %path.display(), states = store.len(), "Store read");
        Ok(store)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlatRow {
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Population")]
    population: u64,
    #[serde(rename = "Median Age")]
    median_age: f64,
    #[serde(rename = "Period")]
    period: Option<Period>,
    #[serde(rename = "Cases", default)]
    cases: Option<i64>,
    #[serde(rename = "Deaths")]
    deaths: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(month: u8) -> Period {
        Period::new(month).unwrap()
    }

    fn alabama() -> StateRecordStore {
        let mut store = StateRecordStore::new();
        for (month, deaths) in [(3, 3), (4, 27), (5, 30), (6, 90), (7, 150)] {
            store.upsert_deaths("AL", p(month), deaths);
        }
        store
    }

    #[test]
    fn test_alabama_totals() {
        let store = alabama();

        assert_eq!(store.total_deaths("AL").unwrap(), 300);
        assert_eq!(store.max_deaths("AL").unwrap(), Some(150));
        assert_eq!(store.deaths_for_period("AL", p(4)).unwrap(), 27);
    }

    #[test]
    fn test_add_deaths_to_absent_period_creates_bucket() {
        let mut record = StateRecord::with_profile("TX", 28_000_000, 35.0);
        record.add_deaths(p(3), 100);

        assert_eq!(record.period(p(3)).unwrap().deaths, 100);
        assert_eq!(
            record.to_string(),
            "State: TX, Population: 28000000, Median Age: 35, Data: {3: (0, 100)}"
        );
    }

    #[test]
    fn test_repeated_adds_accumulate() {
        let mut store = StateRecordStore::new();
        for delta in [100, 50, -5, 5] {
            store.upsert_deaths("TX", p(3), delta);
        }
        store.upsert_deaths("TX", p(4), 200);

        assert_eq!(store.deaths_for_period("TX", p(3)).unwrap(), 150);
        assert_eq!(store.deaths_for_period("TX", p(4)).unwrap(), 200);
        assert_eq!(store.total_deaths("TX").unwrap(), 350);
    }

    #[test]
    fn test_cases_and_deaths_share_period_bucket() {
        let mut store = StateRecordStore::new();
        store.upsert_cases("CO", p(5), 500);
        store.upsert_deaths("CO", p(5), 45);

        let record = store.get("CO").unwrap();
        assert_eq!(record.period(p(5)), Some(PeriodCounts { cases: 500, deaths: 45 }));
        assert_eq!(store.max_cases("CO").unwrap(), Some(500));
    }

    #[test]
    fn test_missing_period_is_an_error_not_zero() {
        let mut store = StateRecordStore::new();
        store.upsert_deaths("NY", p(4), 10);

        let err = store.deaths_for_period("NY", p(3)).unwrap_err();
        assert!(matches!(err, CovidError::PeriodNotFound { ref state, period: 3 } if state == "NY"));
        assert!(!store.has_period("NY", p(3)).unwrap());
        assert!(store.has_period("NY", p(4)).unwrap());
    }

    #[test]
    fn test_unknown_state() {
        let store = alabama();
        assert!(matches!(store.get("NY"), Err(CovidError::StateNotFound(_))));
        assert!(store.total_deaths("NY").is_err());
    }

    #[test]
    fn test_profile_is_last_write_wins() {
        let mut store = alabama();
        store.set_population("AL", 400);
        store.set_population("AL", 4_903_185);
        store.set_median_age("AL", 39.4);

        let al = store.get("AL").unwrap();
        assert_eq!(al.population(), 4_903_185);
        assert_eq!(al.median_age(), 39.4);
    }

    #[test]
    fn test_max_of_empty_record() {
        let mut store = StateRecordStore::new();
        store.insert(StateRecord::new("WY"));
        assert_eq!(store.max_deaths("WY").unwrap(), None);
        assert_eq!(store.total_deaths("WY").unwrap(), 0);
    }

    #[test]
    fn test_national_totals() {
        let mut store = alabama();
        store.set_population("AL", 400);
        store.upsert_cases("AL", p(3), 30);
        store.upsert_deaths("CO", p(3), 27);
        store.upsert_cases("CO", p(3), 150);
        store.set_population("CO", 3001);

        assert_eq!(
            store.national_totals(),
            NationalTotals {
                population: 3401,
                cases: 180,
                deaths: 327
            }
        );
    }

    #[test]
    fn test_csv_round_trip() {
        let mut store = alabama();
        store.set_population("AL", 400);
        store.set_median_age("AL", 39.4);
        store.upsert_cases("AL", p(3), 30);
        store.upsert_deaths("CO", p(6), -2);
        store.set_median_age("CO", 37.1);

        let mut buf = Vec::new();
        store.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("State,Population,Median Age,Period,Cases,Deaths\n"));
        assert!(text.contains("AL,400,39.4,3,30,3\n"));

        let restored = StateRecordStore::read_csv(buf.as_slice()).unwrap();
        assert_eq!(restored, store);
        for record in store.states() {
            let code = record.state_code();
            assert_eq!(restored.total_deaths(code).unwrap(), record.total_deaths());
            assert_eq!(restored.max_deaths(code).unwrap(), record.max_deaths());
        }
    }

    #[test]
    fn test_csv_round_trip_keeps_states_without_periods() {
        let mut store = StateRecordStore::new();
        store.set_population("WY", 576_851);
        store.set_median_age("WY", 38.0);
        store.insert(StateRecord::new("VT"));
        store.upsert_deaths("AL", p(3), 3);

        let mut buf = Vec::new();
        store.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.lines().any(|l| l.starts_with("WY,576851,") && l.ends_with(",,,")));

        let restored = StateRecordStore::read_csv(buf.as_slice()).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored, store);
        assert_eq!(restored.total_deaths("WY").unwrap(), 0);
        assert_eq!(restored.max_deaths("WY").unwrap(), None);
        assert_eq!(restored.get("WY").unwrap().population(), 576_851);
        assert!(!restored.has_period("VT", p(3)).unwrap());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("covid.data.txt");
        let store = alabama();

        store.save(&path).unwrap();
        let restored = StateRecordStore::load(&path).unwrap();

        assert_eq!(restored.deaths_for_period("AL", p(7)).unwrap(), 150);
    }

    #[test]
    fn test_reads_death_only_file() {
        let csv = "State,Population,Median Age,Period,Deaths\n\
                   AL,400,39.4,3,3\n\
                   AL,400,39.4,4,27\n";
        let store = StateRecordStore::read_csv(csv.as_bytes()).unwrap();

        assert_eq!(store.total_deaths("AL").unwrap(), 30);
        assert_eq!(store.total_cases("AL").unwrap(), 0);
        assert_eq!(store.get("AL").unwrap().population(), 400);
    }

    #[test]
    fn test_rejects_out_of_range_period() {
        let csv = "State,Population,Median Age,Period,Cases,Deaths\nAL,1,1,13,0,0\n";
        assert!(StateRecordStore::read_csv(csv.as_bytes()).is_err());
    }
}
