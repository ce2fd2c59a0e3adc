//! Per-period and range queries over the state store.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{CovidError, Result};
use crate::period::{MonthWindow, Period, REPORTING_WINDOW};
use crate::store::{StateRecord, StateRecordStore};

/// Column result rows are ordered by. Ties always fall back to state code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Population,
    MedianAge,
    State,
}

impl FromStr for SortKey {
    type Err = CovidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "population" => Ok(SortKey::Population),
            "median_age" | "age" => Ok(SortKey::MedianAge),
            "state" => Ok(SortKey::State),
            _ => Err(CovidError::InvalidSortKey(s.to_string())),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Population => "population",
            SortKey::MedianAge => "median_age",
            SortKey::State => "state",
        })
    }
}

/// The state columns every report row carries, so all of them sort alike.
pub trait StateProfile {
    fn state(&self) -> &str;
    fn population(&self) -> u64;
    fn median_age(&self) -> f64;
}

/// Sorts ascending by `key`, breaking ties by state code.
pub fn sort_rows<T: StateProfile>(rows: &mut [T], key: SortKey) {
    rows.sort_by(|a, b| {
        let primary = match key {
            SortKey::Population => a.population().cmp(&b.population()),
            SortKey::MedianAge => a.median_age().total_cmp(&b.median_age()),
            SortKey::State => Ordering::Equal,
        };
        primary.then_with(|| a.state().cmp(b.state()))
    });
}

/// Which months a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    Period(Period),
    Range(MonthWindow),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRow {
    pub state: String,
    pub population: u64,
    pub median_age: f64,
    pub cases: i64,
    pub deaths: i64,
}

impl StateProfile for QueryRow {
    fn state(&self) -> &str {
        &self.state
    }

    fn population(&self) -> u64 {
        self.population
    }

    fn median_age(&self) -> f64 {
        self.median_age
    }
}

/// One row per state for `period`, or summed over the reporting window when
/// `period` is `None`.
pub fn query(store: &StateRecordStore, sort: SortKey, period: Option<Period>) -> Result<Vec<QueryRow>> {
    let scope = period.map_or(QueryScope::Range(REPORTING_WINDOW), QueryScope::Period);
    query_scope(store, sort, scope)
}

/// Rows for an explicit scope.
///
/// Per-period queries leave out states without that period; range queries
/// leave out states with no period inside the range.
///
/// # Errors
///
/// [`CovidError::EmptyStore`] if the store holds no states.
pub fn query_scope(store: &StateRecordStore, sort: SortKey, scope: QueryScope) -> Result<Vec<QueryRow>> {
    if store.is_empty() {
        return Err(CovidError::EmptyStore);
    }

    let mut rows: Vec<QueryRow> = store
        .states()
        .filter_map(|record| row_for(record, scope))
        .collect();

    sort_rows(&mut rows, sort);
    Ok(rows)
}

fn row_for(record: &StateRecord, scope: QueryScope) -> Option<QueryRow> {
    let (cases, deaths) = match scope {
        QueryScope::Period(period) => {
            let counts = record.period(period)?;
            (counts.cases, counts.deaths)
        }
        QueryScope::Range(window) => {
            let mut in_range = record.periods().filter(|(p, _)| window.contains(*p)).peekable();
            in_range.peek()?;
            in_range.fold((0, 0), |(cases, deaths), (_, c)| (cases + c.cases, deaths + c.deaths))
        }
    };

    Some(QueryRow {
        state: record.state_code().to_string(),
        population: record.population(),
        median_age: record.median_age(),
        cases,
        deaths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(month: u8) -> Period {
        Period::new(month).unwrap()
    }

    fn store() -> StateRecordStore {
        let mut store = StateRecordStore::new();
        store.set_population("TX", 28_000_000);
        store.set_median_age("TX", 35.0);
        store.upsert_deaths("TX", p(3), 100);
        store.upsert_deaths("TX", p(4), 200);
        store.upsert_cases("TX", p(4), 2000);

        store.set_population("UT", 10_000_000);
        store.set_median_age("UT", 25.0);
        store.upsert_deaths("UT", p(4), 10);

        store.set_population("AK", 10_000_000);
        store.set_median_age("AK", 35.0);
        store.upsert_deaths("AK", p(8), 1);
        store
    }

    fn states(rows: &[QueryRow]) -> Vec<&str> {
        rows.iter().map(|r| r.state.as_str()).collect()
    }

    #[test]
    fn test_population_order_with_state_tiebreak() {
        let mut store = store();
        store.upsert_deaths("AK", p(3), 1);
        let rows = query(&store, SortKey::Population, None).unwrap();
        assert_eq!(states(&rows), vec!["AK", "UT", "TX"]);
    }

    #[test]
    fn test_median_age_and_state_order() {
        let mut store = store();
        store.upsert_deaths("AK", p(5), 4);

        let by_age = query(&store, SortKey::MedianAge, None).unwrap();
        assert_eq!(states(&by_age), vec!["UT", "AK", "TX"]);

        let by_state = query(&store, SortKey::State, None).unwrap();
        assert_eq!(states(&by_state), vec!["AK", "TX", "UT"]);
    }

    #[test]
    fn test_single_period_excludes_states_without_bucket() {
        let rows = query(&store(), SortKey::Population, Some(p(3))).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0],
            QueryRow {
                state: "TX".into(),
                population: 28_000_000,
                median_age: 35.0,
                cases: 0,
                deaths: 100
            }
        );
    }

    #[test]
    fn test_range_sums_only_in_window_periods() {
        let rows = query(&store(), SortKey::State, None).unwrap();

        // AK only has August data, outside March-July.
        assert_eq!(states(&rows), vec!["TX", "UT"]);
        assert_eq!(rows[0].deaths, 300);
        assert_eq!(rows[0].cases, 2000);
    }

    #[test]
    fn test_explicit_range() {
        let window = MonthWindow::new(4, 8).unwrap();
        let rows = query_scope(&store(), SortKey::State, QueryScope::Range(window)).unwrap();

        assert_eq!(states(&rows), vec!["AK", "TX", "UT"]);
        assert_eq!(rows[1].deaths, 200);
    }

    #[test]
    fn test_empty_store_fails() {
        let err = query(&StateRecordStore::new(), SortKey::State, None).unwrap_err();
        assert!(matches!(err, CovidError::EmptyStore));
    }

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("median_age".parse::<SortKey>().unwrap(), SortKey::MedianAge);
        assert_eq!("Population".parse::<SortKey>().unwrap(), SortKey::Population);
        assert!("deaths".parse::<SortKey>().is_err());
        assert_eq!(SortKey::MedianAge.to_string(), "median_age");
    }
}
