//! County to state aggregation.
//!
//! Counties are joined across the population, case and death sources on
//! their numeric identifier. A county missing from any of the three sources
//! is left out of the case/death sums entirely.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::delta::row_deltas;
use crate::error::Result;
use crate::parser::{CountyPopulation, CumulativeTable};
use crate::period::{MonthWindow, Period};
use crate::store::StateRecordStore;

/// A county's monthly case and death deltas, one element per window month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountyDeltas {
    pub county_fips: i64,
    pub state: String,
    pub county_name: String,
    pub population: u64,
    pub cases: Vec<i64>,
    pub deaths: Vec<i64>,
}

/// One county's case count for one month.
///
/// Ordered by state, then population, county name, month and case count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CountyObservation {
    pub state: String,
    pub population: u64,
    pub county_name: String,
    pub period: Period,
    pub case_count: i64,
}

impl CountyObservation {
    pub fn month_name(&self) -> &'static str {
        self.period.name()
    }
}

/// Converts a cumulative table to `county id -> monthly deltas`, keeping
/// only counties present in `known`. The first row wins for a repeated id.
fn deltas_by_county(
    table: &CumulativeTable,
    known: &HashMap<i64, &CountyPopulation>,
    window: &MonthWindow,
) -> Result<HashMap<i64, Vec<i64>>> {
    let mut deltas = HashMap::new();
    let mut unmatched = 0usize;

    for row in table.rows() {
        if !known.contains_key(&row.county_fips) {
            unmatched += 1;
            continue;
        }
        if deltas.contains_key(&row.county_fips) {
            warn!(source = table.source_name(), county_fips = row.county_fips, "Repeated county row ignored");
            continue;
        }
        deltas.insert(row.county_fips, row_deltas(table, row, window)?);
    }

    debug!(
        source = table.source_name(),
        matched = deltas.len(),
        unmatched,
        "Converted cumulative rows"
    );
    Ok(deltas)
}

/// Joins the three county sources, in population-table order.
pub fn join_counties(
    populations: &[CountyPopulation],
    cases: &CumulativeTable,
    deaths: &CumulativeTable,
    window: &MonthWindow,
) -> Result<Vec<CountyDeltas>> {
    let known: HashMap<i64, &CountyPopulation> =
        populations.iter().map(|p| (p.county_fips, p)).collect();

    let mut case_deltas = deltas_by_county(cases, &known, window)?;
    let mut death_deltas = deltas_by_county(deaths, &known, window)?;

    let mut joined = Vec::new();
    for county in populations {
        let (Some(cases), Some(deaths)) = (
            case_deltas.remove(&county.county_fips),
            death_deltas.remove(&county.county_fips),
        ) else {
            continue;
        };

        joined.push(CountyDeltas {
            county_fips: county.county_fips,
            state: county.state.clone(),
            county_name: county.county_name.clone(),
            population: county.population,
            cases,
            deaths,
        });
    }

    debug!(
        counties = populations.len(),
        joined = joined.len(),
        "Joined county sources"
    );
    Ok(joined)
}

/// Adds every county's monthly deltas into its state's period buckets.
pub fn fold_into_store(counties: &[CountyDeltas], window: &MonthWindow, store: &mut StateRecordStore) {
    for county in counties {
        for ((period, cases), deaths) in window.periods().zip(&county.cases).zip(&county.deaths) {
            store.upsert_cases(&county.state, period, *cases);
            store.upsert_deaths(&county.state, period, *deaths);
        }
    }
}

/// Sums county populations per state.
pub fn state_populations(populations: &[CountyPopulation]) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for county in populations {
        *totals.entry(county.state.clone()).or_insert(0) += county.population;
    }
    totals
}

/// Builds the per-state store from the parsed sources.
///
/// Population comes from the population table; states absent from a
/// reference table keep zero.
pub fn aggregate(
    populations: &[CountyPopulation],
    cases: &CumulativeTable,
    deaths: &CumulativeTable,
    median_ages: &HashMap<String, f64>,
    window: &MonthWindow,
) -> Result<StateRecordStore> {
    let counties = join_counties(populations, cases, deaths, window)?;

    let mut store = StateRecordStore::new();
    fold_into_store(&counties, window, &mut store);

    let totals = state_populations(populations);
    let states: Vec<String> = store.states().map(|r| r.state_code().to_string()).collect();
    for state in states {
        match totals.get(&state) {
            Some(population) => store.set_population(&state, *population),
            None => warn!(state = %state, "No population for state"),
        }
        match median_ages.get(&state) {
            Some(age) => store.set_median_age(&state, *age),
            None => warn!(state = %state, "No median age for state"),
        }
    }

    debug!(states = store.len(), "Aggregated counties into states");
    Ok(store)
}

/// Expands joined counties into sorted per-month case observations.
pub fn county_observations(counties: &[CountyDeltas], window: &MonthWindow) -> Vec<CountyObservation> {
    let mut observations: Vec<CountyObservation> = counties
        .iter()
        .flat_map(|county| {
            window
                .periods()
                .zip(&county.cases)
                .map(|(period, cases)| CountyObservation {
                    state: county.state.clone(),
                    population: county.population,
                    county_name: county.county_name.clone(),
                    period,
                    case_count: *cases,
                })
        })
        .collect();

    observations.sort();
    observations
}
