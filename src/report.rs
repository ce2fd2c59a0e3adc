//! Report tables derived from query results: rates, death summaries, a
//! single state's share of the national figures, and per-county rates.

use std::str::FromStr;

use serde::Serialize;

use crate::aggregate::CountyObservation;
use crate::error::{CovidError, Result};
use crate::period::{Period, REPORTING_WINDOW};
use crate::query::{QueryRow, SortKey, StateProfile, sort_rows};
use crate::store::StateRecordStore;

/// `part` as a percentage of `total`, 0 when `total` is 0.
pub fn pct(part: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

/// `part / total`, 0 when `total` is 0.
pub fn ratio(part: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn signed(population: u64) -> i64 {
    i64::try_from(population).unwrap_or(i64::MAX)
}

macro_rules! state_profile {
    ($row:ty) => {
        impl StateProfile for $row {
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
    };
}

/// A query row with derived rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRow {
    pub state: String,
    pub population: u64,
    pub median_age: f64,
    pub cases: i64,
    pub deaths: i64,
    /// Cases as a percentage of population.
    pub case_rate: f64,
    /// Deaths per case.
    pub death_rate: f64,
}

state_profile!(RateRow);

/// Adds rate columns, keeping the input order.
pub fn rate_rows(rows: &[QueryRow]) -> Vec<RateRow> {
    rows.iter()
        .map(|r| RateRow {
            state: r.state.clone(),
            population: r.population,
            median_age: r.median_age,
            cases: r.cases,
            deaths: r.deaths,
            case_rate: pct(r.cases, signed(r.population)),
            death_rate: ratio(r.deaths, r.cases),
        })
        .collect()
}

/// How deaths are summarised per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeathAggregation {
    /// Sum of every period.
    #[default]
    Total,
    /// Largest single period.
    Max,
    /// One column per month.
    All,
}

impl FromStr for DeathAggregation {
    type Err = CovidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "total" => Ok(DeathAggregation::Total),
            "max" => Ok(DeathAggregation::Max),
            "all" => Ok(DeathAggregation::All),
            _ => Err(CovidError::InvalidAggregation(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeathRow {
    pub state: String,
    pub population: u64,
    pub median_age: f64,
    pub num_deaths: i64,
}

state_profile!(DeathRow);

/// Per-state total or maximum monthly deaths. States without periods are
/// left out of `Max`.
pub fn death_summary(store: &StateRecordStore, sort: SortKey, agg: DeathAggregation) -> Result<Vec<DeathRow>> {
    if store.is_empty() {
        return Err(CovidError::EmptyStore);
    }

    let mut rows: Vec<DeathRow> = store
        .states()
        .filter_map(|r| {
            let num_deaths = match agg {
                DeathAggregation::Max => r.max_deaths()?,
                DeathAggregation::Total | DeathAggregation::All => r.total_deaths(),
            };
            Some(DeathRow {
                state: r.state_code().to_string(),
                population: r.population(),
                median_age: r.median_age(),
                num_deaths,
            })
        })
        .collect();

    sort_rows(&mut rows, sort);
    Ok(rows)
}

/// Deaths per month of the reporting window; empty cells for months the
/// state has no data for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyDeathsRow {
    pub state: String,
    pub population: u64,
    pub median_age: f64,
    pub march: Option<i64>,
    pub april: Option<i64>,
    pub may: Option<i64>,
    pub june: Option<i64>,
    pub july: Option<i64>,
}

state_profile!(MonthlyDeathsRow);

pub fn monthly_deaths(store: &StateRecordStore, sort: SortKey) -> Result<Vec<MonthlyDeathsRow>> {
    if store.is_empty() {
        return Err(CovidError::EmptyStore);
    }

    let mut rows: Vec<MonthlyDeathsRow> = store
        .states()
        .map(|r| {
            let month = |m: u8| {
                Period::new(m)
                    .ok()
                    .and_then(|p| r.period(p))
                    .map(|c| c.deaths)
            };
            MonthlyDeathsRow {
                state: r.state_code().to_string(),
                population: r.population(),
                median_age: r.median_age(),
                march: month(3),
                april: month(4),
                may: month(5),
                june: month(6),
                july: month(7),
            }
        })
        .collect();

    sort_rows(&mut rows, sort);
    Ok(rows)
}

/// One state's figures against the national totals, for one month or for
/// the whole window (`period == "total"`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    pub state: String,
    pub period: String,
    pub population: u64,
    pub national_population: u64,
    pub population_share_pct: f64,
    pub cases: i64,
    pub national_cases: i64,
    pub case_share_pct: f64,
    pub deaths: i64,
    pub national_deaths: i64,
    pub death_share_pct: f64,
}

/// Month-by-month and overall share of `state` in the national figures.
pub fn state_breakdown(store: &StateRecordStore, state: &str) -> Result<Vec<BreakdownRow>> {
    let record = store.get(state)?;
    let national = store.national_totals();
    let population_share = pct(signed(record.population()), signed(national.population));

    let row = |period: String, cases: i64, deaths: i64, national_cases: i64, national_deaths: i64| BreakdownRow {
        state: state.to_string(),
        period,
        population: record.population(),
        national_population: national.population,
        population_share_pct: population_share,
        cases,
        national_cases,
        case_share_pct: pct(cases, national_cases),
        deaths,
        national_deaths,
        death_share_pct: pct(deaths, national_deaths),
    };

    let mut rows = Vec::new();
    let mut total = (0, 0, 0, 0);
    for (period, counts) in record.periods().filter(|(p, _)| REPORTING_WINDOW.contains(*p)) {
        let (national_cases, national_deaths) = store
            .states()
            .filter_map(|r| r.period(period))
            .fold((0, 0), |(c, d), counts| (c + counts.cases, d + counts.deaths));
        total.0 += counts.cases;
        total.1 += counts.deaths;
        rows.push(row(
            period.name().to_string(),
            counts.cases,
            counts.deaths,
            national_cases,
            national_deaths,
        ));
    }

    // national figures over the window only
    for (_, counts) in store
        .states()
        .flat_map(|r| r.periods())
        .filter(|(p, _)| REPORTING_WINDOW.contains(*p))
    {
        total.2 += counts.cases;
        total.3 += counts.deaths;
    }
    let (cases, deaths, national_cases, national_deaths) = total;
    rows.push(row("total".to_string(), cases, deaths, national_cases, national_deaths));

    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountyRateRow {
    pub county: String,
    pub population: u64,
    pub cases: i64,
    /// Cases as a percentage of county population.
    pub infection_rate: f64,
}

/// Infection rate of every populated county of `state` in `period`, in
/// observation order (increasing population).
pub fn county_rates(observations: &[CountyObservation], state: &str, period: Period) -> Vec<CountyRateRow> {
    observations
        .iter()
        .filter(|o| o.state == state && o.period == period && o.population > 0)
        .map(|o| CountyRateRow {
            county: o.county_name.clone(),
            population: o.population,
            cases: o.case_count,
            infection_rate: pct(o.case_count, signed(o.population)),
        })
        .collect()
}
