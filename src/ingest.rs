//! The load → convert → aggregate pipeline behind every report.

use std::path::Path;

use tracing::{Span, info};

use crate::aggregate::{CountyObservation, aggregate, county_observations, join_counties};
use crate::error::Result;
use crate::fetch::HttpClient;
use crate::parser::{CountyPopulation, CumulativeTable, parse_cumulative, parse_median_age, parse_population};
use crate::period::{MonthWindow, REPORTING_WINDOW};
use crate::source::{SourceKind, SourceLoader, is_populated};
use crate::store::StateRecordStore;

pub struct Ingest<C> {
    loader: SourceLoader<C>,
    window: MonthWindow,
    span: Span,
}

impl<C: HttpClient> Ingest<C> {
    /// Ingestion over the March-July window; events are recorded inside `span`.
    pub fn new(loader: SourceLoader<C>, span: Span) -> Self {
        Self {
            loader,
            window: REPORTING_WINDOW,
            span,
        }
    }

    pub fn with_window(mut self, window: MonthWindow) -> Self {
        self.window = window;
        self
    }

    /// Reads the durable store at `store_path`, or builds it from the raw
    /// sources and writes it there when the file is missing or empty.
    #[tracing::instrument(parent = &self.span, skip_all, fields(path = %store_path.display()))]
    pub fn load_or_build(&self, store_path: &Path) -> Result<StateRecordStore> {
        if is_populated(store_path) {
            info!(path = %store_path.display(), "Loading state data from store");
            return StateRecordStore::load(store_path);
        }

        info!(path = %store_path.display(), "Store missing or empty, building from sources");
        let store = self.build()?;
        store.save(store_path)?;
        info!(path = %store_path.display(), states = store.len(), "Store created");
        Ok(store)
    }

    /// Builds the store from the raw sources without touching the durable file.
    #[tracing::instrument(parent = &self.span, skip_all, fields(window = ?self.window))]
    pub fn build(&self) -> Result<StateRecordStore> {
        let populations = self.populations()?;
        let median_ages = parse_median_age(&self.loader.load(SourceKind::MedianAge)?)?;
        let cases = self.cumulative(SourceKind::Cases)?;
        let deaths = self.cumulative(SourceKind::Deaths)?;

        aggregate(&populations, &cases, &deaths, &median_ages, &self.window)
    }

    /// County-level case observations, rebuilt from the raw sources.
    #[tracing::instrument(parent = &self.span, skip_all)]
    pub fn county_observations(&self) -> Result<Vec<CountyObservation>> {
        let populations = self.populations()?;
        let cases = self.cumulative(SourceKind::Cases)?;
        let deaths = self.cumulative(SourceKind::Deaths)?;

        let counties = join_counties(&populations, &cases, &deaths, &self.window)?;
        Ok(county_observations(&counties, &self.window))
    }

    fn populations(&self) -> Result<Vec<CountyPopulation>> {
        let rows = parse_population(&self.loader.load(SourceKind::Population)?)?;
        info!(counties = rows.len(), "Parsed population source");
        Ok(rows)
    }

    fn cumulative(&self, source: SourceKind) -> Result<CumulativeTable> {
        let table = parse_cumulative(source.name(), &self.loader.load(source)?)?;
        info!(source = %source, rows = table.rows().len(), "Parsed cumulative source");
        Ok(table)
    }
}
