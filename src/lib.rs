pub mod aggregate;
pub mod config;
pub mod delta;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod output;
pub mod parser;
pub mod period;
pub mod query;
pub mod report;
pub mod source;
pub mod states;
pub mod store;

pub use error::{CovidError, Result};
