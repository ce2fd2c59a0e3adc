//! Raw source catalogue and the fetch-or-read-cache policy.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{Span, debug, error, info};

use crate::error::{CovidError, Result};
use crate::fetch::{HttpClient, fetch_bytes};

/// The four raw inputs of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Population,
    Cases,
    Deaths,
    MedianAge,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Population,
        SourceKind::Cases,
        SourceKind::Deaths,
        SourceKind::MedianAge,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Population => "population",
            SourceKind::Cases => "cases",
            SourceKind::Deaths => "deaths",
            SourceKind::MedianAge => "median_age",
        }
    }

    /// Cache file name; for remote sources also the file name under the base URL.
    pub fn file_name(self) -> &'static str {
        match self {
            SourceKind::Population => "covid_county_population_usafacts.csv",
            SourceKind::Cases => "covid_confirmed_usafacts.csv",
            SourceKind::Deaths => "covid_deaths_usafacts.csv",
            SourceKind::MedianAge => "state_median_age.csv",
        }
    }

    pub fn is_remote(self) -> bool {
        !matches!(self, SourceKind::MedianAge)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Loads raw source bytes, reading the local cache when present and
/// otherwise fetching once and writing the body verbatim to the cache.
pub struct SourceLoader<C> {
    cache_dir: PathBuf,
    base_url: String,
    client: C,
    span: Span,
}

impl<C: HttpClient> SourceLoader<C> {
    /// All events emitted by the loader are recorded inside `span`.
    pub fn new(cache_dir: impl Into<PathBuf>, base_url: impl Into<String>, client: C, span: Span) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            base_url: base_url.into(),
            client,
            span,
        }
    }

    pub fn cache_path(&self, source: SourceKind) -> PathBuf {
        self.cache_dir.join(source.file_name())
    }

    pub fn url(&self, source: SourceKind) -> Option<String> {
        source
            .is_remote()
            .then(|| format!("{}/{}", self.base_url, source.file_name()))
    }

    /// Returns the bytes of `source`.
    ///
    /// # Errors
    ///
    /// [`CovidError::MissingReferenceFile`] for an absent local-only file,
    /// [`CovidError::SourceUnavailable`] when the remote fetch fails.
    #[tracing::instrument(parent = &self.span, skip_all, fields(source = %source))]
    pub fn load(&self, source: SourceKind) -> Result<Vec<u8>> {
        let path = self.cache_path(source);

        if is_populated(&path) {
            let bytes = fs::read(&path)?;
            debug!(source = %source, path = %path.display(), bytes = bytes.len(), "Read cached source");
            return Ok(bytes);
        }

        let Some(url) = self.url(source) else {
            error!(source = %source, path = %path.display(), "Reference file missing");
            return Err(CovidError::MissingReferenceFile(path));
        };

        info!(source = %source, url = %url, "Cache miss, fetching source");
        let bytes = fetch_bytes(&self.client, &url).map_err(|e| {
            error!(source = %source, error = %e, "Data source not responding");
            CovidError::SourceUnavailable {
                source_name: source.name().to_string(),
                reason: format!("{e:#}"),
            }
        })?;

        if bytes.is_empty() {
            error!(source = %source, "Data source returned an empty body");
            return Err(CovidError::SourceUnavailable {
                source_name: source.name().to_string(),
                reason: "empty response body".to_string(),
            });
        }

        fs::create_dir_all(&self.cache_dir)?;
        fs::write(&path, &bytes)?;
        debug!(source = %source, path = %path.display(), bytes = bytes.len(), "Cached source");

        Ok(bytes)
    }
}

/// True for an existing, non-empty regular file.
pub(crate) fn is_populated(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    struct StubClient {
        body: Option<Vec<u8>>,
        calls: Cell<usize>,
    }

    impl StubClient {
        fn serving(body: &[u8]) -> Self {
            Self {
                body: Some(body.to_vec()),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                body: None,
                calls: Cell::new(0),
            }
        }
    }

    impl HttpClient for StubClient {
        fn get(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            self.body
                .clone()
                .ok_or_else(|| anyhow::anyhow!("404 Not Found"))
        }
    }

    fn loader(dir: &Path, client: StubClient) -> SourceLoader<StubClient> {
        SourceLoader::new(dir, "http://example.test/data", client, Span::none())
    }

    #[test]
    fn test_fetches_once_then_reads_cache() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path(), StubClient::serving(b"countyFIPS,State\n"));

        let first = loader.load(SourceKind::Deaths).unwrap();
        let second = loader.load(SourceKind::Deaths).unwrap();

        assert_eq!(first, second);
        assert_eq!(loader.client.calls.get(), 1);
        assert_eq!(
            fs::read(dir.path().join("covid_deaths_usafacts.csv")).unwrap(),
            first
        );
    }

    #[test]
    fn test_existing_cache_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SourceKind::Population.file_name()), b"cached").unwrap();
        let loader = loader(dir.path(), StubClient::failing());

        assert_eq!(loader.load(SourceKind::Population).unwrap(), b"cached");
        assert_eq!(loader.client.calls.get(), 0);
    }

    #[test]
    fn test_empty_cache_file_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SourceKind::Cases.file_name()), b"").unwrap();
        let loader = loader(dir.path(), StubClient::serving(b"fresh"));

        assert_eq!(loader.load(SourceKind::Cases).unwrap(), b"fresh");
        assert_eq!(loader.client.calls.get(), 1);
    }

    #[test]
    fn test_fetch_failure_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path(), StubClient::failing());

        let err = loader.load(SourceKind::Cases).unwrap_err();
        assert!(matches!(err, CovidError::SourceUnavailable { ref source_name, .. } if source_name == "cases"));
        assert!(!dir.path().join(SourceKind::Cases.file_name()).exists());
    }

    #[test]
    fn test_median_age_is_never_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path(), StubClient::serving(b"State,Median\n"));

        let err = loader.load(SourceKind::MedianAge).unwrap_err();
        assert!(matches!(err, CovidError::MissingReferenceFile(_)));
        assert_eq!(loader.client.calls.get(), 0);
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_load_events_nest_under_loader_span() {
        let dir = tempfile::tempdir().unwrap();
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("source_loader");
            let loader = SourceLoader::new(dir.path(), "http://example.test", StubClient::serving(b"x"), span);
            loader.load(SourceKind::Cases).unwrap();
        });

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("Cache miss, fetching source"))
            .unwrap();
        assert!(line.contains("source_loader:load{source=cases}"), "{line}");
    }

    #[test]
    fn test_url_joins_base_and_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path(), StubClient::failing());
        assert_eq!(
            loader.url(SourceKind::Population).as_deref(),
            Some("http://example.test/data/covid_county_population_usafacts.csv")
        );
        assert_eq!(loader.url(SourceKind::MedianAge), None);
    }
}
