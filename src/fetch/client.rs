use anyhow::Result;

/// Blocking GET transport. Implementations return the response body of a
/// successful request and an error for transport failures or non-success
/// statuses.
pub trait HttpClient {
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}
