use super::client::HttpClient;
use anyhow::Result;

/// [`HttpClient`] over a plain `reqwest` blocking client. No timeout or retry.
pub struct BasicClient(reqwest::blocking::Client);

impl BasicClient {
    pub fn new() -> Self {
        Self(reqwest::blocking::Client::new())
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for BasicClient {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.0.get(url).send()?.error_for_status()?;
        Ok(resp.bytes()?.to_vec())
    }
}
