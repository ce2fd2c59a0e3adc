mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::Result;
use tracing::debug;

pub fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    debug!(url, "GET");
    let bytes = client.get(url)?;
    debug!(url, bytes = bytes.len(), "Response received");
    Ok(bytes)
}
