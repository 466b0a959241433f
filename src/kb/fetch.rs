//! Downloading the knowledge base artifact into the cache.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use tracing::info;

use super::KbError;

pub const CLIENT_ID: &str = "sre-agent-kb-loader/1.0";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Download `url` to `dest`. The body is written to a temporary file in the
/// same directory and renamed into place, so readers never see a partial file.
pub async fn download(client: &Client, url: &str, dest: &Path) -> Result<u64, KbError> {
    let resp = client
        .get(url)
        .header(USER_AGENT, CLIENT_ID)
        .header(ACCEPT, "*/*")
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;
    let body = resp.bytes().await?;
    let size = body.len() as u64;

    let dir = dest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(".").to_path_buf());
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), KbError> {
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| KbError::Io(e.error))?;
        Ok(())
    })
    .await??;

    info!(%url, bytes = size, "knowledge base downloaded");
    Ok(size)
}
