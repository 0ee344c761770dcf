use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{error, info};

use crate::config::HttpSettings;
use crate::domain::filename_from_url;
use crate::error::BagError;

pub const CHUNK_SIZE: usize = 1024 * 1024;
pub const BATCH_MANIFEST_NAME: &str = "encode-manifest-file.txt";

static QUERY_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:search|report|matrix)/\?").expect("query path pattern is valid")
});

pub trait PortalClient: Send + Sync {
    fn fetch_to_file(&self, url: &str, destination: &Path) -> Result<(), BagError>;
}

#[derive(Clone)]
pub struct PortalHttpClient {
    client: Client,
    max_retries: u32,
}

impl PortalHttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, BagError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent)
                .map_err(|err| BagError::Http(format!("invalid user agent: {err}")))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| BagError::Http(err.to_string()))?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
        })
    }

    fn send_with_retries(&self, url: &str) -> Result<Response, BagError> {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0u32;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    if attempt < self.max_retries && is_retryable_status(resp.status().as_u16()) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(BagError::Http(err.to_string()));
                }
            }
        }
    }
}

impl PortalClient for PortalHttpClient {
    fn fetch_to_file(&self, url: &str, destination: &Path) -> Result<(), BagError> {
        let response = self.send_with_retries(url)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let host = host_of(url);
            let body = response
                .text()
                .unwrap_or_else(|_| "request failed".to_string());
            error!("HTTP GET failed for url: {url}");
            error!("host {host} responded:\n\n{body}");
            return Err(BagError::Transfer {
                path: destination.to_path_buf(),
                host,
                status,
                body,
            });
        }
        write_chunks(response, destination)?;
        info!("file [{}] transfer successful", destination.display());
        Ok(())
    }
}

fn write_chunks<R: Read>(mut reader: R, destination: &Path) -> Result<(), BagError> {
    let mut file = File::create(destination).map_err(|err| {
        BagError::Filesystem(format!("create {}: {err}", destination.display()))
    })?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|err| BagError::Http(err.to_string()))?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])
            .map_err(|err| BagError::Filesystem(err.to_string()))?;
    }
    file.flush()
        .map_err(|err| BagError::Filesystem(err.to_string()))
}

pub fn batch_download_url(url: &str) -> String {
    QUERY_PATH.replace_all(url, "/batch_download/").into_owned()
}

pub fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed.host_str().map(|host| match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            })
        })
        .unwrap_or_else(|| url.to_string())
}

/// The first line of the batch download manifest is the metadata export URL.
pub fn resolve_metadata_file(
    client: &dyn PortalClient,
    url: &str,
    output_dir: &Path,
) -> Result<PathBuf, BagError> {
    let batch_url = batch_download_url(url);
    info!("attempting to get ENCODE batch download manifest from: {batch_url}");
    let manifest_file = std::path::absolute(output_dir.join(BATCH_MANIFEST_NAME))
        .map_err(|err| BagError::Filesystem(err.to_string()))?;
    client.fetch_to_file(&batch_url, &manifest_file)?;

    let content = std::fs::read_to_string(&manifest_file).map_err(|err| {
        BagError::Filesystem(format!("read {}: {err}", manifest_file.display()))
    })?;
    let metadata_url = first_line(&content);
    let filename = filename_from_url(metadata_url);
    if metadata_url.is_empty() || filename.is_empty() {
        return Err(BagError::Resolution {
            path: output_dir.to_path_buf(),
        });
    }

    let metadata_file = manifest_file.with_file_name(filename);
    client.fetch_to_file(metadata_url, &metadata_file)?;
    Ok(metadata_file)
}

fn first_line(content: &str) -> &str {
    content
        .split_inclusive('\n')
        .next()
        .unwrap_or_default()
        .trim_matches(['\r', '\n'])
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
