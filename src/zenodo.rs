use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::domain::StudyId;
use crate::error::RatError;

const BASE_DELAY_MS: u64 = 500;
const MAX_ERROR_BODY: usize = 200;
const COPY_BUF: usize = 64 * 1024;

/// One downloadable file of a Zenodo record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFile {
    pub key: String,
    pub size: u64,
    pub url: String,
}

impl RecordFile {
    /// Matches `S01.zip` as well as descriptive names such as `S01_rifampicin.zip`.
    pub fn is_archive_for(&self, study: &StudyId) -> bool {
        let key = self.key.to_ascii_uppercase();
        let code = study.code();
        key.ends_with(".ZIP")
            && (key == format!("{code}.ZIP") || key.starts_with(&format!("{code}_")))
    }
}

pub trait ZenodoClient: Send + Sync {
    fn record_files(&self, record_id: &str) -> Result<Vec<RecordFile>, RatError>;
    fn download(&self, file: &RecordFile, destination: &Path) -> Result<u64, RatError>;
}

pub fn find_study_file<'a>(
    files: &'a [RecordFile],
    study: &StudyId,
    record_id: &str,
) -> Result<&'a RecordFile, RatError> {
    files
        .iter()
        .find(|file| file.is_archive_for(study))
        .ok_or_else(|| RatError::StudyNotInRecord {
            study: study.code(),
            record: record_id.to_string(),
        })
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    #[serde(default)]
    files: Vec<RecordFileResponse>,
}

#[derive(Debug, Deserialize)]
struct RecordFileResponse {
    key: String,
    #[serde(default)]
    size: u64,
    links: RecordFileLinks,
}

#[derive(Debug, Deserialize)]
struct RecordFileLinks {
    #[serde(rename = "self")]
    self_link: String,
}

#[derive(Clone)]
pub struct ZenodoHttpClient {
    client: Client,
    api_base: String,
    max_retries: usize,
}

impl ZenodoHttpClient {
    pub fn new(config: &FetchConfig) -> Result<Self, RatError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("rat-fetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RatError::ZenodoHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| RatError::ZenodoHttp(err.to_string()))?;

        Ok(Self {
            client,
            api_base: config.zenodo_api.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn record_url(&self, record_id: &str) -> String {
        format!("{}/records/{}", self.api_base, record_id)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, RatError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        warn!(status, attempt, "zenodo returned retryable status");
                        backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        warn!(error = %err, attempt, "zenodo request failed, retrying");
                        backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(map_transport_error(&err));
                }
            }
        }
    }
}

impl ZenodoClient for ZenodoHttpClient {
    fn record_files(&self, record_id: &str) -> Result<Vec<RecordFile>, RatError> {
        let url = self.record_url(record_id);
        debug!(%url, "listing record files");
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let response = ensure_success(response)?;
        let record: RecordResponse = response.json().map_err(|err| {
            if err.is_body() {
                map_transport_error(&err)
            } else {
                RatError::ZenodoHttp(format!("invalid record JSON: {err}"))
            }
        })?;
        Ok(record
            .files
            .into_iter()
            .map(|file| RecordFile {
                key: file.key,
                size: file.size,
                url: file.links.self_link,
            })
            .collect())
    }

    fn download(&self, file: &RecordFile, destination: &Path) -> Result<u64, RatError> {
        info!(key = %file.key, size = file.size, "downloading");
        let response = self.send_with_retries(|| {
            self.client
                .get(&file.url)
                .header(ACCEPT, "application/octet-stream")
        })?;
        let mut response = ensure_success(response)?;

        let parent = destination
            .parent()
            .ok_or_else(|| RatError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent).map_err(|err| RatError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".rat-fetch")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|err| RatError::Filesystem(err.to_string()))?;
        let written = copy_body(&mut response, temp.as_file_mut())?;

        if file.size > 0 && written != file.size {
            return Err(RatError::IncompleteDownload {
                file: file.key.clone(),
                expected: file.size,
                actual: written,
            });
        }
        temp.persist(destination)
            .map_err(|err| RatError::Filesystem(err.to_string()))?;
        Ok(written)
    }
}

fn ensure_success(response: Response) -> Result<Response, RatError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .ok()
        .map(|body| body.trim().chars().take(MAX_ERROR_BODY).collect::<String>())
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| "Zenodo request failed".to_string());
    Err(RatError::ZenodoStatus { status, message })
}

/// Streams the body into `out`. Read failures are upstream, write failures are local.
fn copy_body<R: Read, W: Write>(body: &mut R, out: &mut W) -> Result<u64, RatError> {
    let mut buf = [0u8; COPY_BUF];
    let mut written = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(RatError::ZenodoHttp(format!("ConnectionError: {err}"))),
        };
        out.write_all(&buf[..n])
            .map_err(|err| RatError::Filesystem(format!("write download: {err}")))?;
        written += n as u64;
    }
    out.flush()
        .map_err(|err| RatError::Filesystem(format!("write download: {err}")))?;
    Ok(written)
}

fn map_transport_error(err: &reqwest::Error) -> RatError {
    if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        RatError::ZenodoHttp(format!("ConnectionError: {err}"))
    } else {
        RatError::ZenodoHttp(err.to_string())
    }
}

fn backoff(attempt: usize) {
    thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn file(key: &str) -> RecordFile {
        RecordFile {
            key: key.to_string(),
            size: 1,
            url: format!("https://example.org/{key}"),
        }
    }

    #[test]
    fn archive_matching() {
        let s01: StudyId = "S01".parse().unwrap();
        assert!(file("S01.zip").is_archive_for(&s01));
        assert!(file("s01_rifampicin.ZIP").is_archive_for(&s01));
        assert!(!file("S010.zip").is_archive_for(&s01));
        assert!(!file("S01_notes.pdf").is_archive_for(&s01));
        assert!(!file("S11.zip").is_archive_for(&s01));
    }

    #[test]
    fn missing_study_is_reported() {
        let files = vec![file("S02.zip")];
        let s01: StudyId = "S01".parse().unwrap();
        let err = find_study_file(&files, &s01, "123").unwrap_err();
        assert_matches!(err, RatError::StudyNotInRecord { .. });
    }

    #[test]
    fn record_json_parses() {
        let json = r#"{
            "id": "123",
            "files": [
                {"key": "S01.zip", "size": 42, "checksum": "md5:abc",
                 "links": {"self": "https://zenodo.org/api/records/123/files/S01.zip/content"}}
            ]
        }"#;
        let record: RecordResponse = serde_json::from_str(json).unwrap();
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].size, 42);
        assert!(record.files[0].links.self_link.ends_with("/content"));
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::StorageFull, "No space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
        }
    }

    #[test]
    fn local_write_failure_is_not_transient() {
        let err = copy_body(&mut &b"payload"[..], &mut FailingWriter).unwrap_err();
        assert_matches!(err, RatError::Filesystem(_));
        assert!(!err.is_transient());
        assert!(!err.to_string().contains("ConnectionError"));
    }

    #[test]
    fn upstream_read_failure_is_transient() {
        let err = copy_body(&mut FailingReader, &mut Vec::new()).unwrap_err();
        assert_matches!(err, RatError::ZenodoHttp(_));
        assert!(err.is_transient());
    }

    #[test]
    fn copy_body_counts_bytes() {
        let mut out = Vec::new();
        let written = copy_body(&mut &b"0123456789"[..], &mut out).unwrap();
        assert_eq!(written, 10);
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn retry_policy() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
    }
}
