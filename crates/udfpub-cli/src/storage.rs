//! Cloud Storage uploads for staged libraries

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use udfpub_core::{ObjectStore, RemoteError};

use crate::bigquery::{http_client, network, rejection};

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Simple media uploads through the JSON API
pub struct GcsClient {
    http: Client,
    endpoint: String,
    token: String,
}

impl GcsClient {
    pub fn new(token: impl Into<String>) -> Result<Self, RemoteError> {
        Ok(Self {
            http: http_client()?,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: token.into(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

impl ObjectStore for GcsClient {
    fn upload(&mut self, bucket: &str, destination: &str, local: &Path) -> Result<(), RemoteError> {
        let body = fs::read(local)?;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.endpoint, bucket);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .query(&[("uploadType", "media"), ("name", destination)])
            .header(CONTENT_TYPE, content_type(local))
            .body(body)
            .send()
            .map_err(network)?;

        if !response.status().is_success() {
            return Err(rejection(response));
        }
        debug!("Uploaded gs://{}/{}", bucket, destination);
        Ok(())
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Wraps another store and shows a spinner while files go up
pub struct ProgressStore<'a> {
    inner: &'a mut dyn ObjectStore,
    spinner: Option<ProgressBar>,
    uploaded: usize,
}

impl<'a> ProgressStore<'a> {
    /// `show` is false when stderr is not a terminal.
    pub fn new(inner: &'a mut dyn ObjectStore, show: bool) -> Self {
        let spinner = show.then(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
                pb.set_style(
                    style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
                );
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message("Staging libraries...");
            pb
        });
        Self {
            inner,
            spinner,
            uploaded: 0,
        }
    }

    pub fn uploaded(&self) -> usize {
        self.uploaded
    }

    /// Clear the spinner once staging is over and report how many files went up.
    pub fn finish(&self) {
        if let Some(pb) = &self.spinner {
            pb.finish_and_clear();
        }
        if self.uploaded > 0 {
            info!("✓ Uploaded {} library files", self.uploaded);
        }
    }
}

impl ObjectStore for ProgressStore<'_> {
    fn upload(&mut self, bucket: &str, destination: &str, local: &Path) -> Result<(), RemoteError> {
        if let Some(pb) = &self.spinner {
            pb.set_message(format!("Uploading {}", destination));
        }
        self.inner.upload(bucket, destination, local)?;
        self.uploaded += 1;
        Ok(())
    }
}
