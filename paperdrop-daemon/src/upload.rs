//! Upload executor: one attempt to hand a stable file to the document API.
//!
//! A single call reads the file, posts it as multipart form data and reports
//! the outcome. It never retries and never touches the local file; both are
//! the retry driver's job.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use paperdrop_core::{Config, StablePath};

use crate::fs::FileSystem;
use crate::http::{HttpClient, HttpError, HttpRequest};
use crate::multipart::MultipartForm;
use crate::paths::{authorization_header, upload_url};

pub const DOCUMENT_FIELD: &str = "document";
pub const TITLE_FIELD: &str = "title";

/// The only status the endpoint returns for an accepted document.
pub const ACCEPTED_STATUS: u16 = 200;

#[derive(Debug, Error)]
pub enum UploadError {
    /// The local file could not be read; no request was sent.
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("upload request failed: {0}")]
    Transport(#[from] HttpError),

    /// The server answered with anything other than 200.
    #[error("server rejected upload: status {status}, response: {body}")]
    Rejected { status: u16, body: String },

    /// The attempt was cut short before it produced an outcome.
    #[error("upload attempt interrupted: {0}")]
    Interrupted(String),
}

impl UploadError {
    /// True when the failure came from the network or the server, which is
    /// what the retry counter tracks.
    pub fn is_remote(&self) -> bool {
        matches!(self, UploadError::Transport(_) | UploadError::Rejected { .. })
    }
}

/// A single upload attempt. Implementations must not retry internally.
pub trait Upload: Send + Sync {
    fn upload(&self, path: &StablePath) -> Result<(), UploadError>;
}

/// Posts files to `{base_url}/api/documents/post_document/`.
pub struct DocumentUploader {
    fs: Arc<dyn FileSystem>,
    client: Arc<dyn HttpClient>,
    endpoint: String,
    authorization: String,
}

impl DocumentUploader {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        client: Arc<dyn HttpClient>,
        base_url: &str,
        token: &str,
    ) -> Self {
        Self {
            fs,
            client,
            endpoint: upload_url(base_url),
            authorization: authorization_header(token),
        }
    }

    pub fn from_config(
        fs: Arc<dyn FileSystem>,
        client: Arc<dyn HttpClient>,
        config: &Config,
    ) -> Self {
        Self::new(fs, client, &config.base_url, &config.auth_token)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Read the file and build the request without sending it.
    pub fn build_request(&self, path: &StablePath) -> Result<HttpRequest, UploadError> {
        let read_err = |source| UploadError::Read {
            path: path.as_path().to_path_buf(),
            source,
        };
        let mut contents = Vec::new();
        self.fs
            .open(path.as_path())
            .map_err(read_err)?
            .read_to_end(&mut contents)
            .map_err(read_err)?;

        let name = path.file_name();
        let mut form = MultipartForm::new();
        form.file(DOCUMENT_FIELD, &name, &contents)
            .text(TITLE_FIELD, &name);
        let (content_type, body) = form.finish();

        Ok(HttpRequest::post(self.endpoint.clone())
            .header("Content-Type", content_type)
            .header("Authorization", self.authorization.clone())
            .body(body))
    }
}

impl Upload for DocumentUploader {
    fn upload(&self, path: &StablePath) -> Result<(), UploadError> {
        let request = self.build_request(path)?;
        let response = self.client.execute(request)?;
        if response.status != ACCEPTED_STATUS {
            return Err(UploadError::Rejected {
                status: response.status,
                body: response.body,
            });
        }
        Ok(())
    }
}
