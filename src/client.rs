use bytes::Bytes;
use futures::Stream;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{
    auth::Authenticator,
    credentials::{CredentialsError, ServiceAccountKey},
    files::{DriveFile, FileList},
    images,
};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/drive/v3/";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Page size used when the caller does not pick one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page size `files.list` accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Fields requested for every file resource.
const FILE_FIELDS: &str = "id,name,mimeType,size";

/// 403 reasons that mean "slow down" rather than "not allowed".
const RATE_LIMIT_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
];

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid service-account credentials"))]
    Credentials { source: CredentialsError },

    #[snafu(display("{resource} was not found or is not visible to the service account"))]
    NotFound { resource: String },

    #[snafu(display("service account lacks access to {resource}: {message}"))]
    PermissionDenied { resource: String, message: String },

    #[snafu(display("'{folder_id}' is not a folder (mime type '{mime_type}')"))]
    NotAFolder {
        folder_id: String,
        mime_type: String,
    },

    #[snafu(display("token endpoint rejected the assertion: {status_code} - {message}"))]
    TokenExchange { status_code: u16, message: String },

    #[snafu(display("failed to sign token assertion"))]
    Signing { source: jsonwebtoken::errors::Error },

    #[snafu(display("Drive API error: {status_code} - {message}"))]
    Api { status_code: u16, message: String },

    #[snafu(display("HTTP request failed"))]
    Http { source: reqwest::Error },

    #[snafu(display("failed to decode Drive API response"))]
    Decode { source: serde_json::Error },

    #[snafu(display("failed to write '{}'", path.display()))]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse URL"))]
    InvalidUrl { source: url::ParseError },

    #[snafu(display("base URL '{url}' cannot carry a path"))]
    InvalidBaseUrl { url: String },
}

/// Google's JSON error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Maps a failed response onto the crate's error kinds.
pub(crate) fn error_for_status(status: StatusCode, body: &str, resource: &str) -> Error {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = envelope
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());
    let rate_limited = envelope.as_ref().is_some_and(|e| {
        e.error
            .errors
            .iter()
            .any(|d| RATE_LIMIT_REASONS.contains(&d.reason.as_str()))
    });

    match status {
        StatusCode::NOT_FOUND => Error::NotFound {
            resource: resource.to_string(),
        },
        StatusCode::FORBIDDEN if !rate_limited => Error::PermissionDenied {
            resource: resource.to_string(),
            message,
        },
        _ => Error::Api {
            status_code: status.as_u16(),
            message,
        },
    }
}

/// Internal client for making requests to the Drive API
pub(crate) struct DriveClient {
    http_client: Client,
    auth: Authenticator,
    base_url: Url,
    pub page_size: u32,
}

impl DriveClient {
    /// URL of `files` or of `files/{file_id}`.
    fn files_url(&self, file_id: Option<&str>) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                InvalidBaseUrlSnafu {
                    url: self.base_url.to_string(),
                }
                .build()
            })?;
            segments.pop_if_empty().push("files");
            if let Some(id) = file_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Authorizes and sends a request, turning non-success statuses into errors.
    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, Error> {
        let token = self.auth.token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .context(HttpSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.context(HttpSnafu)?;
            debug!(status = status.as_u16(), resource, "Drive API request failed");
            return Err(error_for_status(status, &body, resource));
        }

        Ok(response)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, Error> {
        let bytes = self
            .send(request, resource)
            .await?
            .bytes()
            .await
            .context(HttpSnafu)?;
        serde_json::from_slice(&bytes).context(DecodeSnafu)
    }

    /// Get a file's metadata
    #[instrument(skip_all, fields(file.id = %file_id))]
    pub(crate) async fn get_file(&self, file_id: &str) -> Result<DriveFile, Error> {
        let url = self.files_url(Some(file_id))?;
        let request = self
            .http_client
            .get(url)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")]);

        self.send_json(request, &format!("file '{file_id}'")).await
    }

    /// List one page of files matching `query`
    #[instrument(skip_all, fields(page.size = page_size, page.token = ?page_token))]
    pub(crate) async fn list_page(
        &self,
        query: &str,
        resource: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileList, Error> {
        let url = self.files_url(None)?;
        let fields = format!("nextPageToken,incompleteSearch,files({FILE_FIELDS})");
        let page_size = page_size.to_string();

        let mut request = self.http_client.get(url).query(&[
            ("q", query),
            ("fields", fields.as_str()),
            ("pageSize", page_size.as_str()),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let page: FileList = self.send_json(request, resource).await?;
        debug!(
            files = page.files.len(),
            has_more = page.next_page_token.is_some(),
            "listed page"
        );
        Ok(page)
    }

    /// Start a content download and hand back the open response
    async fn media_response(&self, file_id: &str) -> Result<Response, Error> {
        let url = self.files_url(Some(file_id))?;
        let request = self
            .http_client
            .get(url)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);

        self.send(request, &format!("file '{file_id}'")).await
    }

    /// Download a file's full content
    #[instrument(skip_all, fields(file.id = %file_id))]
    pub(crate) async fn download(&self, file_id: &str) -> Result<Bytes, Error> {
        let bytes = self
            .media_response(file_id)
            .await?
            .bytes()
            .await
            .context(HttpSnafu)?;
        info!(bytes = bytes.len(), "downloaded file");
        Ok(bytes)
    }

    /// Stream a file's content to `destination`, returning the bytes written.
    ///
    /// A partially written file is removed when the transfer fails.
    #[instrument(skip_all, fields(file.id = %file_id, destination = %destination.display()))]
    pub(crate) async fn download_to(&self, file_id: &str, destination: &Path) -> Result<u64, Error> {
        let response = self.media_response(file_id).await?;
        let mut file = tokio::fs::File::create(destination)
            .await
            .context(IoSnafu { path: destination })?;

        match copy_body(response, &mut file, destination).await {
            Ok(written) => {
                info!(bytes = written, "downloaded file to disk");
                Ok(written)
            }
            Err(e) => {
                drop(file);
                if let Err(remove_err) = tokio::fs::remove_file(destination).await {
                    warn!(error = %remove_err, "failed to remove partial download");
                }
                Err(e)
            }
        }
    }
}

async fn copy_body(
    mut response: Response,
    file: &mut tokio::fs::File,
    destination: &Path,
) -> Result<u64, Error> {
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.context(HttpSnafu)? {
        file.write_all(&chunk)
            .await
            .context(IoSnafu { path: destination })?;
        written += chunk.len() as u64;
    }
    file.flush().await.context(IoSnafu { path: destination })?;
    Ok(written)
}

/// Builder for [`GoogleDrive`] with non-default settings.
pub struct GoogleDriveBuilder {
    credentials_path: PathBuf,
    base_url: Option<Url>,
    scopes: Vec<String>,
    page_size: u32,
    timeout: Duration,
}

impl GoogleDriveBuilder {
    fn new(credentials_path: PathBuf) -> Self {
        Self {
            credentials_path,
            base_url: None,
            scopes: vec![DEFAULT_SCOPE.to_string()],
            page_size: DEFAULT_PAGE_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Root of the Drive v3 API, e.g. a proxy or a local fake.
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// OAuth scopes requested for the access token.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Default page size for listings, clamped to `1..=1000`.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Timeout applied to every HTTP request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load the credentials and build the client. No request is sent.
    pub fn build(self) -> Result<GoogleDrive, Error> {
        let key = ServiceAccountKey::from_file(&self.credentials_path).context(CredentialsSnafu)?;

        let base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL).context(InvalidUrlSnafu)?,
        };
        if base_url.cannot_be_a_base() {
            return InvalidBaseUrlSnafu {
                url: base_url.to_string(),
            }
            .fail();
        }

        let http_client = Client::builder()
            .timeout(self.timeout)
            .build()
            .context(HttpSnafu)?;
        let auth = Authenticator::new(http_client.clone(), key, self.scopes)?;
        debug!(service_account = auth.client_email(), %base_url, "Drive client ready");

        Ok(GoogleDrive {
            client: Arc::new(DriveClient {
                http_client,
                auth,
                base_url,
                page_size: self.page_size,
            }),
        })
    }
}

/// Read-only client for a Google Drive account reached through a service
/// account.
///
/// ```rust,ignore
/// use futures::TryStreamExt;
/// use gdrive_images::GoogleDrive;
///
/// let drive = GoogleDrive::new("service-account.json")?;
/// let images = drive.iter_images("1AbCdEfGh");
/// futures::pin_mut!(images);
/// while let Some(bytes) = images.try_next().await? {
///     println!("{} bytes", bytes.len());
/// }
/// ```
#[derive(Clone)]
pub struct GoogleDrive {
    client: Arc<DriveClient>,
}

impl GoogleDrive {
    /// Create a client from a service-account key file
    pub fn new(credentials_path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::builder(credentials_path).build()
    }

    /// Create a client with a custom Drive API base URL
    pub fn with_base_url(credentials_path: impl AsRef<Path>, base_url: Url) -> Result<Self, Error> {
        Self::builder(credentials_path).base_url(base_url).build()
    }

    /// Start configuring a client
    pub fn builder(credentials_path: impl AsRef<Path>) -> GoogleDriveBuilder {
        GoogleDriveBuilder::new(credentials_path.as_ref().to_path_buf())
    }

    /// Lazily yields the content of every image directly inside `folder_id`.
    ///
    /// Nothing is requested until the stream is first polled. The folder is
    /// resolved first, so a bad id surfaces as [`Error::NotFound`],
    /// [`Error::PermissionDenied`] or [`Error::NotAFolder`] on that first
    /// poll. Any error ends the stream.
    pub fn iter_images(
        &self,
        folder_id: impl Into<String>,
    ) -> impl Stream<Item = Result<Bytes, Error>> + Send {
        images::image_bytes(self.client.clone(), folder_id.into(), self.client.page_size)
    }

    /// [`iter_images`](Self::iter_images) with an explicit listing page size.
    pub fn iter_images_with_page_size(
        &self,
        folder_id: impl Into<String>,
        page_size: u32,
    ) -> impl Stream<Item = Result<Bytes, Error>> + Send {
        images::image_bytes(
            self.client.clone(),
            folder_id.into(),
            page_size.clamp(1, MAX_PAGE_SIZE),
        )
    }

    /// Lists every non-trashed file directly inside `folder_id`.
    ///
    /// This method returns a stream that handles pagination automatically.
    /// `None` uses the page size the client was built with.
    pub fn list_files(
        &self,
        folder_id: impl Into<String>,
        page_size: Option<u32>,
    ) -> impl Stream<Item = Result<DriveFile, Error>> + Send {
        let page_size = self.effective_page_size(page_size);
        images::folder_files(self.client.clone(), folder_id.into(), page_size, false)
    }

    /// Lists the image files directly inside `folder_id`.
    pub fn list_images(
        &self,
        folder_id: impl Into<String>,
        page_size: Option<u32>,
    ) -> impl Stream<Item = Result<DriveFile, Error>> + Send {
        let page_size = self.effective_page_size(page_size);
        images::folder_files(self.client.clone(), folder_id.into(), page_size, true)
    }

    /// Fetch a single file's metadata.
    pub async fn get_file(&self, file_id: &str) -> Result<DriveFile, Error> {
        self.client.get_file(file_id).await
    }

    /// Download a single file into memory.
    pub async fn download_file(&self, file_id: &str) -> Result<Bytes, Error> {
        self.client.download(file_id).await
    }

    /// Download a single file to a local path without holding it in memory.
    pub async fn download_file_to(
        &self,
        file_id: &str,
        destination: impl AsRef<Path>,
    ) -> Result<u64, Error> {
        self.client.download_to(file_id, destination.as_ref()).await
    }

    fn effective_page_size(&self, page_size: Option<u32>) -> u32 {
        page_size
            .unwrap_or(self.client.page_size)
            .clamp(1, MAX_PAGE_SIZE)
    }
}
