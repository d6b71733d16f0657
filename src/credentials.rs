//! Service-account key documents.
//!
//! A key is the JSON file downloaded from the Google Cloud console for a
//! service account. Only the fields needed to mint access tokens are kept.

use serde::Deserialize;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::path::{Path, PathBuf};

/// The only `type` accepted in a key document.
const SERVICE_ACCOUNT_TYPE: &str = "service_account";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CredentialsError {
    #[snafu(display("failed to read credentials file '{}'", path.display()))]
    Read {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("credentials file '{}' is not valid JSON", path.display()))]
    Parse {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[snafu(display("credentials have type '{actual}', expected 'service_account'"))]
    WrongType { actual: String },

    #[snafu(display("credentials are missing required field '{field}'"))]
    MissingField { field: &'static str },

    #[snafu(display("credentials private key is not a valid RSA PEM"))]
    InvalidKey { source: jsonwebtoken::errors::Error },
}

/// Raw on-disk layout. Every field is optional so that a missing one is
/// reported by name instead of as a generic parse failure.
#[derive(Debug, Deserialize)]
struct RawKey {
    #[serde(rename = "type")]
    key_type: Option<String>,
    project_id: Option<String>,
    private_key_id: Option<String>,
    private_key: Option<String>,
    client_email: Option<String>,
    client_id: Option<String>,
    token_uri: Option<String>,
}

/// A validated service-account key.
#[derive(Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub token_uri: String,
    pub project_id: Option<String>,
    pub private_key_id: Option<String>,
    pub client_id: Option<String>,
    pub(crate) private_key: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_id", &self.client_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl ServiceAccountKey {
    /// Reads and validates a key file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        let contents = std::fs::read(path).context(ReadSnafu { path })?;
        let raw: RawKey = serde_json::from_slice(&contents).context(ParseSnafu { path })?;
        Self::from_raw(raw)
    }

    /// Validates a key already held in memory.
    pub fn from_json(json: &str) -> Result<Self, CredentialsError> {
        let raw: RawKey = serde_json::from_str(json).context(ParseSnafu {
            path: PathBuf::from("<memory>"),
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawKey) -> Result<Self, CredentialsError> {
        let key_type = raw.key_type.context(MissingFieldSnafu { field: "type" })?;
        ensure!(
            key_type == SERVICE_ACCOUNT_TYPE,
            WrongTypeSnafu { actual: key_type }
        );

        let private_key = non_empty(raw.private_key).context(MissingFieldSnafu {
            field: "private_key",
        })?;
        let client_email = non_empty(raw.client_email).context(MissingFieldSnafu {
            field: "client_email",
        })?;
        let token_uri = non_empty(raw.token_uri).context(MissingFieldSnafu {
            field: "token_uri",
        })?;

        // PEM decoding alone does not parse the RSA structure; a trial
        // signature does.
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(private_key.as_bytes())
            .context(InvalidKeySnafu)?;
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &serde_json::json!({}),
            &encoding_key,
        )
        .context(InvalidKeySnafu)?;

        Ok(Self {
            client_email,
            token_uri,
            project_id: raw.project_id,
            private_key_id: raw.private_key_id,
            client_id: raw.client_id,
            private_key,
        })
    }

    pub(crate) fn encoding_key(&self) -> Result<jsonwebtoken::EncodingKey, CredentialsError> {
        jsonwebtoken::EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .context(InvalidKeySnafu)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
