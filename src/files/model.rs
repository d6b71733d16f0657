use serde::{Deserialize, Serialize};

use super::filter::{is_image_mime, FOLDER_MIME_TYPE};

/// A Drive file resource, restricted to the fields this crate requests.
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mime_type: String,

    /// Size in bytes. Drive sends it as a decimal string and omits it for
    /// folders and Google-native documents.
    #[serde(
        default,
        with = "crate::common::serde::u64_as_string::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<u64>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn is_image(&self) -> bool {
        is_image_mime(&self.mime_type)
    }
}

/// One page of a `files.list` response.
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    #[serde(default)]
    pub next_page_token: Option<String>,

    #[serde(default)]
    pub incomplete_search: bool,
}
