//! Lazy folder traversal.
//!
//! Both streams do no work until polled and issue their requests strictly in
//! sequence: the folder lookup, then one `files.list` page at a time, and for
//! [`image_bytes`] one download per image before the next descriptor is looked
//! at. Only the current page of descriptors is held in memory.

use bytes::Bytes;
use futures::{pin_mut, Stream, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::{
    client::{DriveClient, Error, NotAFolderSnafu},
    files::{
        filter::{children_query, image_children_query},
        DriveFile,
    },
};

/// Resolves `folder_id` and fails unless it names a folder.
#[instrument(skip_all, fields(folder.id = %folder_id))]
async fn resolve_folder(client: &DriveClient, folder_id: &str) -> Result<DriveFile, Error> {
    let folder = client.get_file(folder_id).await?;
    if !folder.is_folder() {
        return NotAFolderSnafu {
            folder_id,
            mime_type: folder.mime_type,
        }
        .fail();
    }
    debug!(folder.name = %folder.name, "resolved folder");
    Ok(folder)
}

/// Children of `folder_id`, optionally restricted to images.
pub(crate) fn folder_files(
    client: Arc<DriveClient>,
    folder_id: String,
    page_size: u32,
    images_only: bool,
) -> impl Stream<Item = Result<DriveFile, Error>> + Send {
    async_stream::try_stream! {
        resolve_folder(&client, &folder_id).await?;

        let query = if images_only {
            image_children_query(&folder_id)
        } else {
            children_query(&folder_id)
        };
        let resource = format!("folder '{folder_id}'");

        let mut page_token: Option<String> = None;
        loop {
            let page = client
                .list_page(&query, &resource, page_size, page_token.as_deref())
                .await?;
            if page.incomplete_search {
                warn!("Drive reported an incomplete search; some files may be missing");
            }

            for file in page.files {
                // The server-side clause is a hint; the allowlist is enforced here.
                if images_only && !file.is_image() {
                    debug!(file.id = %file.id, mime_type = %file.mime_type, "skipping non-image");
                    continue;
                }
                yield file;
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
    }
}

/// Content of every image in `folder_id`, one buffer per file.
pub(crate) fn image_bytes(
    client: Arc<DriveClient>,
    folder_id: String,
    page_size: u32,
) -> impl Stream<Item = Result<Bytes, Error>> + Send {
    async_stream::try_stream! {
        let files = folder_files(client.clone(), folder_id, page_size, true);
        pin_mut!(files);

        while let Some(file) = files.try_next().await? {
            let bytes = client.download(&file.id).await?;
            yield bytes;
        }
    }
}
