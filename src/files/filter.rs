//! Which files count as images, and how a folder listing is asked for.

use mime::Mime;

/// MIME type Drive assigns to folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Fixed set of image formats the iterator yields.
pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
    "image/heic",
    "image/heif",
];

/// Whether `mime_type` names one of [`IMAGE_MIME_TYPES`].
///
/// Parameters such as `; charset=...` are ignored, and so is ASCII case.
pub fn is_image_mime(mime_type: &str) -> bool {
    let Ok(parsed) = mime_type.trim().parse::<Mime>() else {
        return false;
    };
    if parsed.type_() != mime::IMAGE {
        return false;
    }
    let essence = parsed.essence_str().to_ascii_lowercase();
    IMAGE_MIME_TYPES.contains(&essence.as_str())
}

/// Escapes a value for use inside a single-quoted Drive query string.
pub(crate) fn escape_query_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Query for the non-trashed children of `folder_id`.
pub(crate) fn children_query(folder_id: &str) -> String {
    format!(
        "'{}' in parents and trashed = false",
        escape_query_value(folder_id)
    )
}

/// Query for the non-trashed image children of `folder_id`.
pub(crate) fn image_children_query(folder_id: &str) -> String {
    let mime_clause = IMAGE_MIME_TYPES
        .iter()
        .map(|m| format!("mimeType = '{m}'"))
        .collect::<Vec<_>>()
        .join(" or ");
    format!("{} and ({mime_clause})", children_query(folder_id))
}
