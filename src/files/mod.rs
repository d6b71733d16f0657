pub mod filter;
pub mod model;

pub use filter::{is_image_mime, FOLDER_MIME_TYPE, IMAGE_MIME_TYPES};
pub use model::{DriveFile, FileList};
