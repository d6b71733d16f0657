//! # gdrive-images
//!
//! Read-only access to image files in a Google Drive folder, authenticated
//! with a service-account key.
//!
//! [`GoogleDrive::iter_images`] returns a lazy stream that lists the folder
//! page by page and downloads each image only when the caller asks for the
//! next item.

mod auth;
mod client;
mod common;
mod credentials;
pub mod files;
mod images;
pub mod prelude;


pub use client::{Error, GoogleDrive, GoogleDriveBuilder, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use credentials::{CredentialsError, ServiceAccountKey};
pub use files::{is_image_mime, DriveFile, FileList, IMAGE_MIME_TYPES};
