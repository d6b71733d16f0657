//! # Prelude for the gdrive-images crate
//!
//! This module re-exports the most commonly used types for convenience.
//!
//! ```rust,ignore
//! use gdrive_images::prelude::*;
//! ```

pub use crate::client::{Error, GoogleDrive, GoogleDriveBuilder};
pub use crate::credentials::CredentialsError;
pub use crate::files::DriveFile;
