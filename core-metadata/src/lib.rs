//! # Metadata Module
//!
//! Song sources other than YouTube:
//!
//! - [`catalog::SaavnClient`] searches a JioSaavn-compatible API and maps its
//!   results to `saavn-` songs with direct stream URLs.
//! - [`import::LocalImporter`] turns audio files on disk into `local-` songs,
//!   probing duration and tags with `lofty`.

pub mod catalog;
pub mod error;
pub mod import;

pub use catalog::SaavnClient;
pub use error::{MetadataError, Result};
pub use import::{is_supported_audio_file, LocalImporter, SUPPORTED_EXTENSIONS};
