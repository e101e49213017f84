//! Printcheck Adapters - External adapters for printcheck.
//!
//! This crate provides adapters for:
//! - Filesystem and in-memory image loading
//! - HTTP image fetching
//! - Diagnostic snapshots and ROI crop output
//! - The reference template store

pub mod fs;
pub mod http;
pub mod snapshots;
pub mod templates;

pub use fs::{
    load_file, load_from_bytes, load_from_path, sanitize_title, FsImageSource, UniqueTitles,
};
pub use http::{is_url, HttpFetcher, UrlImageSource};
pub use snapshots::{CropWriter, FsSnapshotWriter};
pub use templates::{default_templates_dir, list_templates, load_template_image, TemplateSet};
