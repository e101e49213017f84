//! Filesystem adapter for loading card photographs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use printcheck_core::domain::{Provenance, RawImage};
use printcheck_core::error::LoadError;
use printcheck_core::ImageSource;
use tracing::{debug, warn};

/// Supported image extensions.
const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "webp", "bmp"];

/// Longest sanitized title, in characters.
const MAX_TITLE_CHARS: usize = 40;

/// Stand-in for titles that would not name a child directory.
const PLACEHOLDER_TITLE: &str = "image";

/// Turns a free-form title into a file-name stem.
///
/// Keeps the first 40 characters, replaces spaces with `_` and path
/// separators with `-`. Empty and all-dot results (`.`, `..`) become
/// `image`, so the stem always names a child of its parent directory.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let stem: String = title
        .chars()
        .take(MAX_TITLE_CHARS)
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' => '-',
            other => other,
        })
        .collect();
    if stem.chars().all(|c| c == '.') {
        PLACEHOLDER_TITLE.to_string()
    } else {
        stem
    }
}

/// Hands out sanitized titles that are unique within one batch.
///
/// The first image with a given stem keeps it; later ones get `-1`, `-2`, ...
/// with the stem shortened so the result stays within 40 characters. Clones
/// share the same claims, so one instance can span several sources.
#[derive(Debug, Clone, Default)]
pub struct UniqueTitles {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl UniqueTitles {
    /// Creates an empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitizes `title` and reserves a variant no earlier call returned.
    #[must_use]
    pub fn claim(&self, title: &str) -> String {
        let base = sanitize_title(title);
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if claimed.insert(base.clone()) {
            return base;
        }
        let mut n = 1usize;
        loop {
            let suffix = format!("-{n}");
            let keep = MAX_TITLE_CHARS.saturating_sub(suffix.len());
            let candidate: String = base.chars().take(keep).chain(suffix.chars()).collect();
            if claimed.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Creates `<debug_dir>/<sanitized title>/` and returns it.
///
/// # Errors
///
/// Returns [`LoadError::ScratchDir`] when the directory cannot be created.
pub fn prepare_scratch_dir(debug_dir: &Path, title: &str) -> Result<PathBuf, LoadError> {
    let dir = debug_dir.join(sanitize_title(title));
    std::fs::create_dir_all(&dir).map_err(|source| LoadError::ScratchDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

/// Loads `<input_dir>/<sanitized name>.jpg`, the layout the crawler writes.
///
/// With `debug_dir` set, the scratch directory is created first so it exists
/// even when the file turns out to be missing.
///
/// # Errors
///
/// Returns [`LoadError`] when the scratch directory cannot be created or the
/// file is missing or undecodable.
pub fn load_from_path(
    name: &str,
    input_dir: &Path,
    debug_dir: Option<&Path>,
) -> Result<RawImage, LoadError> {
    let stem = sanitize_title(name);
    let path = input_dir.join(format!("{stem}.jpg"));
    let scratch_dir = debug_dir
        .map(|dir| prepare_scratch_dir(dir, &stem))
        .transpose()?;
    let mut raw = decode_file(&path, stem)?;
    raw.scratch_dir = scratch_dir;
    Ok(raw)
}

/// Loads an arbitrary image file, titled by its sanitized file stem.
///
/// # Errors
///
/// Returns [`LoadError`] when the file is missing or undecodable, or the
/// scratch directory cannot be created.
pub fn load_file(path: &Path, debug_dir: Option<&Path>) -> Result<RawImage, LoadError> {
    load_titled_file(path, sanitize_title(&file_stem(path)), debug_dir)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned())
}

/// `title` must already be sanitized.
fn load_titled_file(
    path: &Path,
    title: String,
    debug_dir: Option<&Path>,
) -> Result<RawImage, LoadError> {
    let mut raw = decode_file(path, title)?;
    raw.scratch_dir = debug_dir
        .map(|dir| prepare_scratch_dir(dir, &raw.title))
        .transpose()?;
    Ok(raw)
}

/// Decodes an in-memory encoded image, titled by the sanitized `title`.
///
/// # Errors
///
/// Returns [`LoadError::Decode`] for a corrupt buffer, or
/// [`LoadError::ScratchDir`] when the scratch directory cannot be created.
pub fn load_from_bytes(
    bytes: &[u8],
    title: &str,
    debug_dir: Option<&Path>,
) -> Result<RawImage, LoadError> {
    let image = image::load_from_memory(bytes).map_err(|e| LoadError::Decode {
        source_name: title.to_string(),
        reason: e.to_string(),
    })?;
    let title = sanitize_title(title);
    let scratch_dir = debug_dir
        .map(|dir| prepare_scratch_dir(dir, &title))
        .transpose()?;
    Ok(RawImage {
        title,
        provenance: Provenance::InMemory,
        image,
        scratch_dir,
    })
}

fn decode_file(path: &Path, title: String) -> Result<RawImage, LoadError> {
    if !path.is_file() {
        return Err(LoadError::Missing {
            path: path.to_path_buf(),
        });
    }
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let image = image::load_from_memory(&bytes).map_err(|e| LoadError::Decode {
        source_name: path.display().to_string(),
        reason: e.to_string(),
    })?;
    debug!(path = %path.display(), width = image.width(), height = image.height(), "decoded");
    Ok(RawImage {
        title,
        provenance: Provenance::Path(path.to_path_buf()),
        image,
        scratch_dir: None,
    })
}

/// Filesystem image source adapter.
pub struct FsImageSource {
    paths: Vec<PathBuf>,
    recursive: bool,
    debug_dir: Option<PathBuf>,
    titles: UniqueTitles,
}

impl FsImageSource {
    /// Creates a new filesystem image source.
    ///
    /// # Arguments
    ///
    /// * `paths` - Files or directories to scan
    /// * `recursive` - Whether to recurse into subdirectories
    #[must_use]
    pub fn new(paths: Vec<PathBuf>, recursive: bool) -> Self {
        Self {
            paths,
            recursive,
            debug_dir: None,
            titles: UniqueTitles::new(),
        }
    }

    /// Creates a scratch directory per image under `dir`.
    #[must_use]
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    /// Draws titles from a claim set shared with other sources.
    #[must_use]
    pub fn with_titles(mut self, titles: UniqueTitles) -> Self {
        self.titles = titles;
        self
    }

    /// Collects all image files from the configured paths.
    ///
    /// Explicitly named files are kept even when missing or of an unknown
    /// type, so they are reported rather than silently dropped.
    fn collect_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for path in &self.paths {
            if path.is_dir() {
                self.collect_from_dir(path, &mut files);
            } else {
                if path.is_file() && !is_supported_image(path) {
                    warn!("Unsupported file type: {}", path.display());
                }
                files.push(path.clone());
            }
        }

        files.sort();
        files.dedup();
        files
    }

    fn collect_from_dir(&self, dir: &Path, files: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read directory {}: {e}", dir.display());
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_supported_image(&path) {
                files.push(path);
            } else if path.is_dir() && self.recursive {
                self.collect_from_dir(&path, files);
            }
        }
    }
}

impl ImageSource for FsImageSource {
    fn images(&self) -> Box<dyn Iterator<Item = Result<RawImage, LoadError>> + Send + '_> {
        let files = self.collect_files();
        debug!("Found {} image files", files.len());

        let debug_dir = self.debug_dir.as_deref();
        Box::new(
            files
                .into_iter()
                .map(move |path| {
                    let title = self.titles.claim(&file_stem(&path));
                    load_titled_file(&path, title, debug_dir)
                }),
        )
    }

    fn count_hint(&self) -> Option<usize> {
        Some(self.collect_files().len())
    }
}

/// Checks if a path has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|e| RASTER_EXTENSIONS.contains(&e.as_str()))
}
