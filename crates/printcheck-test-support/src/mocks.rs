//! Mock implementations of core port traits.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::DynamicImage;
use printcheck_core::domain::{CardReport, RawImage};
use printcheck_core::error::LoadError;
use printcheck_core::ports::{
    ImageSource, ProgressEvent, ProgressSink, ResultOutput, SnapshotSink, Stage,
};

/// Mock implementation of `ImageSource` for testing.
///
/// Yields pre-built images, then a `Missing` error for each registered
/// missing path, and tracks iteration for assertions.
pub struct MockImageSource {
    images: Vec<RawImage>,
    missing: Vec<PathBuf>,
    iteration_count: Arc<Mutex<usize>>,
}

impl MockImageSource {
    /// Creates a new mock source with the given images.
    #[must_use]
    pub fn new(images: Vec<RawImage>) -> Self {
        Self {
            images,
            missing: Vec::new(),
            iteration_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates an empty mock source.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(vec![])
    }

    /// Adds a path that fails to load.
    #[must_use]
    pub fn with_missing(mut self, path: impl Into<PathBuf>) -> Self {
        self.missing.push(path.into());
        self
    }

    /// Returns the number of times the source has been iterated.
    #[must_use]
    pub fn iteration_count(&self) -> usize {
        *self
            .iteration_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ImageSource for MockImageSource {
    fn images(&self) -> Box<dyn Iterator<Item = Result<RawImage, LoadError>> + Send + '_> {
        *self
            .iteration_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        let missing = self
            .missing
            .iter()
            .map(|path| Err(LoadError::Missing { path: path.clone() }));
        Box::new(self.images.iter().cloned().map(Ok).chain(missing))
    }

    fn count_hint(&self) -> Option<usize> {
        Some(self.images.len() + self.missing.len())
    }
}

/// Mock implementation of `ResultOutput` for testing.
///
/// Captures reports for later assertions.
pub struct MockResultOutput {
    reports: Arc<Mutex<Vec<CardReport>>>,
    flush_count: Arc<Mutex<usize>>,
}

impl MockResultOutput {
    /// Creates a new mock output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reports: Arc::new(Mutex::new(Vec::new())),
            flush_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns all captured reports.
    #[must_use]
    pub fn reports(&self) -> Vec<CardReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of times `flush()` was called.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        *self
            .flush_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockResultOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultOutput for MockResultOutput {
    fn write(&self, report: &CardReport) -> anyhow::Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        *self
            .flush_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

/// Mock implementation of `ProgressSink` for testing.
///
/// Captures events for later assertions.
pub struct MockProgressSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl MockProgressSink {
    /// Creates a new mock progress sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns all captured events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of `Started` events.
    #[must_use]
    pub fn started_count(&self) -> usize {
        self.count(|e| matches!(e, ProgressEvent::Started { .. }))
    }

    /// Returns the number of `Completed` events.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.count(|e| matches!(e, ProgressEvent::Completed { .. }))
    }

    /// Returns the number of `Skipped` events.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(|e| matches!(e, ProgressEvent::Skipped { .. }))
    }

    /// Returns whether a `Finished` event was received.
    #[must_use]
    pub fn has_finished(&self) -> bool {
        self.count(|e| matches!(e, ProgressEvent::Finished { .. })) > 0
    }

    /// Returns the final counts from the `Finished` event, if any.
    #[must_use]
    pub fn finished_counts(&self) -> Option<(usize, usize)> {
        self.events().iter().find_map(|e| match e {
            ProgressEvent::Finished { processed, skipped } => Some((*processed, *skipped)),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&ProgressEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl Default for MockProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for MockProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Mock implementation of `SnapshotSink` for testing.
///
/// Records which stages were saved and where, without touching disk.
/// Can be told to fail so callers' error handling can be checked.
pub struct MockSnapshotSink {
    saved: Arc<Mutex<Vec<(PathBuf, Stage, (u32, u32))>>>,
    fail: bool,
}

impl MockSnapshotSink {
    /// Creates a sink that accepts every snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            saved: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    /// Creates a sink that rejects every snapshot.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Stages saved so far, in call order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, stage, _)| *stage)
            .collect()
    }

    /// Dimensions of the image saved for a stage, if any.
    #[must_use]
    pub fn dimensions_of(&self, stage: Stage) -> Option<(u32, u32)> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, s, _)| *s == stage)
            .map(|(_, _, dims)| *dims)
    }

    /// Directories snapshots were written into.
    #[must_use]
    pub fn directories(&self) -> Vec<PathBuf> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(dir, _, _)| dir.clone())
            .collect()
    }
}

impl Default for MockSnapshotSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSink for MockSnapshotSink {
    fn save(&self, scratch_dir: &Path, stage: Stage, image: &DynamicImage) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("snapshot sink is read-only");
        }
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((
                scratch_dir.to_path_buf(),
                stage,
                (image.width(), image.height()),
            ));
        Ok(())
    }
}
