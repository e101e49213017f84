//! Progress reporting port for UI integration.

use crate::domain::CardReport;

/// Events emitted during a batch for progress tracking.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Processing started for an image.
    Started {
        /// Title or path of the image.
        title: String,
        /// Index in the batch (0-based).
        index: usize,
        /// Total images in batch, if known.
        total: Option<usize>,
    },
    /// An image produced a report, processed or skipped.
    Completed {
        /// The report.
        report: CardReport,
    },
    /// An image was skipped.
    Skipped {
        /// Title or path of the image.
        title: String,
        /// Reason for skipping.
        reason: String,
    },
    /// All images have been handled.
    Finished {
        /// Images that produced an ROI crop.
        processed: usize,
        /// Images that were skipped.
        skipped: usize,
    },
}

/// Port for receiving progress events.
pub trait ProgressSink: Send + Sync {
    /// Called when a progress event occurs.
    fn on_event(&self, event: ProgressEvent);
}
