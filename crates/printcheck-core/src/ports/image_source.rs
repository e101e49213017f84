//! Image source port for loading card photographs.

use crate::domain::RawImage;
use crate::error::LoadError;

/// Port for loading images from a source.
pub trait ImageSource: Send + Sync {
    /// Returns an iterator over images from this source.
    ///
    /// Individual items are errors when an image fails to load; the caller
    /// reports them as skips and continues.
    fn images(&self) -> Box<dyn Iterator<Item = Result<RawImage, LoadError>> + Send + '_>;

    /// Returns the total number of images, if known.
    fn count_hint(&self) -> Option<usize>;
}
