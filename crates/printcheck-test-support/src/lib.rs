//! Test support utilities for printcheck.
//!
//! Provides port mocks and synthetic card builders for testing the
//! alignment and extraction pipeline.
//!
//! # Example
//!
//! ```
//! use printcheck_test_support::{MockImageSource, SyntheticCardBuilder};
//!
//! // A tilted card on a dark table
//! let face = SyntheticCardBuilder::default_card_face();
//! let photo = SyntheticCardBuilder::photo(&face, 4.0, 40, image::Rgb([50, 50, 50]));
//!
//! let source = MockImageSource::new(vec![SyntheticCardBuilder::raw("card", photo)]);
//! ```

mod builders;
mod mocks;

pub use builders::{SyntheticCardBuilder, BORDER_WIDTH, CARD_YELLOW};
pub use mocks::{MockImageSource, MockProgressSink, MockResultOutput, MockSnapshotSink};
