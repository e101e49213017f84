//! Pipeline stages, leaf first.
//!
//! Each stage is a pure transformation over borrowed images and is safe to
//! share between threads.

mod align;
mod color;
mod contour;
mod features;
mod localize;
mod quality;
mod ransac;
mod rectify;
mod refine;

pub use align::{FeatureAligner, FeatureAlignment};
pub use color::{hsv_mask, rgb_to_hsv, rgb_to_ycrcb, ycrcb_to_rgb};
pub use contour::{approx_polygon, largest_external_contour, Contour};
pub use features::{match_descriptors, Descriptor, DescriptorMatch, Keypoint, OrbExtractor};
pub use localize::{BorderDetection, BorderLocalizer, EdgeStrategy};
pub use quality::{clahe, laplacian_variance, Assessment, Histogram, QualityGate};
pub use ransac::{fit_homography_ransac, RansacFit};
pub use rectify::{warp_perspective, PerspectiveRectifier};
pub use refine::{Refinement, RoiRefiner};
