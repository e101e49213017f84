//! Outlier-robust homography estimation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FeatureConfig;
use crate::domain::{signed_area, Homography, Point2};
use crate::error::AlignmentError;

/// A homography with its supporting correspondences.
#[derive(Debug, Clone)]
pub struct RansacFit {
    /// Transform mapping source points onto destination points.
    pub homography: Homography,
    /// Per-correspondence inlier flags.
    pub inliers: Vec<bool>,
    /// Number of inliers.
    pub inlier_count: usize,
}

/// Fits a homography to `src -> dst` with seeded RANSAC, then refits on the
/// consensus set.
///
/// # Errors
///
/// Returns [`AlignmentError::TooFewMatches`] for fewer than four pairs and
/// [`AlignmentError::NoConsensus`] when the best model has fewer than
/// `min_inliers` inliers.
pub fn fit_homography_ransac(
    src: &[Point2],
    dst: &[Point2],
    config: &FeatureConfig,
) -> Result<RansacFit, AlignmentError> {
    let n = src.len().min(dst.len());
    if n < 4 {
        return Err(AlignmentError::TooFewMatches {
            found: n,
            required: 4,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(Homography, usize)> = None;

    for _ in 0..config.ransac_iterations {
        let sample = sample_indices(&mut rng, n, 4);
        let s: Vec<Point2> = sample.iter().map(|&i| src[i]).collect();
        let d: Vec<Point2> = sample.iter().map(|&i| dst[i]).collect();
        if is_degenerate(&s) || is_degenerate(&d) {
            continue;
        }
        let Some(h) = Homography::from_correspondences(&s, &d) else {
            continue;
        };
        let count = count_inliers(&h, src, dst, config.ransac_threshold);
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((h, count));
            if count * 10 > n * 9 {
                break;
            }
        }
    }

    let (best_h, best_count) = best.ok_or(AlignmentError::NoConsensus {
        inliers: 0,
        required: config.min_inliers,
    })?;
    if best_count < config.min_inliers {
        return Err(AlignmentError::NoConsensus {
            inliers: best_count,
            required: config.min_inliers,
        });
    }

    let mask = inlier_mask(&best_h, src, dst, config.ransac_threshold);
    let (in_src, in_dst): (Vec<Point2>, Vec<Point2>) = mask
        .iter()
        .enumerate()
        .filter(|(_, inlier)| **inlier)
        .map(|(i, _)| (src[i], dst[i]))
        .unzip();
    let refit = Homography::from_correspondences(&in_src, &in_dst).unwrap_or(best_h);

    // Keep the refit only if it does not lose support.
    let refit_mask = inlier_mask(&refit, src, dst, config.ransac_threshold);
    let refit_count = refit_mask.iter().filter(|&&m| m).count();
    let (homography, inliers) = if refit_count >= best_count {
        (refit, refit_mask)
    } else {
        (best_h, mask)
    };
    let inlier_count = inliers.iter().filter(|&&m| m).count();

    Ok(RansacFit {
        homography,
        inliers,
        inlier_count,
    })
}

/// `k` distinct indices from `0..n` by a partial Fisher-Yates shuffle.
fn sample_indices(rng: &mut StdRng, n: usize, k: usize) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..n).collect();
    for i in 0..k.min(n) {
        let j = rng.random_range(i..n);
        pool.swap(i, j);
    }
    pool.truncate(k.min(n));
    pool
}

/// True when any three of the four points are nearly collinear.
fn is_degenerate(points: &[Point2]) -> bool {
    const MIN_TRIANGLE_AREA: f64 = 1.0;
    (0..points.len()).any(|skip| {
        let tri: Vec<Point2> = points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| (i != skip).then_some(*p))
            .collect();
        signed_area(&tri).abs() < MIN_TRIANGLE_AREA
    })
}

fn inlier_mask(h: &Homography, src: &[Point2], dst: &[Point2], threshold: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| h.reprojection_error(*s, *d) < threshold)
        .collect()
}

fn count_inliers(h: &Homography, src: &[Point2], dst: &[Point2], threshold: f64) -> usize {
    src.iter()
        .zip(dst)
        .filter(|(s, d)| h.reprojection_error(**s, **d) < threshold)
        .count()
}
