//! Gridded bivariate normal kernel density, evaluated the way a plotting
//! library's 2-D density stat does it: normal-reference bandwidth per axis,
//! Gaussian kernel with standard deviation `h / 4`, values on an `n x n` grid.

use crate::config::toml_config::DensityConfig;
use crate::domain::model::{DensityGrid, Extent};
use geo::{BoundingRect, MultiPolygon};
use std::f64::consts::PI;

/// Type 7 sample quantile of already sorted values.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Normal reference rule: `4 * 1.06 * min(sd, IQR / 1.34) * n^(-1/5)`.
/// `None` when fewer than two values or the spread is zero.
pub fn bandwidth_nrd(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let iqr = quantile(&sorted, 0.75) - quantile(&sorted, 0.25);

    let spread = variance.sqrt().min(iqr / 1.34);
    let h = 4.0 * 1.06 * spread * (n as f64).powf(-0.2);
    (h.is_finite() && h > 0.0).then_some(h)
}

/// Bandwidths `(hx, hy)` in metres for one facet.
pub fn bandwidths(points: &[(f64, f64)], settings: &DensityConfig) -> (f64, f64) {
    let pick = |values: Vec<f64>| {
        let h = settings
            .bandwidth_m
            .or_else(|| bandwidth_nrd(&values))
            .unwrap_or(settings.min_bandwidth_m);
        (h * settings.bandwidth_adjust).max(settings.min_bandwidth_m)
    };

    let hx = pick(points.iter().map(|p| p.0).collect());
    let hy = pick(points.iter().map(|p| p.1).collect());
    (hx, hy)
}

fn dnorm(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

/// Evaluate the density of `points` on a `grid_size x grid_size` grid spanning `extent`.
pub fn kde2d(
    points: &[(f64, f64)],
    hx: f64,
    hy: f64,
    grid_size: usize,
    extent: Extent,
) -> DensityGrid {
    let n = grid_size.max(2);
    let axis = |min: f64, max: f64| -> Vec<f64> {
        (0..n)
            .map(|i| min + (max - min) * i as f64 / (n - 1) as f64)
            .collect()
    };
    let gx = axis(extent.min_x, extent.max_x);
    let gy = axis(extent.min_y, extent.max_y);

    let mut values = vec![0.0; n * n];
    if points.is_empty() {
        return DensityGrid {
            nx: n,
            ny: n,
            extent,
            values,
        };
    }

    let sx = hx / 4.0;
    let sy = hy / 4.0;

    // 逐點累加核權重的外積，記憶體只需 n x n
    let mut wx = vec![0.0; n];
    let mut wy = vec![0.0; n];
    for &(x, y) in points {
        for (w, g) in wx.iter_mut().zip(&gx) {
            *w = dnorm((g - x) / sx);
        }
        for (w, g) in wy.iter_mut().zip(&gy) {
            *w = dnorm((g - y) / sy);
        }
        for (row, &weight_y) in values.chunks_exact_mut(n).zip(&wy) {
            if weight_y == 0.0 {
                continue;
            }
            for (cell, &weight_x) in row.iter_mut().zip(&wx) {
                *cell += weight_x * weight_y;
            }
        }
    }

    let norm = points.len() as f64 * sx * sy;
    for value in &mut values {
        *value /= norm;
    }

    DensityGrid {
        nx: n,
        ny: n,
        extent,
        values,
    }
}

/// Bounding box of the outline and every point, padded.
pub fn density_extent<'a>(
    outline: &MultiPolygon<f64>,
    points: impl IntoIterator<Item = &'a (f64, f64)>,
    padding_fraction: f64,
) -> Option<Extent> {
    let mut extent = outline.bounding_rect().map(|rect| Extent {
        min_x: rect.min().x,
        min_y: rect.min().y,
        max_x: rect.max().x,
        max_y: rect.max().y,
    });

    for &(x, y) in points {
        match extent.as_mut() {
            Some(e) => e.include(x, y),
            None => {
                extent = Some(Extent {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                })
            }
        }
    }

    extent.map(|e| {
        let padded = e.padded(padding_fraction);
        // 單點時給一個最小範圍
        if padded.width() <= 0.0 || padded.height() <= 0.0 {
            Extent {
                min_x: padded.min_x - 1.0,
                min_y: padded.min_y - 1.0,
                max_x: padded.max_x + 1.0,
                max_y: padded.max_y + 1.0,
            }
        } else {
            padded
        }
    })
}

/// `bins + 1` equally spaced breaks from 0 to `max_density`.
pub fn contour_breaks(max_density: f64, bins: usize) -> Vec<f64> {
    let bins = bins.max(1);
    (0..=bins)
        .map(|k| max_density * k as f64 / bins as f64)
        .collect()
}

/// Filled band a density value falls into, `1..bins`. Values below the first
/// non-zero break are not drawn.
pub fn band_level(value: f64, breaks: &[f64]) -> Option<usize> {
    let bins = breaks.len().checked_sub(1)?;
    let width = *breaks.get(1)?;
    if !(width > 0.0) || value < width {
        return None;
    }
    let level = (value / width).floor() as usize;
    Some(level.min(bins.saturating_sub(1)).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn extent(size: f64) -> Extent {
        Extent {
            min_x: 0.0,
            min_y: 0.0,
            max_x: size,
            max_y: size,
        }
    }

    #[test]
    fn test_bandwidth_nrd_matches_reference() {
        let h = bandwidth_nrd(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!((h - 4.586665).abs() < 1e-5, "h = {}", h);
    }

    #[test]
    fn test_bandwidth_nrd_degenerate_inputs() {
        assert!(bandwidth_nrd(&[]).is_none());
        assert!(bandwidth_nrd(&[3.0]).is_none());
        assert!(bandwidth_nrd(&[3.0, 3.0, 3.0]).is_none());
    }

    #[test]
    fn test_bandwidths_fall_back_and_adjust() {
        let settings = DensityConfig {
            min_bandwidth_m: 1_000.0,
            bandwidth_adjust: 2.0,
            ..DensityConfig::default()
        };
        let (hx, hy) = bandwidths(&[(10.0, 20.0)], &settings);
        assert_eq!(hx, 2_000.0);
        assert_eq!(hy, 2_000.0);

        let fixed = DensityConfig {
            bandwidth_m: Some(8_000.0),
            ..DensityConfig::default()
        };
        let points = [(0.0, 0.0), (50_000.0, 10.0), (100_000.0, 20.0)];
        assert_eq!(bandwidths(&points, &fixed), (8_000.0, 8_000.0));
    }

    #[test]
    fn test_kde_peaks_at_cluster() {
        let points = vec![(25.0, 75.0); 5];
        let grid = kde2d(&points, 20.0, 20.0, 101, extent(100.0));

        let (best, _) = grid
            .values
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (idx, &v)| if v > acc.1 { (idx, v) } else { acc });
        assert_eq!(best % grid.nx, 25);
        assert_eq!(best / grid.nx, 75);

        // sd = h/4 = 5, peak = 1 / (2 pi * 5 * 5)
        let expected_peak = 1.0 / (2.0 * PI * 25.0);
        assert!((grid.max() - expected_peak).abs() < 1e-9);
    }

    #[test]
    fn test_kde_integrates_to_one() {
        let points = vec![(40.0, 50.0), (60.0, 50.0), (50.0, 45.0)];
        let grid = kde2d(&points, 20.0, 20.0, 201, extent(100.0));

        let cell = (100.0 / 200.0) * (100.0 / 200.0);
        let total: f64 = grid.values.iter().sum::<f64>() * cell;
        assert!((total - 1.0).abs() < 0.01, "total = {}", total);
    }

    #[test]
    fn test_kde_is_symmetric_between_two_points() {
        let points = vec![(30.0, 50.0), (70.0, 50.0)];
        let grid = kde2d(&points, 20.0, 20.0, 101, extent(100.0));

        assert!((grid.value(30, 50) - grid.value(70, 50)).abs() < 1e-15);
        assert!(grid.value(30, 50) > grid.value(50, 50));
        assert!((grid.value(30, 40) - grid.value(30, 60)).abs() < 1e-15);
    }

    #[test]
    fn test_kde_without_points_is_flat_zero() {
        let grid = kde2d(&[], 10.0, 10.0, 10, extent(1.0));
        assert_eq!(grid.values.len(), 100);
        assert_eq!(grid.max(), 0.0);
    }

    #[test]
    fn test_density_extent_covers_outline_and_points() {
        let outline = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ]]);
        let points = [(20.0, 5.0)];
        let e = density_extent(&outline, points.iter(), 0.0).unwrap();
        assert_eq!((e.min_x, e.max_x, e.min_y, e.max_y), (0.0, 20.0, 0.0, 10.0));

        let empty = MultiPolygon::<f64>::new(vec![]);
        assert!(density_extent(&empty, [].iter(), 0.1).is_none());
        let single = density_extent(&empty, [(3.0, 3.0)].iter(), 0.1).unwrap();
        assert!(single.width() > 0.0 && single.height() > 0.0);
    }

    #[test]
    fn test_breaks_and_levels() {
        let breaks = contour_breaks(1.0, 10);
        assert_eq!(breaks.len(), 11);
        assert_eq!(breaks[0], 0.0);
        assert_eq!(breaks[10], 1.0);

        assert_eq!(band_level(0.05, &breaks), None);
        assert_eq!(band_level(0.15, &breaks), Some(1));
        assert_eq!(band_level(0.95, &breaks), Some(9));
        assert_eq!(band_level(1.0, &breaks), Some(9));
        assert_eq!(band_level(0.5, &contour_breaks(0.0, 10)), None);
    }
}
