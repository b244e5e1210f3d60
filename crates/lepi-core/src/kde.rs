//! Gaussian kernel density estimation over a rectangular window, and masking
//! of the resulting surface to the exact boundary polygon.
//!
//! The estimate is computed on the boundary's bounding box and only then
//! masked to the polygon.
//!
//!   k(d)  = exp(−|d|² / 2σ²) / (2πσ²)
//!   λ(u)  = Σⱼ k(u − xⱼ) / e(u)
//!   e(u)  = [Φ((x₁−uₓ)/σ) − Φ((x₀−uₓ)/σ)] · [Φ((y₁−u_y)/σ) − Φ((y₀−u_y)/σ)]
//!
//! e(u) ≡ 1 when edge correction is off. Values are relative intensity
//! (points per square degree), never rescaled to [0, 1].

use serde::Serialize;

use crate::boundary::Boundary;
use crate::error::{PipelineError, Result};
use crate::pattern::{PointPattern, Window};

#[derive(Debug, Clone, Copy)]
pub struct KdeParams {
    /// Kernel standard deviation in window units (degrees).
    pub sigma: f64,
    pub width: usize,
    pub height: usize,
    pub edge_correction: bool,
}

/// Density grid over a window. Row 0 = min_lat (S→N), like the DEM.
/// Undefined (masked) cells hold NaN.
#[derive(Debug, Clone, Serialize)]
pub struct DensitySurface {
    pub values: Vec<f64>,
    pub width: usize,
    pub height: usize,
    pub window: Window,
    pub sigma: f64,
}

impl DensitySurface {
    pub fn cell_size(&self) -> (f64, f64) {
        (
            self.window.width() / self.width as f64,
            self.window.height() / self.height as f64,
        )
    }

    /// Geographic centre of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (dx, dy) = self.cell_size();
        (
            self.window.min_lon + (col as f64 + 0.5) * dx,
            self.window.min_lat + (row as f64 + 0.5) * dy,
        )
    }

    /// `None` for masked cells.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let v = self.values[row * self.width + col];
        (!v.is_nan()).then_some(v)
    }

    pub fn defined_cells(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    /// (min, max) over defined cells.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Mark every cell whose centre lies outside `boundary` as undefined.
    /// Returns the number of cells masked by this call.
    pub fn mask_to(&mut self, boundary: &Boundary) -> usize {
        let mut masked = 0usize;
        for r in 0..self.height {
            for c in 0..self.width {
                let (lon, lat) = self.cell_center(r, c);
                let idx = r * self.width + c;
                if !self.values[idx].is_nan() && !boundary.contains(lon, lat) {
                    self.values[idx] = f64::NAN;
                    masked += 1;
                }
            }
        }
        tracing::debug!(masked, remaining = self.defined_cells(), "density masked to boundary");
        masked
    }
}

// ── Normal CDF ────────────────────────────────────────────────────────────────

/// erf via Abramowitz & Stegun 7.1.26 (|ε| < 1.5e-7).
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Kernel mass falling inside `[lo, hi]` along one axis for a kernel at `u`.
fn axis_mass(u: f64, lo: f64, hi: f64, sigma: f64) -> f64 {
    normal_cdf((hi - u) / sigma) - normal_cdf((lo - u) / sigma)
}

// ── Estimation ────────────────────────────────────────────────────────────────

fn fill_row(row: usize, out: &mut [f64], pattern: &PointPattern, params: &KdeParams) {
    let w = &pattern.window;
    let dx = w.width() / params.width as f64;
    let dy = w.height() / params.height as f64;
    let two_s2 = 2.0 * params.sigma * params.sigma;
    let norm = 1.0 / (std::f64::consts::PI * two_s2);

    let uy = w.min_lat + (row as f64 + 0.5) * dy;
    let mass_y = if params.edge_correction {
        axis_mass(uy, w.min_lat, w.max_lat, params.sigma)
    } else {
        1.0
    };

    for (col, cell) in out.iter_mut().enumerate() {
        let ux = w.min_lon + (col as f64 + 0.5) * dx;
        let sum: f64 = pattern
            .points()
            .iter()
            .map(|p| {
                let ddx = ux - p.x();
                let ddy = uy - p.y();
                (-(ddx * ddx + ddy * ddy) / two_s2).exp()
            })
            .sum();
        let mut v = sum * norm;
        if params.edge_correction {
            let e = axis_mass(ux, w.min_lon, w.max_lon, params.sigma) * mass_y;
            if e > 0.0 {
                v /= e;
            }
        }
        *cell = v;
    }
}

/// Estimate the density surface over the pattern's window.
///
/// An empty pattern is an error rather than an all-zero surface.
pub fn estimate_density(pattern: &PointPattern, params: &KdeParams) -> Result<DensitySurface> {
    if pattern.is_empty() {
        return Err(PipelineError::EmptyPointPattern);
    }
    if !(params.sigma.is_finite() && params.sigma > 0.0) {
        return Err(PipelineError::InvalidBandwidth(params.sigma));
    }
    if params.width == 0 || params.height == 0 {
        return Err(PipelineError::InvalidGrid {
            width: params.width,
            height: params.height,
        });
    }
    let w = &pattern.window;
    if !(w.width() > 0.0 && w.height() > 0.0) {
        return Err(PipelineError::Boundary(format!(
            "degenerate density window {:.4}x{:.4} degrees",
            w.width(),
            w.height()
        )));
    }

    let mut values = vec![0.0f64; params.width * params.height];

    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        values
            .par_chunks_mut(params.width)
            .enumerate()
            .for_each(|(r, row)| fill_row(r, row, pattern, params));
    }
    #[cfg(not(feature = "threading"))]
    {
        for (r, row) in values.chunks_mut(params.width).enumerate() {
            fill_row(r, row, pattern, params);
        }
    }

    tracing::info!(
        points = pattern.len(),
        sigma = params.sigma,
        grid = %format!("{}x{}", params.width, params.height),
        edge_correction = params.edge_correction,
        "density estimated"
    );

    Ok(DensitySurface {
        values,
        width: params.width,
        height: params.height,
        window: *w,
        sigma: params.sigma,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Crs;
    use approx::assert_relative_eq;
    use geo::{LineString, Point, Polygon};

    fn window(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Window {
        Window { min_lon, max_lon, min_lat, max_lat }
    }

    fn params(sigma: f64, n: usize, edge: bool) -> KdeParams {
        KdeParams { sigma, width: n, height: n, edge_correction: edge }
    }

    #[test]
    fn erf_matches_reference_values() {
        assert_relative_eq!(erf(0.0), 0.0, epsilon = 1e-7);
        assert_relative_eq!(erf(1.0), 0.842_700_79, epsilon = 1e-6);
        assert_relative_eq!(erf(-0.5), -0.520_499_88, epsilon = 1e-6);
        assert_relative_eq!(normal_cdf(1.959_964), 0.975, epsilon = 1e-5);
    }

    #[test]
    fn empty_pattern_fails_explicitly() {
        let pp = PointPattern::new(Crs::Wgs84, window(0.0, 1.0, 0.0, 1.0), &[]);
        let err = estimate_density(&pp, &params(0.1, 16, true)).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyPointPattern));
    }

    #[test]
    fn non_positive_sigma_rejected() {
        let pp = PointPattern::new(Crs::Wgs84, window(0.0, 1.0, 0.0, 1.0), &[Point::new(0.5, 0.5)]);
        assert!(matches!(
            estimate_density(&pp, &params(0.0, 16, true)),
            Err(PipelineError::InvalidBandwidth(_))
        ));
        assert!(matches!(
            estimate_density(&pp, &params(f64::NAN, 16, true)),
            Err(PipelineError::InvalidBandwidth(_))
        ));
    }

    #[test]
    fn single_point_integrates_to_one_without_edge_loss() {
        // Window spans ±10σ so almost no kernel mass leaves it.
        let pp = PointPattern::new(Crs::Wgs84, window(-1.0, 1.0, -1.0, 1.0), &[Point::new(0.0, 0.0)]);
        let s = estimate_density(&pp, &params(0.1, 200, false)).unwrap();
        let (dx, dy) = s.cell_size();
        let integral: f64 = s.values.iter().sum::<f64>() * dx * dy;
        assert_relative_eq!(integral, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn peak_sits_at_the_point() {
        let pp = PointPattern::new(Crs::Wgs84, window(0.0, 4.0, 0.0, 4.0), &[Point::new(1.0, 3.0)]);
        let s = estimate_density(&pp, &params(0.2, 40, false)).unwrap();
        let (best, _) = s
            .values
            .iter()
            .enumerate()
            .fold((0usize, f64::MIN), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });
        let (lon, lat) = s.cell_center(best / s.width, best % s.width);
        assert!((lon - 1.0).abs() <= 0.1 && (lat - 3.0).abs() <= 0.1, "peak at ({lon}, {lat})");
        // Relative intensity, not a [0, 1] surface.
        let (_, max) = s.value_range().unwrap();
        assert!(max > 1.0, "max={max}");
    }

    #[test]
    fn edge_correction_lifts_border_cells() {
        let w = window(0.0, 1.0, 0.0, 1.0);
        let pp = PointPattern::new(Crs::Wgs84, w, &[Point::new(0.05, 0.05), Point::new(0.5, 0.5)]);
        let raw = estimate_density(&pp, &params(0.2, 10, false)).unwrap();
        let corr = estimate_density(&pp, &params(0.2, 10, true)).unwrap();
        for (a, b) in raw.values.iter().zip(&corr.values) {
            assert!(b >= a);
        }
        // Corner cell loses roughly three quarters of its kernel mass.
        assert!(corr.values[0] > 2.0 * raw.values[0]);
    }

    #[cfg(feature = "threading")]
    #[test]
    fn parallel_rows_match_sequential_rows() {
        let w = window(10.0, 14.0, 42.0, 46.0);
        let pts: Vec<Point<f64>> = (0..25)
            .map(|i| Point::new(10.1 + 0.15 * i as f64, 42.2 + 0.13 * ((i * 7) % 25) as f64))
            .collect();
        let pp = PointPattern::new(Crs::Wgs84, w, &pts);
        for edge in [false, true] {
            let p = KdeParams { sigma: 0.3, width: 37, height: 23, edge_correction: edge };
            let parallel = estimate_density(&pp, &p).unwrap();
            let mut sequential = vec![0.0f64; p.width * p.height];
            for (r, row) in sequential.chunks_mut(p.width).enumerate() {
                fill_row(r, row, &pp, &p);
            }
            assert_eq!(parallel.values, sequential);
        }
    }

    #[test]
    fn mask_undefines_every_cell_outside_polygon() {
        // Triangle inside the unit square window.
        let tri = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        let boundary = Boundary::from_polygons("tri", vec![tri]).unwrap();
        let w = Window::from_boundary(&boundary);
        let pp = PointPattern::new(Crs::Wgs84, w, &[Point::new(0.2, 0.2)]);
        let mut s = estimate_density(&pp, &params(0.1, 20, true)).unwrap();
        let total = s.values.len();
        let masked = s.mask_to(&boundary);
        assert!(masked > 0 && masked < total);
        for r in 0..s.height {
            for c in 0..s.width {
                let (lon, lat) = s.cell_center(r, c);
                assert_eq!(s.get(r, c).is_some(), boundary.contains(lon, lat));
            }
        }
        assert_eq!(s.defined_cells(), total - masked);
        // Masking twice changes nothing.
        assert_eq!(s.mask_to(&boundary), 0);
    }
}
