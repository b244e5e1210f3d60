//! Fixed-width elevation histogram.

use serde::Serialize;

use crate::error::{PipelineError, Result};

/// Upper bound on the number of bins a histogram may allocate.
pub const MAX_BINS: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// Lower edge of bin 0: the minimum value aligned down to a multiple of
    /// `bin_width`.
    pub origin: f64,
    pub bin_width: f64,
    pub counts: Vec<usize>,
}

/// One `[lo, hi)` bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bin {
    pub lo: f64,
    pub hi: f64,
    pub count: usize,
}

impl Histogram {
    /// Bin `values` into `[origin + k·w, origin + (k+1)·w)`. Non-finite values
    /// are ignored; no finite value yields an empty histogram.
    pub fn from_values(values: &[f32], bin_width: f64) -> Result<Self> {
        if !(bin_width.is_finite() && bin_width > 0.0) {
            return Err(PipelineError::InvalidBinWidth(bin_width));
        }
        let finite: Vec<f64> = values
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| f64::from(v))
            .collect();
        let Some(min) = finite.iter().copied().reduce(f64::min) else {
            return Ok(Self {
                origin: 0.0,
                bin_width,
                counts: Vec::new(),
            });
        };
        let max = finite.iter().copied().fold(min, f64::max);

        let origin = (min / bin_width).floor() * bin_width;
        let span = ((max - origin) / bin_width).floor();
        if !(span.is_finite() && span < MAX_BINS as f64) {
            return Err(PipelineError::HistogramRange { min, max, bin_width });
        }
        let n_bins = span as usize + 1;
        let mut counts = vec![0usize; n_bins];
        for v in finite {
            let idx = (((v - origin) / bin_width).floor() as usize).min(n_bins - 1);
            counts[idx] += 1;
        }
        Ok(Self {
            origin,
            bin_width,
            counts,
        })
    }

    pub fn bins(&self) -> Vec<Bin> {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let lo = self.origin + i as f64 * self.bin_width;
                Bin {
                    lo,
                    hi: lo + self.bin_width,
                    count,
                }
            })
            .collect()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_are_aligned_to_width() {
        let h = Histogram::from_values(&[5.0, 95.0, 105.0, 205.0], 100.0).unwrap();
        let bins = h.bins();
        assert_eq!(bins.len(), 3);
        assert_eq!((bins[0].lo, bins[0].hi, bins[0].count), (0.0, 100.0, 2));
        assert_eq!((bins[1].lo, bins[1].hi, bins[1].count), (100.0, 200.0, 1));
        assert_eq!((bins[2].lo, bins[2].hi, bins[2].count), (200.0, 300.0, 1));
        assert_eq!(h.total(), 4);
    }

    #[test]
    fn upper_edge_opens_a_new_bin() {
        let h = Histogram::from_values(&[100.0, 199.9, 200.0], 100.0).unwrap();
        assert_eq!(h.origin, 100.0);
        assert_eq!(h.counts, vec![2, 1]);
    }

    #[test]
    fn negative_elevations_align_downwards() {
        let h = Histogram::from_values(&[-20.0, 30.0], 100.0).unwrap();
        assert_eq!(h.origin, -100.0);
        assert_eq!(h.counts, vec![1, 1]);
    }

    #[test]
    fn empty_and_nan_inputs_give_empty_histogram() {
        let h = Histogram::from_values(&[], 100.0).unwrap();
        assert!(h.is_empty());
        let h = Histogram::from_values(&[f32::NAN], 100.0).unwrap();
        assert!(h.is_empty());
        assert_eq!(h.max_count(), 0);
    }

    #[test]
    fn unbounded_range_is_an_error_not_a_panic() {
        // Undeclared float fill value next to a real elevation.
        assert!(matches!(
            Histogram::from_values(&[120.0, -3.4e38], 100.0),
            Err(PipelineError::HistogramRange { .. })
        ));
        // Tiny but positive width.
        assert!(matches!(
            Histogram::from_values(&[0.0, 1000.0], 1e-300),
            Err(PipelineError::HistogramRange { .. })
        ));
    }

    #[test]
    fn range_just_under_the_cap_is_accepted() {
        let h = Histogram::from_values(&[0.0, 99_999.0], 0.1).unwrap();
        assert!(h.counts.len() <= MAX_BINS);
        assert_eq!(h.total(), 2);
    }

    #[test]
    fn zero_width_rejected() {
        assert!(matches!(
            Histogram::from_values(&[1.0], 0.0),
            Err(PipelineError::InvalidBinWidth(_))
        ));
    }
}
