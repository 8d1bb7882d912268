//! Normalization to 8-bit intensities
//!
//! Both normalizers map `[low, high]` linearly onto `[0, 1]`, clip, and scale
//! to `0..=255`. [`PercentileNormalize`] derives the bounds from each slice on
//! its own; [`RangeNormalize`] uses bounds fixed up front, typically the
//! final state of a [`MinMaxFinder`] run.

use super::{MinMaxFinder, Processor};
use crate::dimensions::DimensionTag;
use crate::errors::{Result, TimelapseError};
use crate::file_handle::{DimensionSource, Pixel, ReadSelectors};
use ndarray::ArrayD;
use num_traits::ToPrimitive;

/// Default lower percentile
pub const DEFAULT_LOW_PERCENTILE: f64 = 50.0;
/// Default upper percentile
pub const DEFAULT_HIGH_PERCENTILE: f64 = 99.8;

/// `q`-th percentile (0..=100) of ascending `sorted` values
///
/// Interpolates linearly between the two nearest ranks. `None` when empty.
#[must_use]
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (q / 100.0).clamp(0.0, 1.0) * last as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let fraction = rank - below as f64;
    Some(sorted[below] + (sorted[above] - sorted[below]) * fraction)
}

/// Map `data` from `[low, high]` onto `0..=255`, clipping outside values
///
/// When `high <= low` every value above `low` maps to 255 and the rest to 0.
/// NaN maps to 0.
#[must_use]
pub fn normalize_to_u8<T: Pixel>(data: &ArrayD<T>, low: f64, high: f64) -> ArrayD<u8> {
    let span = high - low;
    data.mapv(|value| {
        let value = value.to_f64().unwrap_or(f64::NAN);
        if span > 0.0 {
            (((value - low) / span).clamp(0.0, 1.0) * 255.0) as u8
        } else if value > low {
            u8::MAX
        } else {
            0
        }
    })
}

fn check_percentiles(low: f64, high: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low > high {
        return Err(TimelapseError::invalid_argument(format!(
            "percentiles must satisfy 0 <= low <= high <= 100, got low={low}, high={high}"
        )));
    }
    Ok(())
}

/// Per-slice percentile normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileNormalize {
    low: f64,
    high: f64,
}

impl Default for PercentileNormalize {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_PERCENTILE,
            high: DEFAULT_HIGH_PERCENTILE,
        }
    }
}

impl PercentileNormalize {
    /// # Errors
    ///
    /// `InvalidArgument` unless `0 <= low <= high <= 100`.
    pub fn new(low: f64, high: f64) -> Result<Self> {
        check_percentiles(low, high)?;
        Ok(Self { low, high })
    }

    #[must_use]
    pub fn low(&self) -> f64 {
        self.low
    }

    #[must_use]
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Intensity values at the configured percentiles, NaN ignored
    #[must_use]
    pub fn bounds<T: Pixel>(&self, data: &ArrayD<T>) -> Option<(f64, f64)> {
        let mut values: Vec<f64> = data
            .iter()
            .filter_map(ToPrimitive::to_f64)
            .filter(|v| !v.is_nan())
            .collect();
        values.sort_by(f64::total_cmp);
        Some((percentile(&values, self.low)?, percentile(&values, self.high)?))
    }

    /// Normalize one slice
    #[must_use]
    pub fn normalize<T: Pixel>(&self, data: &ArrayD<T>) -> ArrayD<u8> {
        match self.bounds(data) {
            Some((low, high)) => normalize_to_u8(data, low, high),
            None => data.mapv(|_| 0),
        }
    }
}

impl<T: Pixel> Processor<T> for PercentileNormalize {
    type Output = ArrayD<u8>;

    fn process(
        &mut self,
        data: ArrayD<T>,
        _dims: &[(DimensionTag, usize)],
        _file: &dyn DimensionSource,
        _selectors: &ReadSelectors,
    ) -> Result<Option<ArrayD<u8>>> {
        Ok(Some(self.normalize(&data)))
    }
}

/// Normalization against fixed intensity bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeNormalize {
    min: f64,
    max: f64,
}

impl RangeNormalize {
    /// # Errors
    ///
    /// `InvalidArgument` for non-finite bounds or `min > max`.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(TimelapseError::invalid_argument(format!(
                "invalid normalization range [{min}, {max}]"
            )));
        }
        Ok(Self { min, max })
    }

    /// Bounds from a finished min/max run
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the finder has not seen any value.
    pub fn from_min_max<T: Pixel>(finder: &MinMaxFinder<T>) -> Result<Self> {
        let (min, max) = finder.range().ok_or_else(|| {
            TimelapseError::invalid_argument("min/max finder has not processed any data")
        })?;
        let as_f64 = |v: T| {
            v.to_f64()
                .ok_or_else(|| TimelapseError::invalid_argument(format!("{v} is not representable")))
        };
        Self::new(as_f64(min)?, as_f64(max)?)
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }
}

impl<T: Pixel> Processor<T> for RangeNormalize {
    type Output = ArrayD<u8>;

    fn process(
        &mut self,
        data: ArrayD<T>,
        _dims: &[(DimensionTag, usize)],
        _file: &dyn DimensionSource,
        _selectors: &ReadSelectors,
    ) -> Result<Option<ArrayD<u8>>> {
        Ok(Some(normalize_to_u8(&data, self.min, self.max)))
    }
}
