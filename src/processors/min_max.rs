//! Running minimum and maximum intensity

use super::Processor;
use crate::dimensions::DimensionTag;
use crate::errors::Result;
use crate::file_handle::{DimensionSource, Pixel, ReadSelectors};
use ndarray::ArrayD;

/// Tracks the smallest and largest value seen across all steps
///
/// Both extremes are `None` until a step containing at least one comparable
/// value arrives. NaN values are skipped.
#[derive(Debug, Clone)]
pub struct MinMaxFinder<T> {
    min: Option<T>,
    max: Option<T>,
    steps: usize,
}

impl<T: Pixel> Default for MinMaxFinder<T> {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            steps: 0,
        }
    }
}

impl<T: Pixel> MinMaxFinder<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn min(&self) -> Option<T> {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Option<T> {
        self.max
    }

    /// `(min, max)` once both are known
    #[must_use]
    pub fn range(&self) -> Option<(T, T)> {
        self.min.zip(self.max)
    }

    /// Number of steps processed
    #[must_use]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Fold `data` into the running extremes
    pub fn update(&mut self, data: &ArrayD<T>) {
        for &value in data.iter() {
            // NaN is the only value not comparable to itself
            if value.partial_cmp(&value).is_none() {
                continue;
            }
            if self.min.map_or(true, |min| value < min) {
                self.min = Some(value);
            }
            if self.max.map_or(true, |max| value > max) {
                self.max = Some(value);
            }
        }
        self.steps += 1;
    }
}

impl<T: Pixel> Processor<T> for MinMaxFinder<T> {
    type Output = ();

    fn process(
        &mut self,
        data: ArrayD<T>,
        _dims: &[(DimensionTag, usize)],
        _file: &dyn DimensionSource,
        _selectors: &ReadSelectors,
    ) -> Result<Option<()>> {
        self.update(&data);
        Ok(None)
    }
}
