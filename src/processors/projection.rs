//! Maximum intensity projection

use super::Processor;
use crate::dimensions::DimensionTag;
use crate::errors::{Result, TimelapseError};
use crate::file_handle::{DimensionSource, Pixel, ReadSelectors};
use ndarray::{ArrayD, Axis};

/// Largest step rank accepted: one projected axis plus the plane
const MAX_PROJECTION_NDIM: usize = 3;

/// Collapses one axis of every single-channel step to its per-pixel maximum
///
/// Steps must have at most three axes, so every other non-spatial dimension
/// has to be fixed. NaN values never win the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxProject {
    axis: DimensionTag,
}

impl Default for MaxProject {
    fn default() -> Self {
        Self::new(DimensionTag::Depth)
    }
}

impl MaxProject {
    #[must_use]
    pub fn new(axis: DimensionTag) -> Self {
        Self { axis }
    }

    #[must_use]
    pub fn axis(&self) -> DimensionTag {
        self.axis
    }

    /// Project `data`, whose axes are `dims`, along the configured axis
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for more than three axes, `InvalidDimension` if
    /// the projected axis is not among `dims`.
    pub fn project<T: Pixel>(
        &self,
        data: &ArrayD<T>,
        dims: &[(DimensionTag, usize)],
    ) -> Result<ArrayD<T>> {
        if data.ndim() > MAX_PROJECTION_NDIM {
            return Err(TimelapseError::invalid_argument(format!(
                "max projection takes at most {MAX_PROJECTION_NDIM} axes, got {}; fix the remaining dimensions",
                data.ndim()
            )));
        }
        let axis = dims
            .iter()
            .position(|(tag, _)| *tag == self.axis)
            .ok_or_else(|| TimelapseError::invalid_dimension(self.axis, "not an axis of the step data"))?;

        Ok(data.fold_axis(Axis(axis), T::min_value(), |&max, &value| {
            if value > max {
                value
            } else {
                max
            }
        }))
    }
}

impl<T: Pixel> Processor<T> for MaxProject {
    type Output = ArrayD<T>;

    fn process(
        &mut self,
        data: ArrayD<T>,
        dims: &[(DimensionTag, usize)],
        _file: &dyn DimensionSource,
        _selectors: &ReadSelectors,
    ) -> Result<Option<ArrayD<T>>> {
        self.project(&data, dims).map(Some)
    }
}
