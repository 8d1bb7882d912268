//! Identity processor

use super::Processor;
use crate::dimensions::DimensionTag;
use crate::errors::Result;
use crate::file_handle::{DimensionSource, Pixel, ReadSelectors};
use ndarray::ArrayD;

/// Returns every step's data unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl<T: Pixel> Processor<T> for Passthrough {
    type Output = ArrayD<T>;

    fn process(
        &mut self,
        data: ArrayD<T>,
        _dims: &[(DimensionTag, usize)],
        _file: &dyn DimensionSource,
        _selectors: &ReadSelectors,
    ) -> Result<Option<ArrayD<T>>> {
        Ok(Some(data))
    }
}
