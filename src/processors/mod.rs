//! Processors fed by the streaming driver
//!
//! A processor is constructed once, receives every step of a driver run in
//! strictly increasing operating index order, and is handed back to the
//! caller when the run ends so its final state can be read.
//!
//! # Organization
//!
//! - [`passthrough`]: identity processor
//! - [`min_max`]: running intensity extremes
//! - [`intensity`]: per-step median profiles and intensity histograms
//! - [`percentile`]: 8-bit normalization by percentiles or fixed bounds
//! - [`projection`]: maximum intensity projection along one axis
//!
//! Computation processors accumulate and return `None`; normalization
//! processors and the projection return a transformed slice for every step.

pub mod intensity;
pub mod min_max;
pub mod passthrough;
pub mod percentile;
pub mod projection;

pub use intensity::IntensityDistribution;
pub use min_max::MinMaxFinder;
pub use passthrough::Passthrough;
pub use percentile::{normalize_to_u8, percentile, PercentileNormalize, RangeNormalize};
pub use projection::MaxProject;

use crate::dimensions::DimensionTag;
use crate::errors::Result;
use crate::file_handle::{DimensionSource, Pixel, ReadSelectors};
use ndarray::ArrayD;

/// Stateful per-step consumer of driver reads
pub trait Processor<T: Pixel> {
    /// Transformed slice returned by normalization processors
    type Output;

    /// Consume one step
    ///
    /// `dims` lists the axes of `data` in order; `selectors` are the absolute
    /// indices the step was read with. Returning an error aborts the run.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn process(
        &mut self,
        data: ArrayD<T>,
        dims: &[(DimensionTag, usize)],
        file: &dyn DimensionSource,
        selectors: &ReadSelectors,
    ) -> Result<Option<Self::Output>>;
}

impl<T: Pixel, P: Processor<T> + ?Sized> Processor<T> for &mut P {
    type Output = P::Output;

    fn process(
        &mut self,
        data: ArrayD<T>,
        dims: &[(DimensionTag, usize)],
        file: &dyn DimensionSource,
        selectors: &ReadSelectors,
    ) -> Result<Option<Self::Output>> {
        (**self).process(data, dims, file, selectors)
    }
}
