//! Intensity distributions over time
//!
//! For every step, records the median intensity profile along each of the
//! `X`, `Y` and `Z` axes present in the data, plus a histogram with one bin
//! per representable value of the element type. Each step fills the slot at
//! its operating index minus the operating dimension's begin.
//!
//! The histogram has `max - min + 1` bins, so value `v` always lands in bin
//! `v - min`. This differs from an edge-based histogram over `min..=max`
//! with `max - min` bins, whose last bin would merge the two largest values.

use super::Processor;
use crate::dimensions::DimensionTag;
use crate::errors::{Result, TimelapseError};
use crate::file_handle::{DimensionSource, Pixel, ReadSelectors};
use ndarray::{Array2, ArrayD, Axis};
use num_traits::ToPrimitive;

/// Largest histogram the processor will allocate per slot
pub const MAX_HISTOGRAM_BINS: usize = 1 << 16;

/// Axes that get a median profile, in profile order
const PROFILE_AXES: [DimensionTag; 3] = [DimensionTag::X, DimensionTag::Y, DimensionTag::Depth];

#[derive(Debug, Clone)]
struct DistributionState {
    begin: usize,
    slots: usize,
    /// `(tag, axis_len × slots)` median profiles
    profiles: Vec<(DimensionTag, Array2<f64>)>,
    /// Value of bin 0
    offset: i64,
    /// `slots × bins` counts
    histogram: Array2<u64>,
    filled: Vec<bool>,
}

/// Per-step median profiles and intensity histograms
///
/// State is allocated on the first step, once the plane shape and the slot
/// count are known. Floating point element types are rejected.
#[derive(Debug, Clone)]
pub struct IntensityDistribution {
    operating_dim: DimensionTag,
    state: Option<DistributionState>,
}

impl Default for IntensityDistribution {
    fn default() -> Self {
        Self::new(DimensionTag::Time)
    }
}

impl IntensityDistribution {
    /// Slot steps by `operating_dim`; this must match the driver's
    #[must_use]
    pub fn new(operating_dim: DimensionTag) -> Self {
        Self {
            operating_dim,
            state: None,
        }
    }

    #[must_use]
    pub fn operating_dim(&self) -> DimensionTag {
        self.operating_dim
    }

    /// Number of slots, once allocated
    #[must_use]
    pub fn slots(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.slots)
    }

    /// Median profile along `tag`, shaped `axis_len × slots`
    #[must_use]
    pub fn profile(&self, tag: DimensionTag) -> Option<&Array2<f64>> {
        self.state
            .as_ref()?
            .profiles
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, profile)| profile)
    }

    /// Histogram counts, shaped `slots × bins`
    #[must_use]
    pub fn histogram(&self) -> Option<&Array2<u64>> {
        self.state.as_ref().map(|s| &s.histogram)
    }

    /// Intensity value counted by histogram bin 0
    #[must_use]
    pub fn histogram_offset(&self) -> Option<i64> {
        self.state.as_ref().map(|s| s.offset)
    }

    /// Absolute operating indices whose slot has been written
    #[must_use]
    pub fn filled_indices(&self) -> Vec<usize> {
        self.state.as_ref().map_or_else(Vec::new, |s| {
            s.filled
                .iter()
                .enumerate()
                .filter(|(_, filled)| **filled)
                .map(|(slot, _)| s.begin + slot)
                .collect()
        })
    }

    fn allocate<T: Pixel>(
        &self,
        data: &ArrayD<T>,
        dims: &[(DimensionTag, usize)],
        file: &dyn DimensionSource,
    ) -> Result<DistributionState> {
        let (min, max) = T::integer_range().ok_or_else(|| {
            TimelapseError::invalid_argument(format!(
                "intensity distributions need an integer element type, got {}",
                T::DTYPE
            ))
        })?;
        let bins = usize::try_from(max - min + 1).unwrap_or(usize::MAX);
        if bins > MAX_HISTOGRAM_BINS {
            return Err(TimelapseError::invalid_argument(format!(
                "{} needs {bins} histogram bins, at most {MAX_HISTOGRAM_BINS} are supported",
                T::DTYPE
            )));
        }

        let bounds = file.dims()?.get(self.operating_dim).ok_or_else(|| {
            TimelapseError::invalid_dimension(self.operating_dim, "not found in file")
        })?;

        let profiles = PROFILE_AXES
            .iter()
            .filter_map(|tag| {
                let axis = dims.iter().position(|(t, _)| t == tag)?;
                Some((*tag, Array2::zeros((data.len_of(Axis(axis)), bounds.len))))
            })
            .collect();

        Ok(DistributionState {
            begin: bounds.begin,
            slots: bounds.len,
            profiles,
            offset: min,
            histogram: Array2::zeros((bounds.len, bins)),
            filled: vec![false; bounds.len],
        })
    }
}

impl<T: Pixel> Processor<T> for IntensityDistribution {
    type Output = ();

    fn process(
        &mut self,
        data: ArrayD<T>,
        dims: &[(DimensionTag, usize)],
        file: &dyn DimensionSource,
        selectors: &ReadSelectors,
    ) -> Result<Option<()>> {
        if self.state.is_none() {
            self.state = Some(self.allocate(&data, dims, file)?);
        }
        let operating_dim = self.operating_dim;
        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };

        let index = selectors.get(operating_dim).ok_or_else(|| {
            TimelapseError::invalid_argument(format!(
                "step selectors {selectors} do not pin the operating dimension '{operating_dim}'"
            ))
        })?;
        let slot = index
            .checked_sub(state.begin)
            .filter(|&slot| slot < state.slots)
            .ok_or_else(|| {
                TimelapseError::invalid_dimension(
                    operating_dim,
                    format!("index {index} has no slot"),
                )
            })?;

        for (tag, profile) in &mut state.profiles {
            let axis = dims.iter().position(|(t, _)| *t == *tag).ok_or_else(|| {
                TimelapseError::corrupt(format!("step data lost its '{tag}' axis"))
            })?;
            if data.len_of(Axis(axis)) != profile.nrows() {
                return Err(TimelapseError::corrupt(format!(
                    "'{tag}' axis changed length between steps"
                )));
            }
            for (i, lane) in data.axis_iter(Axis(axis)).enumerate() {
                let mut values: Vec<f64> = lane.iter().filter_map(ToPrimitive::to_f64).collect();
                profile[[i, slot]] = median(&mut values);
            }
        }

        let offset = state.offset;
        let mut counts = state.histogram.row_mut(slot);
        counts.fill(0);
        for value in &data {
            if let Some(bin) = value.to_i64().and_then(|v| usize::try_from(v - offset).ok()) {
                counts[bin] += 1;
            }
        }
        state.filled[slot] = true;

        Ok(None)
    }
}

/// Median of `values`, averaging the middle pair for even counts; NaN when empty
fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
