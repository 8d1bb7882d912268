//! Plane loading and selectors
//!
//! [`load_plane`] performs exactly one collaborator read and normalizes the
//! result so every selected axis is gone. [`LazyPlane`] binds a file and a set
//! of selectors into a repeatable, side-effect-free unit of deferred work.

use crate::dimensions::DimensionTag;
use crate::errors::{Result, TimelapseError};
use crate::file_handle::{FileHandle, ReadSelectors};
use ndarray::{Array2, ArrayD, Axis, Ix2};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Half-open, ascending `start:stop:step` range over a dimension
///
/// Missing bounds default to the whole domain the range is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: Option<usize>,
    pub stop: Option<usize>,
    pub step: usize,
}

impl IndexRange {
    /// Every index of the domain
    #[must_use]
    pub const fn full() -> Self {
        Self {
            start: None,
            stop: None,
            step: 1,
        }
    }

    #[must_use]
    pub const fn new(start: usize, stop: usize) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    #[must_use]
    pub const fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.step == 1
    }

    /// Resolve against the domain `[lo, hi)`, returning the selected indices
    ///
    /// A stop past `hi` is clamped; a stop before the start selects nothing.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the step is zero or the start lies outside the
    /// domain.
    pub fn resolve(&self, lo: usize, hi: usize) -> Result<Vec<usize>> {
        if self.step == 0 {
            return Err(TimelapseError::invalid_argument("range step must be positive"));
        }

        let start = self.start.unwrap_or(lo);
        if start < lo || start > hi {
            return Err(TimelapseError::invalid_argument(format!(
                "range start {start} lies outside [{lo}, {hi})"
            )));
        }

        let stop = self.stop.unwrap_or(hi).min(hi);
        if stop <= start {
            return Ok(Vec::new());
        }

        Ok((start..stop).step_by(self.step).collect())
    }
}

impl Default for IndexRange {
    fn default() -> Self {
        Self::full()
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<usize>| b.map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{}:{}:{}", bound(self.start), bound(self.stop), self.step)
    }
}

impl FromStr for IndexRange {
    type Err = TimelapseError;

    /// Parses `start:stop` or `start:stop:step`; either bound may be empty
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let bound = |part: &str| -> Result<Option<usize>> {
            if part.is_empty() {
                Ok(None)
            } else {
                part.parse().map(Some).map_err(|_| {
                    TimelapseError::invalid_argument(format!("invalid range bound '{part}'"))
                })
            }
        };

        match parts.as_slice() {
            [start, stop] => Ok(Self {
                start: bound(start)?,
                stop: bound(stop)?,
                step: 1,
            }),
            [start, stop, step] => Ok(Self {
                start: bound(start)?,
                stop: bound(stop)?,
                step: bound(step)?.unwrap_or(1),
            }),
            _ => Err(TimelapseError::invalid_argument(format!(
                "invalid range '{s}': expected 'start:stop[:step]'"
            ))),
        }
    }
}

/// Pin a dimension to one absolute index, or restrict it to a sub-range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Index(usize),
    Range(IndexRange),
}

impl FromStr for Selector {
    type Err = TimelapseError;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains(':') {
            return s.parse().map(Self::Range);
        }
        s.trim().parse().map(Self::Index).map_err(|_| {
            TimelapseError::invalid_argument(format!(
                "selector '{s}' is neither a fixed index nor a range"
            ))
        })
    }
}

/// Result of one plane read with every selected axis squeezed out
#[derive(Debug, Clone)]
pub struct LoadedPlane<T> {
    pub data: ArrayD<T>,
    pub dims: Vec<(DimensionTag, usize)>,
}

impl<T: Clone> LoadedPlane<T> {
    /// Keep only `positions` (relative to the axis start) along `tag`
    ///
    /// # Errors
    ///
    /// `InvalidDimension` if `tag` is not an axis of this plane, or
    /// `InvalidArgument` if a position is out of bounds.
    pub fn select_positions(mut self, tag: DimensionTag, positions: &[usize]) -> Result<Self> {
        let axis = self
            .dims
            .iter()
            .position(|(t, _)| *t == tag)
            .ok_or_else(|| {
                TimelapseError::invalid_dimension(tag, "not present in the read result")
            })?;

        let len = self.dims[axis].1;
        if let Some(bad) = positions.iter().find(|&&p| p >= len) {
            return Err(TimelapseError::invalid_argument(format!(
                "position {bad} out of bounds for '{tag}' with length {len}"
            )));
        }

        self.data = self.data.select(Axis(axis), positions);
        self.dims[axis].1 = positions.len();
        Ok(self)
    }

    /// Dims string of the remaining axes
    #[must_use]
    pub fn dims_string(&self) -> String {
        self.dims.iter().map(|(tag, _)| tag.as_char()).collect()
    }
}

/// Perform one physical read and squeeze every selected axis
///
/// Collaborators may either squeeze selected axes themselves or return them
/// with size 1; both normalize to the same result.
///
/// # Errors
///
/// Propagates the collaborator's error unmodified. Returns `CorruptSource` if
/// the reported dims disagree with the buffer shape, or a selected axis came
/// back with more than one element.
pub fn load_plane<F: FileHandle + ?Sized>(
    file: &F,
    selectors: &ReadSelectors,
) -> Result<LoadedPlane<F::Elem>> {
    let raw = file.read(selectors)?;
    let mut data = raw.data;
    let mut dims = raw.dims;

    if data.ndim() != dims.len() {
        return Err(TimelapseError::corrupt(format!(
            "read returned {} axes but reported {} dims",
            data.ndim(),
            dims.len()
        )));
    }
    if data.shape().iter().zip(&dims).any(|(&n, (_, size))| n != *size) {
        return Err(TimelapseError::corrupt(format!(
            "read returned shape {:?} but reported dims {:?}",
            data.shape(),
            dims
        )));
    }

    for axis in (0..dims.len()).rev() {
        let (tag, size) = dims[axis];
        if !selectors.contains(tag) {
            continue;
        }
        if size != 1 {
            return Err(TimelapseError::corrupt(format!(
                "selected dimension '{tag}' came back with {size} elements"
            )));
        }
        data = data.index_axis_move(Axis(axis), 0);
        dims.remove(axis);
    }

    Ok(LoadedPlane { data, dims })
}

/// Deferred read of exactly one 2D plane
///
/// Evaluating it any number of times against unchanged file content yields
/// an identical buffer. Nothing is cached.
pub struct LazyPlane<F: FileHandle> {
    file: Arc<F>,
    selectors: ReadSelectors,
}

impl<F: FileHandle> Clone for LazyPlane<F> {
    fn clone(&self) -> Self {
        Self {
            file: Arc::clone(&self.file),
            selectors: self.selectors.clone(),
        }
    }
}

impl<F: FileHandle> fmt::Debug for LazyPlane<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyPlane")
            .field("file", &self.file.identifier())
            .field("selectors", &self.selectors)
            .finish()
    }
}

impl<F: FileHandle> LazyPlane<F> {
    #[must_use]
    pub fn new(file: Arc<F>, selectors: ReadSelectors) -> Self {
        Self { file, selectors }
    }

    #[must_use]
    pub fn selectors(&self) -> &ReadSelectors {
        &self.selectors
    }

    /// Read the plane now
    ///
    /// # Errors
    ///
    /// Propagates read failures; `CorruptSource` if the result is not a
    /// `Y`, `X` plane.
    pub fn evaluate(&self) -> Result<Array2<F::Elem>> {
        debug!(
            "Reading plane {} from {}",
            self.selectors,
            self.file.identifier()
        );
        let plane = load_plane(self.file.as_ref(), &self.selectors)?;
        let tags: Vec<DimensionTag> = plane.dims.iter().map(|(tag, _)| *tag).collect();
        if tags != DimensionTag::SPATIAL {
            return Err(TimelapseError::corrupt(format!(
                "plane read for {} returned dims '{}', expected 'YX'",
                self.selectors,
                plane.dims_string()
            )));
        }
        Ok(plane.data.into_dimensionality::<Ix2>()?)
    }
}
