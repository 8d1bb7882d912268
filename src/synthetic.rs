//! In-memory file handle whose pixels come from a closure
//!
//! Used to fabricate timelapse files of any layout without touching disk, and
//! to observe how many physical reads the lazy array and driver perform.

use crate::dimensions::{DimensionMap, DimensionTag};
use crate::errors::{Result, TimelapseError};
use crate::file_handle::{DimensionSource, FileHandle, Pixel, RawRead, ReadSelectors};
use ndarray::{indices, ArrayD, Dimension, IxDyn};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Absolute coordinates of one generated pixel, spatial axes included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelCoords {
    entries: Vec<(DimensionTag, usize)>,
}

impl PixelCoords {
    #[must_use]
    pub fn get(&self, tag: DimensionTag) -> Option<usize> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, index)| *index)
    }

    /// Absolute index along `tag`, 0 if the file has no such dimension
    #[must_use]
    pub fn index(&self, tag: DimensionTag) -> usize {
        self.get(tag).unwrap_or(0)
    }
}

type Generator<T> = Box<dyn Fn(&PixelCoords) -> T + Send + Sync>;

/// Closure-backed [`FileHandle`]
pub struct SyntheticFile<T> {
    dims: DimensionMap,
    generator: Generator<T>,
    squeeze: bool,
    failure: Option<(DimensionTag, usize)>,
    reads: AtomicUsize,
}

impl<T: Pixel> SyntheticFile<T> {
    pub fn new(dims: DimensionMap, generator: impl Fn(&PixelCoords) -> T + Send + Sync + 'static) -> Self {
        Self {
            dims,
            generator: Box::new(generator),
            squeeze: true,
            failure: None,
            reads: AtomicUsize::new(0),
        }
    }

    /// Build from a compact layout such as `"S1T3Y4X4"`
    ///
    /// # Errors
    ///
    /// See [`DimensionMap::from_spec`].
    pub fn from_spec(
        spec: &str,
        generator: impl Fn(&PixelCoords) -> T + Send + Sync + 'static,
    ) -> Result<Self> {
        Ok(Self::new(DimensionMap::from_spec(spec)?, generator))
    }

    /// Return selected axes as size-1 axes instead of squeezing them
    #[must_use]
    pub fn with_unsqueezed_reads(mut self) -> Self {
        self.squeeze = false;
        self
    }

    /// Fail every read that pins `tag` to `index`
    #[must_use]
    pub fn failing_at(mut self, tag: DimensionTag, index: usize) -> Self {
        self.failure = Some((tag, index));
        self
    }

    /// Number of `read` calls so far, failed ones included
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_read_count(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }
}

impl<T> fmt::Debug for SyntheticFile<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticFile")
            .field("dims", &self.dims)
            .field("squeeze", &self.squeeze)
            .field("failure", &self.failure)
            .field("reads", &self.reads.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<T: Pixel> DimensionSource for SyntheticFile<T> {
    fn dims(&self) -> Result<DimensionMap> {
        Ok(self.dims.clone())
    }
}

impl<T: Pixel> FileHandle for SyntheticFile<T> {
    type Elem = T;

    fn read(&self, selectors: &ReadSelectors) -> Result<RawRead<T>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        for (tag, index) in selectors.iter() {
            let bounds = self
                .dims
                .get(*tag)
                .ok_or_else(|| TimelapseError::invalid_dimension(tag, "not a dimension of this file"))?;
            if !bounds.contains(*index) {
                return Err(TimelapseError::invalid_dimension(
                    tag,
                    format!("index {index} outside [{}, {})", bounds.begin, bounds.end()),
                ));
            }
        }

        if let Some((tag, index)) = self.failure {
            if selectors.get(tag) == Some(index) {
                return Err(TimelapseError::corrupt(format!(
                    "synthetic read failure at {tag}={index}"
                )));
            }
        }

        // (tag, first absolute index, output length) per returned axis
        let axes: Vec<(DimensionTag, usize, usize)> = self
            .dims
            .iter()
            .filter_map(|(tag, bounds)| match selectors.get(*tag) {
                Some(_) if self.squeeze => None,
                Some(index) => Some((*tag, index, 1)),
                None => Some((*tag, bounds.begin, bounds.len)),
            })
            .collect();

        let pinned: Vec<(DimensionTag, usize)> = if self.squeeze {
            selectors.iter().copied().collect()
        } else {
            Vec::new()
        };

        let shape: Vec<usize> = axes.iter().map(|(_, _, len)| *len).collect();
        let mut values = Vec::with_capacity(shape.iter().product());
        for offsets in indices(IxDyn(&shape)) {
            let mut entries = pinned.clone();
            entries.extend(
                axes.iter()
                    .zip(offsets.slice())
                    .map(|((tag, first, _), offset)| (*tag, first + offset)),
            );
            values.push((self.generator)(&PixelCoords { entries }));
        }

        Ok(RawRead {
            data: ArrayD::from_shape_vec(IxDyn(&shape), values)?,
            dims: axes.iter().map(|(tag, _, len)| (*tag, *len)).collect(),
        })
    }

    fn identifier(&self) -> String {
        let layout: String = self
            .dims
            .iter()
            .map(|(tag, bounds)| format!("{tag}{}", bounds.len))
            .collect();
        format!("synthetic:{layout}")
    }
}
