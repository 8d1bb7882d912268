//! Lazy N-D array assembled from a grid of deferred plane reads
//!
//! [`build_lazy_array`] performs a single sample read to learn the plane shape
//! and then lays out one [`LazyPlane`] per point of the operable dimensions'
//! cartesian product, in row-major order. Selection produces new views over
//! the same grid without touching the file; only [`LazyArray::materialize`]
//! and friends perform reads.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use timelapse_tools::prelude::*;
//!
//! let file = Arc::new(StackFile::<u16>::open("movie.tls").unwrap());
//! let array = build_lazy_array(file).unwrap();
//! assert!(array.dims_string().ends_with("YX"));
//!
//! // First channel of the third timepoint, nothing read yet
//! let view = array
//!     .select(DimensionTag::Time, AxisSelection::Index(2))
//!     .unwrap()
//!     .select(DimensionTag::Channel, AxisSelection::Index(0))
//!     .unwrap();
//! let pool = ParallelConfig::with_threads(4).build_pool().unwrap();
//! let data = view.materialize_in(&pool).unwrap();
//! ```

use crate::dimensions::{describe, DimensionTag};
use crate::errors::{Result, TimelapseError};
use crate::file_handle::{DataType, FileHandle, Pixel, ReadSelectors};
use crate::plane::{load_plane, IndexRange, LazyPlane};
use crate::stack_file::StackFile;
use ndarray::{indices, ArrayD, Axis, Dimension, IxDyn};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Selection applied to one axis of a [`LazyArray`]
///
/// Positions are relative to the current view (0-based), not absolute file
/// indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSelection {
    /// Pin the axis to one position and drop it from the shape
    Index(usize),
    /// Keep the axis, restricted to the range
    Range(IndexRange),
}

impl AxisSelection {
    /// The whole axis
    #[must_use]
    pub const fn all() -> Self {
        Self::Range(IndexRange::full())
    }
}

impl FromStr for AxisSelection {
    type Err = TimelapseError;

    fn from_str(s: &str) -> Result<Self> {
        if s.contains(':') {
            return s.parse().map(Self::Range);
        }
        s.trim().parse().map(Self::Index).map_err(|_| {
            TimelapseError::invalid_argument(format!(
                "selection '{s}' is neither an index nor a range"
            ))
        })
    }
}

/// Positions of one grid or spatial axis visible through a view
#[derive(Debug, Clone, PartialEq, Eq)]
struct AxisView {
    tag: DimensionTag,
    positions: Vec<usize>,
    kept: bool,
}

impl AxisView {
    fn full(tag: DimensionTag, len: usize) -> Self {
        Self {
            tag,
            positions: (0..len).collect(),
            kept: true,
        }
    }

    fn is_identity(&self, len: usize) -> bool {
        self.kept
            && self.positions.len() == len
            && self.positions.iter().enumerate().all(|(i, &p)| i == p)
    }
}

/// Logical N-D array whose planes are read only when materialized
pub struct LazyArray<F: FileHandle> {
    file: Arc<F>,
    /// Row-major over `grid_shape`
    grid: Arc<Vec<LazyPlane<F>>>,
    grid_shape: Vec<usize>,
    spatial_shape: (usize, usize),
    /// One entry per grid axis, then `Y`, `X`
    axes: Vec<AxisView>,
}

impl<F: FileHandle> Clone for LazyArray<F> {
    fn clone(&self) -> Self {
        Self {
            file: Arc::clone(&self.file),
            grid: Arc::clone(&self.grid),
            grid_shape: self.grid_shape.clone(),
            spatial_shape: self.spatial_shape,
            axes: self.axes.clone(),
        }
    }
}

impl<F: FileHandle> fmt::Debug for LazyArray<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyArray")
            .field("file", &self.file.identifier())
            .field("dims", &self.dims_string())
            .field("shape", &self.shape())
            .field("dtype", &self.dtype())
            .finish()
    }
}

/// Build the lazy array for an open file
///
/// Exactly one eager read happens here: the plane at every operable
/// dimension's begin index, used to learn the spatial shape.
///
/// # Errors
///
/// - `CorruptSource` if the file reports no dimensions or the sample read
///   does not produce a `Y`, `X` plane
/// - `InvalidDimension` if a dimension declares zero length
/// - any error of the sample read
pub fn build_lazy_array<F: FileHandle>(file: Arc<F>) -> Result<LazyArray<F>> {
    let descriptor = describe(file.as_ref())?;

    let mut base = ReadSelectors::new();
    if let Some(block) = descriptor.block() {
        base.set(DimensionTag::Block, block.begin);
    }

    let operable: Vec<_> = descriptor
        .non_spatial()
        .iter()
        .filter(|(tag, _)| tag.is_operable())
        .copied()
        .collect();

    let mut sample_selectors = base.clone();
    for (tag, bounds) in descriptor.non_spatial() {
        sample_selectors.set(*tag, bounds.begin);
    }
    let sample = load_plane(file.as_ref(), &sample_selectors)?;
    if sample.data.ndim() < 2 {
        return Err(TimelapseError::corrupt(format!(
            "sample read returned {} axes, expected a plane",
            sample.data.ndim()
        )));
    }
    let shape = sample.data.shape();
    let spatial_shape = (shape[shape.len() - 2], shape[shape.len() - 1]);

    let grid_shape: Vec<usize> = operable.iter().map(|(_, bounds)| bounds.len).collect();
    let cells: usize = grid_shape.iter().product();

    let mut grid = Vec::with_capacity(cells);
    for offsets in indices(IxDyn(&grid_shape)) {
        let mut selectors = base.clone();
        for ((tag, bounds), offset) in operable.iter().zip(offsets.slice()) {
            selectors.set(*tag, bounds.begin + offset);
        }
        grid.push(LazyPlane::new(Arc::clone(&file), selectors));
    }

    let mut axes: Vec<AxisView> = operable
        .iter()
        .map(|(tag, bounds)| AxisView::full(*tag, bounds.len))
        .collect();
    axes.push(AxisView::full(DimensionTag::Y, spatial_shape.0));
    axes.push(AxisView::full(DimensionTag::X, spatial_shape.1));

    let array = LazyArray {
        file,
        grid: Arc::new(grid),
        grid_shape,
        spatial_shape,
        axes,
    };

    debug!(
        "Built lazy array for {} with dims {} and shape {:?} ({} planes)",
        array.file.identifier(),
        array.dims_string(),
        array.shape(),
        cells
    );

    Ok(array)
}

/// Where to build a lazy array from
pub enum ImageSource<F> {
    Path(PathBuf),
    Handle(Arc<F>),
}

impl<F> From<PathBuf> for ImageSource<F> {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl<F> From<&Path> for ImageSource<F> {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl<F> From<&str> for ImageSource<F> {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl<F> From<Arc<F>> for ImageSource<F> {
    fn from(handle: Arc<F>) -> Self {
        Self::Handle(handle)
    }
}

/// Build a lazy array from a stack file path or an already open stack file
///
/// # Errors
///
/// `NotFound`, `IsADirectory` or `InvalidArgument` for unusable paths, then
/// anything [`build_lazy_array`] returns.
pub fn open_lazy_array<T: Pixel>(
    source: impl Into<ImageSource<StackFile<T>>>,
) -> Result<LazyArray<StackFile<T>>> {
    let file = match source.into() {
        ImageSource::Path(path) => Arc::new(StackFile::open(path)?),
        ImageSource::Handle(handle) => handle,
    };
    build_lazy_array(file)
}

impl<F: FileHandle> LazyArray<F> {
    /// The file this array reads from
    #[must_use]
    pub fn file(&self) -> &Arc<F> {
        &self.file
    }

    #[must_use]
    pub fn dtype(&self) -> DataType {
        F::Elem::DTYPE
    }

    /// Tags of the visible axes, spatial last
    #[must_use]
    pub fn dims(&self) -> Vec<DimensionTag> {
        self.axes.iter().filter(|a| a.kept).map(|a| a.tag).collect()
    }

    #[must_use]
    pub fn dims_string(&self) -> String {
        self.dims().into_iter().map(DimensionTag::as_char).collect()
    }

    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.axes
            .iter()
            .filter(|a| a.kept)
            .map(|a| a.positions.len())
            .collect()
    }

    /// Visible shape of the non-spatial axes
    #[must_use]
    pub fn operating_shape(&self) -> Vec<usize> {
        self.grid_axes()
            .iter()
            .filter(|a| a.kept)
            .map(|a| a.positions.len())
            .collect()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.axes.iter().filter(|a| a.kept).count()
    }

    /// Number of elements in the view
    #[must_use]
    pub fn size(&self) -> usize {
        self.shape().iter().product()
    }

    /// Visible length of `tag`, if it is an axis of this view
    #[must_use]
    pub fn len_of(&self, tag: DimensionTag) -> Option<usize> {
        self.axes
            .iter()
            .find(|a| a.kept && a.tag == tag)
            .map(|a| a.positions.len())
    }

    /// Number of plane reads a full materialization performs
    #[must_use]
    pub fn plane_count(&self) -> usize {
        self.grid_axes().iter().map(|a| a.positions.len()).product()
    }

    fn grid_axes(&self) -> &[AxisView] {
        &self.axes[..self.grid_shape.len()]
    }

    fn spatial_axes(&self) -> &[AxisView] {
        &self.axes[self.grid_shape.len()..]
    }

    /// Select along one dimension without reading anything
    ///
    /// An index removes the dimension from the shape and dims string; a range
    /// keeps it. Selecting a dimension that is not part of the view is ignored
    /// with a warning.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the index or range falls outside the axis.
    pub fn select(&self, tag: DimensionTag, selection: AxisSelection) -> Result<Self> {
        let Some(axis) = self.axes.iter().position(|a| a.kept && a.tag == tag) else {
            warn!(
                "Ignoring the selection {:?} on '{}' as it is not a dimension of this array ({})",
                selection,
                tag,
                self.dims_string()
            );
            return Ok(self.clone());
        };

        let mut view = self.clone();
        view.axes[axis] = apply_selection(&self.axes[axis], selection)?;
        Ok(view)
    }

    /// Apply one selection per visible axis, in dims order
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the number of selections does not match
    /// [`ndim`](Self::ndim) or any selection is out of bounds.
    pub fn slice(&self, selections: &[AxisSelection]) -> Result<Self> {
        if selections.len() != self.ndim() {
            return Err(TimelapseError::invalid_argument(format!(
                "expected {} selections for dims '{}', got {}",
                self.ndim(),
                self.dims_string(),
                selections.len()
            )));
        }

        let mut view = self.clone();
        let kept: Vec<usize> = (0..self.axes.len()).filter(|&i| self.axes[i].kept).collect();
        for (&axis, &selection) in kept.iter().zip(selections) {
            view.axes[axis] = apply_selection(&self.axes[axis], selection)?;
        }
        Ok(view)
    }

    /// Split into one view per (scene, channel) pair with both indexed out
    ///
    /// Falls back to per-scene or per-channel views when only one of the two
    /// is present, and to the whole array when neither is.
    ///
    /// # Errors
    ///
    /// Only if a selection fails, which cannot happen for in-bounds indices.
    pub fn scene_channel_views(&self) -> Result<Vec<Self>> {
        let scenes = self.len_of(DimensionTag::Scene);
        let channels = self.len_of(DimensionTag::Channel);

        let mut views = Vec::new();
        match (scenes, channels) {
            (Some(s), Some(c)) => {
                for si in 0..s {
                    let scene = self.select(DimensionTag::Scene, AxisSelection::Index(si))?;
                    for ci in 0..c {
                        views.push(scene.select(DimensionTag::Channel, AxisSelection::Index(ci))?);
                    }
                }
            }
            (Some(s), None) => {
                for si in 0..s {
                    views.push(self.select(DimensionTag::Scene, AxisSelection::Index(si))?);
                }
            }
            (None, Some(c)) => {
                for ci in 0..c {
                    views.push(self.select(DimensionTag::Channel, AxisSelection::Index(ci))?);
                }
            }
            (None, None) => views.push(self.clone()),
        }
        Ok(views)
    }

    /// Grid cells covered by this view, in row-major order of the view
    fn cell_indices(&self) -> Vec<usize> {
        let axes = self.grid_axes();
        let lens: Vec<usize> = axes.iter().map(|a| a.positions.len()).collect();
        indices(IxDyn(&lens))
            .into_iter()
            .map(|offsets| {
                axes.iter()
                    .zip(offsets.slice())
                    .zip(&self.grid_shape)
                    .fold(0, |flat, ((axis, &o), &n)| flat * n + axis.positions[o])
            })
            .collect()
    }

    /// Read one grid cell and apply the spatial part of the view
    fn evaluate_cell(&self, cell: usize) -> Result<ArrayD<F::Elem>> {
        let mut plane = self.grid[cell].evaluate()?.into_dyn();

        let (sy, sx) = self.spatial_shape;
        for (axis, (view, len)) in self.spatial_axes().iter().zip([sy, sx]).enumerate() {
            if plane.shape()[axis] != len {
                return Err(TimelapseError::corrupt(format!(
                    "plane {} has shape {:?}, expected ({sy}, {sx})",
                    self.grid[cell].selectors(),
                    plane.shape()
                )));
            }
            if !view.is_identity(len) {
                plane = plane.select(Axis(axis), &view.positions);
            }
        }

        for axis in (0..2).rev() {
            if !self.spatial_axes()[axis].kept {
                plane = plane.index_axis_move(Axis(axis), 0);
            }
        }
        Ok(plane)
    }

    /// Materialize the plane at `index`, one entry per visible non-spatial axis
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a wrong-length or out-of-bounds index; read
    /// failures propagate.
    pub fn plane(&self, index: &[usize]) -> Result<ArrayD<F::Elem>> {
        let axes = self.grid_axes();
        let kept = axes.iter().filter(|a| a.kept).count();
        if index.len() != kept {
            return Err(TimelapseError::invalid_argument(format!(
                "expected a {kept}-dimensional plane index, got {index:?}"
            )));
        }

        let mut given = index.iter();
        let mut flat = 0;
        for (axis, &n) in axes.iter().zip(&self.grid_shape) {
            let offset = if axis.kept {
                let &i = given.next().unwrap_or(&0);
                *axis.positions.get(i).ok_or_else(|| {
                    TimelapseError::invalid_argument(format!(
                        "index {i} out of bounds for '{}' with length {}",
                        axis.tag,
                        axis.positions.len()
                    ))
                })?
            } else {
                axis.positions[0]
            };
            flat = flat * n + offset;
        }
        self.evaluate_cell(flat)
    }

    /// Read every plane of the view sequentially and assemble the result
    ///
    /// # Errors
    ///
    /// The first read failure aborts materialization.
    pub fn materialize(&self) -> Result<ArrayD<F::Elem>> {
        let planes = self
            .cell_indices()
            .into_iter()
            .map(|cell| self.evaluate_cell(cell))
            .collect::<Result<Vec<_>>>()?;
        self.assemble(planes)
    }

    /// Read planes concurrently on `pool`; results are placed by index
    ///
    /// # Errors
    ///
    /// Any read failure aborts materialization.
    pub fn materialize_in(&self, pool: &ThreadPool) -> Result<ArrayD<F::Elem>> {
        let cells = self.cell_indices();
        debug!(
            "Materializing {} planes across {} threads",
            cells.len(),
            pool.current_num_threads()
        );
        let planes = pool.install(|| {
            cells
                .par_iter()
                .map(|&cell| self.evaluate_cell(cell))
                .collect::<Result<Vec<_>>>()
        })?;
        self.assemble(planes)
    }

    fn assemble(&self, planes: Vec<ArrayD<F::Elem>>) -> Result<ArrayD<F::Elem>> {
        let mut data = Vec::with_capacity(self.size());
        for plane in &planes {
            data.extend(plane.iter().copied());
        }
        Ok(ArrayD::from_shape_vec(IxDyn(&self.shape()), data)?)
    }
}

fn apply_selection(axis: &AxisView, selection: AxisSelection) -> Result<AxisView> {
    let len = axis.positions.len();
    match selection {
        AxisSelection::Index(i) => {
            let &position = axis.positions.get(i).ok_or_else(|| {
                TimelapseError::invalid_argument(format!(
                    "index {i} out of bounds for '{}' with length {len}",
                    axis.tag
                ))
            })?;
            Ok(AxisView {
                tag: axis.tag,
                positions: vec![position],
                kept: false,
            })
        }
        AxisSelection::Range(range) => {
            let picked = range.resolve(0, len)?;
            Ok(AxisView {
                tag: axis.tag,
                positions: picked.into_iter().map(|p| axis.positions[p]).collect(),
                kept: true,
            })
        }
    }
}
